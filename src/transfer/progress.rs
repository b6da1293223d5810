//! Parsers for rsync's `--info=progress2`, `--itemize-changes` and
//! `--stats` output

/// Percentage from a progress2 line such as
/// `    1,238,099  45%  146.38MB/s    0:00:00 (xfr#1, to-chk=0/1)`
pub fn parse_percent(line: &str) -> Option<u8> {
    line.split_whitespace()
        .find_map(|token| token.strip_suffix('%'))
        .and_then(|pct| pct.parse::<u8>().ok())
        .filter(|pct| *pct <= 100)
}

/// Files completed so far, from the `xfr#N` marker of a progress2 line
pub fn parse_xfr_count(line: &str) -> Option<u64> {
    let start = line.find("xfr#")? + "xfr#".len();
    let digits: String = line[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Parse a `--stats` number: `1,234`, `1.23K`, `4.5M`
fn parse_stat_number(raw: &str) -> Option<u64> {
    let raw = raw.trim().replace(',', "");
    let (digits, multiplier) = match raw.chars().last()? {
        'K' => (&raw[..raw.len() - 1], 1024f64),
        'M' => (&raw[..raw.len() - 1], 1024f64 * 1024.0),
        'G' => (&raw[..raw.len() - 1], 1024f64 * 1024.0 * 1024.0),
        'T' => (&raw[..raw.len() - 1], 1024f64 * 1024.0 * 1024.0 * 1024.0),
        _ => (raw.as_str(), 1f64),
    };
    if multiplier == 1.0 {
        digits.parse().ok()
    } else {
        digits.parse::<f64>().ok().map(|n| (n * multiplier).round() as u64)
    }
}

/// Value following `label:` on the first line that starts with it
fn stat_value<'a>(lines: impl IntoIterator<Item = &'a str>, label: &str) -> Option<u64> {
    lines.into_iter().find_map(|line| {
        let rest = line.trim().strip_prefix(label)?.strip_prefix(':')?;
        let first = rest.split_whitespace().next()?;
        parse_stat_number(first)
    })
}

/// Whether a line is an itemized change for a regular file (`>f+++++++++ a.txt`)
fn is_itemized_file(line: &str) -> bool {
    let mut chars = line.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('>' | '<' | 'c' | 'h'), Some('f'))
    )
}

/// Estimated file count from a dry run's combined output
///
/// Prefers `Number of regular files transferred:` (rsync >= 3.1), then the
/// older `Number of files transferred:`, then counts itemized file lines.
pub fn parse_dry_run_estimate(output: &str) -> u64 {
    stat_value(output.lines(), "Number of regular files transferred")
        .or_else(|| stat_value(output.lines(), "Number of files transferred"))
        .unwrap_or_else(|| output.lines().filter(|l| is_itemized_file(l)).count() as u64)
}

/// Whether a line belongs to rsync's `--stats` summary
pub fn is_stats_line(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("Number of ") || line.starts_with("Total ")
}

/// (files transferred, bytes transferred) from a real run's `--stats` block
pub fn parse_transfer_totals(lines: &[String]) -> (Option<u64>, Option<u64>) {
    let iter = || lines.iter().map(String::as_str);
    let files = stat_value(iter(), "Number of regular files transferred")
        .or_else(|| stat_value(iter(), "Number of files transferred"));
    let bytes = stat_value(iter(), "Total transferred file size");
    (files, bytes)
}

/// Emits each 10% checkpoint at most once
///
/// progress2 can step backwards while incremental recursion discovers more
/// files; regressions are ignored.
#[derive(Debug, Default)]
pub struct CheckpointTracker {
    last_checkpoint: u8,
}

impl CheckpointTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the checkpoint crossed by `percent`, if it is a new one
    pub fn observe(&mut self, percent: u8) -> Option<u8> {
        let checkpoint = (percent.min(100) / 10) * 10;
        if checkpoint > self.last_checkpoint {
            self.last_checkpoint = checkpoint;
            Some(checkpoint)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_from_progress2_line() {
        let line = "      1,238,099  45%  146.38MB/s    0:00:00 (xfr#1, to-chk=0/1)";
        assert_eq!(parse_percent(line), Some(45));
        assert_eq!(parse_xfr_count(line), Some(1));
        assert_eq!(parse_percent("sending incremental file list"), None);
        assert_eq!(parse_xfr_count("no marker here"), None);
    }

    #[test]
    fn dry_run_estimate_from_stats() {
        let output = "\
>f+++++++++ a.txt
>f+++++++++ b.txt

Number of files: 12 (reg: 10, dir: 2)
Number of created files: 2
Number of regular files transferred: 7
Total file size: 1,234 bytes
";
        assert_eq!(parse_dry_run_estimate(output), 7);
    }

    #[test]
    fn dry_run_estimate_falls_back() {
        let old = "Number of files transferred: 3\n";
        assert_eq!(parse_dry_run_estimate(old), 3);

        let itemized = ">f+++++++++ a.txt\ncd+++++++++ sub/\n>f.st...... sub/b.txt\n";
        assert_eq!(parse_dry_run_estimate(itemized), 2);

        assert_eq!(parse_dry_run_estimate(""), 0);
    }

    #[test]
    fn transfer_totals() {
        let lines: Vec<String> = [
            "Number of regular files transferred: 1,024",
            "Total transferred file size: 5,242,880 bytes",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(parse_transfer_totals(&lines), (Some(1024), Some(5_242_880)));
        assert_eq!(parse_transfer_totals(&[]), (None, None));
    }

    #[test]
    fn stats_lines_are_recognized() {
        assert!(is_stats_line("Number of regular files transferred: 3"));
        assert!(is_stats_line("Total transferred file size: 10 bytes"));
        assert!(!is_stats_line("      1,238,099  45%  146.38MB/s    0:00:00"));
        assert!(!is_stats_line("sent 1,024 bytes  received 35 bytes"));
    }

    #[test]
    fn human_readable_numbers() {
        assert_eq!(parse_stat_number("1.50K"), Some(1536));
        assert_eq!(parse_stat_number("2M"), Some(2 * 1024 * 1024));
        assert_eq!(parse_stat_number("n/a"), None);
    }

    #[test]
    fn checkpoints_every_ten_percent() {
        let mut tracker = CheckpointTracker::new();
        let seen: Vec<u8> = [3, 9, 10, 14, 27, 25, 99, 100, 100]
            .into_iter()
            .filter_map(|p| tracker.observe(p))
            .collect();
        assert_eq!(seen, vec![10, 20, 90, 100]);
    }
}
