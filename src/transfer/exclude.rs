//! Exclusion rules shared by the key deriver and the rsync command builder
//!
//! User patterns are regular expressions matched against entry names.
//! rsync only understands glob patterns, so each regex is converted when it
//! has a glob equivalent. The rest are enforced by [`ExclusionRules::prune`]
//! on the mirror once a directory transfer finishes.

use crate::cache::key::{normalize_extension, SyncOptions};
use crate::cache::store::SIDECAR_PREFIX;
use crate::error::{RmirrorError, RmirrorResult};
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Compiled, canonical exclusion set
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    extensions: Vec<String>,
    dirs: Vec<String>,
    patterns: Vec<Regex>,
}

impl ExclusionRules {
    /// Build from sync options, dropping invalid regexes with a warning
    pub fn from_options(options: &SyncOptions) -> Self {
        let canonical = options.canonical();
        let patterns = canonical
            .exclude_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %pattern, "Ignoring invalid exclude pattern: {}", e);
                    None
                }
            })
            .collect();

        Self {
            extensions: canonical.exclude_extensions,
            dirs: canonical.exclude_dirs,
            patterns,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty() && self.dirs.is_empty() && self.patterns.is_empty()
    }

    /// Number of valid regex patterns kept
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Whether an entry would be excluded
    ///
    /// `path` is relative to the synced root, `/`-separated. Directory rules
    /// match any component, extension and regex rules match the file name.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.trim_matches('/');
        let name = path.rsplit('/').next().unwrap_or(path);

        if path.split('/').any(|part| self.dirs.iter().any(|d| d == part)) {
            return true;
        }

        if let Some((_, ext)) = name.rsplit_once('.') {
            let ext = normalize_extension(ext);
            if self.extensions.contains(&ext) {
                return true;
            }
        }

        self.patterns.iter().any(|re| re.is_match(name))
    }

    /// rsync `--exclude=` arguments for this rule set
    pub fn rsync_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        for ext in &self.extensions {
            args.push(format!("--exclude=*.{}", ext));
        }
        for dir in &self.dirs {
            args.push(format!("--exclude={}/", dir));
        }
        for re in &self.patterns {
            match regex_to_glob(re.as_str()) {
                Some(glob) => args.push(format!("--exclude={}", glob)),
                None => debug!(
                    pattern = %re.as_str(),
                    "Exclude pattern has no rsync glob form, pruning after transfer"
                ),
            }
        }

        args
    }

    /// Delete every entry under `root` the rules exclude
    ///
    /// Sidecars are never touched. Returns the number of entries removed;
    /// an excluded directory counts once.
    pub fn prune(&self, root: &Path) -> RmirrorResult<u64> {
        if self.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        let mut walker = WalkDir::new(root).min_depth(1).follow_links(false).into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if entry.file_name().to_string_lossy().starts_with(SIDECAR_PREFIX) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !self.matches(&relative) {
                continue;
            }

            let result = if entry.file_type().is_dir() {
                walker.skip_current_dir();
                fs::remove_dir_all(entry.path())
            } else {
                fs::remove_file(entry.path())
            };
            result.map_err(|e| {
                RmirrorError::io(format!("pruning excluded {}", entry.path().display()), e)
            })?;
            debug!(path = %relative, "Pruned excluded entry");
            removed += 1;
        }

        Ok(removed)
    }
}

/// Convert a simple regex to an rsync glob
///
/// Supported: `^`/`$` anchors, `.*`, `.`, escaped literals, character
/// classes. Alternation, groups, `+`, `?` and counted repetition have no
/// glob form and yield `None`.
pub fn regex_to_glob(pattern: &str) -> Option<String> {
    if pattern.contains(['(', ')', '|', '+', '{', '}']) {
        return None;
    }

    let (anchored_start, body) = match pattern.strip_prefix('^') {
        Some(rest) => (true, rest),
        None => (false, pattern),
    };
    let (anchored_end, body) = match body.strip_suffix('$') {
        Some(rest) if !rest.ends_with('\\') => (true, rest),
        _ => (false, body),
    };

    let mut glob = String::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                escaped @ ('.' | '-' | '_' | '/' | '$' | '^') => glob.push(escaped),
                // glob metacharacters need their own escape
                escaped @ ('*' | '?' | '[' | ']') => {
                    glob.push('\\');
                    glob.push(escaped);
                }
                // \d, \w, \s, ... have no glob form
                _ => return None,
            },
            '.' if chars.peek() == Some(&'*') => {
                chars.next();
                glob.push('*');
            }
            '.' => glob.push('?'),
            '*' | '?' => return None,
            '[' => {
                glob.push('[');
                loop {
                    let class_char = chars.next()?;
                    glob.push(class_char);
                    if class_char == ']' {
                        break;
                    }
                }
            }
            other => glob.push(other),
        }
    }

    if !anchored_start && !glob.starts_with('*') {
        glob.insert(0, '*');
    }
    if !anchored_end && !glob.ends_with('*') {
        glob.push('*');
    }
    if glob.is_empty() || glob.chars().all(|c| c == '*') {
        // A match-everything exclude would empty the mirror
        return None;
    }
    Some(glob)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(exts: &[&str], dirs: &[&str], patterns: &[&str]) -> SyncOptions {
        SyncOptions {
            exclude_extensions: exts.iter().map(|s| s.to_string()).collect(),
            exclude_dirs: dirs.iter().map(|s| s.to_string()).collect(),
            exclude_patterns: patterns.iter().map(|s| s.to_string()).collect(),
            ..SyncOptions::default()
        }
    }

    #[test]
    fn empty_rules_emit_no_args() {
        let rules = ExclusionRules::from_options(&SyncOptions::default());
        assert!(rules.is_empty());
        assert!(rules.rsync_args().is_empty());
    }

    #[test]
    fn extensions_and_dirs_become_excludes() {
        let rules = ExclusionRules::from_options(&options(&[".LOG", "tmp"], &["node_modules/"], &[]));
        assert_eq!(
            rules.rsync_args(),
            vec!["--exclude=*.log", "--exclude=*.tmp", "--exclude=node_modules/"]
        );
    }

    #[test]
    fn invalid_regex_dropped() {
        let rules = ExclusionRules::from_options(&options(&[], &[], &["[unclosed", "^cache_"]));
        assert_eq!(rules.pattern_count(), 1);
        assert!(rules.matches("cache_01.bin"));
    }

    #[test]
    fn matches_by_dir_extension_and_pattern() {
        let rules = ExclusionRules::from_options(&options(&["log"], &["target"], &["^~"]));
        assert!(rules.matches("app/debug.LOG"));
        assert!(rules.matches("crates/core/target/release/app"));
        assert!(rules.matches("src/~lock"));
        assert!(!rules.matches("src/main.rs"));
        assert!(!rules.matches("targets/list.txt"));
    }

    #[test]
    fn regex_glob_conversion() {
        assert_eq!(regex_to_glob(r"^temp_.*\.log$").as_deref(), Some("temp_*.log"));
        assert_eq!(regex_to_glob(r"\.bak$").as_deref(), Some("*.bak"));
        assert_eq!(regex_to_glob("backup").as_deref(), Some("*backup*"));
        assert_eq!(regex_to_glob("^v.$").as_deref(), Some("v?"));
        assert_eq!(regex_to_glob("^[0-9]x$").as_deref(), Some("[0-9]x"));
    }

    #[test]
    fn unsupported_regex_has_no_glob() {
        assert_eq!(regex_to_glob("(a|b)"), None);
        assert_eq!(regex_to_glob(r"\d+"), None);
        assert_eq!(regex_to_glob("ab?c"), None);
        assert_eq!(regex_to_glob(".*"), None);
    }

    #[test]
    fn unsupported_regex_still_matches_locally() {
        let rules = ExclusionRules::from_options(&options(&[], &[], &[r"^\d+\.tmp$"]));
        assert!(rules.matches("123.tmp"));
        assert!(rules.rsync_args().is_empty());
    }

    #[test]
    fn prune_removes_entries_rsync_could_not_skip() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src/build-linux")).unwrap();
        fs::write(root.join("123.tmp"), "x").unwrap();
        fs::write(root.join("src/45.tmp"), "x").unwrap();
        fs::write(root.join("src/build-linux/out.o"), "x").unwrap();
        fs::write(root.join("src/main.rs"), "x").unwrap();
        fs::write(root.join("v1.tmp"), "x").unwrap();
        fs::write(root.join(".rmirror-synced.json"), "{}").unwrap();

        let rules = ExclusionRules::from_options(&options(&[], &[], &[r"^\d+\.tmp$", r"^build-\w+$"]));
        assert_eq!(rules.prune(root).unwrap(), 3);

        assert!(!root.join("123.tmp").exists());
        assert!(!root.join("src/45.tmp").exists());
        assert!(!root.join("src/build-linux").exists());
        assert!(root.join("src/main.rs").exists());
        assert!(root.join("v1.tmp").exists());
        assert!(root.join(".rmirror-synced.json").exists());
    }

    #[test]
    fn prune_without_rules_is_noop() {
        let temp = tempfile::TempDir::new().unwrap();
        fs::write(temp.path().join("123.tmp"), "x").unwrap();
        let rules = ExclusionRules::from_options(&SyncOptions::default());
        assert_eq!(rules.prune(temp.path()).unwrap(), 0);
        assert!(temp.path().join("123.tmp").exists());
    }
}
