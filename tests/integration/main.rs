//! Integration tests for rmirror

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const KEY: &str = "0123456789abcdef";
    const OTHER_KEY: &str = "fedcba9876543210";

    /// Config file pointing the cache root into a temp dir
    struct Sandbox {
        dir: TempDir,
    }

    impl Sandbox {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().join("cache");
            fs::create_dir_all(&root).unwrap();
            let config = format!(
                "[general]\naudit_log = false\n\n[cache]\nroot = {:?}\n",
                root.display().to_string()
            );
            fs::write(dir.path().join("config.toml"), config).unwrap();
            Self { dir }
        }

        fn config_path(&self) -> PathBuf {
            self.dir.path().join("config.toml")
        }

        fn root(&self) -> PathBuf {
            self.dir.path().join("cache")
        }

        /// A cache entry with one file and a sync stamp `hours_ago` old
        fn seed(&self, key: &str, hours_ago: i64) -> PathBuf {
            let path = self.root().join(key);
            fs::create_dir_all(path.join("srv")).unwrap();
            fs::write(path.join("srv/data.txt"), "mirrored").unwrap();
            let synced_at = chrono::Utc::now() - chrono::Duration::hours(hours_ago);
            fs::write(
                path.join(".rmirror-synced.json"),
                format!("{{\"synced_at\":\"{}\"}}", synced_at.to_rfc3339()),
            )
            .unwrap();
            path
        }

        fn lock(&self, key: &str) {
            let lock = serde_json::json!({
                "sync_id": "integration-sync",
                "acquired_at": chrono::Utc::now().to_rfc3339(),
                "owner_pid": std::process::id(),
            });
            fs::write(self.root().join(key).join(".rmirror-lock.json"), lock.to_string()).unwrap();
        }

        fn cmd(&self) -> Command {
            let mut cmd = rmirror();
            cmd.env_remove("RUST_LOG")
                .env("RMIRROR_CONFIG", self.config_path());
            cmd
        }
    }

    fn rmirror() -> Command {
        cargo_bin_cmd!("rmirror")
    }

    fn exists(path: &Path) -> bool {
        path.exists()
    }

    #[test]
    fn help_displays() {
        rmirror()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("mirror remote trees"));
    }

    #[test]
    fn version_displays() {
        rmirror()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("rmirror"));
    }

    #[test]
    fn sync_help_lists_filters() {
        rmirror()
            .args(["sync", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--exclude-ext"))
            .stdout(predicate::str::contains("--if-stale"));
    }

    #[test]
    fn config_path_honors_flag() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("ttl_hours = 72"));
    }

    #[test]
    fn config_set_persists() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "set", "cache.ttl_hours", "6"])
            .assert()
            .success();

        let written = fs::read_to_string(sandbox.config_path()).unwrap();
        assert!(written.contains("ttl_hours = 6"));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "set", "vm.name", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn invalid_config_file_is_reported() {
        let sandbox = Sandbox::new();
        fs::write(sandbox.config_path(), "[cache\nroot = ").unwrap();
        sandbox
            .cmd()
            .arg("list")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn list_empty() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No caches"));
    }

    #[test]
    fn list_json_shows_entries() {
        let sandbox = Sandbox::new();
        sandbox.seed(KEY, 1);
        sandbox.seed(OTHER_KEY, 200);

        let output = sandbox
            .cmd()
            .args(["list", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let entries = entries.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["cache_key"], KEY);
        assert_eq!(entries[0]["state"], "fresh");
        assert_eq!(entries[0]["file_count"], 1);
        assert_eq!(entries[1]["state"], "expired");
    }

    #[test]
    fn list_locked_filter() {
        let sandbox = Sandbox::new();
        sandbox.seed(KEY, 1);
        sandbox.seed(OTHER_KEY, 1);
        sandbox.lock(OTHER_KEY);

        sandbox
            .cmd()
            .args(["list", "--locked", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::eq(format!("{}\n", OTHER_KEY)));
    }

    #[test]
    fn status_by_key() {
        let sandbox = Sandbox::new();
        sandbox.seed(KEY, 1);

        sandbox
            .cmd()
            .args(["status", "--key", KEY, "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"state\": \"fresh\""))
            .stdout(predicate::str::contains("\"locked\": false"));
    }

    #[test]
    fn status_of_missing_cache() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["status", "--key", KEY, "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("missing"));
    }

    #[test]
    fn status_require_exists_fails_for_missing_cache() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["status", "--key", KEY, "--require-exists"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("Cache not found"))
            .stderr(predicate::str::contains(KEY));
    }

    #[test]
    fn status_require_exists_passes_for_synced_cache() {
        let sandbox = Sandbox::new();
        sandbox.seed(KEY, 1);
        sandbox
            .cmd()
            .args(["status", "--key", KEY, "--require-exists", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("fresh"));
    }

    #[test]
    fn status_rejects_non_key() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["status", "--key", "../etc"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("not a cache key"));
    }

    #[test]
    fn status_needs_key_or_target() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--key"));
    }

    #[test]
    fn cleanup_removes_old_unlocked_caches() {
        let sandbox = Sandbox::new();
        let fresh = sandbox.seed(KEY, 1);
        let old = sandbox.seed(OTHER_KEY, 200);

        sandbox
            .cmd()
            .args(["cleanup", "--max-age-hours", "72", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::eq(format!("{}\n", OTHER_KEY)));

        assert!(exists(&fresh));
        assert!(!exists(&old));
    }

    #[test]
    fn cleanup_skips_locked_caches() {
        let sandbox = Sandbox::new();
        let locked = sandbox.seed(KEY, 200);
        sandbox.lock(KEY);

        let output = sandbox
            .cmd()
            .args(["cleanup", "--max-age-hours", "0", "--yes", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["skipped_locked"][0], KEY);
        assert_eq!(report["removed"].as_array().unwrap().len(), 0);
        assert!(exists(&locked));
    }

    #[test]
    fn cleanup_all_requires_confirmation() {
        let sandbox = Sandbox::new();
        let cache = sandbox.seed(KEY, 1);

        sandbox
            .cmd()
            .args(["cleanup", "--max-age-hours", "0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--yes"));
        assert!(exists(&cache));
    }

    #[test]
    fn unlock_removes_lock() {
        let sandbox = Sandbox::new();
        sandbox.seed(KEY, 1);
        sandbox.lock(KEY);

        sandbox
            .cmd()
            .args(["unlock", "--key", KEY, "--yes", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"unlocked\": true"));

        assert!(!exists(&sandbox.root().join(KEY).join(".rmirror-lock.json")));
    }

    #[test]
    fn unlock_unknown_key_is_noop() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["unlock", "--key", KEY, "--yes", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::eq("false\n"));
    }

    #[test]
    fn unlock_rejects_non_key() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["unlock", "--key", "not-a-key", "--yes"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not a cache key"));
    }

    #[test]
    fn sync_without_host_fails() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["sync", "-u", "dev", "-d", "/srv"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--host is required"));
    }
}
