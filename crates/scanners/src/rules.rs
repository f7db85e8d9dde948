//! Pattern ruleset provisioning: clone-or-update with serialized refresh.
//!
//! The ruleset checkout is process-wide shared read-only state. Readers
//! (the YARA adapter) read whatever revision is on disk; refreshes are
//! serialized so at most one runs at a time, and the initial clone lands
//! through a staging directory plus rename so a concurrent reader never
//! observes a half-written tree.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::ScanConfig;
use crate::exec::{CommandRunner, ExecError};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("clone of {url} failed: {stderr}")]
    Clone { url: String, stderr: String },

    #[error("update of {} failed: {stderr}", .path.display())]
    Update { path: PathBuf, stderr: String },

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Owned handle to the shared ruleset checkout. Never a global: the
/// orchestrator owns one and hands it to the pattern adapter.
pub struct RuleStore {
    repo_url: String,
    path: PathBuf,
    entry: String,
    git_program: String,
    runner: CommandRunner,
    refresh_lock: Mutex<()>,
}

impl RuleStore {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            repo_url: config.rules_repo_url.clone(),
            path: config.rules_dir.clone(),
            entry: config.rules_entry.clone(),
            git_program: config.git_program.clone(),
            runner: CommandRunner::new(config.scan_timeout),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rule file handed to the compiler.
    pub fn entry_file(&self) -> PathBuf {
        self.path.join(&self.entry)
    }

    pub fn is_provisioned(&self) -> bool {
        self.path.join(".git").exists()
    }

    /// Clone-or-update maintenance operation, run at process startup.
    ///
    /// Idempotent: an up-to-date checkout costs one fast-forward check.
    /// Failure is reported but must not prevent the process from serving
    /// requests — the pattern adapter then fails per-request instead.
    pub async fn ensure(&self) -> Result<(), ProvisionError> {
        let _guard = self.refresh_lock.lock().await;
        if self.is_provisioned() {
            self.update().await
        } else {
            self.clone_fresh().await
        }
    }

    async fn clone_fresh(&self) -> Result<(), ProvisionError> {
        let parent = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;

        // Stage the clone next to the final location so the rename that
        // publishes it stays on one filesystem.
        let staging = tempfile::Builder::new()
            .prefix(".rules-staging-")
            .tempdir_in(&parent)?;
        let checkout = staging.path().join("rules");
        let checkout_arg = checkout.to_string_lossy().into_owned();

        info!("Cloning pattern rules from {}", self.repo_url);
        let output = self
            .runner
            .run(
                &self.git_program,
                &["clone", "--depth", "1", &self.repo_url, &checkout_arg],
            )
            .await?;
        if !output.success() {
            return Err(ProvisionError::Clone {
                url: self.repo_url.clone(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        std::fs::rename(&checkout, &self.path)?;
        Ok(())
    }

    async fn update(&self) -> Result<(), ProvisionError> {
        let path_arg = self.path.to_string_lossy().into_owned();
        info!("Updating pattern rules in {}", self.path.display());
        let output = self
            .runner
            .run(&self.git_program, &["-C", &path_arg, "pull", "--ff-only"])
            .await?;
        if !output.success() {
            return Err(ProvisionError::Update {
                path: self.path.clone(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    /// Stand-in `git` that records its argument vectors and mimics clone
    /// (creating `dest/.git`) without touching the network.
    fn fake_git(dir: &Path, log: &Path) -> PathBuf {
        let script = dir.join("fake-git");
        let body = format!(
            "#!/bin/sh\n\
             echo \"$@\" >> {log}\n\
             if [ \"$1\" = clone ]; then\n\
             \tfor dest; do :; done\n\
             \tmkdir -p \"$dest/.git\"\n\
             \techo rules > \"$dest/rules.yar\"\n\
             fi\n\
             exit 0\n",
            log = log.display()
        );
        std::fs::write(&script, body).unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();
        script
    }

    fn store_in(dir: &Path) -> (RuleStore, PathBuf) {
        let log = dir.join("git.log");
        let script = fake_git(dir, &log);
        let config = ScanConfig::default()
            .with_rules_dir(dir.join("yara-rules"))
            .with_rules_repo_url("https://example.invalid/rules.git")
            .with_git_program(script.to_string_lossy().into_owned())
            .with_scan_timeout(Duration::from_secs(5));
        (RuleStore::new(&config), log)
    }

    #[tokio::test]
    async fn test_first_ensure_clones_then_updates() {
        let dir = tempfile::tempdir().unwrap();
        let (store, log) = store_in(dir.path());

        assert!(!store.is_provisioned());
        store.ensure().await.unwrap();
        assert!(store.is_provisioned());
        assert!(store.entry_file().starts_with(store.path()));

        store.ensure().await.unwrap();

        let log = std::fs::read_to_string(log).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("clone --depth 1"));
        assert!(lines[1].contains("pull --ff-only"));
    }

    #[tokio::test]
    async fn test_idempotent_update_leaves_checkout_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _log) = store_in(dir.path());

        store.ensure().await.unwrap();
        let before = std::fs::read_to_string(store.path().join("rules.yar")).unwrap();
        store.ensure().await.unwrap();
        let after = std::fs::read_to_string(store.path().join("rules.yar")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_clone_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("failing-git");
        std::fs::write(&script, "#!/bin/sh\necho 'fatal: could not resolve host' >&2\nexit 128\n")
            .unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let config = ScanConfig::default()
            .with_rules_dir(dir.path().join("yara-rules"))
            .with_git_program(script.to_string_lossy().into_owned())
            .with_scan_timeout(Duration::from_secs(5));
        let store = RuleStore::new(&config);

        let err = store.ensure().await.unwrap_err();
        assert!(matches!(err, ProvisionError::Clone { .. }));
        assert!(err.to_string().contains("could not resolve host"));
        assert!(!store.is_provisioned());
    }
}
