//! Trivy adapters: filesystem, image and repository scan modes of the same
//! external tool, each with its own fixed audit-log path.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::ScanConfig;
use crate::core::{Adapter, AdapterError, ScanResult, ScanTarget, ScanType};
use crate::exec::CommandRunner;

use super::run_cli_scan;

pub struct TrivyFsAdapter {
    program: String,
    log_path: PathBuf,
    runner: CommandRunner,
}

impl TrivyFsAdapter {
    pub fn new(config: &ScanConfig, runner: CommandRunner) -> Self {
        Self {
            program: config.trivy_program.clone(),
            log_path: config.results_dir.join("trivy_fs_scan.log"),
            runner,
        }
    }
}

#[async_trait]
impl Adapter for TrivyFsAdapter {
    fn id(&self) -> &'static str {
        "trivy-fs"
    }

    fn name(&self) -> &'static str {
        "Trivy filesystem scan"
    }

    fn scan_type(&self) -> ScanType {
        ScanType::TrivyFs
    }

    async fn scan(&self, target: &ScanTarget) -> Result<ScanResult, AdapterError> {
        let target_arg = target.to_string();
        run_cli_scan(
            &self.runner,
            &self.program,
            &["fs", &target_arg, "--format", "table"],
            &self.log_path,
            self.scan_type(),
            target,
        )
        .await
    }
}

pub struct TrivyImageAdapter {
    program: String,
    log_path: PathBuf,
    runner: CommandRunner,
}

impl TrivyImageAdapter {
    pub fn new(config: &ScanConfig, runner: CommandRunner) -> Self {
        Self {
            program: config.trivy_program.clone(),
            log_path: config.results_dir.join("trivy_image_scan.log"),
            runner,
        }
    }
}

#[async_trait]
impl Adapter for TrivyImageAdapter {
    fn id(&self) -> &'static str {
        "trivy-image"
    }

    fn name(&self) -> &'static str {
        "Trivy image scan"
    }

    fn scan_type(&self) -> ScanType {
        ScanType::TrivyImage
    }

    async fn scan(&self, target: &ScanTarget) -> Result<ScanResult, AdapterError> {
        let target_arg = target.to_string();
        run_cli_scan(
            &self.runner,
            &self.program,
            &["image", &target_arg, "--format", "table"],
            &self.log_path,
            self.scan_type(),
            target,
        )
        .await
    }
}

/// Repository mode works against a remote URL and against a local checkout;
/// the orchestrator uses it for both legs of the repository pipeline.
pub struct TrivyRepoAdapter {
    program: String,
    log_path: PathBuf,
    runner: CommandRunner,
}

impl TrivyRepoAdapter {
    pub fn new(config: &ScanConfig, runner: CommandRunner) -> Self {
        Self {
            program: config.trivy_program.clone(),
            log_path: config.results_dir.join("trivy_repo_scan.log"),
            runner,
        }
    }
}

#[async_trait]
impl Adapter for TrivyRepoAdapter {
    fn id(&self) -> &'static str {
        "trivy-repo"
    }

    fn name(&self) -> &'static str {
        "Trivy repository scan"
    }

    fn scan_type(&self) -> ScanType {
        ScanType::TrivyRepo
    }

    async fn scan(&self, target: &ScanTarget) -> Result<ScanResult, AdapterError> {
        let target_arg = target.to_string();
        run_cli_scan(
            &self.runner,
            &self.program,
            &["repo", &target_arg, "--format", "table"],
            &self.log_path,
            self.scan_type(),
            target,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;
    use std::time::Duration;

    fn config_in(dir: &std::path::Path, program: &str) -> ScanConfig {
        let mut config = ScanConfig::default()
            .with_results_dir(dir.join("scan-results"))
            .with_scan_timeout(Duration::from_secs(5));
        config.trivy_program = program.to_string();
        config
    }

    #[tokio::test]
    async fn test_success_persists_audit_log() {
        let dir = tempfile::tempdir().unwrap();
        // `echo` stands in for trivy: exits 0, prints its argument vector.
        let config = config_in(dir.path(), "echo");
        let adapter = TrivyFsAdapter::new(&config, CommandRunner::new(config.scan_timeout));

        let result = adapter
            .scan(&ScanTarget::path("/tmp/extracted"))
            .await
            .unwrap();
        assert_eq!(result.severity, Severity::Info);
        assert!(result.details.contains("fs /tmp/extracted --format table"));

        let log = std::fs::read_to_string(config.results_dir.join("trivy_fs_scan.log")).unwrap();
        assert_eq!(log, result.details);
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("failing-trivy");
        std::fs::write(&script, "#!/bin/sh\necho 'DB download failed' >&2\nexit 1\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&script).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&script, perms).unwrap();
        }

        let config = config_in(dir.path(), &script.to_string_lossy());
        let adapter = TrivyImageAdapter::new(&config, CommandRunner::new(config.scan_timeout));

        let err = adapter
            .scan(&ScanTarget::reference("alpine:latest"))
            .await
            .unwrap_err();
        match err {
            AdapterError::Tool { stderr, .. } => assert_eq!(stderr, "DB download failed"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!config.results_dir.join("trivy_image_scan.log").exists());
    }
}
