//! Scanner adapters.
//!
//! Each adapter wraps one external scanning capability behind the uniform
//! `Adapter` contract; the CLI-backed ones share a single run-persist-
//! normalize helper so success/failure mapping exists in exactly one shape.

mod clamav;
mod grype;
mod trivy;
mod yara;

pub use clamav::{AvClient, ClamAvAdapter, ClamdClient, FileVerdict, Verdict};
pub use grype::GrypeImageAdapter;
pub use trivy::{TrivyFsAdapter, TrivyImageAdapter, TrivyRepoAdapter};
pub use yara::{CompiledRules, PatternEngine, PatternMatch, YaraAdapter, YaraCliEngine};

use std::path::Path;
use tracing::warn;

use crate::core::{AdapterError, ScanResult, ScanTarget, ScanType, Severity};
use crate::exec::CommandRunner;

/// Shared CLI-scan shape: run the tool, persist stdout for audit, normalize
/// exit status into the uniform result contract.
pub(crate) async fn run_cli_scan(
    runner: &CommandRunner,
    program: &str,
    args: &[&str],
    log_path: &Path,
    scan_type: ScanType,
    target: &ScanTarget,
) -> Result<ScanResult, AdapterError> {
    let output = runner.run(program, args).await?;
    if !output.success() {
        return Err(AdapterError::Tool {
            tool: program.to_string(),
            stderr: output.stderr.trim().to_string(),
        });
    }

    persist_audit_log(log_path, &output.stdout).await;
    Ok(ScanResult::new(
        scan_type,
        target.to_string(),
        Severity::Info,
        output.stdout,
    ))
}

/// Audit logs are best-effort: a failed write must not fail the scan.
async fn persist_audit_log(path: &Path, stdout: &str) {
    if let Some(parent) = path.parent() {
        if let Err(err) = tokio::fs::create_dir_all(parent).await {
            warn!(
                "Failed to create audit log directory {}: {}",
                parent.display(),
                err
            );
            return;
        }
    }
    if let Err(err) = tokio::fs::write(path, stdout).await {
        warn!("Failed to write audit log {}: {}", path.display(), err);
    }
}
