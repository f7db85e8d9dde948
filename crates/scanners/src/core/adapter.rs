//! The uniform contract every scanner adapter implements.
//!
//! An adapter wraps exactly one external scanning capability. Whatever the
//! wrapped tool produces (tabular text, daemon verdict lines, per-file
//! match lists), `scan` normalizes it into a single `ScanResult`; whatever
//! goes wrong (non-zero exit, unreachable daemon, timeout) surfaces as a
//! typed `AdapterError`. Adapters never retry and never convert their own
//! failures into results — both are the orchestrator's job, done in one
//! place.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::result::{ScanResult, ScanType};
use crate::exec::ExecError;

/// Where an adapter points its wrapped tool: a filesystem path inside a
/// request workspace, or an opaque reference (image name, repository URL).
#[derive(Debug, Clone)]
pub enum ScanTarget {
    Path(PathBuf),
    Reference(String),
}

impl ScanTarget {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn reference(reference: impl Into<String>) -> Self {
        Self::Reference(reference.into())
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Reference(_) => None,
        }
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Reference(reference) => write!(f, "{}", reference),
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{tool} failed: {stderr}")]
    Tool { tool: String, stderr: String },

    #[error("daemon unreachable: {0}")]
    Daemon(String),

    #[error("rule compilation failed: {0}")]
    Rules(String),

    #[error("{tool} timed out after {seconds}s")]
    TimedOut { tool: String, seconds: u64 },

    #[error("unsupported target: {0}")]
    UnsupportedTarget(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ExecError> for AdapterError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Timeout { command, seconds } => Self::TimedOut {
                tool: command,
                seconds,
            },
            ExecError::Spawn { command, source } => Self::Tool {
                tool: command,
                stderr: source.to_string(),
            },
        }
    }
}

#[async_trait]
pub trait Adapter: Send + Sync {
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn scan_type(&self) -> ScanType;

    async fn scan(&self, target: &ScanTarget) -> Result<ScanResult, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_display() {
        assert_eq!(
            ScanTarget::reference("alpine:latest").to_string(),
            "alpine:latest"
        );
        assert_eq!(ScanTarget::path("/tmp/scan").to_string(), "/tmp/scan");
    }

    #[test]
    fn test_exec_error_conversion() {
        let err: AdapterError = ExecError::Timeout {
            command: "trivy".to_string(),
            seconds: 300,
        }
        .into();
        assert!(matches!(err, AdapterError::TimedOut { seconds: 300, .. }));
        assert!(err.to_string().contains("timed out"));
    }
}
