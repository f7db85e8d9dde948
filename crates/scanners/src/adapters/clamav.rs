//! Signature antivirus adapter backed by the clamd daemon.
//!
//! clamd speaks a line protocol over a local socket. A `MULTISCAN` request
//! scans a path recursively using the daemon's worker threads; the reply
//! carries one verdict line per file:
//!
//! ```text
//! /path/file1: OK
//! /path/file2: Eicar-Test-Signature FOUND
//! /path/file3: lstat() failed ERROR
//! ```
//!
//! The adapter aggregates these into one result whose details lead with a
//! `Total files scanned: N, Infected files: M` summary line.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

use crate::config::ScanConfig;
use crate::core::{Adapter, AdapterError, ScanResult, ScanTarget, ScanType, Severity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    Found(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileVerdict {
    pub path: String,
    pub verdict: Verdict,
}

/// Daemon round-trip contract; mocked in tests.
#[async_trait]
pub trait AvClient: Send + Sync {
    /// Recursive scan: one verdict per file under `path`.
    async fn multiscan(&self, path: &Path) -> Result<Vec<FileVerdict>, AdapterError>;
}

pub struct ClamdClient {
    socket: PathBuf,
    timeout: Duration,
}

impl ClamdClient {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            socket: config.clamd_socket.clone(),
            timeout: config.scan_timeout,
        }
    }

    async fn roundtrip(&self, path: &Path) -> Result<String, AdapterError> {
        let mut stream = UnixStream::connect(&self.socket).await.map_err(|err| {
            AdapterError::Daemon(format!(
                "cannot reach clamd at {}: {}",
                self.socket.display(),
                err
            ))
        })?;

        // NUL-delimited command form; the reply is NUL-delimited too.
        let command = format!("zMULTISCAN {}\0", path.display());
        stream
            .write_all(command.as_bytes())
            .await
            .map_err(|err| AdapterError::Daemon(err.to_string()))?;

        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .await
            .map_err(|err| AdapterError::Daemon(err.to_string()))?;
        Ok(String::from_utf8_lossy(&response).into_owned())
    }
}

#[async_trait]
impl AvClient for ClamdClient {
    async fn multiscan(&self, path: &Path) -> Result<Vec<FileVerdict>, AdapterError> {
        let response = tokio::time::timeout(self.timeout, self.roundtrip(path))
            .await
            .map_err(|_| AdapterError::TimedOut {
                tool: "clamd".to_string(),
                seconds: self.timeout.as_secs(),
            })??;
        parse_multiscan_response(&response)
    }
}

pub(crate) fn parse_multiscan_response(response: &str) -> Result<Vec<FileVerdict>, AdapterError> {
    let mut verdicts = Vec::new();
    for line in response.split(|c| c == '\0' || c == '\n') {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (path, status) = line.split_once(": ").ok_or_else(|| {
            AdapterError::Daemon(format!("unparseable clamd reply line: {line}"))
        })?;
        let verdict = if status == "OK" {
            Verdict::Clean
        } else if let Some(signature) = status.strip_suffix(" FOUND") {
            Verdict::Found(signature.to_string())
        } else if let Some(message) = status.strip_suffix(" ERROR") {
            Verdict::Error(message.to_string())
        } else {
            return Err(AdapterError::Daemon(format!(
                "unexpected clamd verdict: {line}"
            )));
        };
        verdicts.push(FileVerdict {
            path: path.to_string(),
            verdict,
        });
    }
    Ok(verdicts)
}

pub struct ClamAvAdapter {
    client: Arc<dyn AvClient>,
}

impl ClamAvAdapter {
    pub fn new(client: Arc<dyn AvClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Adapter for ClamAvAdapter {
    fn id(&self) -> &'static str {
        "clamav-fs"
    }

    fn name(&self) -> &'static str {
        "ClamAV signature scan"
    }

    fn scan_type(&self) -> ScanType {
        ScanType::ClamAvFs
    }

    async fn scan(&self, target: &ScanTarget) -> Result<ScanResult, AdapterError> {
        let path = target.as_path().ok_or_else(|| {
            AdapterError::UnsupportedTarget(format!("{target} is not a filesystem path"))
        })?;

        let verdicts = self.client.multiscan(path).await?;
        let total = verdicts.len();
        let infected = verdicts
            .iter()
            .filter(|v| matches!(v.verdict, Verdict::Found(_)))
            .count();
        debug!("ClamAV scanned {} files, {} infected", total, infected);

        let mut details = format!(
            "Total files scanned: {}, Infected files: {}\n\nDetails:\n",
            total, infected
        );
        for verdict in &verdicts {
            match &verdict.verdict {
                Verdict::Clean => details.push_str(&format!("{}: OK\n", verdict.path)),
                Verdict::Found(signature) => {
                    details.push_str(&format!("{}: {} FOUND\n", verdict.path, signature))
                }
                Verdict::Error(message) => {
                    details.push_str(&format!("{}: {} ERROR\n", verdict.path, message))
                }
            }
        }

        let severity = if infected == 0 {
            Severity::Info
        } else {
            Severity::Warning
        };
        Ok(ScanResult::new(
            ScanType::ClamAvFs,
            target.to_string(),
            severity,
            details.trim_end().to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_mixed_verdicts() {
        let response = "/scan/a.txt: OK\0/scan/b.bin: Eicar-Test-Signature FOUND\0/scan/c: lstat() failed ERROR\0";
        let verdicts = parse_multiscan_response(response).unwrap();
        assert_eq!(verdicts.len(), 3);
        assert_eq!(verdicts[0].verdict, Verdict::Clean);
        assert_eq!(
            verdicts[1].verdict,
            Verdict::Found("Eicar-Test-Signature".to_string())
        );
        assert_eq!(
            verdicts[2].verdict,
            Verdict::Error("lstat() failed".to_string())
        );
    }

    #[test]
    fn test_rejects_garbage_reply() {
        assert!(parse_multiscan_response("not a verdict line").is_err());
    }

    struct StaticClient {
        verdicts: Vec<FileVerdict>,
    }

    #[async_trait]
    impl AvClient for StaticClient {
        async fn multiscan(&self, _path: &Path) -> Result<Vec<FileVerdict>, AdapterError> {
            Ok(self.verdicts.clone())
        }
    }

    #[tokio::test]
    async fn test_clean_scan_aggregates_to_info() {
        let adapter = ClamAvAdapter::new(Arc::new(StaticClient {
            verdicts: vec![
                FileVerdict {
                    path: "/scan/a".to_string(),
                    verdict: Verdict::Clean,
                },
                FileVerdict {
                    path: "/scan/b".to_string(),
                    verdict: Verdict::Clean,
                },
            ],
        }));
        let result = adapter.scan(&ScanTarget::path("/scan")).await.unwrap();
        assert_eq!(result.severity, Severity::Info);
        assert!(result
            .details
            .starts_with("Total files scanned: 2, Infected files: 0"));
    }

    #[tokio::test]
    async fn test_infected_scan_aggregates_to_warning() {
        let adapter = ClamAvAdapter::new(Arc::new(StaticClient {
            verdicts: vec![
                FileVerdict {
                    path: "/scan/a".to_string(),
                    verdict: Verdict::Clean,
                },
                FileVerdict {
                    path: "/scan/eicar.com".to_string(),
                    verdict: Verdict::Found("Eicar-Test-Signature".to_string()),
                },
            ],
        }));
        let result = adapter.scan(&ScanTarget::path("/scan")).await.unwrap();
        assert_eq!(result.severity, Severity::Warning);
        assert!(result.details.contains("Infected files: 1"));
        assert!(result
            .details
            .contains("/scan/eicar.com: Eicar-Test-Signature FOUND"));
    }

    #[tokio::test]
    async fn test_reference_target_is_rejected() {
        let adapter = ClamAvAdapter::new(Arc::new(StaticClient { verdicts: vec![] }));
        let err = adapter
            .scan(&ScanTarget::reference("alpine:latest"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::UnsupportedTarget(_)));
    }
}
