use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Warning => write!(f, "Warning"),
            Self::Error => write!(f, "Error"),
        }
    }
}

impl Severity {
    pub fn color(&self) -> &'static str {
        match self {
            Self::Info => "blue",
            Self::Warning => "yellow",
            Self::Error => "red",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Info => "🔵",
            Self::Warning => "🟡",
            Self::Error => "🔴",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanType {
    #[serde(rename = "Trivy FS")]
    TrivyFs,
    #[serde(rename = "Trivy Image")]
    TrivyImage,
    #[serde(rename = "Trivy Repo")]
    TrivyRepo,
    #[serde(rename = "Grype Image")]
    GrypeImage,
    #[serde(rename = "ClamAV FS")]
    ClamAvFs,
    #[serde(rename = "YARA")]
    Yara,
    #[serde(rename = "Zip")]
    Zip,
    #[serde(rename = "Repo Clone")]
    RepoClone,
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrivyFs => write!(f, "Trivy FS"),
            Self::TrivyImage => write!(f, "Trivy Image"),
            Self::TrivyRepo => write!(f, "Trivy Repo"),
            Self::GrypeImage => write!(f, "Grype Image"),
            Self::ClamAvFs => write!(f, "ClamAV FS"),
            Self::Yara => write!(f, "YARA"),
            Self::Zip => write!(f, "Zip"),
            Self::RepoClone => write!(f, "Repo Clone"),
        }
    }
}

/// One normalized scanner verdict, regardless of the wrapped tool's native
/// output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub target: String,
    pub scan_type: ScanType,
    pub severity: Severity,
    pub details: String,
}

impl ScanResult {
    pub fn new(
        scan_type: ScanType,
        target: impl Into<String>,
        severity: Severity,
        details: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            scan_type,
            severity,
            details: details.into(),
        }
    }
}

/// Emitted in place of a `ScanResult` when an adapter fails outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResult {
    pub scan_type: ScanType,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScanOutcome {
    Report(ScanResult),
    Failed(ErrorResult),
}

impl ScanOutcome {
    pub fn scan_type(&self) -> ScanType {
        match self {
            Self::Report(result) => result.scan_type,
            Self::Failed(error) => error.scan_type,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn as_report(&self) -> Option<&ScanResult> {
        match self {
            Self::Report(result) => Some(result),
            Self::Failed(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&ErrorResult> {
        match self {
            Self::Report(_) => None,
            Self::Failed(error) => Some(error),
        }
    }
}

/// Ordered aggregation of one request's scan outcomes.
#[derive(Debug, Serialize)]
pub struct ScanReport {
    outcomes: Vec<ScanOutcome>,
    generated_at: DateTime<Utc>,
    engine_version: String,
}

impl ScanReport {
    pub fn new(outcomes: Vec<ScanOutcome>) -> Self {
        Self {
            outcomes,
            generated_at: Utc::now(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn outcomes(&self) -> &[ScanOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Number of adapters that failed outright.
    pub fn error_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_error()).count()
    }

    pub fn count_by_severity(&self) -> SeverityCount {
        let mut count = SeverityCount::default();
        for outcome in &self.outcomes {
            if let ScanOutcome::Report(result) = outcome {
                match result.severity {
                    Severity::Info => count.info += 1,
                    Severity::Warning => count.warning += 1,
                    Severity::Error => count.error += 1,
                }
            }
        }
        count
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeverityCount {
    pub info: usize,
    pub warning: usize,
    pub error: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_type_labels() {
        assert_eq!(ScanType::TrivyFs.to_string(), "Trivy FS");
        assert_eq!(ScanType::ClamAvFs.to_string(), "ClamAV FS");
        assert_eq!(ScanType::Zip.to_string(), "Zip");
    }

    #[test]
    fn test_outcome_serialization_shapes() {
        let report = ScanOutcome::Report(ScanResult::new(
            ScanType::TrivyFs,
            "/tmp/extracted",
            Severity::Info,
            "clean",
        ));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["scan_type"], "Trivy FS");
        assert_eq!(json["severity"], "info");
        assert!(json.get("error").is_none());

        let failed = ScanOutcome::Failed(ErrorResult {
            scan_type: ScanType::GrypeImage,
            error: "grype exited 1".to_string(),
        });
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error"], "grype exited 1");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_report_counts() {
        let report = ScanReport::new(vec![
            ScanOutcome::Report(ScanResult::new(ScanType::TrivyFs, "a", Severity::Info, "")),
            ScanOutcome::Report(ScanResult::new(
                ScanType::ClamAvFs,
                "a",
                Severity::Warning,
                "",
            )),
            ScanOutcome::Failed(ErrorResult {
                scan_type: ScanType::Yara,
                error: "boom".to_string(),
            }),
        ]);
        let counts = report.count_by_severity();
        assert_eq!(counts.info, 1);
        assert_eq!(counts.warning, 1);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.len(), 3);
    }
}
