use thiserror::Error;

use crate::workspace::ExtractError;

/// Failures fatal to a whole scan request.
///
/// Everything adapter-local stays inside the aggregated report as an
/// `ErrorResult`; the variants here are the only ways a request terminates
/// without a result list.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Missing or contradictory request parameters. No work is attempted.
    #[error("invalid scan request: {0}")]
    InvalidRequest(String),

    /// The uploaded archive could not be safely unpacked. No partial scan
    /// results are returned.
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    /// The scratch workspace could not be established.
    #[error("workspace unavailable: {0}")]
    Resource(#[source] std::io::Error),
}
