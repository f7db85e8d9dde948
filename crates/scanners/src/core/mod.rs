pub mod adapter;
pub mod artifact;
pub mod error;
pub mod result;

pub use adapter::{Adapter, AdapterError, ScanTarget};
pub use artifact::{ArtifactDescriptor, ArtifactKind, RequestedPipeline, ScanRequest};
pub use error::ScanError;
pub use result::{
    ErrorResult, ScanOutcome, ScanReport, ScanResult, ScanType, Severity, SeverityCount,
};
