//! Kensa Scanners - Artifact Scan Orchestration Engine
//!
//! This crate classifies an inbound artifact (uploaded file or archive,
//! container image reference, repository URL), selects the applicable scan
//! pipeline, and fans out to external scanning tools behind a uniform
//! adapter contract, aggregating their heterogeneous outputs into one
//! ordered result list.

pub mod adapters;
pub mod classify;
pub mod config;
pub mod core;
pub mod exec;
pub mod orchestrator;
pub mod rules;
pub mod workspace;

pub use config::ScanConfig;

pub use crate::core::{
    Adapter, AdapterError, ArtifactDescriptor, ArtifactKind, ErrorResult, RequestedPipeline,
    ScanError, ScanOutcome, ScanReport, ScanRequest, ScanResult, ScanTarget, ScanType, Severity,
    SeverityCount,
};

pub use orchestrator::{Orchestrator, OrchestratorBuilder, ScanStep};

pub use rules::{ProvisionError, RuleStore};

pub use workspace::{ExtractError, ExtractLimits, Workspace};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
