//! Declarative pipeline tables.
//!
//! A pipeline is an ordered list of stages; the steps inside one stage have
//! no data dependency on each other and run concurrently against the same
//! read-only target. One executor runs any table; adding a scanner to a
//! pipeline means editing a table, not forking a code path.

use crate::core::ScanType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanStep {
    VulnFilesystem,
    SignatureAv,
    PatternRules,
    VulnImagePrimary,
    VulnImageSecondary,
    VulnRepoRemote,
    VulnRepoLocal,
}

impl ScanStep {
    /// Scan type attributed to this step when no adapter is registered for
    /// it and a failure entry must still be emitted in its place.
    pub fn scan_type(&self) -> ScanType {
        match self {
            Self::VulnFilesystem => ScanType::TrivyFs,
            Self::SignatureAv => ScanType::ClamAvFs,
            Self::PatternRules => ScanType::Yara,
            Self::VulnImagePrimary => ScanType::TrivyImage,
            Self::VulnImageSecondary => ScanType::GrypeImage,
            Self::VulnRepoRemote | Self::VulnRepoLocal => ScanType::TrivyRepo,
        }
    }
}

/// Read passes shared by the filesystem pipeline and the post-clone leg of
/// the repository pipeline.
pub const FILESYSTEM_STAGE: &[ScanStep] = &[
    ScanStep::VulnFilesystem,
    ScanStep::SignatureAv,
    ScanStep::PatternRules,
];

/// Both image scanners always run: complementary coverage.
pub const IMAGE_STAGE: &[ScanStep] = &[ScanStep::VulnImagePrimary, ScanStep::VulnImageSecondary];

/// Adapters that require the local repository checkout.
pub const REPO_LOCAL_STAGE: &[ScanStep] = &[
    ScanStep::VulnFilesystem,
    ScanStep::SignatureAv,
    ScanStep::PatternRules,
    ScanStep::VulnRepoLocal,
];
