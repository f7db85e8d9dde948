use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::ScanError;

/// Pipeline selector as it appears in the request (`scanType` form field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedPipeline {
    Filesystem,
    Image,
    Repo,
}

impl fmt::Display for RequestedPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem => write!(f, "filesystem"),
            Self::Image => write!(f, "image"),
            Self::Repo => write!(f, "repo"),
        }
    }
}

impl FromStr for RequestedPipeline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "filesystem" => Ok(Self::Filesystem),
            "image" => Ok(Self::Image),
            "repo" => Ok(Self::Repo),
            other => Err(format!("unknown scan type: {other}")),
        }
    }
}

/// Raw scan request as it arrives at the system boundary.
///
/// Field presence is validated against the selected pipeline before any
/// work starts; a contradiction is an immediate `InvalidRequest` with zero
/// adapters invoked.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub pipeline: Option<RequestedPipeline>,
    pub file: Option<(String, Vec<u8>)>,
    pub image_name: Option<String>,
    pub repo_url: Option<String>,
}

impl ScanRequest {
    pub fn filesystem(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            pipeline: Some(RequestedPipeline::Filesystem),
            file: Some((name.into(), content)),
            ..Self::default()
        }
    }

    pub fn image(name: impl Into<String>) -> Self {
        Self {
            pipeline: Some(RequestedPipeline::Image),
            image_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn repo(url: impl Into<String>) -> Self {
        Self {
            pipeline: Some(RequestedPipeline::Repo),
            repo_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Validates the required-iff rules and produces the immutable
    /// descriptor consumed by the orchestrator.
    pub fn into_descriptor(self) -> Result<ArtifactDescriptor, ScanError> {
        match self.pipeline {
            Some(RequestedPipeline::Filesystem) => match self.file {
                Some((name, content)) if !name.is_empty() => {
                    Ok(ArtifactDescriptor::UploadedFile { name, content })
                }
                Some(_) => Err(ScanError::InvalidRequest(
                    "no valid filename provided".to_string(),
                )),
                None => Err(ScanError::InvalidRequest(
                    "filesystem scan requires a file".to_string(),
                )),
            },
            Some(RequestedPipeline::Image) => match self.image_name {
                Some(name) if !name.is_empty() => Ok(ArtifactDescriptor::ImageReference { name }),
                _ => Err(ScanError::InvalidRequest(
                    "image scan requires an image name".to_string(),
                )),
            },
            Some(RequestedPipeline::Repo) => match self.repo_url {
                Some(url) if !url.is_empty() => Ok(ArtifactDescriptor::RepositoryUrl { url }),
                _ => Err(ScanError::InvalidRequest(
                    "repo scan requires a repository URL".to_string(),
                )),
            },
            None => Err(ScanError::InvalidRequest(
                "missing scan type".to_string(),
            )),
        }
    }
}

/// Validated artifact, consumed exactly once per request.
#[derive(Debug, Clone)]
pub enum ArtifactDescriptor {
    UploadedFile { name: String, content: Vec<u8> },
    ImageReference { name: String },
    RepositoryUrl { url: String },
}

/// Artifact kind derived from content inspection, never from the filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    PlainFile,
    ArchiveGzip,
    ArchiveTar,
    ArchiveZip,
    Unknown,
}

impl ArtifactKind {
    /// Whether extraction happens before scanning. `Unknown` degrades to a
    /// plain-file scan.
    pub fn is_archive(&self) -> bool {
        matches!(
            self,
            Self::ArchiveGzip | Self::ArchiveTar | Self::ArchiveZip
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filesystem_request_without_file_is_invalid() {
        let request = ScanRequest {
            pipeline: Some(RequestedPipeline::Filesystem),
            ..ScanRequest::default()
        };
        assert!(matches!(
            request.into_descriptor(),
            Err(ScanError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_empty_filename_is_invalid() {
        let request = ScanRequest::filesystem("", b"data".to_vec());
        assert!(matches!(
            request.into_descriptor(),
            Err(ScanError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_missing_pipeline_is_invalid() {
        assert!(matches!(
            ScanRequest::default().into_descriptor(),
            Err(ScanError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_image_request_round_trip() {
        let descriptor = ScanRequest::image("alpine:latest").into_descriptor().unwrap();
        match descriptor {
            ArtifactDescriptor::ImageReference { name } => assert_eq!(name, "alpine:latest"),
            other => panic!("unexpected descriptor: {other:?}"),
        }
    }

    #[test]
    fn test_pipeline_parsing() {
        assert_eq!(
            "repo".parse::<RequestedPipeline>().unwrap(),
            RequestedPipeline::Repo
        );
        assert!("registry".parse::<RequestedPipeline>().is_err());
    }

    #[test]
    fn test_archive_kinds() {
        assert!(ArtifactKind::ArchiveZip.is_archive());
        assert!(!ArtifactKind::PlainFile.is_archive());
        assert!(!ArtifactKind::Unknown.is_archive());
    }
}
