//! Grype image adapter: the secondary image scanner, always run alongside
//! Trivy's image mode for complementary vulnerability coverage.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::ScanConfig;
use crate::core::{Adapter, AdapterError, ScanResult, ScanTarget, ScanType};
use crate::exec::CommandRunner;

use super::run_cli_scan;

pub struct GrypeImageAdapter {
    program: String,
    log_path: PathBuf,
    runner: CommandRunner,
}

impl GrypeImageAdapter {
    pub fn new(config: &ScanConfig, runner: CommandRunner) -> Self {
        Self {
            program: config.grype_program.clone(),
            log_path: config.results_dir.join("grype_image_scan.log"),
            runner,
        }
    }
}

#[async_trait]
impl Adapter for GrypeImageAdapter {
    fn id(&self) -> &'static str {
        "grype-image"
    }

    fn name(&self) -> &'static str {
        "Grype image scan"
    }

    fn scan_type(&self) -> ScanType {
        ScanType::GrypeImage
    }

    async fn scan(&self, target: &ScanTarget) -> Result<ScanResult, AdapterError> {
        let target_arg = target.to_string();
        run_cli_scan(
            &self.runner,
            &self.program,
            &[&target_arg, "--output", "table"],
            &self.log_path,
            self.scan_type(),
            target,
        )
        .await
    }
}
