//! Scan orchestration: pipeline selection, workspace lifecycle, fan-out.
//!
//! ## Request lifecycle
//!
//! `Received → Classified → Prepared → Scanning → Aggregated → Cleaned →
//! Responded`, terminal on success and failure alike. `Cleaned` is a
//! finally-style transition: the workspace is released after the scan phase
//! regardless of how that phase terminated, and the uploaded artifact lives
//! inside the workspace, so teardown also removes it.
//!
//! ## Failure semantics
//!
//! A failing adapter never aborts its siblings — partial results beat none
//! for a multi-tool security scan. Its typed error becomes an `ErrorResult`
//! entry here, in exactly one place (`run_step`). Only failures that
//! prevent establishing a valid pipeline or workspace are fatal, surfacing
//! as a single `ScanError`.
//!
//! ## Ordering
//!
//! Steps inside a stage run concurrently but results are buffered back in
//! table order, so the response ordering is canonical regardless of which
//! branch finishes first.

mod pipeline;

pub use pipeline::{ScanStep, FILESYSTEM_STAGE, IMAGE_STAGE, REPO_LOCAL_STAGE};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::adapters::{
    ClamAvAdapter, ClamdClient, GrypeImageAdapter, TrivyFsAdapter, TrivyImageAdapter,
    TrivyRepoAdapter, YaraAdapter, YaraCliEngine,
};
use crate::classify::classify;
use crate::config::ScanConfig;
use crate::core::{
    Adapter, ArtifactDescriptor, ErrorResult, ScanError, ScanOutcome, ScanReport, ScanRequest,
    ScanResult, ScanTarget, ScanType, Severity,
};
use crate::exec::CommandRunner;
use crate::rules::RuleStore;
use crate::workspace::{self, ExtractLimits, Workspace};

/// Request lifecycle states, logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanPhase {
    Received,
    Classified,
    Prepared,
    Scanning,
    Aggregated,
    Cleaned,
    Responded,
}

pub struct Orchestrator {
    config: ScanConfig,
    adapters: HashMap<ScanStep, Arc<dyn Adapter>>,
    rules: Arc<RuleStore>,
    runner: CommandRunner,
}

/// Test seam: an orchestrator with hand-picked adapters instead of the
/// real external tools.
pub struct OrchestratorBuilder {
    config: ScanConfig,
    adapters: HashMap<ScanStep, Arc<dyn Adapter>>,
}

impl OrchestratorBuilder {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            adapters: HashMap::new(),
        }
    }

    pub fn with_adapter(mut self, step: ScanStep, adapter: Arc<dyn Adapter>) -> Self {
        self.adapters.insert(step, adapter);
        self
    }

    pub fn build(self) -> Orchestrator {
        let runner = CommandRunner::new(self.config.scan_timeout);
        let rules = Arc::new(RuleStore::new(&self.config));
        Orchestrator {
            adapters: self.adapters,
            rules,
            runner,
            config: self.config,
        }
    }
}

impl Orchestrator {
    /// Engine wired to the real external tools.
    pub fn new(config: ScanConfig) -> Self {
        let runner = CommandRunner::new(config.scan_timeout);
        let rules = Arc::new(RuleStore::new(&config));

        let mut adapters: HashMap<ScanStep, Arc<dyn Adapter>> = HashMap::new();
        adapters.insert(
            ScanStep::VulnFilesystem,
            Arc::new(TrivyFsAdapter::new(&config, runner.clone())),
        );
        adapters.insert(
            ScanStep::SignatureAv,
            Arc::new(ClamAvAdapter::new(Arc::new(ClamdClient::new(&config)))),
        );
        adapters.insert(
            ScanStep::PatternRules,
            Arc::new(YaraAdapter::new(
                Arc::new(YaraCliEngine::new(&config, runner.clone())),
                rules.clone(),
            )),
        );
        adapters.insert(
            ScanStep::VulnImagePrimary,
            Arc::new(TrivyImageAdapter::new(&config, runner.clone())),
        );
        adapters.insert(
            ScanStep::VulnImageSecondary,
            Arc::new(GrypeImageAdapter::new(&config, runner.clone())),
        );
        let repo = Arc::new(TrivyRepoAdapter::new(&config, runner.clone()));
        adapters.insert(ScanStep::VulnRepoRemote, repo.clone());
        adapters.insert(ScanStep::VulnRepoLocal, repo);

        Self {
            adapters,
            rules,
            runner,
            config,
        }
    }

    pub fn builder(config: ScanConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Shared ruleset handle, provisioned by the caller at startup.
    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// Entry point: validates the request, selects the pipeline, returns
    /// the aggregated report. Adapter faults never escape as errors.
    pub async fn run(&self, request: ScanRequest) -> Result<ScanReport, ScanError> {
        let mut phase = ScanPhase::Received;
        let descriptor = request.into_descriptor()?;

        let outcomes = match descriptor {
            ArtifactDescriptor::UploadedFile { name, content } => {
                self.run_filesystem(&mut phase, &name, &content).await?
            }
            ArtifactDescriptor::ImageReference { name } => {
                self.run_image(&mut phase, &name).await?
            }
            ArtifactDescriptor::RepositoryUrl { url } => {
                self.run_repository(&mut phase, &url).await?
            }
        };

        self.transition(&mut phase, ScanPhase::Responded);
        Ok(ScanReport::new(outcomes))
    }

    fn transition(&self, phase: &mut ScanPhase, next: ScanPhase) {
        debug!("Scan phase {:?} -> {:?}", phase, next);
        *phase = next;
    }

    async fn run_filesystem(
        &self,
        phase: &mut ScanPhase,
        name: &str,
        content: &[u8],
    ) -> Result<Vec<ScanOutcome>, ScanError> {
        let workspace =
            Workspace::create(&self.config.scratch_root).map_err(ScanError::Resource)?;
        let result = self.filesystem_scan(phase, &workspace, name, content).await;
        workspace.release();
        self.transition(phase, ScanPhase::Cleaned);
        result
    }

    async fn filesystem_scan(
        &self,
        phase: &mut ScanPhase,
        workspace: &Workspace,
        name: &str,
        content: &[u8],
    ) -> Result<Vec<ScanOutcome>, ScanError> {
        let upload_path = workspace
            .persist_upload(name, content)
            .map_err(ScanError::Resource)?;

        let kind = classify(&upload_path);
        self.transition(phase, ScanPhase::Classified);
        info!("Classified upload {} as {:?}", name, kind);

        if kind.is_archive() {
            let extract_dir = workspace.extraction_dir().map_err(ScanError::Resource)?;
            let limits = ExtractLimits {
                max_bytes: self.config.max_extract_bytes,
                max_entries: self.config.max_extract_entries,
            };
            workspace::extract(&upload_path, kind, &extract_dir, limits)?;
            self.transition(phase, ScanPhase::Prepared);

            self.transition(phase, ScanPhase::Scanning);
            let mut outcomes = self
                .run_stage(FILESYSTEM_STAGE, &ScanTarget::path(&extract_dir))
                .await;

            // All read passes are complete; the tree can be re-serialized
            // and handed back as an audit bundle.
            let file_name = upload_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let bundle_path = self
                .config
                .results_dir
                .join(format!("{file_name}_scanned.zip"));
            outcomes.push(match workspace::repackage(&extract_dir, &bundle_path) {
                Ok(()) => ScanOutcome::Report(ScanResult::new(
                    ScanType::Zip,
                    bundle_path.display().to_string(),
                    Severity::Info,
                    "Files re-zipped after scanning.",
                )),
                Err(err) => {
                    warn!("Re-packaging {} failed: {}", extract_dir.display(), err);
                    ScanOutcome::Failed(ErrorResult {
                        scan_type: ScanType::Zip,
                        error: format!("Re-packaging failed: {err}"),
                    })
                }
            });
            self.transition(phase, ScanPhase::Aggregated);
            Ok(outcomes)
        } else {
            self.transition(phase, ScanPhase::Prepared);
            self.transition(phase, ScanPhase::Scanning);
            let outcomes = self
                .run_stage(FILESYSTEM_STAGE, &ScanTarget::path(&upload_path))
                .await;
            self.transition(phase, ScanPhase::Aggregated);
            Ok(outcomes)
        }
    }

    async fn run_image(
        &self,
        phase: &mut ScanPhase,
        name: &str,
    ) -> Result<Vec<ScanOutcome>, ScanError> {
        self.transition(phase, ScanPhase::Classified);
        self.transition(phase, ScanPhase::Prepared);
        self.transition(phase, ScanPhase::Scanning);
        let outcomes = self
            .run_stage(IMAGE_STAGE, &ScanTarget::reference(name))
            .await;
        self.transition(phase, ScanPhase::Aggregated);
        self.transition(phase, ScanPhase::Cleaned);
        Ok(outcomes)
    }

    async fn run_repository(
        &self,
        phase: &mut ScanPhase,
        url: &str,
    ) -> Result<Vec<ScanOutcome>, ScanError> {
        self.transition(phase, ScanPhase::Classified);
        self.transition(phase, ScanPhase::Scanning);

        // Manifest-level pass against the remote first: it surfaces
        // results even when the clone later cannot.
        let remote = self
            .run_step(ScanStep::VulnRepoRemote, &ScanTarget::reference(url))
            .await;
        if remote.is_error() {
            // Clone-dependent passes are pointless against an unreachable
            // remote; respond with the single failure entry.
            self.transition(phase, ScanPhase::Aggregated);
            self.transition(phase, ScanPhase::Cleaned);
            return Ok(vec![remote]);
        }

        let workspace =
            Workspace::create(&self.config.scratch_root).map_err(ScanError::Resource)?;
        let result = self.repository_scan(phase, &workspace, url, remote).await;
        workspace.release();
        self.transition(phase, ScanPhase::Cleaned);
        result
    }

    async fn repository_scan(
        &self,
        phase: &mut ScanPhase,
        workspace: &Workspace,
        url: &str,
        remote: ScanOutcome,
    ) -> Result<Vec<ScanOutcome>, ScanError> {
        let mut outcomes = vec![remote];
        let checkout = workspace.clone_dir();

        match self.clone_repository(url, &checkout).await {
            Ok(()) => {
                self.transition(phase, ScanPhase::Prepared);
                outcomes.extend(
                    self.run_stage(REPO_LOCAL_STAGE, &ScanTarget::path(&checkout))
                        .await,
                );
            }
            Err(message) => {
                error!("Repository clone of {} failed: {}", url, message);
                outcomes.push(ScanOutcome::Failed(ErrorResult {
                    scan_type: ScanType::RepoClone,
                    error: message,
                }));
            }
        }

        self.transition(phase, ScanPhase::Aggregated);
        Ok(outcomes)
    }

    async fn clone_repository(&self, url: &str, dest: &Path) -> Result<(), String> {
        info!("Cloning repository {} into {}", url, dest.display());
        let dest_arg = dest.to_string_lossy().into_owned();
        match self
            .runner
            .run(&self.config.git_program, &["clone", url, &dest_arg])
            .await
        {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(output.stderr.trim().to_string()),
            Err(err) => Err(err.to_string()),
        }
    }

    /// Runs every step of one stage concurrently against the same read-only
    /// target, then emits the buffered results in table order.
    async fn run_stage(&self, steps: &[ScanStep], target: &ScanTarget) -> Vec<ScanOutcome> {
        join_all(steps.iter().map(|step| self.run_step(*step, target))).await
    }

    /// The single place where a typed adapter failure becomes an
    /// `ErrorResult` entry.
    async fn run_step(&self, step: ScanStep, target: &ScanTarget) -> ScanOutcome {
        let Some(adapter) = self.adapters.get(&step) else {
            return ScanOutcome::Failed(ErrorResult {
                scan_type: step.scan_type(),
                error: format!("no adapter registered for {step:?}"),
            });
        };

        match adapter.scan(target).await {
            Ok(result) => ScanOutcome::Report(result),
            Err(err) => {
                warn!("{} failed: {}", adapter.name(), err);
                ScanOutcome::Failed(ErrorResult {
                    scan_type: adapter.scan_type(),
                    error: format!("{} failed: {}", adapter.name(), err),
                })
            }
        }
    }
}
