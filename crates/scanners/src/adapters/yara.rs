//! Pattern-rule adapter.
//!
//! Compiles the shared ruleset once per invocation, then walks the target
//! (single file or directory tree) recording every file with at least one
//! rule match. A clean walk is a success outcome carrying the
//! `No matches found` marker, not an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::core::{Adapter, AdapterError, ScanResult, ScanTarget, ScanType, Severity};
use crate::exec::CommandRunner;
use crate::rules::RuleStore;

/// One file with at least one rule hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub path: String,
    pub rules: Vec<String>,
}

#[async_trait]
pub trait CompiledRules: Send + Sync {
    /// Names of the rules matching `file`, empty when clean.
    async fn match_file(&self, file: &Path) -> Result<Vec<String>, AdapterError>;
}

#[async_trait]
pub trait PatternEngine: Send + Sync {
    /// Compiles the ruleset entry file. Runs once per scan invocation.
    async fn compile(&self, entry_file: &Path) -> Result<Box<dyn CompiledRules>, AdapterError>;
}

/// Engine backed by the `yarac`/`yara` command-line pair: `yarac` compiles
/// the ruleset into a scratch file, `yara -C` matches it per file.
pub struct YaraCliEngine {
    yarac_program: String,
    yara_program: String,
    runner: CommandRunner,
}

impl YaraCliEngine {
    pub fn new(config: &ScanConfig, runner: CommandRunner) -> Self {
        Self {
            yarac_program: config.yarac_program.clone(),
            yara_program: config.yara_program.clone(),
            runner,
        }
    }
}

#[async_trait]
impl PatternEngine for YaraCliEngine {
    async fn compile(&self, entry_file: &Path) -> Result<Box<dyn CompiledRules>, AdapterError> {
        if !entry_file.exists() {
            return Err(AdapterError::Rules(format!(
                "ruleset entry {} is missing; has the ruleset been provisioned?",
                entry_file.display()
            )));
        }

        let compiled = NamedTempFile::new()?;
        let entry_arg = entry_file.to_string_lossy().into_owned();
        let compiled_arg = compiled.path().to_string_lossy().into_owned();

        let output = self
            .runner
            .run(&self.yarac_program, &[&entry_arg, &compiled_arg])
            .await?;
        if !output.success() {
            return Err(AdapterError::Rules(output.stderr.trim().to_string()));
        }

        Ok(Box::new(YaraCliRules {
            yara_program: self.yara_program.clone(),
            runner: self.runner.clone(),
            compiled,
        }))
    }
}

struct YaraCliRules {
    yara_program: String,
    runner: CommandRunner,
    // Held for its lifetime: the scratch file is removed on drop.
    compiled: NamedTempFile,
}

#[async_trait]
impl CompiledRules for YaraCliRules {
    async fn match_file(&self, file: &Path) -> Result<Vec<String>, AdapterError> {
        let compiled_arg = self.compiled.path().to_string_lossy().into_owned();
        let file_arg = file.to_string_lossy().into_owned();

        let output = self
            .runner
            .run(&self.yara_program, &["-C", &compiled_arg, &file_arg])
            .await?;
        if !output.success() {
            return Err(AdapterError::Tool {
                tool: self.yara_program.clone(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        // One line per matching rule: "<rule-name> <file-path>".
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect())
    }
}

pub struct YaraAdapter {
    engine: Arc<dyn PatternEngine>,
    rules: Arc<RuleStore>,
}

impl YaraAdapter {
    pub fn new(engine: Arc<dyn PatternEngine>, rules: Arc<RuleStore>) -> Self {
        Self { engine, rules }
    }
}

#[async_trait]
impl Adapter for YaraAdapter {
    fn id(&self) -> &'static str {
        "yara"
    }

    fn name(&self) -> &'static str {
        "YARA pattern scan"
    }

    fn scan_type(&self) -> ScanType {
        ScanType::Yara
    }

    async fn scan(&self, target: &ScanTarget) -> Result<ScanResult, AdapterError> {
        let root = target.as_path().ok_or_else(|| {
            AdapterError::UnsupportedTarget(format!("{target} is not a filesystem path"))
        })?;

        let compiled = self.engine.compile(&self.rules.entry_file()).await?;

        let files: Vec<PathBuf> = if root.is_file() {
            vec![root.to_path_buf()]
        } else {
            WalkDir::new(root)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .collect()
        };

        let mut matches: Vec<PatternMatch> = Vec::new();
        for file in &files {
            let rules = compiled.match_file(file).await?;
            if !rules.is_empty() {
                matches.push(PatternMatch {
                    path: file.display().to_string(),
                    rules,
                });
            }
        }
        debug!("YARA matched {} of {} files", matches.len(), files.len());

        let (severity, details) = if matches.is_empty() {
            (Severity::Info, "No matches found".to_string())
        } else {
            let mut details = String::new();
            for matched in &matches {
                details.push_str(&format!("{}: {}\n", matched.path, matched.rules.join(", ")));
            }
            (Severity::Warning, details.trim_end().to_string())
        };

        Ok(ScanResult::new(
            ScanType::Yara,
            target.to_string(),
            severity,
            details,
        ))
    }
}
