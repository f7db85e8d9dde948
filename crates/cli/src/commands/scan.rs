//! Scan command: one subcommand per pipeline.
//!
//! The command builds the orchestrator against the real external tools,
//! provisions the pattern ruleset fail-open (a provisioning failure only
//! degrades the YARA leg, it never blocks scanning), runs the request and
//! renders the aggregated report.

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::*;
use std::fs;
use std::path::PathBuf;

use kensa_scanners::{Orchestrator, ScanConfig, ScanOutcome, ScanReport, ScanRequest};

#[derive(Subcommand, Clone)]
pub enum ScanCommand {
    /// Scan an uploaded file or archive.
    Filesystem {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
        format: OutputFormat,
    },

    /// Scan a container image by reference.
    Image {
        #[arg(short, long)]
        name: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
        format: OutputFormat,
    },

    /// Scan a remote repository.
    Repo {
        #[arg(short, long)]
        url: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
        format: OutputFormat,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum OutputFormat {
    Console,
    Json,
}

impl ScanCommand {
    pub async fn execute(self) -> Result<()> {
        let config = ScanConfig::from_env();
        let orchestrator = Orchestrator::new(config);

        if let Err(err) = orchestrator.rules().ensure().await {
            eprintln!(
                "{} {}",
                "⚠️  Ruleset provisioning failed:".yellow(),
                err
            );
        }

        let (request, format) = match self {
            ScanCommand::Filesystem { input, format } => {
                let content = fs::read(&input)
                    .with_context(|| format!("Failed to read {}", input.display()))?;
                let name = input
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("upload.bin")
                    .to_string();
                (ScanRequest::filesystem(name, content), format)
            }
            ScanCommand::Image { name, format } => (ScanRequest::image(name), format),
            ScanCommand::Repo { url, format } => (ScanRequest::repo(url), format),
        };

        let report = orchestrator.run(request).await?;

        match format {
            OutputFormat::Json => println!("{}", report.to_json()?),
            OutputFormat::Console => render_console(&report),
        }
        Ok(())
    }
}

fn render_console(report: &ScanReport) {
    println!("{}", "🔍 Scan Report".bright_blue().bold());
    println!("{}", "=".repeat(50).bright_blue());

    for outcome in report.outcomes() {
        match outcome {
            ScanOutcome::Report(result) => {
                println!(
                    "\n{} {} {}",
                    result.severity.emoji(),
                    result.scan_type.to_string().bold(),
                    format!("({})", result.severity).color(result.severity.color())
                );
                println!("   Target: {}", result.target);
                for line in result.details.lines() {
                    println!("   {}", line);
                }
            }
            ScanOutcome::Failed(failure) => {
                println!(
                    "\n🔴 {} {}",
                    failure.scan_type.to_string().bold(),
                    "(failed)".red()
                );
                for line in failure.error.lines() {
                    println!("   {}", line);
                }
            }
        }
    }

    let counts = report.count_by_severity();
    println!("\n{}", "=".repeat(50).bright_blue());
    println!(
        "🔵 {} info   🟡 {} warning   🔴 {} failed",
        counts.info,
        counts.warning,
        counts.error + report.error_count()
    );
}
