use anyhow::Result;
use clap::Subcommand;
use colored::*;

use kensa_scanners::{RuleStore, ScanConfig};

#[derive(Subcommand, Clone)]
pub enum RulesCommand {
    /// Clone or update the pattern ruleset checkout.
    Update,
}

impl RulesCommand {
    pub async fn execute(self) -> Result<()> {
        match self {
            RulesCommand::Update => {
                let config = ScanConfig::from_env();
                let store = RuleStore::new(&config);
                store.ensure().await?;
                println!(
                    "{} Ruleset ready at {}",
                    "✅".green(),
                    store.path().display()
                );
                Ok(())
            }
        }
    }
}
