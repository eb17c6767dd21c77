//! Status command implementation
//!
//! Prints ledger records and the delivery state of every artifact in the
//! export area and the queue.

use crate::config::load_config;
use crate::core::ledger::MappingLedger;
use crate::core::status::{collect_status, ArtifactArea, ArtifactState, StatusReport};
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking pipeline status");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let ledger = MappingLedger::new(config.export.ledger_path());
        let report = match collect_status(
            &config.export.export_dir,
            &config.queue.queue_dir,
            &ledger,
            &config.queue.artifact_extension,
        ) {
            Ok(r) => r,
            Err(e) => {
                println!("❌ Failed to read pipeline state");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        Ok(0)
    }
}

fn print_report(report: &StatusReport) {
    println!("📊 Pipeline Status");
    println!();

    if report.artifacts.is_empty() && report.ledger_records.is_empty() {
        println!("No artifacts or ledger records found.");
        return;
    }

    println!("Ledger records: {}", report.ledger_records.len());
    println!();

    for area in [ArtifactArea::Export, ArtifactArea::Queue] {
        let artifacts: Vec<_> = report.artifacts.iter().filter(|a| a.area == area).collect();
        if artifacts.is_empty() {
            continue;
        }
        match area {
            ArtifactArea::Export => println!("Export area:"),
            ArtifactArea::Queue => println!("Delivery queue:"),
        }
        for artifact in artifacts {
            let icon = match artifact.state {
                ArtifactState::Uploaded => "✅",
                ArtifactState::Uploading => "⏳",
                ArtifactState::Pending | ArtifactState::AwaitingTransfer => "📦",
                ArtifactState::NoRecipient => "⚠️ ",
            };
            println!("  {icon} {} [{}]", artifact.name, artifact.state);
            if !artifact.recipients.is_empty() {
                println!("     → {}", artifact.recipients.join(", "));
            }
        }
        println!();
    }

    println!("Summary:");
    for state in [
        ArtifactState::AwaitingTransfer,
        ArtifactState::Pending,
        ArtifactState::Uploading,
        ArtifactState::Uploaded,
        ArtifactState::NoRecipient,
    ] {
        println!("  {state}: {}", report.count(state));
    }
}
