//! Export command implementation
//!
//! Runs one export for a single study, the same path the change feed takes
//! for a `StableStudy` event, and prints the outcome.

use super::{build_coordinator, process_runner};
use crate::config::load_config;
use crate::core::export::ExportOutcome;
use crate::domain::{CourierError, ExportState, StudyId};
use clap::Args;
use std::fs;

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Host id of the study to export
    pub study_id: String,
}

impl ExportArgs {
    /// Execute the export command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(study_id = %self.study_id, "Starting export command");

        let study_id = match StudyId::new(self.study_id.as_str()) {
            Ok(id) => id,
            Err(e) => {
                eprintln!("Invalid study id: {e}");
                return Ok(2);
            }
        };

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        if let Err(e) = fs::create_dir_all(&config.export.export_dir) {
            eprintln!(
                "Failed to create {}: {e}",
                config.export.export_dir.display()
            );
            return Ok(5);
        }

        let coordinator = match build_coordinator(&config, process_runner()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to initialize: {e}");
                return Ok(2);
            }
        };

        println!("🚀 Exporting study {study_id}...");
        println!();

        let outcome = match coordinator.export_study(&study_id).await {
            Ok(o) => o,
            Err(CourierError::Host(e)) => {
                tracing::error!(study_id = %study_id, error = %e, "Host server unreachable");
                eprintln!("Export failed: {e}");
                return Ok(4);
            }
            Err(e) => {
                tracing::error!(study_id = %study_id, error = %e, "Export failed");
                eprintln!("Export failed: {e}");
                return Ok(5);
            }
        };

        print_outcome(&outcome);
        let code = exit_code(&outcome);
        match code {
            0 if outcome.skipped.is_none() => println!("✅ Export completed successfully!"),
            0 => println!("Nothing to export."),
            1 => println!("⚠️  Export completed with failed delivery requests"),
            _ => println!("❌ Export failed"),
        }
        Ok(code)
    }
}

fn print_outcome(outcome: &ExportOutcome) {
    println!("📊 Export Summary:");
    println!("  Study: {}", outcome.study_id);
    println!("  State: {}", outcome.state);
    if let Some(reason) = outcome.skipped {
        println!("  Skipped: {reason}");
    }
    if let Some(artifact) = &outcome.artifact {
        println!("  Artifact: {}", artifact.name);
        println!("  Size: {} bytes", artifact.size);
        println!("  SHA-256: {}", artifact.sha256);
    }
    if !outcome.recipients.is_empty() {
        println!("  Recipients: {}", outcome.recipients.join(", "));
        println!(
            "  Delivery requests: {} accepted, {} failed",
            outcome.deliveries_ok, outcome.deliveries_failed
        );
    }
    if outcome.default_passphrase {
        println!("  ⚠️  No pw= token; the default passphrase was used");
    }
    println!("  Duration: {:.2}s", outcome.duration.as_secs_f64());
    println!();
}

/// 0 when delivered or nothing to do, 1 when some delivery requests failed
fn exit_code(outcome: &ExportOutcome) -> i32 {
    match outcome.state {
        ExportState::Delivered if outcome.deliveries_failed == 0 => 0,
        ExportState::Delivered | ExportState::Enqueued => 1,
        ExportState::Idle => 0,
        _ => 5,
    }
}
