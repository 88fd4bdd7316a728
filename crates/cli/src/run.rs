use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use server::config::AppConfig;
use server::state::AppState;
use vyve_core::{AnalysisResult, StepLog, StepStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Remembers which step states were already printed.
#[derive(Default)]
pub struct StepPrinter {
    seen: Vec<(String, StepStatus)>,
}

impl StepPrinter {
    /// Log entries whose step or status changed since the last call.
    pub fn transitions<'a>(&mut self, log: &'a [StepLog]) -> Vec<&'a StepLog> {
        let mut fresh = Vec::new();
        for entry in log {
            let key = (entry.step_name.clone(), entry.status);
            if !self.seen.contains(&key) {
                self.seen.push(key);
                fresh.push(entry);
            }
        }
        fresh
    }

    fn print(&mut self, result: &AnalysisResult) {
        for entry in self.transitions(&result.metadata.conversation_log) {
            let status = match entry.status {
                StepStatus::Completed => entry.status.as_str().green(),
                StepStatus::Error => entry.status.as_str().red(),
                StepStatus::InProgress => entry.status.as_str().yellow(),
                StepStatus::Pending => entry.status.as_str().dimmed(),
            };
            println!("  {:<22} {}", entry.step_name, status);
        }
    }
}

/// Runs the phase in this process and polls its row until the run ends.
pub async fn run_phase(config: &AppConfig, phase: i64, model: Option<String>) -> Result<()> {
    let state = AppState::from_config(config).await?;
    let model = model.unwrap_or_else(|| state.orchestrator.default_model().to_string());

    state
        .orchestrator
        .check_preconditions(phase)
        .await
        .with_context(|| format!("Cannot run phase {}", phase))?;

    println!("Running phase {} with {}", phase, model.bold());

    let orchestrator = Arc::clone(&state.orchestrator);
    let run_model = model.clone();
    let mut run = tokio::spawn(async move { orchestrator.run_phase(phase, &run_model).await });

    let mut printer = StepPrinter::default();
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    let outcome = loop {
        tokio::select! {
            joined = &mut run => break joined.context("Phase run task failed")?,
            _ = interval.tick() => {
                if let Some(result) = state.results.find_by_phase(phase).await? {
                    printer.print(&result);
                }
            }
        }
    };

    if let Some(result) = state.results.find_by_phase(phase).await? {
        printer.print(&result);
    }

    let result = outcome.with_context(|| format!("Phase {} failed", phase))?;
    println!();
    println!(
        "{} phase {} (version {})",
        "Completed".green().bold(),
        phase,
        result.version
    );
    if let Some(score) = result.metadata.verification_score {
        println!("Verification score: {}", score);
    }
    if let Some(findings) = &result.metadata.key_findings {
        for finding in findings {
            println!("  • {}", finding);
        }
    }
    Ok(())
}
