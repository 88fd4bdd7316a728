use std::path::Path;

use anyhow::Result;
use colored::{ColoredString, Colorize};
use orchestrator::PhaseStatus;
use server::config::AppConfig;
use server::state::AppState;
use vyve_core::AnalysisStatus;

fn status_label(phase: &PhaseStatus) -> ColoredString {
    if phase.running {
        return "running".yellow().bold();
    }
    match phase.status {
        None => "not run".dimmed(),
        Some(AnalysisStatus::Completed) => "completed".green(),
        Some(AnalysisStatus::Error) => "error".red(),
        Some(status) => status.as_str().yellow(),
    }
}

pub async fn status(config: &AppConfig, project_dir: &Path) -> Result<()> {
    let state = AppState::from_config(config).await?;
    let phases = state.orchestrator.phase_statuses().await?;
    let prompts = state.prompts.list().await?;

    println!();
    println!("Project:  {}", project_dir.display());
    println!("Database: {}", config.database.url);
    println!();

    for phase in &phases {
        let has_prompt = prompts.iter().any(|p| p.phase_number == phase.phase_number);
        let prompt_marker = if has_prompt { " " } else { "!" };
        println!(
            "  {} {:>2}  {:<40} {}",
            prompt_marker,
            phase.phase_number,
            phase.name,
            status_label(phase)
        );
    }

    if prompts.is_empty() {
        println!();
        println!("No prompts yet. Run 'vyve import-prompts <file.json>'.");
    }
    println!();

    Ok(())
}
