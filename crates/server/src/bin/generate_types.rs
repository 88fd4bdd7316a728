//! Run with: cargo run --package server --bin generate-types --features typescript

use std::fs;
use std::path::Path;

fn main() {
    println!("Generating TypeScript types...");

    let out_dir = Path::new("frontend/src/types/generated");

    if let Err(e) = fs::create_dir_all(out_dir) {
        eprintln!("Failed to create output directory: {}", e);
        std::process::exit(1);
    }

    #[cfg(feature = "typescript")]
    {
        use ts_rs::TS;

        vyve_core::PhasePrompt::export_all_to(out_dir).expect("Failed to export PhasePrompt");
        vyve_core::UpsertPhasePrompt::export_all_to(out_dir)
            .expect("Failed to export UpsertPhasePrompt");
        vyve_core::ReferenceDocument::export_all_to(out_dir)
            .expect("Failed to export ReferenceDocument");
        vyve_core::AnalysisResult::export_all_to(out_dir).expect("Failed to export AnalysisResult");
        vyve_core::AnalysisMetadata::export_all_to(out_dir)
            .expect("Failed to export AnalysisMetadata");
        vyve_core::StepLog::export_all_to(out_dir).expect("Failed to export StepLog");
        vyve_core::Document::export_all_to(out_dir).expect("Failed to export Document");
        vyve_core::Company::export_all_to(out_dir).expect("Failed to export Company");
        vyve_core::PhaseInfo::export_all_to(out_dir).expect("Failed to export PhaseInfo");

        events::EventEnvelope::export_all_to(out_dir).expect("Failed to export EventEnvelope");
        events::Event::export_all_to(out_dir).expect("Failed to export Event");
        events::UploadEvent::export_all_to(out_dir).expect("Failed to export UploadEvent");

        orchestrator::PhaseStatus::export_all_to(out_dir).expect("Failed to export PhaseStatus");
    }

    println!("TypeScript types generated in {}", out_dir.display());
}
