pub mod adjust;
pub mod error;
pub mod executor;
pub mod locks;
pub mod prompts;

pub use adjust::{AdjustError, AdjustRequest, AdjustResponse, AnalysisAdjuster};
pub use error::{OrchestratorError, Result};
pub use executor::{ExecutorConfig, PhaseOrchestrator, PhaseStatus};
pub use locks::PhaseLocks;
