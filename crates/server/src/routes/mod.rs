mod adjust;
mod analysis_results;
mod companies;
mod documents;
mod health;
mod phase_prompts;
mod phases;
mod reference_documents;
pub mod sse;
pub mod upload;

pub use adjust::*;
pub use analysis_results::*;
pub use companies::*;
pub use documents::*;
pub use health::*;
pub use phase_prompts::*;
pub use phases::*;
pub use reference_documents::*;
