mod analysis_result_repository;
mod company_repository;
mod document_repository;
mod phase_prompt_repository;

pub use analysis_result_repository::*;
pub use company_repository::*;
pub use document_repository::*;
pub use phase_prompt_repository::*;
