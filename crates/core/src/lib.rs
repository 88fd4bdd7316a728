//! Domain types shared by every Vyve crate: phase prompts, reference
//! documents, analysis results and their step logs, uploaded documents and
//! the fixed phase catalog.

pub mod domain;
mod error;

pub use domain::*;
pub use error::CoreError;
