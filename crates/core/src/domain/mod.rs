mod analysis;
mod catalog;
mod citation;
mod document;
mod findings;
mod prompt;

pub use analysis::*;
pub use catalog::*;
pub use citation::*;
pub use document::*;
pub use findings::*;
pub use prompt::*;
