//! Event system for Vyve
//!
//! This crate provides the event bus used to broadcast phase progress, and
//! the newline-delimited JSON events streamed back from document uploads.

mod bus;
pub mod ndjson;
mod types;

pub use bus::EventBus;
pub use ndjson::{NdjsonError, UploadEvent};
pub use types::*;
