//! Core data models for wikirag.
//!
//! - Config: everything the user can tune
//! - Errors: one taxonomy shared by lookup, completion and pipeline
//! - Records: dataset questions and result-log lines

mod config;
mod error;
mod record;

pub use config::*;
pub use error::*;
pub use record::*;
