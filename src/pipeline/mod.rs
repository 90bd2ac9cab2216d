//! Dataset-to-result-log pipeline.

mod dataset;
mod prompt;
mod rag;
mod result_log;

pub use dataset::*;
pub use prompt::*;
pub use rag::*;
pub use result_log::*;
