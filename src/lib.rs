//! wikirag - Retrieval-augmented question answering over a redundant
//! knowledge-base endpoint pool.
//!
//! ## Architecture
//!
//! - **Endpoint Pool**: fixed, ordered list of knowledge-base addresses
//! - **Multi-Endpoint Query Client**: first-success-wins lookup across the
//!   pool, with every per-endpoint failure kept for diagnosis
//! - **Completion Client**: OpenAI-compatible chat completions with retry
//!   and rate-limit backoff
//! - **RAG Pipeline**: question → passage → prompt → completion → JSONL
//!
//! ## Failure model
//!
//! - Setup errors (empty pool, bad config) stop the run before any request
//! - Endpoint failures are masked by failing over to the next endpoint
//! - An exhausted pool fails the record; the driver's policy decides
//!   whether to skip it or abort

pub mod client;
pub mod models;
pub mod pipeline;

// Re-exports for convenience
pub use client::{
    Completer, EndpointPool, HttpTransport, LLMClient, Method, MultiEndpointClient, Query,
    SamplingParams, Transport,
};
pub use models::{Config, QueryError, Result, WikiragError};
pub use pipeline::{DatasetSpec, PromptBuilder, RagPipeline, ResultLog, RunOptions};
