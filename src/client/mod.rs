//! Clients for the two remote services.
//!
//! - Knowledge-base lookups: `EndpointPool` + `Transport` + `MultiEndpointClient`
//! - Completions: `LLMClient` behind the `Completer` trait

mod health;
mod llm_client;
mod multi;
mod pool;
mod query;
mod rate_limiter;
mod transport;

#[cfg(test)]
pub(crate) mod test_server;

pub use health::*;
pub use llm_client::*;
pub use multi::*;
pub use pool::*;
pub use query::*;
pub use rate_limiter::*;
pub use transport::*;
