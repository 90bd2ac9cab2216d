//! Wire transport for knowledge-base lookups.
//!
//! The service speaks JSON-RPC 2.0 over HTTP POST. A successful call yields
//! the raw `result` member; everything else becomes an `AttemptFailure` so
//! the caller can move on to the next endpoint.

use crate::client::{Endpoint, Query};
use crate::models::AttemptFailure;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

/// One request/response exchange with a single endpoint.
///
/// Implementations perform no retries and no failover; that is the job of
/// `MultiEndpointClient`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue `query` against `endpoint` and return the raw result value.
    async fn call(&self, endpoint: &Endpoint, query: &Query) -> Result<Value, AttemptFailure>;

    /// Check that `endpoint` answers at all.
    ///
    /// `Ok` means the service responded at the protocol level, even if it
    /// rejected the probe method.
    async fn probe(&self, endpoint: &Endpoint) -> Result<(), AttemptFailure>;
}

/// Method used for reachability probes.
const PROBE_METHOD: &str = "system.listMethods";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    // `None` when the member is absent, `Some(Value::Null)` for an explicit null.
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl RpcResponse {
    /// Split a decoded reply into its result or a classified failure.
    fn into_result(self) -> Result<Value, AttemptFailure> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(AttemptFailure::Remote {
                code: error.code,
                message: error.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(AttemptFailure::Malformed(
                "neither result nor error in JSON-RPC reply".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// JSON-RPC over HTTP transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Create a transport whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    async fn post(
        &self,
        endpoint: &Endpoint,
        method: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<RpcResponse, AttemptFailure> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        trace!(endpoint = %endpoint, id = request.id, method, "Sending lookup request");

        let response = self
            .client
            .post(endpoint.url())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptFailure::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        serde_json::from_str::<RpcResponse>(&body)
            .map_err(|e| AttemptFailure::Malformed(format!("invalid JSON-RPC body: {e}")))
    }

    fn classify(&self, e: reqwest::Error) -> AttemptFailure {
        if e.is_timeout() {
            AttemptFailure::Timeout(self.timeout)
        } else if e.is_decode() || e.is_body() {
            AttemptFailure::Malformed(e.to_string())
        } else {
            AttemptFailure::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, endpoint: &Endpoint, query: &Query) -> Result<Value, AttemptFailure> {
        self.post(endpoint, query.method().name(), query.params())
            .await?
            .into_result()
    }

    async fn probe(&self, endpoint: &Endpoint) -> Result<(), AttemptFailure> {
        match self
            .post(endpoint, PROBE_METHOD, &BTreeMap::new())
            .await?
            .into_result()
        {
            Ok(_) | Err(AttemptFailure::Remote { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
