//! Multi-endpoint query client.
//!
//! Runs one logical query against a pool of redundant knowledge-base
//! endpoints and hands back exactly one result:
//! - endpoints are tried left to right, one at a time
//! - the first well-formed success wins; later endpoints are not contacted
//! - every failure is kept, in pool order, for the aggregate error
//!
//! The client keeps no state between calls and never reorders the pool.

use crate::client::{
    Endpoint, EndpointPool, HealthCheckResult, HealthStatus, Method, NOT_FOUND_SENTINEL, Payload,
    Query, Transport,
};
use crate::models::{AttemptFailure, EndpointFailure, QueryError};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one logical lookup.
pub type QueryResult = std::result::Result<Payload, QueryError>;

/// Failover client over a fixed endpoint pool.
pub struct MultiEndpointClient {
    pool: EndpointPool,
    transport: Arc<dyn Transport>,
    attempt_timeout: Duration,
}

impl MultiEndpointClient {
    /// Create a client over an already validated pool.
    pub fn new(pool: EndpointPool, transport: Arc<dyn Transport>, attempt_timeout: Duration) -> Self {
        Self {
            pool,
            transport,
            attempt_timeout,
        }
    }

    /// Create a client straight from an address list.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Configuration` if `addresses` is empty. No
    /// endpoint is contacted in that case.
    pub fn from_addresses<I, S>(
        addresses: I,
        transport: Arc<dyn Transport>,
        attempt_timeout: Duration,
    ) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pool = EndpointPool::new(addresses)?;
        Ok(Self::new(pool, transport, attempt_timeout))
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Run `query` against the pool, first success wins.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::AllEndpointsFailed` with one entry per endpoint,
    /// in pool order, if no endpoint produced a usable result.
    pub async fn query_all(&self, query: &Query) -> QueryResult {
        let mut failures = Vec::with_capacity(self.pool.size());

        for (index, endpoint) in self.pool.iter().enumerate() {
            debug!(
                endpoint = %endpoint,
                index,
                method = %query.method(),
                "Querying endpoint"
            );

            match self.attempt(endpoint, query).await {
                Ok(value) => {
                    debug!(
                        endpoint = %endpoint,
                        index,
                        failed_before = failures.len(),
                        "Endpoint answered"
                    );
                    return Ok(Payload::new(value));
                }
                Err(reason) => {
                    warn!(
                        endpoint = %endpoint,
                        index,
                        error = %reason,
                        "Endpoint attempt failed, trying next"
                    );
                    failures.push(EndpointFailure {
                        endpoint: endpoint.address().to_string(),
                        reason,
                    });
                }
            }
        }

        warn!(
            method = %query.method(),
            endpoints = failures.len(),
            "All endpoints failed"
        );
        Err(QueryError::AllEndpointsFailed { failures })
    }

    /// String-keyed entry point: validates the method name and parameters
    /// before any endpoint is contacted.
    pub async fn query_named<I, K, V>(&self, method: &str, params: I) -> QueryResult
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let method: Method = method.parse()?;
        let query = Query::new(method, params)?;
        self.query_all(&query).await
    }

    /// Passage text for a topic entity.
    pub async fn fetch_passage(&self, entity_id: &str) -> Result<String, QueryError> {
        let query = Query::wikipedia_page(entity_id)?;
        self.query_all(&query).await.map(Payload::into_text)
    }

    /// Probe every endpoint in pool order. Probing never changes the pool.
    pub async fn probe_all(&self) -> Vec<HealthCheckResult> {
        let mut results = Vec::with_capacity(self.pool.size());

        for endpoint in &self.pool {
            let start = Instant::now();
            let outcome =
                match tokio::time::timeout(self.attempt_timeout, self.transport.probe(endpoint))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(AttemptFailure::Timeout(self.attempt_timeout)),
                };
            let latency_ms = start.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(()) => HealthCheckResult {
                    endpoint: endpoint.address().to_string(),
                    status: HealthStatus::Healthy,
                    latency_ms: Some(latency_ms),
                    error: None,
                },
                Err(e @ (AttemptFailure::Transport(_) | AttemptFailure::Timeout(_))) => {
                    HealthCheckResult {
                        endpoint: endpoint.address().to_string(),
                        status: HealthStatus::Unreachable,
                        latency_ms: None,
                        error: Some(e.to_string()),
                    }
                }
                Err(e) => HealthCheckResult {
                    endpoint: endpoint.address().to_string(),
                    status: HealthStatus::Unhealthy,
                    latency_ms: Some(latency_ms),
                    error: Some(e.to_string()),
                },
            };

            match result.status {
                HealthStatus::Healthy => {
                    info!(endpoint = %endpoint, latency_ms, "Endpoint healthy");
                }
                status => {
                    warn!(
                        endpoint = %endpoint,
                        status = %status,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "Endpoint not healthy"
                    );
                }
            }
            results.push(result);
        }

        results
    }

    /// One bounded attempt against one endpoint, including payload checks.
    async fn attempt(&self, endpoint: &Endpoint, query: &Query) -> Result<Value, AttemptFailure> {
        let value = tokio::time::timeout(self.attempt_timeout, self.transport.call(endpoint, query))
            .await
            .map_err(|_| AttemptFailure::Timeout(self.attempt_timeout))??;

        match &value {
            Value::Null => Err(AttemptFailure::NotFound),
            Value::String(s) if s.trim() == NOT_FOUND_SENTINEL => Err(AttemptFailure::NotFound),
            _ => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConfigError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted behaviour for one fake endpoint.
    #[derive(Clone)]
    enum Behaviour {
        Answer(Value),
        Fail(AttemptFailure),
        Hang,
    }

    /// In-process transport with a call counter per endpoint.
    struct FakeTransport {
        behaviours: HashMap<String, Behaviour>,
        calls: HashMap<String, AtomicUsize>,
        order: std::sync::Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn new(script: &[(&str, Behaviour)]) -> Arc<Self> {
            Arc::new(Self {
                behaviours: script
                    .iter()
                    .map(|(addr, b)| (addr.to_string(), b.clone()))
                    .collect(),
                calls: script
                    .iter()
                    .map(|(addr, _)| (addr.to_string(), AtomicUsize::new(0)))
                    .collect(),
                order: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn calls(&self, address: &str) -> usize {
            self.calls
                .get(address)
                .map(|c| c.load(Ordering::SeqCst))
                .unwrap_or(0)
        }

        fn total_calls(&self) -> usize {
            self.calls.values().map(|c| c.load(Ordering::SeqCst)).sum()
        }

        fn order(&self) -> Vec<String> {
            self.order.lock().unwrap().clone()
        }

        fn behaviour(&self, endpoint: &Endpoint) -> Behaviour {
            if let Some(counter) = self.calls.get(endpoint.address()) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            self.order
                .lock()
                .unwrap()
                .push(endpoint.address().to_string());
            self.behaviours
                .get(endpoint.address())
                .cloned()
                .unwrap_or(Behaviour::Fail(AttemptFailure::Transport(
                    "unknown endpoint".to_string(),
                )))
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn call(&self, endpoint: &Endpoint, _query: &Query) -> Result<Value, AttemptFailure> {
            match self.behaviour(endpoint) {
                Behaviour::Answer(v) => Ok(v),
                Behaviour::Fail(e) => Err(e),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(AttemptFailure::Transport("hung".to_string()))
                }
            }
        }

        async fn probe(&self, endpoint: &Endpoint) -> Result<(), AttemptFailure> {
            match self.behaviour(endpoint) {
                Behaviour::Answer(_) => Ok(()),
                Behaviour::Fail(e) => Err(e),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
            }
        }
    }

    fn answer(text: &str) -> Behaviour {
        Behaviour::Answer(Value::from(text))
    }

    fn refused() -> Behaviour {
        Behaviour::Fail(AttemptFailure::Transport("connection refused".to_string()))
    }

    fn client(transport: &Arc<FakeTransport>, addresses: &[&str]) -> MultiEndpointClient {
        let transport: Arc<dyn Transport> = transport.clone();
        MultiEndpointClient::from_addresses(
            addresses.iter().copied(),
            transport,
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_failure_then_success_skips_rest() {
        let transport = FakeTransport::new(&[
            ("a", refused()),
            ("b", answer("X")),
            ("c", answer("Y")),
        ]);
        let client = client(&transport, &["a", "b", "c"]);

        let text = client.fetch_passage("Q42").await.unwrap();

        assert_eq!(text, "X");
        assert_eq!(transport.calls("a"), 1);
        assert_eq!(transport.calls("b"), 1);
        assert_eq!(transport.calls("c"), 0);
    }

    #[tokio::test]
    async fn test_single_success_found_at_any_position() {
        let addresses = ["e0", "e1", "e2", "e3", "e4"];

        for winner in 0..addresses.len() {
            let script: Vec<(&str, Behaviour)> = addresses
                .iter()
                .enumerate()
                .map(|(i, addr)| {
                    if i == winner {
                        (*addr, answer("passage"))
                    } else {
                        (*addr, refused())
                    }
                })
                .collect();
            let transport = FakeTransport::new(&script);
            let client = client(&transport, &addresses);

            let payload = client
                .query_all(&Query::wikipedia_page("Q1").unwrap())
                .await
                .unwrap();

            assert_eq!(payload.into_text(), "passage");
            // attempts == index of first success + 1
            assert_eq!(transport.total_calls(), winner + 1);
        }
    }

    #[tokio::test]
    async fn test_first_success_stops_scan() {
        let transport = FakeTransport::new(&[
            ("a", answer("first")),
            ("b", answer("second")),
        ]);
        let client = client(&transport, &["a", "b"]);

        let text = client.fetch_passage("Q42").await.unwrap();

        assert_eq!(text, "first");
        assert_eq!(transport.calls("b"), 0);
    }

    #[tokio::test]
    async fn test_all_failed_preserves_pool_order() {
        let transport = FakeTransport::new(&[
            ("c", Behaviour::Fail(AttemptFailure::Status(502))),
            ("a", refused()),
            ("b", Behaviour::Fail(AttemptFailure::Malformed("truncated".to_string()))),
        ]);
        let client = client(&transport, &["c", "a", "b"]);

        let err = client
            .query_all(&Query::wikipedia_page("Q42").unwrap())
            .await
            .unwrap_err();

        let failures = err.failures();
        assert_eq!(failures.len(), client.pool().size());
        let endpoints: Vec<&str> = failures.iter().map(|f| f.endpoint.as_str()).collect();
        assert_eq!(endpoints, vec!["c", "a", "b"]);
        assert_eq!(failures[0].reason, AttemptFailure::Status(502));
        assert!(matches!(failures[2].reason, AttemptFailure::Malformed(_)));

        // Each endpoint tried exactly once, never retried.
        assert_eq!(transport.order(), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_not_found_sentinel_moves_to_next_endpoint() {
        let transport = FakeTransport::new(&[
            ("a", answer("Not Found!")),
            ("b", Behaviour::Answer(Value::Null)),
            ("c", answer("Paris is the capital of France.")),
        ]);
        let client = client(&transport, &["a", "b", "c"]);

        let text = client.fetch_passage("Q90").await.unwrap();

        assert_eq!(text, "Paris is the capital of France.");
        assert_eq!(transport.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_not_found_everywhere_is_aggregate_failure() {
        let transport = FakeTransport::new(&[("a", answer("Not Found!")), ("b", answer("Not Found!"))]);
        let client = client(&transport, &["a", "b"]);

        let err = client.fetch_passage("Q0").await.unwrap_err();

        assert!(err
            .failures()
            .iter()
            .all(|f| f.reason == AttemptFailure::NotFound));
    }

    #[tokio::test]
    async fn test_hanging_endpoint_times_out_and_fails_over() {
        let transport = FakeTransport::new(&[("slow", Behaviour::Hang), ("fast", answer("ok"))]);
        let client = client(&transport, &["slow", "fast"]);

        let start = Instant::now();
        let text = client.fetch_passage("Q42").await.unwrap();

        assert_eq!(text, "ok");
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_timeout_recorded_with_attempt_bound() {
        let transport = FakeTransport::new(&[("slow", Behaviour::Hang)]);
        let client = client(&transport, &["slow"]);

        let err = client.fetch_passage("Q42").await.unwrap_err();

        assert_eq!(
            err.failures()[0].reason,
            AttemptFailure::Timeout(Duration::from_millis(200))
        );
    }

    #[tokio::test]
    async fn test_empty_pool_is_configuration_error_without_calls() {
        let transport = FakeTransport::new(&[]);
        let dyn_transport: Arc<dyn Transport> = transport.clone();

        let result = MultiEndpointClient::from_addresses(
            Vec::<String>::new(),
            dyn_transport,
            Duration::from_secs(1),
        );

        assert!(matches!(
            result,
            Err(QueryError::Configuration(ConfigError::EmptyEndpointPool(_)))
        ));
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_method_contacts_nobody() {
        let transport = FakeTransport::new(&[("a", answer("X"))]);
        let client = client(&transport, &["a"]);

        let err = client
            .query_named("get_everything", [("qid", "Q42")])
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::UnsupportedMethod(_)));
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_parameters_contact_nobody() {
        let transport = FakeTransport::new(&[("a", answer("X"))]);
        let client = client(&transport, &["a"]);

        let err = client
            .query_named("get_wikipedia_page", [("qid", "")])
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::InvalidParameters { .. }));
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_structured_payload_passes_through() {
        let transport = FakeTransport::new(&[(
            "a",
            Behaviour::Answer(serde_json::json!({"head": ["P31", "P17"], "tail": []})),
        )]);
        let client = client(&transport, &["a"]);

        let payload = client
            .query_named("get_all_relations_of_an_entity", [("entity_qid", "Q90")])
            .await
            .unwrap();

        assert_eq!(payload.value()["head"][1], "P17");
    }

    #[tokio::test]
    async fn test_calls_do_not_share_state() {
        let transport = FakeTransport::new(&[("a", refused()), ("b", answer("X"))]);
        let client = client(&transport, &["a", "b"]);

        client.fetch_passage("Q1").await.unwrap();
        client.fetch_passage("Q2").await.unwrap();

        // The failing endpoint is still tried first on every call.
        assert_eq!(transport.order(), vec!["a", "b", "a", "b"]);
        assert_eq!(client.pool().addresses(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_probe_all_classifies_endpoints() {
        let transport = FakeTransport::new(&[
            ("up", answer("")),
            ("down", refused()),
            ("broken", Behaviour::Fail(AttemptFailure::Status(500))),
        ]);
        let client = client(&transport, &["up", "down", "broken"]);

        let results = client.probe_all().await;

        let statuses: Vec<HealthStatus> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                HealthStatus::Healthy,
                HealthStatus::Unreachable,
                HealthStatus::Unhealthy
            ]
        );
        assert!(results[1].latency_ms.is_none());
        assert!(results[2].error.as_deref().unwrap().contains("500"));
    }
}
