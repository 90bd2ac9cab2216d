//! Fixed, ordered pool of knowledge-base endpoints.
//!
//! The pool is built once at startup and never reordered, so a lookup
//! scans endpoints in the same order on every run given the same input.

use crate::models::ConfigError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// One network-reachable instance of the knowledge-base service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    address: String,
}

impl Endpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// The address exactly as configured.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Request URL. Bare `host:port` addresses are assumed to be plain HTTP.
    pub fn url(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("http://{}", self.address)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Immutable, non-empty, ordered collection of endpoints.
///
/// Cloning is cheap; clones share the same endpoint list.
#[derive(Debug, Clone)]
pub struct EndpointPool {
    endpoints: Arc<[Endpoint]>,
}

impl EndpointPool {
    /// Build a pool from addresses in the given order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyEndpointPool` if no address is given.
    pub fn new<I, S>(addresses: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints: Vec<Endpoint> = addresses.into_iter().map(Endpoint::new).collect();
        if endpoints.is_empty() {
            return Err(ConfigError::EmptyEndpointPool(
                "no addresses given".to_string(),
            ));
        }
        Ok(Self {
            endpoints: endpoints.into(),
        })
    }

    /// Parse an endpoint list: one address per line, trimmed, blank lines skipped.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let addresses: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        if addresses.is_empty() {
            return Err(ConfigError::EmptyEndpointPool(
                "endpoint list has no addresses".to_string(),
            ));
        }
        Self::new(addresses)
    }

    /// Read the endpoint list file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::AddressFile {
            path: path.to_owned(),
            source: e,
        })?;

        let pool = Self::parse(&content).map_err(|_| {
            ConfigError::EmptyEndpointPool(format!("{} has no addresses", path.display()))
        })?;
        debug!(path = %path.display(), endpoints = pool.size(), "Loaded endpoint list");
        Ok(pool)
    }

    /// Number of endpoints (always at least one).
    pub fn size(&self) -> usize {
        self.endpoints.len()
    }

    /// Endpoint at `index`, in input order.
    pub fn at(&self, index: usize) -> Option<&Endpoint> {
        self.endpoints.get(index)
    }

    /// Endpoints in input order.
    pub fn iter(&self) -> std::slice::Iter<'_, Endpoint> {
        self.endpoints.iter()
    }

    /// Configured addresses in input order.
    pub fn addresses(&self) -> Vec<&str> {
        self.endpoints.iter().map(Endpoint::address).collect()
    }
}

impl<'a> IntoIterator for &'a EndpointPool {
    type Item = &'a Endpoint;
    type IntoIter = std::slice::Iter<'a, Endpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
