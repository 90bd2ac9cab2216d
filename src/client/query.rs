//! Lookup queries against the knowledge-base service.
//!
//! Methods form a closed set validated at the client boundary: a name that
//! is not listed here never reaches the network.

use crate::models::QueryError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Remote operations the knowledge-base service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Wikipedia page text for an entity (`qid`)
    GetWikipediaPage,
    /// Entity identifiers matching a label (`label`)
    Label2Qid,
    /// Wikidata identifier for a Freebase MID (`mid`)
    Mid2Qid,
    /// Outgoing relations of an entity (`entity_qid`)
    GetAllRelations,
}

impl Method {
    pub const ALL: [Method; 4] = [
        Method::GetWikipediaPage,
        Method::Label2Qid,
        Method::Mid2Qid,
        Method::GetAllRelations,
    ];

    /// Wire name of the method.
    pub fn name(&self) -> &'static str {
        match self {
            Method::GetWikipediaPage => "get_wikipedia_page",
            Method::Label2Qid => "label2qid",
            Method::Mid2Qid => "mid2qid",
            Method::GetAllRelations => "get_all_relations_of_an_entity",
        }
    }

    /// Parameters that must be present and non-empty.
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            Method::GetWikipediaPage => &["qid"],
            Method::Label2Qid => &["label"],
            Method::Mid2Qid => &["mid"],
            Method::GetAllRelations => &["entity_qid"],
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| QueryError::UnsupportedMethod(s.to_string()))
    }
}

/// A validated, immutable lookup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    method: Method,
    params: BTreeMap<String, String>,
}

impl Query {
    /// Build a query, checking the method's required parameters.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::InvalidParameters` if a required parameter is
    /// missing or blank.
    pub fn new<I, K, V>(method: Method, params: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let params: BTreeMap<String, String> = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        for &required in method.required_params() {
            match params.get(required) {
                Some(value) if !value.trim().is_empty() => {}
                Some(_) => {
                    return Err(QueryError::InvalidParameters {
                        method: method.name().to_string(),
                        reason: format!("'{required}' must not be empty"),
                    });
                }
                None => {
                    return Err(QueryError::InvalidParameters {
                        method: method.name().to_string(),
                        reason: format!("missing '{required}'"),
                    });
                }
            }
        }

        Ok(Self { method, params })
    }

    /// Passage lookup for an entity.
    pub fn wikipedia_page(qid: &str) -> Result<Self, QueryError> {
        Self::new(Method::GetWikipediaPage, [("qid", qid)])
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

/// Sentinel the knowledge-base service returns for unknown entities.
pub const NOT_FOUND_SENTINEL: &str = "Not Found!";

/// A successful lookup result.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload(Value);

impl Payload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Text form: strings verbatim, anything else as compact JSON.
    pub fn into_text(self) -> String {
        match self.0 {
            Value::String(s) => s,
            other => other.to_string(),
        }
    }
}
