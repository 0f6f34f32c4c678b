//! Boundary to the remote query-execution service.
//!
//! The service accepts `{ "sql": <statement>, "data": <parameters>? }` and
//! answers `{ "results": [rows...] }` or `{ "results": { "error": "..." } }`.
//! Mutations may answer with any other `results` shape, which counts as
//! success with no rows.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::{Row, RowSet};

/// Failure of one remote call. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The store was reached and rejected the statement.
    #[error("query rejected by store: {0}")]
    Remote(String),
    /// The service could not be reached or answered with a non-success status.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The answer did not have the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),
}

/// One statement sent to the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    #[serde(rename = "sql")]
    pub statement: String,
    #[serde(rename = "data", skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Row>,
    /// Service path override; the page fills in its default when unset.
    #[serde(skip)]
    pub service: Option<String>,
}

impl QueryRequest {
    #[must_use]
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            parameters: None,
            service: None,
        }
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Row) -> Self {
        self.parameters = Some(parameters);
        self
    }

    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

/// Raw service answer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryResponse {
    pub results: QueryResults,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum QueryResults {
    Rows(RowSet),
    Error { error: String },
    Other(serde_json::Value),
}

impl QueryResponse {
    /// Collapse the answer into rows or a remote error.
    pub fn into_result(self) -> Result<RowSet, QueryError> {
        match self.results {
            QueryResults::Rows(rows) => Ok(rows),
            QueryResults::Error { error } => Err(QueryError::Remote(error)),
            QueryResults::Other(_) => Ok(RowSet::default()),
        }
    }
}

/// Future returned by [`QueryEndpoint::execute`]. Runs on the page's local
/// task set, so it need not be `Send`.
pub type QueryFuture = Pin<Box<dyn Future<Output = Result<RowSet, QueryError>>>>;

/// Executes statements against the remote store.
pub trait QueryEndpoint {
    fn execute(&self, request: QueryRequest) -> QueryFuture;
}
