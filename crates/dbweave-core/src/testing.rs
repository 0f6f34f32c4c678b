//! Deterministic query endpoint for tests.
//!
//! [`ScriptedEndpoint`] answers statements from a script of canned replies
//! and records every request it receives. Replies may carry a latency, which
//! plays out on tokio's clock, so paused-clock tests can reorder responses.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;

use crate::endpoint::{QueryEndpoint, QueryError, QueryFuture, QueryRequest};
use crate::value::RowSet;

#[derive(Debug, Clone)]
enum Reply {
    Rows(RowSet),
    Fail(String),
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    reply: Reply,
    latency: Duration,
}

#[derive(Debug, Default)]
struct Script {
    rules: Vec<Rule>,
    requests: Vec<QueryRequest>,
}

impl Script {
    /// Exact match wins; otherwise the latest rule whose pattern occurs in
    /// the statement.
    fn lookup(&self, statement: &str) -> Option<&Rule> {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.pattern == statement)
            .or_else(|| {
                self.rules
                    .iter()
                    .rev()
                    .find(|rule| statement.contains(rule.pattern.as_str()))
            })
    }
}

/// Canned-response endpoint. Clones share one script.
///
/// Unscripted statements succeed with no rows.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEndpoint {
    script: Rc<RefCell<Script>>,
}

impl ScriptedEndpoint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `statement` with `rows` (a JSON array of objects).
    ///
    /// # Panics
    ///
    /// Panics if `rows` is not an array of objects.
    pub fn respond(&self, statement: &str, rows: Value) -> &Self {
        self.respond_after(statement, rows, Duration::ZERO)
    }

    /// Like [`respond`](Self::respond), resolving after `latency`.
    ///
    /// # Panics
    ///
    /// Panics if `rows` is not an array of objects.
    pub fn respond_after(&self, statement: &str, rows: Value, latency: Duration) -> &Self {
        self.push(statement, Reply::Rows(self::rows(rows)), latency)
    }

    /// Answer `statement` with a remote error.
    pub fn fail(&self, statement: &str, message: &str) -> &Self {
        self.push(statement, Reply::Fail(message.to_string()), Duration::ZERO)
    }

    fn push(&self, statement: &str, reply: Reply, latency: Duration) -> &Self {
        self.script.borrow_mut().rules.push(Rule {
            pattern: statement.to_string(),
            reply,
            latency,
        });
        self
    }

    /// Every request received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<QueryRequest> {
        self.script.borrow().requests.clone()
    }

    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.script
            .borrow()
            .requests
            .iter()
            .map(|r| r.statement.clone())
            .collect()
    }

    /// How many times exactly `statement` was requested.
    #[must_use]
    pub fn count(&self, statement: &str) -> usize {
        self.script
            .borrow()
            .requests
            .iter()
            .filter(|r| r.statement == statement)
            .count()
    }

    /// Forget recorded requests, keeping the script.
    pub fn clear(&self) {
        self.script.borrow_mut().requests.clear();
    }
}

impl QueryEndpoint for ScriptedEndpoint {
    fn execute(&self, request: QueryRequest) -> QueryFuture {
        let mut script = self.script.borrow_mut();
        let (reply, latency) = script
            .lookup(&request.statement)
            .map_or((Reply::Rows(RowSet::default()), Duration::ZERO), |rule| {
                (rule.reply.clone(), rule.latency)
            });
        script.requests.push(request);
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            match reply {
                Reply::Rows(rows) => Ok(rows),
                Reply::Fail(message) => Err(QueryError::Remote(message)),
            }
        })
    }
}

/// Build a [`RowSet`] from a JSON array of objects.
///
/// # Panics
///
/// Panics if `value` is not an array of objects.
#[must_use]
pub fn rows(value: Value) -> RowSet {
    serde_json::from_value(value).expect("scripted rows must be an array of objects")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(flavor = "current_thread")]
    async fn exact_match_beats_pattern() {
        let endpoint = ScriptedEndpoint::new();
        endpoint
            .respond("from book", json!([{"bookid": 1}, {"bookid": 2}]))
            .respond("select * from book where authorid = 1", json!([{"bookid": 1}]));

        let exact = endpoint
            .execute(QueryRequest::new("select * from book where authorid = 1"))
            .await
            .expect("rows");
        assert_eq!(exact.len(), 1);

        let pattern = endpoint
            .execute(QueryRequest::new("select * from book where authorid = 2"))
            .await
            .expect("rows");
        assert_eq!(pattern.len(), 2);
        assert_eq!(endpoint.count("select * from book where authorid = 2"), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unscripted_and_failing_statements() {
        let endpoint = ScriptedEndpoint::new();
        endpoint.fail("delete from author", "constraint violation");
        let none = endpoint
            .execute(QueryRequest::new("select 1"))
            .await
            .expect("rows");
        assert!(none.is_empty());
        assert_eq!(
            endpoint
                .execute(QueryRequest::new("delete from author where authorid in (3)"))
                .await,
            Err(QueryError::Remote("constraint violation".into()))
        );
        assert_eq!(endpoint.statements().len(), 2);
        endpoint.clear();
        assert!(endpoint.requests().is_empty());
    }
}
