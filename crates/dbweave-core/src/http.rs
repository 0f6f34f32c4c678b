//! HTTP endpoint: posts each statement as JSON to the query service.

use reqwest::{Client, Url};

use crate::endpoint::{QueryEndpoint, QueryError, QueryFuture, QueryRequest, QueryResponse};

/// [`QueryEndpoint`] backed by an async `reqwest` client.
///
/// The request's service path is resolved against `origin`, so one endpoint
/// serves every component of a page, including those with a service override.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: Client,
    origin: Url,
}

impl HttpEndpoint {
    /// Endpoint for the service host at `origin` (e.g. `http://localhost:3000`).
    pub fn new(origin: &str) -> Result<Self, QueryError> {
        let origin = Url::parse(origin).map_err(|err| QueryError::Transport(err.to_string()))?;
        Ok(Self {
            client: Client::new(),
            origin,
        })
    }

    #[must_use]
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn url_for(&self, request: &QueryRequest) -> Result<Url, QueryError> {
        let service = request.service.as_deref().unwrap_or(crate::config::DEFAULT_SERVICE);
        self.origin
            .join(service)
            .map_err(|err| QueryError::Transport(format!("bad service path `{service}`: {err}")))
    }
}

impl QueryEndpoint for HttpEndpoint {
    fn execute(&self, request: QueryRequest) -> QueryFuture {
        let client = self.client.clone();
        let url = self.url_for(&request);
        Box::pin(async move {
            let url = url?;
            tracing::debug!(message = "http.post", url = %url, statement = %request.statement);
            let response = client
                .post(url)
                .json(&request)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|err| QueryError::Transport(err.to_string()))?;
            let body: QueryResponse = response
                .json()
                .await
                .map_err(|err| QueryError::Decode(err.to_string()))?;
            body.into_result()
        })
    }
}
