//! Request handler for GraphQL requests.
//!
//! Transport-agnostic: a transport hands over the bearer token and the raw
//! request body, and writes back whatever bytes come out.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::warn;

use graphgate_core::{Engine, Error};

use crate::auth::Authenticator;

/// A GraphQL request body.
#[derive(Debug, Deserialize)]
struct GraphqlRequest {
    query: String,
    #[serde(default)]
    variables: Option<Box<RawValue>>,
}

/// Authenticates requests and runs them through the engine.
pub struct RequestHandler {
    engine: Arc<Engine>,
    authenticator: Arc<dyn Authenticator>,
    request_timeout: Option<Duration>,
}

impl RequestHandler {
    pub fn new(engine: Arc<Engine>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            engine,
            authenticator,
            request_timeout: None,
        }
    }

    /// Give every request a deadline this far in the future.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Handle a request and return the response body.
    pub async fn handle(&self, token: Option<&str>, body: &[u8]) -> Bytes {
        match self.handle_inner(token, body).await {
            Ok(response) => response,
            Err(e) => self.error_response(e),
        }
    }

    async fn handle_inner(&self, token: Option<&str>, body: &[u8]) -> Result<Bytes, Error> {
        let request: GraphqlRequest = serde_json::from_slice(body).map_err(|e| {
            warn!(error = %e, "rejecting malformed request");
            Error::InvalidRequest(format!("invalid request body: {}", e))
        })?;

        let mut ctx = self.authenticator.authenticate(token).into_context();
        if let Some(timeout) = self.request_timeout {
            ctx = ctx.with_timeout(timeout);
        }

        let variables = request.variables.as_deref().map(|v| v.get().as_bytes());
        self.engine.execute(&request.query, variables, &ctx).await
    }

    fn error_response(&self, error: Error) -> Bytes {
        self.engine.render_error(&error)
    }
}
