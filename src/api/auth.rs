//! Static bearer-token check.
//!
//! Every request except the excluded paths must carry
//! `Authorization: Bearer <token>` with one of the configured tokens. An
//! empty token list turns the check off.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::routes::ApiError;

/// Accepted tokens, held as SHA-256 digests.
#[derive(Clone, Default)]
struct TokenSet {
    digests: Vec<[u8; 32]>,
}

impl TokenSet {
    fn new(tokens: &[SecretString]) -> Self {
        Self {
            digests: tokens.iter().map(|t| digest(t.expose_secret())).collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    fn contains(&self, presented: &str) -> bool {
        let presented = digest(presented);
        self.digests.iter().any(|d| *d == presented)
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

/// Layer that applies the bearer-token check.
#[derive(Clone)]
pub struct BearerAuthLayer {
    tokens: Arc<TokenSet>,
    excluded_paths: Arc<Vec<String>>,
}

impl BearerAuthLayer {
    pub fn new(tokens: &[SecretString]) -> Self {
        if tokens.is_empty() {
            warn!("No API tokens configured; HTTP authentication is disabled");
        }
        Self {
            tokens: Arc::new(TokenSet::new(tokens)),
            excluded_paths: Arc::new(vec!["/health".to_string()]),
        }
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuth {
            inner,
            tokens: Arc::clone(&self.tokens),
            excluded_paths: Arc::clone(&self.excluded_paths),
        }
    }
}

#[derive(Clone)]
pub struct BearerAuth<S> {
    inner: S,
    tokens: Arc<TokenSet>,
    excluded_paths: Arc<Vec<String>>,
}

impl<S> Service<Request> for BearerAuth<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let tokens = Arc::clone(&self.tokens);
        let excluded_paths = Arc::clone(&self.excluded_paths);
        // Take the service that was driven to readiness, leave a clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let path = req.uri().path();
            if tokens.is_empty() || excluded_paths.iter().any(|p| path == p) {
                return inner.call(req).await;
            }

            let header = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            let rejection = match header.and_then(|h| h.strip_prefix("Bearer ")) {
                Some(token) if tokens.contains(token.trim()) => None,
                Some(_) => Some("Invalid API token"),
                None if header.is_some() => {
                    Some("Invalid authorization format, expected Bearer token")
                }
                None => Some("Missing Authorization header"),
            };

            match rejection {
                None => {
                    debug!("Bearer token accepted");
                    inner.call(req).await
                }
                Some(reason) => Ok(unauthorized(reason)),
            }
        })
    }
}

fn unauthorized(message: &str) -> Response {
    warn!(reason = message, "Rejected unauthenticated request");
    ApiError::Unauthorized(message.to_string()).into_response()
}
