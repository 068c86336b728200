//! HTTP API.
//!
//! `GET /health`, `POST /api/get-emails`, `POST /api/get-calendar` and
//! `POST /api/learn`, behind a bearer-token check and a permissive CORS
//! policy.

pub mod auth;
pub mod routes;

pub use auth::BearerAuthLayer;
pub use routes::{ApiError, BriefingRequest, LearnResponse};

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use secrecy::SecretString;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cache::ResultCache;
use crate::llm::LlmProvider;
use crate::pipeline::{BriefingConfig, Learner};
use crate::sources::SourceFactory;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<dyn LlmProvider>,
    /// Builds the per-request Gmail and Calendar sources.
    pub sources: Arc<dyn SourceFactory>,
    pub learner: Arc<Learner>,
    pub cache: Arc<ResultCache>,
    pub briefing: BriefingConfig,
    /// Google token used when a request carries none.
    pub fallback_token: Option<SecretString>,
}

/// Build the router. An empty `api_tokens` list disables authentication.
pub fn router(state: AppState, api_tokens: &[SecretString]) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/get-emails", post(routes::get_emails))
        .route("/api/get-calendar", post(routes::get_calendar))
        .route("/api/learn", post(routes::learn))
        .layer(BearerAuthLayer::new(api_tokens))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
