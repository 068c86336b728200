//! Request handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Local;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use super::AppState;
use crate::cache::{CacheKind, cache_key};
use crate::error::{PipelineError, SourceError};
use crate::pipeline::{CalendarBriefer, LearnRequest, TriagePipeline};

/// Body of the briefing endpoints.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BriefingRequest {
    /// Google OAuth access token for the user's mailbox and calendar.
    #[serde(default, alias = "idToken")]
    pub access_token: Option<String>,
    /// Skip the cache and recompute.
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LearnResponse {
    pub answer: String,
}

/// Handler errors, rendered as `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) | Self::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

// ── Health ──────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "briefly"
    }))
}

// ── Briefings ───────────────────────────────────────────────────────────

#[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn get_emails(
    State(state): State<AppState>,
    Json(body): Json<BriefingRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = resolve_token(&state, body.access_token)?;
    let key = cache_key(
        CacheKind::Emails,
        token.expose_secret(),
        Local::now().date_naive(),
    );
    if let Some(hit) = cached(&state, &key, body.refresh).await {
        return Ok(Json(hit));
    }

    let pipeline = TriagePipeline::new(state.sources.mail(token), state.llm.clone());
    let outcome = pipeline.run_email_triage().await.inspect_err(|e| {
        error!(error = %e, "Email triage failed");
    })?;
    info!(
        messages = outcome.result.len(),
        excluded = outcome.excluded.len(),
        cost = %outcome.cost,
        "Served email triage"
    );

    let value = to_json(&outcome.result)?;
    state.cache.insert(key, value.clone()).await;
    Ok(Json(value))
}

#[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn get_calendar(
    State(state): State<AppState>,
    Json(body): Json<BriefingRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = resolve_token(&state, body.access_token)?;
    let key = cache_key(
        CacheKind::Calendar,
        token.expose_secret(),
        Local::now().date_naive(),
    );
    if let Some(hit) = cached(&state, &key, body.refresh).await {
        return Ok(Json(hit));
    }

    let briefer = CalendarBriefer::new(
        state.sources.calendar(token.clone()),
        state.sources.mail(token),
        state.llm.clone(),
        state.briefing.clone(),
    );
    let (briefing, cost) = briefer
        .run_calendar_briefing(state.briefing.self_email.as_deref())
        .await
        .inspect_err(|e| error!(error = %e, "Calendar briefing failed"))?;
    info!(events = briefing.events.len(), cost = %cost, "Served calendar briefing");

    let value = to_json(&briefing)?;
    state.cache.insert(key, value.clone()).await;
    Ok(Json(value))
}

// ── Learn ───────────────────────────────────────────────────────────────

#[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn learn(
    State(state): State<AppState>,
    Json(request): Json<LearnRequest>,
) -> Result<Json<LearnResponse>, ApiError> {
    let (answer, cost) = state
        .learner
        .answer(request)
        .await
        .inspect_err(|e| error!(error = %e, "Learn request failed"))?;
    info!(chars = answer.len(), cost = %cost, "Served learn request");
    Ok(Json(LearnResponse { answer }))
}

// ── Helpers ─────────────────────────────────────────────────────────────

/// The request's token, else the configured fallback.
fn resolve_token(state: &AppState, presented: Option<String>) -> Result<SecretString, ApiError> {
    presented
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .map(SecretString::from)
        .or_else(|| state.fallback_token.clone())
        .ok_or_else(|| ApiError::BadRequest(SourceError::MissingToken.to_string()))
}

/// Cached value for `key` unless the client asked for a refresh, in which
/// case the entry is dropped.
async fn cached(state: &AppState, key: &str, refresh: bool) -> Option<serde_json::Value> {
    if refresh {
        state.cache.invalidate(key).await;
        return None;
    }
    state.cache.get(key).await
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn briefing_request_accepts_id_token_alias() {
        let body: BriefingRequest = serde_json::from_str(r#"{"idToken": "ya29.x"}"#).unwrap();
        assert_eq!(body.access_token.as_deref(), Some("ya29.x"));
        assert!(!body.refresh);

        let body: BriefingRequest =
            serde_json::from_str(r#"{"access_token": "t", "refresh": true}"#).unwrap();
        assert_eq!(body.access_token.as_deref(), Some("t"));
        assert!(body.refresh);

        let body: BriefingRequest = serde_json::from_str("{}").unwrap();
        assert!(body.access_token.is_none());
    }

    #[test]
    fn error_statuses() {
        assert_eq!(
            ApiError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Pipeline(PipelineError::Unavailable("search".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
