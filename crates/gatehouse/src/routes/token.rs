//! Render-side artifact endpoints: submit-time tokens and honeypot fields.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Deserialize)]
pub struct TokenRequest {
    /// Form context identifier (post id or equivalent)
    post_id: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    token: String,
}

/// Issue a submit-time token for one form render.
///
/// The caller echoes the token back as `hcap_fst_token` on submission.
/// Responses carry cache-prevention headers: a cached token would be
/// single-use-spent or expired by the time a second visitor submits.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<([(header::HeaderName, &'static str); 2], Json<TokenResponse>), StatusCode> {
    let token = state
        .pipeline
        .issue_submit_token(&payload.post_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to issue submit-time token");
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        })?;

    Ok((no_cache_headers(), Json(TokenResponse { token })))
}

#[derive(Serialize)]
pub struct HoneypotResponse {
    /// Randomized decoy field name for this render
    field: String,
    /// Value for the sibling signature field
    signature: String,
}

/// Mint the honeypot field name and anti-tamper signature for one render.
pub async fn honeypot_fields(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (
    [(header::HeaderName, &'static str); 2],
    Json<HoneypotResponse>,
) {
    let session = headers
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (field, signature) = state.pipeline.honeypot().render_fields(session.as_deref());

    (no_cache_headers(), Json(HoneypotResponse { field, signature }))
}

fn no_cache_headers() -> [(header::HeaderName, &'static str); 2] {
    [
        (header::CACHE_CONTROL, "no-cache, must-revalidate, max-age=0"),
        (header::PRAGMA, "no-cache"),
    ]
}
