//! Submission verification endpoint.

use axum::{Form, Json, extract::State, http::HeaderMap};
use serde::Serialize;

use palisade_common::{ErrorCode, Submission};

use gatehouse::pipeline::RequestContext;

use crate::state::AppState;

#[derive(Serialize)]
pub struct VerifyResponse {
    success: bool,
    message: String,
    html_message: String,
    codes: Vec<ErrorCode>,
}

/// Verify one form submission.
///
/// Accepts the raw form-urlencoded fields in posted order; the response
/// token is read from the standard widget field. The caller IP comes from
/// `X-Forwarded-For` and the authenticated session (if any) from
/// `X-Session-Id`, both set by the fronting proxy.
pub async fn verify_submission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> Json<VerifyResponse> {
    let remote_ip = forwarded_for(&headers);
    let session_id = header_value(&headers, "x-session-id");

    let submission = Submission::from_posted_fields(fields, remote_ip, session_id);

    // One context per incoming request: the at-most-once invariant is
    // request-scoped, never process-wide
    let mut ctx = RequestContext::new();
    let result = state.pipeline.verify(&mut ctx, &submission).await;

    Json(VerifyResponse {
        success: result.success,
        html_message: result.html_message(),
        codes: result.codes.iter().cloned().collect(),
        message: result.message,
    })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// First entry of X-Forwarded-For (the original client)
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_value(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
}
