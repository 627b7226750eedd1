/// Authentication layers
///
/// - Applicant routes expect `Authorization: Bearer <session token>` issued
///   by `/v1/applicants/login`. The token's shell id is injected as an
///   [`ApplicantSession`] extension.
/// - Admin routes expect `Authorization: Bearer <DASHBOARD_PASSWORD>`,
///   compared in constant time.
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use shellhacks_shared::auth::tokens::constant_time_eq;

use crate::{app::AppState, error::ApiError};

/// Authenticated applicant, available to handlers via `Extension`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicantSession {
    pub shell_id: String,
}

fn bearer_token(req: &Request) -> Result<&str, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Expected Bearer token".to_string()))
}

/// Validates an applicant session token
pub async fn applicant_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let shell_id = state.lifecycle.verify_credential(bearer_token(&req)?)?;

    req.extensions_mut().insert(ApplicantSession { shell_id });
    Ok(next.run(req).await)
}

/// Checks the dashboard password
pub async fn admin_auth_layer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req)?;
    if !constant_time_eq(token, &state.config.admin.dashboard_password) {
        tracing::warn!(uri = %req.uri(), "Rejected admin request");
        return Err(ApiError::Unauthorized("Invalid dashboard password".to_string()));
    }

    Ok(next.run(req).await)
}
