/// Organizer dashboard endpoints
///
/// Every route requires `Authorization: Bearer <DASHBOARD_PASSWORD>`.
///
/// # Endpoints
///
/// - `GET /v1/admin/applicants?q=&filter=&page=&limit=` - Search and page applicants
/// - `GET /v1/admin/applicants/:shell_id` - One applicant
/// - `POST /v1/admin/accept` - Accept a batch of shell ids
/// - `POST /v1/admin/confirm` - Mark an accepted applicant as attending
/// - `POST /v1/admin/unconfirm` - Undo a confirmation
/// - `POST /v1/admin/check-in` - Check an applicant in at the venue
/// - `POST /v1/admin/remind/apply` - Remind everyone who has not applied
/// - `POST /v1/admin/remind/confirm` - Remind accepted applicants to confirm
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use shellhacks_shared::{
    lifecycle::{ApplicantPage, BatchOutcome, ReminderTarget},
    models::applicant::{Applicant, ApplicationStatus},
};
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    response::{ok, ApiJson, Envelope},
};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Case-insensitive substring of first/last name, email or school
    #[serde(default)]
    pub q: String,

    /// Application status, e.g. `applied` or `not applied`
    pub filter: Option<String>,

    #[serde(default)]
    pub page: i64,

    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptRequest {
    #[serde(rename = "shellIDs")]
    #[validate(length(min = 1, message = "shellIDs must not be empty"))]
    pub shell_ids: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AttendanceRequest {
    #[validate(length(min = 1, message = "email is required"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckInRequest {
    #[serde(rename = "shellID")]
    #[validate(length(min = 1, message = "shellID is required"))]
    pub shell_id: String,
}

#[derive(Debug, Serialize)]
pub struct ReminderResponse {
    pub queued: usize,
}

/// Lists applicants in registration order
///
/// `page` is zero-based. `limit` defaults to 30 and is capped at 500.
pub async fn list_applicants(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Envelope<ApplicantPage>>> {
    let status = match query.filter.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<ApplicationStatus>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        ),
    };

    let page = state
        .lifecycle
        .list_applicants(&query.q, status, query.page, query.limit)
        .await?;
    Ok(ok(page))
}

pub async fn get_applicant(
    State(state): State<AppState>,
    Path(shell_id): Path<String>,
) -> ApiResult<Json<Envelope<Applicant>>> {
    let applicant = state.lifecycle.get_by_shell_id(&shell_id).await?;
    Ok(ok(applicant))
}

/// Accepts every listed applicant currently in `applied`
///
/// Always answers 200 with one outcome per distinct id; ids that were
/// skipped, unknown or failed are reported, not raised.
pub async fn accept(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AcceptRequest>,
) -> ApiResult<Json<Envelope<Vec<BatchOutcome>>>> {
    req.validate()?;
    let outcomes = state.lifecycle.accept_batch(&req.shell_ids).await;
    Ok(ok(outcomes))
}

pub async fn confirm(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AttendanceRequest>,
) -> ApiResult<Json<Envelope<()>>> {
    req.validate()?;
    state.lifecycle.confirm_attendance(&req.email).await?;
    Ok(ok(()))
}

pub async fn unconfirm(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AttendanceRequest>,
) -> ApiResult<Json<Envelope<()>>> {
    req.validate()?;
    state.lifecycle.unconfirm_attendance(&req.email).await?;
    Ok(ok(()))
}

pub async fn check_in(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CheckInRequest>,
) -> ApiResult<Json<Envelope<Applicant>>> {
    req.validate()?;
    let applicant = state.lifecycle.check_in(&req.shell_id).await?;
    Ok(ok(applicant))
}

pub async fn remind_apply(
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<ReminderResponse>>> {
    let queued = state.lifecycle.remind(ReminderTarget::NotApplied).await?;
    Ok(ok(ReminderResponse { queued }))
}

pub async fn remind_confirm(
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<ReminderResponse>>> {
    let queued = state.lifecycle.remind(ReminderTarget::Accepted).await?;
    Ok(ok(ReminderResponse { queued }))
}
