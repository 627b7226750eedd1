/// Applicant-facing endpoints
///
/// # Endpoints
///
/// Public:
/// - `POST /v1/applicants/register` - Create an account
/// - `POST /v1/applicants/confirm-email` - Prove ownership of the email
/// - `POST /v1/applicants/resend-confirmation` - Re-send the confirmation email
/// - `POST /v1/applicants/login` - Exchange email and password for a session token
/// - `POST /v1/applicants/forgot-password` - Email a reset token
/// - `POST /v1/applicants/reset-password` - Set a new password with a reset token
///
/// Session (`Authorization: Bearer <token>`):
/// - `POST /v1/applicants/apply` - Submit the application form (multipart)
/// - `GET /v1/applicants/me` - Current applicant
use axum::{
    extract::{Multipart, State},
    response::Response,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use shellhacks_shared::{
    integrations::ResumeFile,
    lifecycle::{normalize_email, Credential, LifecycleError},
    models::applicant::{Applicant, ApplicantProfile},
    validation::RegistrationDraft,
};

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::auth::ApplicantSession,
    response::{created, ok, ApiJson, Envelope},
};

/// Multipart part carrying the resume file
pub const RESUME_FIELD: &str = "resume";

const INTEGER_FIELDS: &[&str] = &["graduationYear"];
const BOOLEAN_FIELDS: &[&str] = &[
    "firstTimeHack",
    "haveBeenToShell",
    "likeAMentor",
    "needReimbursement",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,

    /// Optional profile answers collected at sign-up
    #[serde(flatten)]
    pub profile: ApplicantProfile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmEmailRequest {
    pub email: String,
    #[serde(alias = "token")]
    pub email_confirmation_token: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub new_password: String,
    pub token: String,
}

/// Creates an account in `not applied` and emails a confirmation token
///
/// # Errors
///
/// - `409 Conflict`: Email already registered
/// - `422 Unprocessable Entity`: One reason per violated rule
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<Response> {
    let applicant = state
        .lifecycle
        .register(RegistrationDraft {
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            password: req.password,
            profile: req.profile,
        })
        .await?;

    Ok(created(applicant))
}

pub async fn confirm_email(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ConfirmEmailRequest>,
) -> ApiResult<Json<Envelope<()>>> {
    state
        .lifecycle
        .confirm_email(&req.email, &req.email_confirmation_token)
        .await?;
    Ok(ok(()))
}

/// Issues a fresh confirmation token
///
/// Throttled per email; `429` carries `Retry-After`.
pub async fn resend_confirmation(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<EmailRequest>,
) -> ApiResult<Json<Envelope<()>>> {
    state.lifecycle.resend_confirmation(&req.email).await?;
    Ok(ok(()))
}

/// Unknown email and wrong password both answer `401`
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<Envelope<Credential>>> {
    let credential = state
        .lifecycle
        .authenticate(&req.email, &req.password)
        .await?;
    Ok(ok(credential))
}

/// Starts a password reset
///
/// Unknown emails get the same answer as registered ones.
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<EmailRequest>,
) -> ApiResult<Json<Envelope<()>>> {
    match state.lifecycle.request_password_reset(&req.email).await {
        Ok(()) => {}
        Err(LifecycleError::NotFound) => {
            tracing::debug!("Password reset requested for an unregistered email");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(ok(()))
}

pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> ApiResult<Json<Envelope<()>>> {
    state
        .lifecycle
        .reset_password(&req.email, &req.new_password, &req.token)
        .await?;
    Ok(ok(()))
}

/// Submits the application form
///
/// Text parts use the camelCase profile keys (`schoolName`, `graduationYear`,
/// ...). The file goes in the `resume` part. An `email` part is optional but,
/// when present, must be the session owner's.
///
/// # Errors
///
/// - `403 Forbidden`: `email` belongs to someone else
/// - `409 Conflict`: Status does not allow submission
/// - `422 Unprocessable Entity`: Missing resume or invalid answers
pub async fn apply(
    State(state): State<AppState>,
    Extension(session): Extension<ApplicantSession>,
    mut multipart: Multipart,
) -> ApiResult<Json<Envelope<Applicant>>> {
    let form = read_application_form(&mut multipart).await?;
    let owner = state.lifecycle.get_by_shell_id(&session.shell_id).await?;

    if let Some(email) = &form.email {
        if normalize_email(email) != owner.email {
            tracing::warn!(
                shell_id = %session.shell_id,
                "Application submitted for another applicant's email"
            );
            return Err(ApiError::Forbidden(
                "Email does not belong to the signed-in applicant".to_string(),
            ));
        }
    }

    let applicant = state
        .lifecycle
        .submit_application(&owner.email, form.profile, form.resume)
        .await?;
    Ok(ok(applicant))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(session): Extension<ApplicantSession>,
) -> ApiResult<Json<Envelope<Applicant>>> {
    let applicant = state.lifecycle.get_by_shell_id(&session.shell_id).await?;
    Ok(ok(applicant))
}

#[derive(Debug, Default)]
struct ApplicationForm {
    email: Option<String>,
    profile: ApplicantProfile,
    resume: Option<ResumeFile>,
}

async fn read_application_form(multipart: &mut Multipart) -> ApiResult<ApplicationForm> {
    let mut form = ApplicationForm::default();
    let mut fields = Map::new();
    let mut reasons = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == RESUME_FIELD {
            let Some(file_name) = field.file_name().map(str::to_string) else {
                continue;
            };
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await?;
            if !bytes.is_empty() {
                form.resume = Some(ResumeFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            continue;
        }

        let value = field.text().await?;
        if name == "email" {
            form.email = Some(value).filter(|v| !v.trim().is_empty());
            continue;
        }

        match form_value(&name, &value) {
            Ok(Some(value)) => {
                fields.insert(name, value);
            }
            Ok(None) => {}
            Err(reason) => reasons.push(reason),
        }
    }

    if !reasons.is_empty() {
        return Err(ApiError::ValidationError(reasons));
    }

    form.profile = serde_json::from_value(JsonValue::Object(fields))
        .map_err(|e| ApiError::BadRequest(format!("Invalid application form: {}", e)))?;
    Ok(form)
}

/// Types one text part; blank parts are treated as absent
fn form_value(name: &str, raw: &str) -> Result<Option<JsonValue>, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(None);
    }

    if INTEGER_FIELDS.contains(&name) {
        return value
            .parse::<i32>()
            .map(|n| Some(JsonValue::from(n)))
            .map_err(|_| format!("{} must be a whole number", name));
    }

    if BOOLEAN_FIELDS.contains(&name) {
        return match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(JsonValue::Bool(true))),
            "false" | "no" | "off" | "0" => Ok(Some(JsonValue::Bool(false))),
            _ => Err(format!("{} must be true or false", name)),
        };
    }

    Ok(Some(JsonValue::from(value)))
}
