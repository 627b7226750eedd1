/// Applicant Lifecycle Manager
///
/// Owns every rule about applicants: identity allocation, the status state
/// machine, one-time tokens, credentials and listing semantics. It talks to
/// the outside world only through the collaborator traits:
///
/// - [`ApplicantStore`] for persistence
/// - [`CredentialService`] for password hashing and session tokens
/// - [`EffectQueue`] for notifications and spreadsheet rows (delivered later by the worker)
/// - [`FileStorage`] for resume uploads (inline, best effort)
///
/// # State Machine
///
/// ```text
/// not applied --submit_application--> applied
/// applied     --accept_batch--------> accepted
/// accepted    --confirm_attendance--> confirmed
/// confirmed   --unconfirm_attendance-> accepted
/// ```
///
/// Every transition is a single conditional update keyed on the observed
/// status, so two concurrent requests cannot both win.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use shellhacks_shared::auth::credentials::Argon2JwtCredentials;
/// use shellhacks_shared::integrations::MemoryFileStorage;
/// use shellhacks_shared::lifecycle::{ApplicantLifecycle, Collaborators, LifecycleConfig};
/// use shellhacks_shared::outbox::MemoryEffectQueue;
/// use shellhacks_shared::store::memory::MemoryApplicantStore;
/// use shellhacks_shared::validation::{RegistrationDraft, ValidationRules};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let lifecycle = ApplicantLifecycle::new(
///     Collaborators {
///         store: Arc::new(MemoryApplicantStore::new()),
///         credentials: Arc::new(Argon2JwtCredentials::new("secret-key-at-least-32-bytes-long!!")),
///         effects: Arc::new(MemoryEffectQueue::new()),
///         storage: Arc::new(MemoryFileStorage::new()),
///     },
///     ValidationRules::default(),
///     LifecycleConfig::default(),
/// );
///
/// let ada = lifecycle
///     .register(RegistrationDraft {
///         first_name: "Ada".into(),
///         last_name: "Lovelace".into(),
///         email: "ADA@x.com".into(),
///         password: "pw123".into(),
///         ..Default::default()
///     })
///     .await?;
/// assert_eq!(ada.email, "ada@x.com");
/// # Ok(())
/// # }
/// ```
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::auth::credentials::{CredentialError, CredentialService};
use crate::auth::jwt::Claims;
use crate::auth::tokens::{avatar_for, constant_time_eq, digest_token, generate_hex_token, generate_shell_id};
use crate::integrations::{FileStorage, ResumeFile};
use crate::models::applicant::{
    Applicant, ApplicantPatch, ApplicantProfile, ApplicationStatus, NewApplicant, ResetToken,
};
use crate::outbox::{EffectQueue, NotificationTemplate, Recipient, SideEffect};
use crate::store::{ApplicantFilter, ApplicantStore, Field, StoreError, UniqueField, Window};
use crate::validation::{RegistrationDraft, ValidationRules};

pub mod config;
pub mod error;
pub mod throttle;


pub use config::{LifecycleConfig, ThrottleConfig, TransitionPolicy};
pub use error::LifecycleError;

use throttle::Throttle;

/// Stored in place of a resume URL when no upload happened
pub const RESUME_PLACEHOLDER: &str = "N/A";

/// Sheet receiving a row per submitted application
pub const APPLICANTS_SHEET: &str = "Applicants";

/// Sheet receiving a row per confirmed attendee
pub const CONFIRMED_SHEET: &str = "Confirmed";

type ShellIdGenerator = Arc<dyn Fn(usize) -> String + Send + Sync>;

/// Collaborators the lifecycle manager is built from
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ApplicantStore>,
    pub credentials: Arc<dyn CredentialService>,
    pub effects: Arc<dyn EffectQueue>,
    pub storage: Arc<dyn FileStorage>,
}

/// Session credential handed out on login
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub token: String,
    #[serde(rename = "shellID")]
    pub shell_id: String,
    pub expires_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

/// One page of the admin listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantPage {
    pub items: Vec<Applicant>,
    pub total_count: u64,
    /// Checked-in applicants across the whole matching set
    pub checked_in_count: u64,
    pub page_info: PageInfo,
}

/// Result of accepting one shell id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AcceptOutcome {
    Accepted,
    /// The applicant exists but was not in `applied`
    Skipped { status: ApplicationStatus },
    NotFound,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    #[serde(rename = "shellID")]
    pub shell_id: String,
    #[serde(flatten)]
    pub outcome: AcceptOutcome,
}

/// Audience of a reminder campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderTarget {
    /// Registered but never applied
    NotApplied,
    /// Accepted but not yet confirmed
    Accepted,
}

impl ReminderTarget {
    pub fn status(&self) -> ApplicationStatus {
        match self {
            ReminderTarget::NotApplied => ApplicationStatus::NotApplied,
            ReminderTarget::Accepted => ApplicationStatus::Accepted,
        }
    }

    pub fn template(&self) -> NotificationTemplate {
        match self {
            ReminderTarget::NotApplied => NotificationTemplate::RemindApply,
            ReminderTarget::Accepted => NotificationTemplate::RemindConfirm,
        }
    }
}

/// Trims and lower-cases an email before any lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn storage_failure(operation: &'static str, e: StoreError) -> LifecycleError {
    error!(operation, error = %e, "Applicant store failure");
    LifecycleError::fatal("storage failure")
}

fn credential_failure(operation: &'static str, e: CredentialError) -> LifecycleError {
    error!(operation, error = %e, "Credential service failure");
    LifecycleError::fatal("credential failure")
}

pub struct ApplicantLifecycle {
    store: Arc<dyn ApplicantStore>,
    credentials: Arc<dyn CredentialService>,
    effects: Arc<dyn EffectQueue>,
    storage: Arc<dyn FileStorage>,
    rules: ValidationRules,
    config: LifecycleConfig,
    throttle: Throttle,
    shell_ids: ShellIdGenerator,
    /// Hash verified for unknown emails so every login pays one Argon2 check
    decoy_hash: OnceCell<String>,
}

impl ApplicantLifecycle {
    pub fn new(collaborators: Collaborators, rules: ValidationRules, config: LifecycleConfig) -> Self {
        Self {
            store: collaborators.store,
            credentials: collaborators.credentials,
            effects: collaborators.effects,
            storage: collaborators.storage,
            rules,
            throttle: Throttle::new(config.throttle),
            config,
            shell_ids: Arc::new(generate_shell_id),
            decoy_hash: OnceCell::new(),
        }
    }

    /// Replaces the random shell id source
    pub fn with_shell_id_generator(
        mut self,
        generator: impl Fn(usize) -> String + Send + Sync + 'static,
    ) -> Self {
        self.shell_ids = Arc::new(generator);
        self
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Store liveness, for health checks
    pub async fn ping(&self) -> Result<(), LifecycleError> {
        self.store
            .ping()
            .await
            .map_err(|e| storage_failure("ping", e))
    }

    /// Creates a new applicant in `not applied`
    ///
    /// # Errors
    ///
    /// - `DuplicateEmail` if the email is taken in any casing
    /// - `ValidationFailed` with every violated rule
    /// - `Fatal` if no unique shell id could be allocated
    pub async fn register(&self, draft: RegistrationDraft) -> Result<Applicant, LifecycleError> {
        let draft = RegistrationDraft {
            first_name: draft.first_name.trim().to_string(),
            last_name: draft.last_name.trim().to_string(),
            email: normalize_email(&draft.email),
            ..draft
        };

        if self.find_by_email(&draft.email).await?.is_some() {
            info!(email = %draft.email, "Registration rejected, email exists");
            return Err(LifecycleError::DuplicateEmail);
        }

        self.rules.validate_registration(&draft)?;

        let password_hash = self.hash_password(draft.password.clone()).await?;
        let confirm_token = generate_hex_token(self.config.confirm_token_bytes);

        let applicant = self
            .insert_with_unique_shell_id(&draft, password_hash, digest_token(&confirm_token))
            .await?;

        info!(shell_id = %applicant.shell_id, email = %applicant.email, "Applicant registered");

        self.enqueue(SideEffect::notify(
            NotificationTemplate::Verification,
            Recipient::from_applicant(&applicant).with_token(confirm_token),
        ))
        .await;

        Ok(applicant)
    }

    async fn insert_with_unique_shell_id(
        &self,
        draft: &RegistrationDraft,
        password_hash: String,
        confirm_digest: String,
    ) -> Result<Applicant, LifecycleError> {
        let base = self.config.shell_id_length;
        let rounds = [base, base + 3];

        for (round, length) in rounds.into_iter().enumerate() {
            if round > 0 {
                warn!(length, "Shell id space crowded, widening");
            }

            for _ in 0..self.config.shell_id_max_attempts {
                let shell_id = (self.shell_ids)(length);

                let taken = self
                    .store
                    .count(&ApplicantFilter::shell_id(&shell_id))
                    .await
                    .map_err(|e| storage_failure("register", e))?;
                if taken > 0 {
                    debug!(shell_id = %shell_id, "Shell id candidate taken");
                    continue;
                }

                let new = NewApplicant {
                    avatar_id: avatar_for(&shell_id),
                    shell_id,
                    email: draft.email.clone(),
                    first_name: draft.first_name.clone(),
                    last_name: draft.last_name.clone(),
                    password_hash: password_hash.clone(),
                    email_confirmation_token: confirm_digest.clone(),
                    profile: draft.profile.clone(),
                    time_created: Utc::now(),
                };

                match self.store.create(new).await {
                    Ok(applicant) => return Ok(applicant),
                    Err(StoreError::Conflict(UniqueField::ShellId)) => continue,
                    Err(StoreError::Conflict(UniqueField::Email)) => {
                        return Err(LifecycleError::DuplicateEmail)
                    }
                    Err(e) => return Err(storage_failure("register", e)),
                }
            }
        }

        error!(email = %draft.email, "Exhausted shell id allocation");
        Err(LifecycleError::fatal("could not allocate a unique shell id"))
    }

    /// Marks the email as confirmed if `token` matches
    ///
    /// Confirming twice succeeds; the confirmation email is only queued once.
    pub async fn confirm_email(&self, email: &str, token: &str) -> Result<(), LifecycleError> {
        let email = normalize_email(email);
        let matching = ApplicantFilter::email(&email).and(ApplicantFilter::eq(
            Field::EmailConfirmationToken,
            digest_token(token),
        ));

        let patch = ApplicantPatch {
            email_confirmed: Some(true),
            ..Default::default()
        };
        let first_time = self
            .store
            .update_one(
                &matching.clone().and(ApplicantFilter::eq(Field::EmailConfirmed, false)),
                &patch,
            )
            .await
            .map_err(|e| storage_failure("confirm_email", e))?;

        match first_time {
            Some(applicant) => {
                info!(shell_id = %applicant.shell_id, "Email confirmed");
                self.enqueue(SideEffect::notify(
                    NotificationTemplate::AccountConfirmation,
                    Recipient::from_applicant(&applicant),
                ))
                .await;
                Ok(())
            }
            None => {
                let already = self
                    .store
                    .find_one(&matching)
                    .await
                    .map_err(|e| storage_failure("confirm_email", e))?;
                match already {
                    Some(_) => Ok(()),
                    None => Err(LifecycleError::NotFound),
                }
            }
        }
    }

    /// Issues a fresh confirmation token, replacing the previous one
    pub async fn resend_confirmation(&self, email: &str) -> Result<(), LifecycleError> {
        let email = normalize_email(email);
        self.throttle
            .check(&email)
            .map_err(|retry_after_secs| LifecycleError::RateLimited { retry_after_secs })?;

        let token = generate_hex_token(self.config.confirm_token_bytes);
        let patch = ApplicantPatch {
            email_confirmation_token: Some(digest_token(&token)),
            ..Default::default()
        };

        let applicant = self
            .store
            .update_one(&ApplicantFilter::email(&email), &patch)
            .await
            .map_err(|e| storage_failure("resend_confirmation", e))?
            .ok_or(LifecycleError::NotFound)?;

        debug!(shell_id = %applicant.shell_id, "Confirmation token reissued");
        self.enqueue(SideEffect::notify(
            NotificationTemplate::Verification,
            Recipient::from_applicant(&applicant).with_token(token),
        ))
        .await;

        Ok(())
    }

    /// Submits (or re-submits) the application form
    ///
    /// # Errors
    ///
    /// - `NotFound` if no applicant has this email
    /// - `ValidationFailed(["resume required"])` without a resume
    /// - `ValidationFailed` for the merged profile
    /// - `InvalidTransition` if the status does not allow submission or
    ///   changed underneath the request
    pub async fn submit_application(
        &self,
        email: &str,
        profile: ApplicantProfile,
        resume: Option<ResumeFile>,
    ) -> Result<Applicant, LifecycleError> {
        let email = normalize_email(email);
        let current = self
            .find_by_email(&email)
            .await?
            .ok_or(LifecycleError::NotFound)?;

        let Some(resume) = resume else {
            return Err(LifecycleError::ValidationFailed(vec![
                "resume required".to_string(),
            ]));
        };

        let observed = current.application_status;
        if self.config.transition_policy == TransitionPolicy::Strict
            && !matches!(
                observed,
                ApplicationStatus::NotApplied | ApplicationStatus::Applied
            )
        {
            return Err(LifecycleError::InvalidTransition {
                from: observed,
                to: ApplicationStatus::Applied,
            });
        }

        let mut merged = current.profile.merged_with(&profile);
        self.rules.validate_application(&merged)?;

        let resume_url = self.store_resume(&email, &resume).await;
        merged.resume = Some(resume_url.clone());

        let guard = ApplicantFilter::email(&email).and(ApplicantFilter::status(observed));
        let patch = ApplicantPatch {
            application_status: Some(ApplicationStatus::Applied),
            profile: Some(merged),
            time_applied: Some(Utc::now()),
            ..Default::default()
        };

        let applicant = self
            .store
            .update_one(&guard, &patch)
            .await
            .map_err(|e| storage_failure("submit_application", e))?
            .ok_or_else(|| {
                if resume_url != RESUME_PLACEHOLDER {
                    warn!(
                        email = %email,
                        resume = %resume_url,
                        "Application status changed during submission, uploaded resume is orphaned"
                    );
                } else {
                    warn!(email = %email, "Application status changed during submission");
                }
                LifecycleError::InvalidTransition {
                    from: observed,
                    to: ApplicationStatus::Applied,
                }
            })?;

        info!(shell_id = %applicant.shell_id, from = %observed, "Application submitted");

        self.enqueue(SideEffect::notify(
            NotificationTemplate::Applied,
            Recipient::from_applicant(&applicant),
        ))
        .await;
        if self.config.mirror_enabled {
            self.enqueue(SideEffect::append_row(APPLICANTS_SHEET, applicant.sheet_row()))
                .await;
        }

        Ok(applicant)
    }

    async fn store_resume(&self, email: &str, resume: &ResumeFile) -> String {
        if !self.config.drive_upload_enabled {
            return RESUME_PLACEHOLDER.to_string();
        }

        let name = email.split('@').next().unwrap_or(email);
        match self
            .storage
            .upload_file(resume, name, &self.config.resume_folder)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                warn!(email = %email, error = %e, "Resume upload failed, storing placeholder");
                RESUME_PLACEHOLDER.to_string()
            }
        }
    }

    /// Admin listing with free-text search, status filter and paging
    ///
    /// `page` and `page_size` are taken by absolute value. A zero page size
    /// falls back to the default; sizes above the maximum are capped.
    pub async fn list_applicants(
        &self,
        query: &str,
        status_filter: Option<ApplicationStatus>,
        page: i64,
        page_size: i64,
    ) -> Result<ApplicantPage, LifecycleError> {
        let page = page.unsigned_abs();
        let page_size = match page_size.unsigned_abs() {
            0 => self.config.default_page_size,
            n => n.min(self.config.max_page_size),
        }
        .max(1);

        let text = query.trim();
        let mut filter = if text.is_empty() {
            ApplicantFilter::True
        } else {
            ApplicantFilter::Or(
                [Field::FirstName, Field::LastName, Field::Email, Field::SchoolName]
                    .into_iter()
                    .map(|field| ApplicantFilter::ContainsIgnoreCase(field, text.to_string()))
                    .collect(),
            )
        };
        if let Some(status) = status_filter {
            filter = filter.and(ApplicantFilter::status(status));
        }

        let total_count = self
            .store
            .count(&filter)
            .await
            .map_err(|e| storage_failure("list_applicants", e))?;
        let checked_in_count = self
            .store
            .count(&filter.clone().and(ApplicantFilter::eq(Field::CheckIn, true)))
            .await
            .map_err(|e| storage_failure("list_applicants", e))?;
        let items = self
            .store
            .find(
                &filter,
                Some(Window {
                    offset: page.saturating_mul(page_size),
                    limit: page_size,
                }),
            )
            .await
            .map_err(|e| storage_failure("list_applicants", e))?;

        Ok(ApplicantPage {
            items,
            total_count,
            checked_in_count,
            page_info: PageInfo {
                page,
                page_size,
                total_pages: total_count.div_ceil(page_size),
            },
        })
    }

    pub async fn get_by_shell_id(&self, shell_id: &str) -> Result<Applicant, LifecycleError> {
        self.store
            .find_one(&ApplicantFilter::shell_id(shell_id.trim()))
            .await
            .map_err(|e| storage_failure("get_by_shell_id", e))?
            .ok_or(LifecycleError::NotFound)
    }

    /// Moves every listed applicant that is `applied` to `accepted`
    ///
    /// Ids are processed concurrently and independently; duplicates are
    /// collapsed. One outcome is returned per distinct id, in input order.
    pub async fn accept_batch(&self, shell_ids: &[String]) -> Vec<BatchOutcome> {
        let mut seen = HashSet::new();
        let distinct: Vec<String> = shell_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();

        let outcomes = join_all(distinct.iter().map(|id| self.accept_one(id))).await;

        distinct
            .into_iter()
            .zip(outcomes)
            .map(|(shell_id, outcome)| BatchOutcome { shell_id, outcome })
            .collect()
    }

    async fn accept_one(&self, shell_id: &str) -> AcceptOutcome {
        let guard = ApplicantFilter::shell_id(shell_id)
            .and(ApplicantFilter::status(ApplicationStatus::Applied));

        match self
            .store
            .update_one(&guard, &ApplicantPatch::status(ApplicationStatus::Accepted))
            .await
        {
            Ok(Some(_)) => {
                info!(shell_id = %shell_id, "Applicant accepted");
                AcceptOutcome::Accepted
            }
            Ok(None) => match self.store.find_one(&ApplicantFilter::shell_id(shell_id)).await {
                Ok(Some(applicant)) => {
                    info!(
                        shell_id = %shell_id,
                        status = %applicant.application_status,
                        "Skipped acceptance, applicant not in applied"
                    );
                    AcceptOutcome::Skipped {
                        status: applicant.application_status,
                    }
                }
                Ok(None) => {
                    warn!(shell_id = %shell_id, "Skipped acceptance, unknown shell id");
                    AcceptOutcome::NotFound
                }
                Err(e) => {
                    error!(shell_id = %shell_id, error = %e, "Acceptance lookup failed");
                    AcceptOutcome::Failed {
                        reason: "storage failure".to_string(),
                    }
                }
            },
            Err(e) => {
                error!(shell_id = %shell_id, error = %e, "Acceptance failed");
                AcceptOutcome::Failed {
                    reason: "storage failure".to_string(),
                }
            }
        }
    }

    /// Records that an accepted applicant will attend
    ///
    /// Under `Strict` policy only `accepted` may confirm and an already
    /// confirmed applicant is left alone. `Lenient` forces `confirmed`.
    pub async fn confirm_attendance(&self, email: &str) -> Result<(), LifecycleError> {
        let applicant = self
            .move_status(
                email,
                ApplicationStatus::Accepted,
                ApplicationStatus::Confirmed,
                "confirm_attendance",
            )
            .await?;

        if let (Some(applicant), true) = (applicant, self.config.mirror_enabled) {
            self.enqueue(SideEffect::append_row(CONFIRMED_SHEET, applicant.sheet_row()))
                .await;
        }
        Ok(())
    }

    /// Rolls a confirmed applicant back to `accepted`
    pub async fn unconfirm_attendance(&self, email: &str) -> Result<(), LifecycleError> {
        self.move_status(
            email,
            ApplicationStatus::Confirmed,
            ApplicationStatus::Accepted,
            "unconfirm_attendance",
        )
        .await
        .map(|_| ())
    }

    /// Shared body of confirm/unconfirm
    ///
    /// Returns the updated record, or `None` when the applicant was already in
    /// `to` and nothing was written.
    async fn move_status(
        &self,
        email: &str,
        from: ApplicationStatus,
        to: ApplicationStatus,
        operation: &'static str,
    ) -> Result<Option<Applicant>, LifecycleError> {
        let email = normalize_email(email);
        let current = self
            .find_by_email(&email)
            .await?
            .ok_or(LifecycleError::NotFound)?;

        let guard = match self.config.transition_policy {
            TransitionPolicy::Lenient => ApplicantFilter::email(&email),
            TransitionPolicy::Strict => {
                if current.application_status == to {
                    debug!(shell_id = %current.shell_id, status = %to, "Status already set");
                    return Ok(None);
                }
                if current.application_status != from {
                    return Err(LifecycleError::InvalidTransition {
                        from: current.application_status,
                        to,
                    });
                }
                ApplicantFilter::email(&email).and(ApplicantFilter::status(from))
            }
        };

        match self
            .store
            .update_one(&guard, &ApplicantPatch::status(to))
            .await
            .map_err(|e| storage_failure(operation, e))?
        {
            Some(applicant) => {
                info!(
                    shell_id = %applicant.shell_id,
                    from = %current.application_status,
                    to = %to,
                    "Attendance status changed"
                );
                Ok(Some(applicant))
            }
            None => {
                let now = self
                    .find_by_email(&email)
                    .await?
                    .ok_or(LifecycleError::NotFound)?;
                if now.application_status == to {
                    Ok(None)
                } else {
                    Err(LifecycleError::InvalidTransition {
                        from: now.application_status,
                        to,
                    })
                }
            }
        }
    }

    /// Marks the applicant as present at the venue
    pub async fn check_in(&self, shell_id: &str) -> Result<Applicant, LifecycleError> {
        let patch = ApplicantPatch {
            check_in: Some(true),
            ..Default::default()
        };

        let applicant = self
            .store
            .update_one(&ApplicantFilter::shell_id(shell_id.trim()), &patch)
            .await
            .map_err(|e| storage_failure("check_in", e))?
            .ok_or(LifecycleError::NotFound)?;

        info!(shell_id = %applicant.shell_id, "Applicant checked in");
        Ok(applicant)
    }

    /// Verifies email and password and issues a session credential
    ///
    /// Unknown email and wrong password fail identically.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Credential, LifecycleError> {
        let email = normalize_email(email);
        let Some(applicant) = self.find_by_email(&email).await? else {
            let decoy = self
                .decoy_hash
                .get_or_try_init(|| self.hash_password(generate_hex_token(16)))
                .await?
                .clone();
            self.verify_password(password.to_string(), decoy).await?;
            debug!(email = %email, "Login for unknown email");
            return Err(LifecycleError::InvalidCredentials);
        };

        if !self
            .verify_password(password.to_string(), applicant.password_hash.clone())
            .await?
        {
            debug!(shell_id = %applicant.shell_id, "Login with wrong password");
            return Err(LifecycleError::InvalidCredentials);
        }

        let claims = Claims::issued_at(&applicant.shell_id, Utc::now(), self.config.credential_ttl);
        let token = self
            .credentials
            .issue(&claims)
            .map_err(|e| credential_failure("authenticate", e))?;

        info!(shell_id = %applicant.shell_id, "Applicant logged in");
        Ok(Credential {
            token,
            shell_id: applicant.shell_id,
            expires_at: claims.expires_at(),
        })
    }

    /// Validates a session token and returns its shell id
    pub fn verify_credential(&self, token: &str) -> Result<String, LifecycleError> {
        self.credentials
            .validate(token)
            .map(|claims| claims.sub)
            .map_err(|e| {
                debug!(error = %e, "Rejected session token");
                LifecycleError::InvalidCredentials
            })
    }

    /// Issues a password reset token valid for `reset_token_ttl`
    pub async fn request_password_reset(&self, email: &str) -> Result<(), LifecycleError> {
        let email = normalize_email(email);
        self.throttle
            .check(&email)
            .map_err(|retry_after_secs| LifecycleError::RateLimited { retry_after_secs })?;

        let token = generate_hex_token(self.config.reset_token_bytes);
        let patch = ApplicantPatch {
            reset_password: Some(Some(ResetToken {
                digest: digest_token(&token),
                expires_at: Utc::now() + self.config.reset_token_ttl,
            })),
            ..Default::default()
        };

        let applicant = self
            .store
            .update_one(&ApplicantFilter::email(&email), &patch)
            .await
            .map_err(|e| storage_failure("request_password_reset", e))?
            .ok_or(LifecycleError::NotFound)?;

        info!(shell_id = %applicant.shell_id, "Password reset requested");
        self.enqueue(SideEffect::notify(
            NotificationTemplate::ForgotPassword,
            Recipient::from_applicant(&applicant).with_token(token),
        ))
        .await;

        Ok(())
    }

    /// Sets a new password if `token` is the live reset token
    ///
    /// The token is consumed: both reset fields are cleared in the same write.
    pub async fn reset_password(
        &self,
        email: &str,
        new_password: &str,
        token: &str,
    ) -> Result<(), LifecycleError> {
        let email = normalize_email(email);
        let digest = digest_token(token);

        let applicant = self
            .find_by_email(&email)
            .await?
            .ok_or(LifecycleError::InvalidOrExpiredToken)?;

        let live = applicant.has_live_reset_token(Utc::now())
            && applicant
                .reset_password_token
                .as_deref()
                .is_some_and(|stored| constant_time_eq(stored, &digest));
        if !live {
            return Err(LifecycleError::InvalidOrExpiredToken);
        }

        self.rules.validate_password(new_password)?;
        let password_hash = self.hash_password(new_password.to_string()).await?;

        let guard = ApplicantFilter::email(&email)
            .and(ApplicantFilter::eq(Field::ResetPasswordToken, digest));
        let patch = ApplicantPatch {
            password_hash: Some(password_hash),
            reset_password: Some(None),
            ..Default::default()
        };

        self.store
            .update_one(&guard, &patch)
            .await
            .map_err(|e| storage_failure("reset_password", e))?
            .ok_or(LifecycleError::InvalidOrExpiredToken)?;

        info!(shell_id = %applicant.shell_id, "Password reset");
        Ok(())
    }

    /// Queues a reminder for every applicant in the target status
    ///
    /// Returns how many reminders were queued.
    pub async fn remind(&self, target: ReminderTarget) -> Result<usize, LifecycleError> {
        let applicants = self
            .store
            .find(&ApplicantFilter::status(target.status()), None)
            .await
            .map_err(|e| storage_failure("remind", e))?;

        let mut queued = 0;
        for applicant in &applicants {
            let effect = SideEffect::notify(target.template(), Recipient::from_applicant(applicant));
            if self.enqueue(effect).await {
                queued += 1;
            }
        }

        info!(
            template = %target.template(),
            matched = applicants.len(),
            queued,
            "Reminders queued"
        );
        Ok(queued)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Applicant>, LifecycleError> {
        self.store
            .find_one(&ApplicantFilter::email(email))
            .await
            .map_err(|e| storage_failure("find_by_email", e))
    }

    /// Queues an effect; failures are logged and reported as `false`
    async fn enqueue(&self, effect: SideEffect) -> bool {
        let kind = effect.kind();
        match self.effects.enqueue(effect).await {
            Ok(()) => true,
            Err(e) => {
                warn!(kind, error = %e, "Failed to queue side effect");
                false
            }
        }
    }

    async fn hash_password(&self, password: String) -> Result<String, LifecycleError> {
        let credentials = Arc::clone(&self.credentials);
        tokio::task::spawn_blocking(move || credentials.hash_password(&password))
            .await
            .map_err(|e| {
                error!(error = %e, "Password hashing task failed");
                LifecycleError::fatal("credential failure")
            })?
            .map_err(|e| credential_failure("hash_password", e))
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, LifecycleError> {
        let credentials = Arc::clone(&self.credentials);
        tokio::task::spawn_blocking(move || credentials.verify_password(&password, &hash))
            .await
            .map_err(|e| {
                error!(error = %e, "Password verification task failed");
                LifecycleError::fatal("credential failure")
            })?
            .map_err(|e| credential_failure("verify_password", e))
    }
}
