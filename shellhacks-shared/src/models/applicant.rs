/// Applicant model
///
/// This module provides the Applicant record, its lifecycle status and the
/// optional profile submitted with the application form.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE applicants (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     shell_id VARCHAR(16) NOT NULL UNIQUE,
///     email VARCHAR(320) NOT NULL UNIQUE,
///     first_name VARCHAR(255) NOT NULL,
///     last_name VARCHAR(255) NOT NULL,
///     password_hash VARCHAR(255) NOT NULL,
///     email_confirmation_token VARCHAR(128) NOT NULL,
///     email_confirmed BOOLEAN NOT NULL DEFAULT FALSE,
///     reset_password_token VARCHAR(128),
///     reset_password_expiration TIMESTAMPTZ,
///     application_status VARCHAR(32) NOT NULL DEFAULT 'not applied',
///     profile JSONB NOT NULL DEFAULT '{}',
///     check_in BOOLEAN NOT NULL DEFAULT FALSE,
///     avatar_id VARCHAR(32) NOT NULL,
///     time_created TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     time_applied TIMESTAMPTZ,
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # State Machine
///
/// ```text
/// not applied → applied → accepted → confirmed
///                            ↑           │
///                            └───────────┘ (administrative rollback)
/// ```
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Position of an applicant in the application pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    /// Registered but the application form has not been submitted
    #[serde(rename = "not applied")]
    NotApplied,

    /// Application form submitted, awaiting review
    #[serde(rename = "applied")]
    Applied,

    /// Accepted by the organizers, attendance not yet confirmed
    #[serde(rename = "accepted")]
    Accepted,

    /// Applicant confirmed they will attend
    #[serde(rename = "confirmed")]
    Confirmed,
}

impl ApplicationStatus {
    /// Converts status to its stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::NotApplied => "not applied",
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown application status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for ApplicationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "not applied" | "not_applied" | "not-applied" => Ok(ApplicationStatus::NotApplied),
            "applied" => Ok(ApplicationStatus::Applied),
            "accepted" => Ok(ApplicationStatus::Accepted),
            "confirmed" => Ok(ApplicationStatus::Confirmed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Application form answers
///
/// Every field stays `None` until the applicant submits the form. Keys are
/// serialized in camelCase, which is also the shape stored in the `profile`
/// JSONB column and mirrored to the spreadsheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicantProfile {
    pub school_name: Option<String>,
    pub level_of_study: Option<String>,
    pub graduation_year: Option<i32>,
    pub major: Option<String>,
    pub gender: Option<String>,
    pub dob: Option<String>,
    pub race: Option<String>,
    pub phone_number: Option<String>,
    pub shirt_size: Option<String>,
    pub dietary_restriction: Option<String>,
    pub first_time_hack: Option<bool>,
    pub how_did_you_hear: Option<String>,
    pub favorite_events: Option<String>,
    pub area_of_focus: Option<String>,
    /// Resume URL, or "N/A" when the upload was skipped or failed
    pub resume: Option<String>,
    pub linked_in: Option<String>,
    pub portfolio: Option<String>,
    pub github: Option<String>,
    pub reason_for_attending: Option<String>,
    pub have_been_to_shell: Option<bool>,
    pub like_a_mentor: Option<bool>,
    pub need_reimbursement: Option<bool>,
    pub location: Option<String>,
}

impl ApplicantProfile {
    /// Overlays `update` on top of `self`
    ///
    /// Fields present in `update` win; absent fields keep their stored value.
    pub fn merged_with(&self, update: &ApplicantProfile) -> ApplicantProfile {
        fn pick<T: Clone>(base: &Option<T>, over: &Option<T>) -> Option<T> {
            over.clone().or_else(|| base.clone())
        }

        ApplicantProfile {
            school_name: pick(&self.school_name, &update.school_name),
            level_of_study: pick(&self.level_of_study, &update.level_of_study),
            graduation_year: pick(&self.graduation_year, &update.graduation_year),
            major: pick(&self.major, &update.major),
            gender: pick(&self.gender, &update.gender),
            dob: pick(&self.dob, &update.dob),
            race: pick(&self.race, &update.race),
            phone_number: pick(&self.phone_number, &update.phone_number),
            shirt_size: pick(&self.shirt_size, &update.shirt_size),
            dietary_restriction: pick(&self.dietary_restriction, &update.dietary_restriction),
            first_time_hack: pick(&self.first_time_hack, &update.first_time_hack),
            how_did_you_hear: pick(&self.how_did_you_hear, &update.how_did_you_hear),
            favorite_events: pick(&self.favorite_events, &update.favorite_events),
            area_of_focus: pick(&self.area_of_focus, &update.area_of_focus),
            resume: pick(&self.resume, &update.resume),
            linked_in: pick(&self.linked_in, &update.linked_in),
            portfolio: pick(&self.portfolio, &update.portfolio),
            github: pick(&self.github, &update.github),
            reason_for_attending: pick(&self.reason_for_attending, &update.reason_for_attending),
            have_been_to_shell: pick(&self.have_been_to_shell, &update.have_been_to_shell),
            like_a_mentor: pick(&self.like_a_mentor, &update.like_a_mentor),
            need_reimbursement: pick(&self.need_reimbursement, &update.need_reimbursement),
            location: pick(&self.location, &update.location),
        }
    }

    /// Returns the profile as a flat camelCase map
    pub fn to_fields(&self) -> Map<String, JsonValue> {
        match serde_json::to_value(self) {
            Ok(JsonValue::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Checks whether the camelCase field `key` holds a non-blank value
    pub fn has_field(&self, key: &str) -> bool {
        match self.to_fields().get(key) {
            None | Some(JsonValue::Null) => false,
            Some(JsonValue::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }
}

/// Applicant record
///
/// Secrets (`password_hash` and token digests) are never serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    /// Store-assigned identifier
    pub id: Uuid,

    /// Short human-typeable identifier, unique across applicants
    #[serde(rename = "shellID")]
    pub shell_id: String,

    /// Lower-cased email, unique across applicants
    pub email: String,

    pub first_name: String,
    pub last_name: String,

    /// Argon2id PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// SHA-256 digest of the outstanding email confirmation token
    #[serde(skip_serializing)]
    pub email_confirmation_token: String,

    /// Set once the applicant proves ownership of the email address
    pub email_confirmed: bool,

    /// SHA-256 digest of the outstanding reset token, paired with the expiration
    #[serde(skip_serializing)]
    pub reset_password_token: Option<String>,

    #[serde(skip_serializing)]
    pub reset_password_expiration: Option<DateTime<Utc>>,

    pub application_status: ApplicationStatus,

    #[serde(flatten)]
    pub profile: ApplicantProfile,

    pub check_in: bool,

    #[serde(rename = "avatarID")]
    pub avatar_id: String,

    pub time_created: DateTime<Utc>,
    pub time_applied: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Applicant {
    /// Checks if a reset token is outstanding and unexpired at `now`
    pub fn has_live_reset_token(&self, now: DateTime<Utc>) -> bool {
        matches!(
            (&self.reset_password_token, self.reset_password_expiration),
            (Some(_), Some(expires)) if now < expires
        )
    }

    /// Row mirrored to the spreadsheet: identity columns followed by the profile
    pub fn sheet_row(&self) -> Map<String, JsonValue> {
        let mut row = Map::new();
        row.insert("shellID".to_string(), JsonValue::from(self.shell_id.clone()));
        row.insert("firstName".to_string(), JsonValue::from(self.first_name.clone()));
        row.insert("lastName".to_string(), JsonValue::from(self.last_name.clone()));
        row.insert("email".to_string(), JsonValue::from(self.email.clone()));
        row.insert(
            "applicationStatus".to_string(),
            JsonValue::from(self.application_status.as_str()),
        );
        row.extend(self.profile.to_fields());
        if let Some(applied) = self.time_applied {
            row.insert("timeApplied".to_string(), JsonValue::from(applied.to_rfc3339()));
        }
        row
    }
}

/// Input for creating a new applicant
///
/// The store assigns `id`, `updated_at`; everything else is decided by the
/// lifecycle manager.
#[derive(Debug, Clone)]
pub struct NewApplicant {
    pub shell_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub email_confirmation_token: String,
    pub avatar_id: String,
    pub profile: ApplicantProfile,
    pub time_created: DateTime<Utc>,
}

/// Outstanding password reset token, always written with its expiration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetToken {
    /// SHA-256 digest of the token
    pub digest: String,

    /// Instant after which the token no longer works
    pub expires_at: DateTime<Utc>,
}

/// Column assignments for a conditional update
///
/// Only `Some` fields are written.
#[derive(Debug, Clone, Default)]
pub struct ApplicantPatch {
    pub password_hash: Option<String>,
    pub email_confirmation_token: Option<String>,
    pub email_confirmed: Option<bool>,

    /// `Some(Some(_))` issues a token, `Some(None)` clears token and expiration
    pub reset_password: Option<Option<ResetToken>>,

    pub application_status: Option<ApplicationStatus>,
    pub profile: Option<ApplicantProfile>,
    pub check_in: Option<bool>,

    /// Written only if the record has no submission time yet
    pub time_applied: Option<DateTime<Utc>>,
}

impl ApplicantPatch {
    /// Patch that only moves the status
    pub fn status(status: ApplicationStatus) -> Self {
        Self {
            application_status: Some(status),
            ..Default::default()
        }
    }

    /// Applies the patch to an in-memory record
    pub fn apply_to(&self, applicant: &mut Applicant) {
        if let Some(hash) = &self.password_hash {
            applicant.password_hash = hash.clone();
        }
        if let Some(token) = &self.email_confirmation_token {
            applicant.email_confirmation_token = token.clone();
        }
        if let Some(confirmed) = self.email_confirmed {
            applicant.email_confirmed = confirmed;
        }
        if let Some(reset) = &self.reset_password {
            applicant.reset_password_token = reset.as_ref().map(|r| r.digest.clone());
            applicant.reset_password_expiration = reset.as_ref().map(|r| r.expires_at);
        }
        if let Some(status) = self.application_status {
            applicant.application_status = status;
        }
        if let Some(profile) = &self.profile {
            applicant.profile = profile.clone();
        }
        if let Some(check_in) = self.check_in {
            applicant.check_in = check_in;
        }
        if let Some(applied) = self.time_applied {
            applicant.time_applied.get_or_insert(applied);
        }
        applicant.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            ApplicationStatus::NotApplied,
            ApplicationStatus::Applied,
            ApplicationStatus::Accepted,
            ApplicationStatus::Confirmed,
        ] {
            assert_eq!(status.as_str().parse::<ApplicationStatus>().unwrap(), status);
        }
        assert_eq!(
            "NOT_APPLIED".parse::<ApplicationStatus>().unwrap(),
            ApplicationStatus::NotApplied
        );
        assert!("rejected".parse::<ApplicationStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_like_stored_value() {
        let json = serde_json::to_string(&ApplicationStatus::NotApplied).unwrap();
        assert_eq!(json, "\"not applied\"");
    }

    #[test]
    fn test_profile_merge_prefers_update() {
        let stored = ApplicantProfile {
            school_name: Some("FIU".to_string()),
            major: Some("CS".to_string()),
            ..Default::default()
        };
        let update = ApplicantProfile {
            major: Some("Math".to_string()),
            shirt_size: Some("M".to_string()),
            ..Default::default()
        };

        let merged = stored.merged_with(&update);
        assert_eq!(merged.school_name.as_deref(), Some("FIU"));
        assert_eq!(merged.major.as_deref(), Some("Math"));
        assert_eq!(merged.shirt_size.as_deref(), Some("M"));
        assert!(merged.gender.is_none());
    }

    #[test]
    fn test_profile_has_field() {
        let profile = ApplicantProfile {
            school_name: Some("  ".to_string()),
            graduation_year: Some(2026),
            ..Default::default()
        };

        assert!(!profile.has_field("schoolName"));
        assert!(profile.has_field("graduationYear"));
        assert!(!profile.has_field("major"));
    }

    #[test]
    fn test_patch_clears_reset_pair_together() {
        let now = Utc::now();
        let mut applicant = Applicant {
            id: Uuid::new_v4(),
            shell_id: "AB3DE".to_string(),
            email: "ada@x.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password_hash: "hash".to_string(),
            email_confirmation_token: "digest".to_string(),
            email_confirmed: false,
            reset_password_token: Some("reset".to_string()),
            reset_password_expiration: Some(now),
            application_status: ApplicationStatus::NotApplied,
            profile: ApplicantProfile::default(),
            check_in: false,
            avatar_id: "Id1".to_string(),
            time_created: now,
            time_applied: None,
            updated_at: now,
        };

        let patch = ApplicantPatch {
            reset_password: Some(None),
            ..Default::default()
        };
        assert!(applicant.has_live_reset_token(now - Duration::seconds(1)));
        assert!(!applicant.has_live_reset_token(now));

        patch.apply_to(&mut applicant);

        assert!(applicant.reset_password_token.is_none());
        assert!(applicant.reset_password_expiration.is_none());
        assert!(!applicant.has_live_reset_token(now - Duration::seconds(1)));
    }

    #[test]
    fn test_applicant_json_hides_secrets() {
        let now = Utc::now();
        let applicant = Applicant {
            id: Uuid::new_v4(),
            shell_id: "AB3DE".to_string(),
            email: "ada@x.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            email_confirmation_token: "digest".to_string(),
            email_confirmed: true,
            reset_password_token: None,
            reset_password_expiration: None,
            application_status: ApplicationStatus::Applied,
            profile: ApplicantProfile {
                school_name: Some("FIU".to_string()),
                ..Default::default()
            },
            check_in: false,
            avatar_id: "Id3".to_string(),
            time_created: now,
            time_applied: Some(now),
            updated_at: now,
        };

        let json = serde_json::to_value(&applicant).unwrap();
        assert_eq!(json["shellID"], "AB3DE");
        assert_eq!(json["schoolName"], "FIU");
        assert_eq!(json["applicationStatus"], "applied");
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("emailConfirmationToken").is_none());
    }
}
