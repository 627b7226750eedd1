/// Applicant record store
///
/// The lifecycle manager reads and writes applicants only through the
/// [`ApplicantStore`] trait. Every write is a single-row conditional update:
/// the filter doubles as the compare-and-swap guard, so a transition whose
/// precondition no longer holds simply matches nothing.
///
/// # Implementations
///
/// - [`postgres::PgApplicantStore`]: production store, filters compiled to SQL
/// - [`memory::MemoryApplicantStore`]: in-process store for tests and local runs
///
/// # Ordering
///
/// Listings are always ordered by `time_created ASC, shell_id ASC`.
///
/// # Example
///
/// ```no_run
/// use shellhacks_shared::models::applicant::{ApplicantPatch, ApplicationStatus};
/// use shellhacks_shared::store::{ApplicantFilter, ApplicantStore};
///
/// # async fn example(store: &dyn ApplicantStore) -> Result<(), Box<dyn std::error::Error>> {
/// // applied -> accepted, only if still applied
/// let guard = ApplicantFilter::shell_id("AB3DE")
///     .and(ApplicantFilter::status(ApplicationStatus::Applied));
/// let updated = store
///     .update_one(&guard, &ApplicantPatch::status(ApplicationStatus::Accepted))
///     .await?;
/// assert!(updated.is_some());
/// # Ok(())
/// # }
/// ```
use async_trait::async_trait;
use std::fmt;

use crate::models::applicant::{Applicant, ApplicantPatch, ApplicationStatus, NewApplicant};

pub mod memory;
pub mod postgres;

/// Column a filter can test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Email,
    ShellId,
    FirstName,
    LastName,
    SchoolName,
    ApplicationStatus,
    EmailConfirmationToken,
    ResetPasswordToken,
    EmailConfirmed,
    CheckIn,
}

/// Value compared by [`ApplicantFilter::Eq`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Bool(bool),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl From<ApplicationStatus> for FilterValue {
    fn from(value: ApplicationStatus) -> Self {
        FilterValue::Text(value.as_str().to_string())
    }
}

/// Value a field holds on a concrete record
enum FieldRef<'a> {
    Text(Option<&'a str>),
    Bool(bool),
}

impl Field {
    fn read(self, applicant: &Applicant) -> FieldRef<'_> {
        match self {
            Field::Email => FieldRef::Text(Some(&applicant.email)),
            Field::ShellId => FieldRef::Text(Some(&applicant.shell_id)),
            Field::FirstName => FieldRef::Text(Some(&applicant.first_name)),
            Field::LastName => FieldRef::Text(Some(&applicant.last_name)),
            Field::SchoolName => FieldRef::Text(applicant.profile.school_name.as_deref()),
            Field::ApplicationStatus => {
                FieldRef::Text(Some(applicant.application_status.as_str()))
            }
            Field::EmailConfirmationToken => {
                FieldRef::Text(Some(&applicant.email_confirmation_token))
            }
            Field::ResetPasswordToken => {
                FieldRef::Text(applicant.reset_password_token.as_deref())
            }
            Field::EmailConfirmed => FieldRef::Bool(applicant.email_confirmed),
            Field::CheckIn => FieldRef::Bool(applicant.check_in),
        }
    }
}

/// Predicate over applicant records
///
/// `And(vec![])` matches everything and `Or(vec![])` matches nothing.
/// Equality against a null column never matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicantFilter {
    True,
    Eq(Field, FilterValue),
    ContainsIgnoreCase(Field, String),
    And(Vec<ApplicantFilter>),
    Or(Vec<ApplicantFilter>),
}

impl ApplicantFilter {
    pub fn eq(field: Field, value: impl Into<FilterValue>) -> Self {
        ApplicantFilter::Eq(field, value.into())
    }

    pub fn email(email: &str) -> Self {
        Self::eq(Field::Email, email)
    }

    pub fn shell_id(shell_id: &str) -> Self {
        Self::eq(Field::ShellId, shell_id)
    }

    pub fn status(status: ApplicationStatus) -> Self {
        Self::eq(Field::ApplicationStatus, status)
    }

    /// Conjunction that flattens nested `And`s and drops `True`
    pub fn and(self, other: ApplicantFilter) -> Self {
        let mut parts = Vec::new();
        for f in [self, other] {
            match f {
                ApplicantFilter::True => {}
                ApplicantFilter::And(inner) => parts.extend(inner),
                f => parts.push(f),
            }
        }
        match parts.len() {
            0 => ApplicantFilter::True,
            1 => parts.remove(0),
            _ => ApplicantFilter::And(parts),
        }
    }

    /// Evaluates the filter against a record in memory
    pub fn matches(&self, applicant: &Applicant) -> bool {
        match self {
            ApplicantFilter::True => true,
            ApplicantFilter::Eq(field, value) => match (field.read(applicant), value) {
                (FieldRef::Text(Some(actual)), FilterValue::Text(expected)) => actual == expected,
                (FieldRef::Bool(actual), FilterValue::Bool(expected)) => actual == *expected,
                _ => false,
            },
            ApplicantFilter::ContainsIgnoreCase(field, needle) => match field.read(applicant) {
                FieldRef::Text(Some(actual)) => {
                    actual.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            },
            ApplicantFilter::And(parts) => parts.iter().all(|f| f.matches(applicant)),
            ApplicantFilter::Or(parts) => parts.iter().any(|f| f.matches(applicant)),
        }
    }
}

/// Slice of an ordered listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

/// Column guarded by a unique constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    ShellId,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueField::Email => f.write_str("email"),
            UniqueField::ShellId => f.write_str("shell_id"),
        }
    }
}

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Insert collided with an existing record
    #[error("Unique constraint violated on {0}")]
    Conflict(UniqueField),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored row could not be mapped back to an [`Applicant`]
    #[error("Corrupt applicant row: {0}")]
    Corrupt(String),
}

/// Persistence for applicants
#[async_trait]
pub trait ApplicantStore: Send + Sync {
    /// Matching records in listing order, optionally windowed
    async fn find(
        &self,
        filter: &ApplicantFilter,
        window: Option<Window>,
    ) -> Result<Vec<Applicant>, StoreError>;

    /// First matching record in listing order
    async fn find_one(&self, filter: &ApplicantFilter) -> Result<Option<Applicant>, StoreError> {
        let mut found = self
            .find(filter, Some(Window { offset: 0, limit: 1 }))
            .await?;
        Ok(found.pop())
    }

    /// Number of matching records
    async fn count(&self, filter: &ApplicantFilter) -> Result<u64, StoreError>;

    /// Inserts a record
    ///
    /// Fails with [`StoreError::Conflict`] if email or shell id is taken.
    async fn create(&self, applicant: NewApplicant) -> Result<Applicant, StoreError>;

    /// Atomically applies `patch` to the first record matching `filter`
    ///
    /// Returns the updated record, or `None` if nothing matched.
    async fn update_one(
        &self,
        filter: &ApplicantFilter,
        patch: &ApplicantPatch,
    ) -> Result<Option<Applicant>, StoreError>;

    /// Liveness probe for health checks
    async fn ping(&self) -> Result<(), StoreError>;
}
