/// Postgres-backed applicant store
///
/// Filters are compiled into `WHERE` clauses with `sqlx::QueryBuilder`; every
/// value is bound, never interpolated. Substring search uses `ILIKE` with
/// `%`, `_` and `\` escaped in the needle. The school name lives inside the
/// `profile` JSONB column and is read with `profile->>'schoolName'`.
///
/// Conditional updates lock the first matching row and re-check the filter
/// in the same statement:
///
/// ```sql
/// UPDATE applicants SET ..., updated_at = NOW()
/// WHERE id = (SELECT id FROM applicants WHERE <filter>
///             ORDER BY time_created, shell_id LIMIT 1 FOR UPDATE)
///   AND <filter>
/// RETURNING ...
/// ```
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, Postgres};
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::{ApplicantFilter, ApplicantStore, Field, FilterValue, StoreError, UniqueField, Window};
use crate::db::pool::health_check;
use crate::models::applicant::{
    Applicant, ApplicantPatch, ApplicantProfile, ApplicationStatus, NewApplicant,
};

const COLUMNS: &str = "id, shell_id, email, first_name, last_name, password_hash, \
     email_confirmation_token, email_confirmed, reset_password_token, \
     reset_password_expiration, application_status, profile, check_in, avatar_id, \
     time_created, time_applied, updated_at";

const ORDER_BY: &str = " ORDER BY time_created ASC, shell_id ASC";

#[derive(Debug, FromRow)]
struct ApplicantRow {
    id: Uuid,
    shell_id: String,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    email_confirmation_token: String,
    email_confirmed: bool,
    reset_password_token: Option<String>,
    reset_password_expiration: Option<DateTime<Utc>>,
    application_status: String,
    profile: Json<ApplicantProfile>,
    check_in: bool,
    avatar_id: String,
    time_created: DateTime<Utc>,
    time_applied: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicantRow> for Applicant {
    type Error = StoreError;

    fn try_from(row: ApplicantRow) -> Result<Self, Self::Error> {
        let application_status: ApplicationStatus = row
            .application_status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("{} ({})", e, row.shell_id)))?;

        Ok(Applicant {
            id: row.id,
            shell_id: row.shell_id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            password_hash: row.password_hash,
            email_confirmation_token: row.email_confirmation_token,
            email_confirmed: row.email_confirmed,
            reset_password_token: row.reset_password_token,
            reset_password_expiration: row.reset_password_expiration,
            application_status,
            profile: row.profile.0,
            check_in: row.check_in,
            avatar_id: row.avatar_id,
            time_created: row.time_created,
            time_applied: row.time_applied,
            updated_at: row.updated_at,
        })
    }
}

fn column(field: Field) -> &'static str {
    match field {
        Field::Email => "email",
        Field::ShellId => "shell_id",
        Field::FirstName => "first_name",
        Field::LastName => "last_name",
        Field::SchoolName => "(profile->>'schoolName')",
        Field::ApplicationStatus => "application_status",
        Field::EmailConfirmationToken => "email_confirmation_token",
        Field::ResetPasswordToken => "reset_password_token",
        Field::EmailConfirmed => "email_confirmed",
        Field::CheckIn => "check_in",
    }
}

/// Escapes `LIKE` metacharacters so the needle matches literally
pub(crate) fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ApplicantFilter) {
    match filter {
        ApplicantFilter::True => {
            qb.push("TRUE");
        }
        ApplicantFilter::Eq(field, FilterValue::Text(value)) => {
            qb.push(column(*field)).push(" = ").push_bind(value.clone());
        }
        ApplicantFilter::Eq(field, FilterValue::Bool(value)) => {
            qb.push(column(*field)).push(" = ").push_bind(*value);
        }
        ApplicantFilter::ContainsIgnoreCase(field, needle) => {
            qb.push(column(*field))
                .push(" ILIKE ")
                .push_bind(format!("%{}%", escape_like(needle)))
                .push(" ESCAPE '\\'");
        }
        ApplicantFilter::And(parts) | ApplicantFilter::Or(parts) if parts.is_empty() => {
            qb.push(if matches!(filter, ApplicantFilter::And(_)) {
                "TRUE"
            } else {
                "FALSE"
            });
        }
        ApplicantFilter::And(parts) | ApplicantFilter::Or(parts) => {
            let joiner = if matches!(filter, ApplicantFilter::And(_)) {
                " AND "
            } else {
                " OR "
            };
            qb.push("(");
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    qb.push(joiner);
                }
                push_filter(qb, part);
            }
            qb.push(")");
        }
    }
}

fn push_assignments(qb: &mut QueryBuilder<'_, Postgres>, patch: &ApplicantPatch) {
    qb.push("updated_at = NOW()");

    if let Some(hash) = &patch.password_hash {
        qb.push(", password_hash = ").push_bind(hash.clone());
    }
    if let Some(token) = &patch.email_confirmation_token {
        qb.push(", email_confirmation_token = ").push_bind(token.clone());
    }
    if let Some(confirmed) = patch.email_confirmed {
        qb.push(", email_confirmed = ").push_bind(confirmed);
    }
    match &patch.reset_password {
        Some(Some(reset)) => {
            qb.push(", reset_password_token = ")
                .push_bind(reset.digest.clone())
                .push(", reset_password_expiration = ")
                .push_bind(reset.expires_at);
        }
        Some(None) => {
            qb.push(", reset_password_token = NULL, reset_password_expiration = NULL");
        }
        None => {}
    }
    if let Some(status) = patch.application_status {
        qb.push(", application_status = ").push_bind(status.as_str());
    }
    if let Some(profile) = &patch.profile {
        qb.push(", profile = ").push_bind(Json(profile.clone()));
    }
    if let Some(check_in) = patch.check_in {
        qb.push(", check_in = ").push_bind(check_in);
    }
    if let Some(applied) = patch.time_applied {
        qb.push(", time_applied = COALESCE(time_applied, ")
            .push_bind(applied)
            .push(")");
    }
}

fn map_insert_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() {
            match db.constraint() {
                Some("applicants_email_key") => return StoreError::Conflict(UniqueField::Email),
                Some("applicants_shell_id_key") => {
                    return StoreError::Conflict(UniqueField::ShellId)
                }
                _ => {}
            }
        }
    }
    StoreError::Database(error)
}

/// Applicant store over a Postgres pool
#[derive(Debug, Clone)]
pub struct PgApplicantStore {
    pool: PgPool,
}

impl PgApplicantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool, shared with the outbox
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ApplicantStore for PgApplicantStore {
    async fn find(
        &self,
        filter: &ApplicantFilter,
        window: Option<Window>,
    ) -> Result<Vec<Applicant>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(COLUMNS).push(" FROM applicants WHERE ");
        push_filter(&mut qb, filter);
        qb.push(ORDER_BY);
        if let Some(window) = window {
            qb.push(" LIMIT ")
                .push_bind(i64::try_from(window.limit).unwrap_or(i64::MAX))
                .push(" OFFSET ")
                .push_bind(i64::try_from(window.offset).unwrap_or(i64::MAX));
        }

        debug!(sql = qb.sql(), "Finding applicants");

        qb.build_query_as::<ApplicantRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Applicant::try_from)
            .collect()
    }

    async fn count(&self, filter: &ApplicantFilter) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM applicants WHERE ");
        push_filter(&mut qb, filter);

        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn create(&self, applicant: NewApplicant) -> Result<Applicant, StoreError> {
        let sql = format!(
            "INSERT INTO applicants (shell_id, email, first_name, last_name, password_hash, \
             email_confirmation_token, application_status, profile, avatar_id, time_created) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {}",
            COLUMNS
        );

        let row = sqlx::query_as::<_, ApplicantRow>(&sql)
            .bind(&applicant.shell_id)
            .bind(&applicant.email)
            .bind(&applicant.first_name)
            .bind(&applicant.last_name)
            .bind(&applicant.password_hash)
            .bind(&applicant.email_confirmation_token)
            .bind(ApplicationStatus::NotApplied.as_str())
            .bind(Json(&applicant.profile))
            .bind(&applicant.avatar_id)
            .bind(applicant.time_created)
            .fetch_one(&self.pool)
            .await
            .map_err(map_insert_error)?;

        Applicant::try_from(row)
    }

    async fn update_one(
        &self,
        filter: &ApplicantFilter,
        patch: &ApplicantPatch,
    ) -> Result<Option<Applicant>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE applicants SET ");
        push_assignments(&mut qb, patch);
        qb.push(" WHERE id = (SELECT id FROM applicants WHERE ");
        push_filter(&mut qb, filter);
        qb.push(ORDER_BY).push(" LIMIT 1 FOR UPDATE) AND ");
        push_filter(&mut qb, filter);
        qb.push(" RETURNING ").push(COLUMNS);

        let row = qb
            .build_query_as::<ApplicantRow>()
            .fetch_optional(&self.pool)
            .await?;

        row.map(Applicant::try_from).transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(health_check(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::applicant::ResetToken;

    fn where_clause(filter: &ApplicantFilter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_filter(&mut qb, filter);
        qb.sql().to_string()
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("lovel"), "lovel");
    }

    #[test]
    fn test_compile_eq_and_contains() {
        let filter = ApplicantFilter::email("ada@x.com").and(ApplicantFilter::ContainsIgnoreCase(
            Field::SchoolName,
            "fiu".into(),
        ));
        assert_eq!(
            where_clause(&filter),
            "(email = $1 AND (profile->>'schoolName') ILIKE $2 ESCAPE '\\')"
        );
    }

    #[test]
    fn test_compile_empty_combinators() {
        assert_eq!(where_clause(&ApplicantFilter::And(vec![])), "TRUE");
        assert_eq!(where_clause(&ApplicantFilter::Or(vec![])), "FALSE");
        assert_eq!(where_clause(&ApplicantFilter::True), "TRUE");
    }

    #[test]
    fn test_compile_or() {
        let filter = ApplicantFilter::Or(vec![
            ApplicantFilter::ContainsIgnoreCase(Field::FirstName, "a".into()),
            ApplicantFilter::ContainsIgnoreCase(Field::LastName, "a".into()),
        ]);
        assert_eq!(
            where_clause(&filter),
            "(first_name ILIKE $1 ESCAPE '\\' OR last_name ILIKE $2 ESCAPE '\\')"
        );
    }

    #[test]
    fn test_assignments_clear_reset_pair() {
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_assignments(
            &mut qb,
            &ApplicantPatch {
                password_hash: Some("h".into()),
                reset_password: Some(None),
                ..Default::default()
            },
        );
        assert_eq!(
            qb.sql(),
            "updated_at = NOW(), password_hash = $1, \
             reset_password_token = NULL, reset_password_expiration = NULL"
        );
    }

    #[test]
    fn test_assignments_issue_reset_pair() {
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_assignments(
            &mut qb,
            &ApplicantPatch {
                reset_password: Some(Some(ResetToken {
                    digest: "d".into(),
                    expires_at: Utc::now(),
                })),
                time_applied: Some(Utc::now()),
                ..Default::default()
            },
        );
        assert_eq!(
            qb.sql(),
            "updated_at = NOW(), reset_password_token = $1, reset_password_expiration = $2, \
             time_applied = COALESCE(time_applied, $3)"
        );
    }
}
