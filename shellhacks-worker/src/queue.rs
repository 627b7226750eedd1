/// Outbox queue
///
/// Reads and updates `outbox_jobs` on behalf of the dispatcher.
///
/// # Claiming
///
/// `claim_jobs` picks due `pending` rows with `FOR UPDATE SKIP LOCKED`, so
/// several dispatchers (or the embedded one in the API) can share the table
/// without delivering a job twice. A claimed job is `running` and its
/// `attempts` counter already includes the attempt being made.
///
/// # Retention
///
/// A job that reaches `delivered` or `failed` loses its one-time token
/// (`payload.recipient.token`) in the same update, and `purge_finished`
/// deletes finished rows once they are old enough.
///
/// # Example
///
/// ```no_run
/// use shellhacks_worker::queue::OutboxQueue;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let queue = OutboxQueue::new(pool);
///
/// for job in queue.claim_jobs(Some(5)).await? {
///     println!("claimed {} ({})", job.id, job.kind);
///     queue.mark_delivered(job.id).await?;
/// }
/// # Ok(())
/// # }
/// ```
use chrono::{DateTime, Utc};
use shellhacks_shared::outbox::{JobStatus, OutboxJob};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Job is missing or no longer `running`
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),
}

/// JSON path of the plaintext token inside a notify payload
const TOKEN_PATH: [&str; 2] = ["recipient", "token"];

const JOB_COLUMNS: &str = "outbox_jobs.id, outbox_jobs.kind, outbox_jobs.payload, \
     outbox_jobs.status, outbox_jobs.attempts, outbox_jobs.next_attempt_at, \
     outbox_jobs.last_error, outbox_jobs.created_at, outbox_jobs.updated_at";

#[derive(Debug, Clone)]
pub struct OutboxQueue {
    db: PgPool,
    batch_size: usize,
}

impl OutboxQueue {
    pub fn new(db: PgPool) -> Self {
        OutboxQueue { db, batch_size: 10 }
    }

    pub fn with_batch_size(db: PgPool, batch_size: usize) -> Self {
        OutboxQueue { db, batch_size }
    }

    /// Claims due jobs, oldest first
    ///
    /// `limit` defaults to the batch size.
    pub async fn claim_jobs(&self, limit: Option<usize>) -> Result<Vec<OutboxJob>, QueueError> {
        let limit = limit.unwrap_or(self.batch_size) as i64;

        let jobs = sqlx::query_as::<_, OutboxJob>(&format!(
            r#"
            WITH due AS (
                SELECT id
                FROM outbox_jobs
                WHERE status = $1 AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at ASC, created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE outbox_jobs
            SET
                status = $3,
                attempts = outbox_jobs.attempts + 1,
                updated_at = NOW()
            FROM due
            WHERE outbox_jobs.id = due.id
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(JobStatus::Pending.as_str())
        .bind(limit)
        .bind(JobStatus::Running.as_str())
        .fetch_all(&self.db)
        .await?;

        if !jobs.is_empty() {
            tracing::debug!(count = jobs.len(), "Claimed outbox jobs");
        }

        Ok(jobs)
    }

    pub async fn pending_count(&self) -> Result<i64, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox_jobs WHERE status = $1")
            .bind(JobStatus::Pending.as_str())
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    pub async fn mark_delivered(&self, job_id: Uuid) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_jobs
            SET status = $2, last_error = NULL, payload = payload #- $4, updated_at = NOW()
            WHERE id = $1 AND status = $3
            "#,
        )
        .bind(job_id)
        .bind(JobStatus::Delivered.as_str())
        .bind(JobStatus::Running.as_str())
        .bind(&TOKEN_PATH[..])
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job_id));
        }
        Ok(())
    }

    /// Puts a job back to `pending` until `next_attempt_at`
    pub async fn schedule_retry(
        &self,
        job_id: Uuid,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_jobs
            SET status = $2, next_attempt_at = $3, last_error = $4, updated_at = NOW()
            WHERE id = $1 AND status = $5
            "#,
        )
        .bind(job_id)
        .bind(JobStatus::Pending.as_str())
        .bind(next_attempt_at)
        .bind(error)
        .bind(JobStatus::Running.as_str())
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job_id));
        }
        Ok(())
    }

    pub async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_jobs
            SET status = $2, last_error = $3, payload = payload #- $5, updated_at = NOW()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(job_id)
        .bind(JobStatus::Failed.as_str())
        .bind(error)
        .bind(JobStatus::Running.as_str())
        .bind(&TOKEN_PATH[..])
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job_id));
        }

        tracing::warn!(job_id = %job_id, error = %error, "Outbox job failed permanently");
        Ok(())
    }

    /// Returns jobs stuck in `running` for longer than `stale_after_secs`
    /// to `pending`
    ///
    /// Covers dispatchers that died mid-delivery. Returns how many jobs were
    /// released.
    pub async fn release_stale(&self, stale_after_secs: u64) -> Result<u64, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_jobs
            SET status = $1, next_attempt_at = NOW(), updated_at = NOW()
            WHERE status = $2 AND updated_at < NOW() - ($3::float8 * INTERVAL '1 second')
            "#,
        )
        .bind(JobStatus::Pending.as_str())
        .bind(JobStatus::Running.as_str())
        .bind(stale_after_secs as f64)
        .execute(&self.db)
        .await?;

        let released = result.rows_affected();
        if released > 0 {
            tracing::warn!(released, "Released stale outbox jobs");
        }
        Ok(released)
    }

    /// Deletes `delivered` and `failed` jobs last touched more than
    /// `retain_secs` ago, returning how many were removed
    pub async fn purge_finished(&self, retain_secs: u64) -> Result<u64, QueueError> {
        let result = sqlx::query(
            r#"
            DELETE FROM outbox_jobs
            WHERE status IN ($1, $2) AND updated_at < NOW() - ($3::float8 * INTERVAL '1 second')
            "#,
        )
        .bind(JobStatus::Delivered.as_str())
        .bind(JobStatus::Failed.as_str())
        .bind(retain_secs as f64)
        .execute(&self.db)
        .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            tracing::info!(purged, "Purged finished outbox jobs");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_columns_cover_model() {
        for column in [
            "id",
            "kind",
            "payload",
            "status",
            "attempts",
            "next_attempt_at",
            "last_error",
            "created_at",
            "updated_at",
        ] {
            assert!(
                JOB_COLUMNS.contains(&format!("outbox_jobs.{}", column)),
                "missing {}",
                column
            );
        }
    }

    // Claiming against a live database is covered in tests/queue_tests.rs
}
