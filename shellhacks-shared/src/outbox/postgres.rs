use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::{EffectQueue, OutboxError, SideEffect};

/// Outbox backed by the `outbox_jobs` table
#[derive(Debug, Clone)]
pub struct PgEffectQueue {
    pool: PgPool,
}

impl PgEffectQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EffectQueue for PgEffectQueue {
    async fn enqueue(&self, effect: SideEffect) -> Result<(), OutboxError> {
        let payload = serde_json::to_value(&effect)?;

        let id: uuid::Uuid = sqlx::query_scalar(
            "INSERT INTO outbox_jobs (kind, payload) VALUES ($1, $2) RETURNING id",
        )
        .bind(effect.kind())
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        debug!(job_id = %id, kind = effect.kind(), "Queued side effect");
        Ok(())
    }
}
