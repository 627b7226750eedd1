/// Outbox job model
///
/// One row of `outbox_jobs`. The worker owns every status change after
/// insertion.
///
/// # State Machine
///
/// ```text
/// pending → running → delivered
///    ↑         │
///    └─────────┤ (retry scheduled)
///              ↓
///            failed (attempts exhausted)
/// ```
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use super::SideEffect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Delivered,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Delivered => "delivered",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Delivered | JobStatus::Failed)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "delivered" => Ok(JobStatus::Delivered),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("Unknown job status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OutboxJob {
    pub id: Uuid,
    pub kind: String,
    pub payload: JsonValue,
    pub status: String,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutboxJob {
    /// Decodes the stored payload
    pub fn effect(&self) -> Result<SideEffect, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn status(&self) -> Option<JobStatus> {
        self.status.parse().ok()
    }
}
