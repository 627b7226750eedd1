use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::{EffectQueue, NotificationTemplate, OutboxError, SideEffect};

/// Outbox that keeps effects in memory
///
/// Used by tests to assert on what the lifecycle manager queued, and by local
/// runs that have no worker.
#[derive(Debug, Default)]
pub struct MemoryEffectQueue {
    effects: Mutex<Vec<SideEffect>>,
    failing: AtomicBool,
}

impl MemoryEffectQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every enqueue while set
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of everything queued so far
    pub async fn effects(&self) -> Vec<SideEffect> {
        self.effects.lock().await.clone()
    }

    /// Drains the queue
    pub async fn take(&self) -> Vec<SideEffect> {
        std::mem::take(&mut *self.effects.lock().await)
    }

    /// Notifications queued for `template`, as (email, token) pairs
    pub async fn notifications(&self, template: NotificationTemplate) -> Vec<(String, Option<String>)> {
        self.effects
            .lock()
            .await
            .iter()
            .filter_map(|e| match e {
                SideEffect::Notify {
                    template: t,
                    recipient,
                } if *t == template => Some((recipient.email.clone(), recipient.token.clone())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EffectQueue for MemoryEffectQueue {
    async fn enqueue(&self, effect: SideEffect) -> Result<(), OutboxError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(OutboxError::Unavailable("memory queue set to fail".to_string()));
        }
        self.effects.lock().await.push(effect);
        Ok(())
    }
}
