/// In-memory applicant store
///
/// Same semantics as the Postgres store (uniqueness, ordering, conditional
/// updates) behind a tokio `RwLock`. Used by unit tests, the API test suite
/// and local runs without a database.
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ApplicantFilter, ApplicantStore, StoreError, UniqueField, Window};
use crate::models::applicant::{Applicant, ApplicantPatch, ApplicationStatus, NewApplicant};

#[derive(Debug, Default)]
pub struct MemoryApplicantStore {
    records: RwLock<Vec<Applicant>>,
    unavailable: AtomicBool,
}

impl MemoryApplicantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail as if the database were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

fn listing_order(records: &[Applicant], filter: &ApplicantFilter) -> Vec<usize> {
    let mut matching: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, a)| filter.matches(a))
        .map(|(i, _)| i)
        .collect();
    matching.sort_by(|&a, &b| {
        (records[a].time_created, &records[a].shell_id)
            .cmp(&(records[b].time_created, &records[b].shell_id))
    });
    matching
}

#[async_trait]
impl ApplicantStore for MemoryApplicantStore {
    async fn find(
        &self,
        filter: &ApplicantFilter,
        window: Option<Window>,
    ) -> Result<Vec<Applicant>, StoreError> {
        self.check_available()?;
        let records = self.records.read().await;
        let ordered = listing_order(&records, filter).into_iter();

        let selected: Vec<usize> = match window {
            Some(w) => ordered
                .skip(usize::try_from(w.offset).unwrap_or(usize::MAX))
                .take(usize::try_from(w.limit).unwrap_or(usize::MAX))
                .collect(),
            None => ordered.collect(),
        };

        Ok(selected.into_iter().map(|i| records[i].clone()).collect())
    }

    async fn count(&self, filter: &ApplicantFilter) -> Result<u64, StoreError> {
        self.check_available()?;
        let records = self.records.read().await;
        Ok(records.iter().filter(|a| filter.matches(a)).count() as u64)
    }

    async fn create(&self, applicant: NewApplicant) -> Result<Applicant, StoreError> {
        self.check_available()?;
        let mut records = self.records.write().await;

        if records.iter().any(|a| a.email == applicant.email) {
            return Err(StoreError::Conflict(UniqueField::Email));
        }
        if records.iter().any(|a| a.shell_id == applicant.shell_id) {
            return Err(StoreError::Conflict(UniqueField::ShellId));
        }

        let record = Applicant {
            id: Uuid::new_v4(),
            shell_id: applicant.shell_id,
            email: applicant.email,
            first_name: applicant.first_name,
            last_name: applicant.last_name,
            password_hash: applicant.password_hash,
            email_confirmation_token: applicant.email_confirmation_token,
            email_confirmed: false,
            reset_password_token: None,
            reset_password_expiration: None,
            application_status: ApplicationStatus::NotApplied,
            profile: applicant.profile,
            check_in: false,
            avatar_id: applicant.avatar_id,
            time_created: applicant.time_created,
            time_applied: None,
            updated_at: Utc::now(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn update_one(
        &self,
        filter: &ApplicantFilter,
        patch: &ApplicantPatch,
    ) -> Result<Option<Applicant>, StoreError> {
        self.check_available()?;
        let mut records = self.records.write().await;

        let Some(&index) = listing_order(&records, filter).first() else {
            return Ok(None);
        };

        let record = &mut records[index];
        patch.apply_to(record);
        Ok(Some(record.clone()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}
