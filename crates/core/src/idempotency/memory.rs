//! In-memory `IdempotencyStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::idempotency::{
    IdempotencyError, IdempotencyOutcome, IdempotencyRecord, IdempotencyStore, RecordState,
    ReserveAttempt,
};

/// Key records in a `DashMap`; the entry API makes reservation atomic.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    records: DashMap<String, IdempotencyRecord>,
}

impl InMemoryIdempotencyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, live or expired.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn reserve(
        &self,
        key: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<ReserveAttempt, IdempotencyError> {
        let fresh = IdempotencyRecord {
            key: key.to_string(),
            state: RecordState::InFlight,
            created_at: now,
            expires_at,
        };
        match self.records.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                Ok(ReserveAttempt::Reserved)
            }
            Entry::Occupied(mut slot) => {
                if slot.get().expires_at <= now {
                    slot.insert(fresh);
                    Ok(ReserveAttempt::Reserved)
                } else {
                    Ok(ReserveAttempt::Existing(slot.get().clone()))
                }
            }
        }
    }

    async fn complete(
        &self,
        key: &str,
        outcome: IdempotencyOutcome,
    ) -> Result<(), IdempotencyError> {
        match self.records.get_mut(key) {
            Some(mut record) => {
                record.state = RecordState::Completed(outcome);
                Ok(())
            }
            None => Err(IdempotencyError::Store(format!(
                "no reservation for key {key}"
            ))),
        }
    }

    async fn release(&self, key: &str) -> Result<(), IdempotencyError> {
        self.records
            .remove_if(key, |_, record| record.state == RecordState::InFlight);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, IdempotencyError> {
        let before = self.records.len();
        self.records.retain(|_, record| record.expires_at > now);
        Ok(u64::try_from(before.saturating_sub(self.records.len())).unwrap_or(u64::MAX))
    }
}
