//! Reservation protocol over an `IdempotencyStore`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::idempotency::{
    IdempotencyError, IdempotencyOutcome, IdempotencyStore, RecordState, ReserveAttempt,
};

/// Shortest accepted client key.
pub const MIN_KEY_LEN: usize = 16;
/// Longest accepted client key.
pub const MAX_KEY_LEN: usize = 255;

/// Outcome of `check_and_reserve`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// First sighting; the caller owns the key and must record or release it.
    New,
    /// Already completed; return this outcome without doing any work.
    Replay(IdempotencyOutcome),
}

/// Check-and-reserve front end for idempotency keys.
#[derive(Clone)]
pub struct IdempotencyTracker {
    store: Arc<dyn IdempotencyStore>,
    ttl: Duration,
}

impl std::fmt::Debug for IdempotencyTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyTracker")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl IdempotencyTracker {
    /// Creates a tracker whose reservations live for `ttl`.
    #[must_use]
    pub fn new(store: Arc<dyn IdempotencyStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Checks a client key: 16 to 255 characters of `[A-Za-z0-9_-]`.
    pub fn validate_key(key: &str) -> Result<(), IdempotencyError> {
        if !(MIN_KEY_LEN..=MAX_KEY_LEN).contains(&key.len()) {
            return Err(IdempotencyError::InvalidKey(format!(
                "length must be between {MIN_KEY_LEN} and {MAX_KEY_LEN}"
            )));
        }
        if !key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(IdempotencyError::InvalidKey(
                "only letters, digits, '-' and '_' are allowed".to_string(),
            ));
        }
        Ok(())
    }

    /// Atomically reserves `key` or reports its prior outcome.
    ///
    /// # Errors
    ///
    /// `InFlight` if another request holds the key and has not finished.
    pub async fn check_and_reserve(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Reservation, IdempotencyError> {
        match self.store.reserve(key, now, now + self.ttl).await? {
            ReserveAttempt::Reserved => Ok(Reservation::New),
            ReserveAttempt::Existing(record) => match record.state {
                RecordState::Completed(outcome) => {
                    debug!(key, "Idempotent replay");
                    Ok(Reservation::Replay(outcome))
                }
                RecordState::InFlight => {
                    warn!(key, "Idempotency key still in flight");
                    Err(IdempotencyError::InFlight(key.to_string()))
                }
            },
        }
    }

    /// Records the final outcome for a reserved key.
    pub async fn record_outcome(
        &self,
        key: &str,
        outcome: IdempotencyOutcome,
    ) -> Result<(), IdempotencyError> {
        self.store.complete(key, outcome).await
    }

    /// Gives a reserved key back after a transient failure.
    pub async fn release(&self, key: &str) -> Result<(), IdempotencyError> {
        self.store.release(key).await
    }

    /// Deletes expired records.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, IdempotencyError> {
        self.store.purge_expired(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::memory::InMemoryIdempotencyStore;
    use rstest::rstest;
    use wagerly_shared::types::TransactionId;

    fn tracker() -> IdempotencyTracker {
        IdempotencyTracker::new(Arc::new(InMemoryIdempotencyStore::new()), Duration::hours(24))
    }

    #[rstest]
    #[case("deposit-0123456789", true)]
    #[case("ABCDEFGHIJ_klmnop", true)]
    #[case("short-key", false)]
    #[case("has spaces in the key", false)]
    #[case("unicode-é-0123456789", false)]
    fn test_validate_key(#[case] key: &str, #[case] valid: bool) {
        assert_eq!(IdempotencyTracker::validate_key(key).is_ok(), valid);
    }

    #[test]
    fn test_validate_key_length_bounds() {
        assert!(IdempotencyTracker::validate_key(&"a".repeat(MAX_KEY_LEN)).is_ok());
        assert!(IdempotencyTracker::validate_key(&"a".repeat(MAX_KEY_LEN + 1)).is_err());
    }

    #[tokio::test]
    async fn test_reserve_record_replay() {
        let tracker = tracker();
        let now = Utc::now();
        let key = "bet-round-000000001";

        assert_eq!(tracker.check_and_reserve(key, now).await.unwrap(), Reservation::New);
        assert_eq!(
            tracker.check_and_reserve(key, now).await,
            Err(IdempotencyError::InFlight(key.to_string()))
        );

        let tx = TransactionId::new();
        tracker
            .record_outcome(key, IdempotencyOutcome::Transaction(tx))
            .await
            .unwrap();
        assert_eq!(
            tracker.check_and_reserve(key, now).await.unwrap(),
            Reservation::Replay(IdempotencyOutcome::Transaction(tx))
        );
    }

    #[tokio::test]
    async fn test_release_allows_retry() {
        let tracker = tracker();
        let now = Utc::now();
        let key = "withdraw-0000000042";
        tracker.check_and_reserve(key, now).await.unwrap();
        tracker.release(key).await.unwrap();
        assert_eq!(tracker.check_and_reserve(key, now).await.unwrap(), Reservation::New);
    }

    #[tokio::test]
    async fn test_expired_key_is_reusable_and_purged() {
        let store = Arc::new(InMemoryIdempotencyStore::new());
        let tracker = IdempotencyTracker::new(store.clone(), Duration::hours(1));
        let now = Utc::now();
        let key = "deposit-pay-000000007";
        tracker.check_and_reserve(key, now).await.unwrap();
        tracker
            .record_outcome(key, IdempotencyOutcome::Transaction(TransactionId::new()))
            .await
            .unwrap();

        let later = now + Duration::hours(2);
        assert_eq!(tracker.check_and_reserve(key, later).await.unwrap(), Reservation::New);

        assert_eq!(tracker.purge_expired(later + Duration::hours(2)).await.unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_reservations_have_one_winner() {
        let tracker = tracker();
        let now = Utc::now();
        let attempts = futures::future::join_all(
            (0..32).map(|_| tracker.check_and_reserve("bonus-welcome-00000001", now)),
        )
        .await;
        let winners = attempts
            .iter()
            .filter(|a| matches!(a, Ok(Reservation::New)))
            .count();
        assert_eq!(winners, 1);
    }
}
