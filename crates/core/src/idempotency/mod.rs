//! Exactly-once delivery of client operations.
//!
//! A client key is reserved atomically before any work starts. The first
//! caller runs the operation and records its outcome; every later caller
//! with the same key gets that outcome back. A key still in flight fails
//! fast so the client retries shortly instead of blocking.

pub mod memory;
pub mod tracker;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wagerly_shared::types::TransactionId;

pub use memory::InMemoryIdempotencyStore;
pub use tracker::{IdempotencyTracker, Reservation};

/// What a completed key resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum IdempotencyOutcome {
    /// The operation produced this transaction.
    Transaction(TransactionId),
    /// The operation was refused; the payload rebuilds the error.
    Refused(serde_json::Value),
}

/// State of a stored key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "outcome", rename_all = "snake_case")]
pub enum RecordState {
    /// Reserved; the first caller is still working.
    InFlight,
    /// Finished with this outcome.
    Completed(IdempotencyOutcome),
}

/// A stored idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Client-supplied key.
    pub key: String,
    /// Current state.
    pub state: RecordState,
    /// Reservation time.
    pub created_at: DateTime<Utc>,
    /// After this instant the key may be reused.
    pub expires_at: DateTime<Utc>,
}

/// Result of an atomic reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveAttempt {
    /// The key was free (or expired) and is now reserved for the caller.
    Reserved,
    /// A live record already holds the key.
    Existing(IdempotencyRecord),
}

/// Idempotency errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdempotencyError {
    /// The key is malformed.
    #[error("Invalid idempotency key: {0}")]
    InvalidKey(String),

    /// The first request with this key has not finished.
    #[error("Request with idempotency key {0} is still in progress")]
    InFlight(String),

    /// The backing store failed.
    #[error("Idempotency store error: {0}")]
    Store(String),
}

/// Persistent key records.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically reserves `key` unless a live record holds it.
    async fn reserve(
        &self,
        key: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<ReserveAttempt, IdempotencyError>;

    /// Marks `key` completed with `outcome`.
    async fn complete(&self, key: &str, outcome: IdempotencyOutcome)
    -> Result<(), IdempotencyError>;

    /// Drops a reservation so the key can be retried.
    async fn release(&self, key: &str) -> Result<(), IdempotencyError>;

    /// Deletes records that expired at or before `now`; returns how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, IdempotencyError>;
}
