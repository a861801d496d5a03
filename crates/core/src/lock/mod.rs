//! Per-user exclusive locks with a bounded wait and a lease.
//!
//! Every balance mutation runs under the lock for its user. A lease that is
//! never released (a crashed holder) lapses on its own, and a stale release
//! can never free a lock someone else now holds.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;
use wagerly_shared::types::UserId;

pub use memory::KeyedLeaseLocks;

/// Lock acquisition failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The wait window elapsed while another holder kept the lock.
    #[error("Timed out after {waited_ms}ms waiting for lock {key}")]
    Timeout {
        /// The contended key.
        key: String,
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// The lock backend failed.
    #[error("Lock backend error: {0}")]
    Backend(String),
}

/// Proof of holding a lock until `release` or lease expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    /// Locked key.
    pub key: String,
    /// Holder token; only the matching lease can release.
    pub token: Uuid,
}

/// Distributed exclusive lock.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Acquires `key`, waiting at most `wait`. The hold lapses after `lease`.
    async fn acquire(&self, key: &str, wait: Duration, lease: Duration)
    -> Result<LockLease, LockError>;

    /// Releases a lease. Releasing a lapsed or foreign lease is a no-op.
    async fn release(&self, lease: &LockLease);
}

/// Lock key for a user's wallet.
#[must_use]
pub fn user_lock_key(user_id: UserId) -> String {
    format!("wallet:user:{user_id}")
}
