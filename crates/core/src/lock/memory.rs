//! In-process lease lock table.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::lock::{LockError, LockLease, LockProvider};

#[derive(Debug, Clone, Copy)]
struct Holder {
    token: Uuid,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct LockSlot {
    holder: Mutex<Option<Holder>>,
    notify: Notify,
}

impl LockSlot {
    /// Takes the slot if it is free or its lease lapsed; otherwise returns
    /// the current holder's expiry.
    fn try_take(&self, token: Uuid, lease: Duration, now: Instant) -> Result<(), Instant> {
        let mut holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        match *holder {
            Some(current) if current.expires_at > now => Err(current.expires_at),
            _ => {
                *holder = Some(Holder {
                    token,
                    expires_at: now + lease,
                });
                Ok(())
            }
        }
    }

    fn release(&self, token: Uuid) -> bool {
        let mut holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        match *holder {
            Some(current) if current.token == token => {
                *holder = None;
                true
            }
            _ => false,
        }
    }
}

/// Lease locks keyed by string, for a single process.
///
/// Waiters sleep on a `Notify` until the holder releases or its lease
/// lapses, whichever comes first. Slots are never removed; the table grows
/// with the number of distinct users seen.
#[derive(Debug, Default)]
pub struct KeyedLeaseLocks {
    slots: DashMap<String, Arc<LockSlot>>,
}

impl KeyedLeaseLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<LockSlot> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.slots.entry(key.to_string()).or_default().value())
    }
}

#[async_trait]
impl LockProvider for KeyedLeaseLocks {
    async fn acquire(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
    ) -> Result<LockLease, LockError> {
        let slot = self.slot(key);
        let token = Uuid::new_v4();
        let started = Instant::now();
        let deadline = started + wait;

        loop {
            let notified = slot.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();

            let now = Instant::now();
            let holder_expiry = match slot.try_take(token, lease, now) {
                Ok(()) => {
                    debug!(key, "Lock acquired");
                    return Ok(LockLease {
                        key: key.to_string(),
                        token,
                    });
                }
                Err(expiry) => expiry,
            };

            if now >= deadline {
                let waited_ms = u64::try_from(now.duration_since(started).as_millis()).unwrap_or(u64::MAX);
                warn!(key, waited_ms, "Lock wait timed out");
                return Err(LockError::Timeout {
                    key: key.to_string(),
                    waited_ms,
                });
            }

            let wake_at = deadline.min(holder_expiry);
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn release(&self, lease: &LockLease) {
        let Some(slot) = self.slots.get(&lease.key).map(|s| Arc::clone(s.value())) else {
            return;
        };
        if slot.release(lease.token) {
            debug!(key = %lease.key, "Lock released");
            slot.notify.notify_waiters();
        } else {
            debug!(key = %lease.key, "Stale lock release ignored");
        }
    }
}
