//! Balance read cache using Moka.
//!
//! Balance reads are frequent and cheap to serve stale for a few seconds.
//! Every committed mutation invalidates the user's entry, so the TTL only
//! bounds staleness from writers in other processes.
//!
//! A read that raced a mutation must not repopulate the entry with what it
//! saw before the commit. Invalidation bumps a generation counter, and a
//! read is only cached if its generation is unchanged afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use wagerly_shared::config::BalanceCacheConfig;
use wagerly_shared::types::{Currency, Money, UserId};

use crate::account::Account;

/// Balance split for one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyBalance {
    /// Total balance.
    pub balance: Money,
    /// Spendable balance.
    pub available: Money,
    /// Funds held for pending workflows.
    pub held: Money,
}

impl CurrencyBalance {
    /// Zero in every field; the view of an account not yet opened.
    pub const EMPTY: Self = Self {
        balance: Money::ZERO,
        available: Money::ZERO,
        held: Money::ZERO,
    };
}

impl From<&Account> for CurrencyBalance {
    fn from(account: &Account) -> Self {
        Self {
            balance: account.balance,
            available: account.available,
            held: account.held,
        }
    }
}

/// A player's balances in both currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    /// The player.
    pub user_id: UserId,
    /// Play currency.
    pub play: CurrencyBalance,
    /// Promotional currency.
    pub promo: CurrencyBalance,
}

impl WalletBalance {
    /// The split for `currency`.
    #[must_use]
    pub const fn get(&self, currency: Currency) -> CurrencyBalance {
        match currency {
            Currency::Play => self.play,
            Currency::Promo => self.promo,
        }
    }
}

/// Generation counters, shared by users falling in the same stripe.
const GENERATION_STRIPES: usize = 256;

/// Per-user balance cache.
#[derive(Clone)]
pub struct BalanceCache {
    cache: Cache<UserId, WalletBalance>,
    generations: Arc<[AtomicU64]>,
}

impl BalanceCache {
    /// Creates a cache sized and timed by `config`.
    #[must_use]
    pub fn new(config: &BalanceCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();
        let generations = (0..GENERATION_STRIPES).map(|_| AtomicU64::new(0)).collect();
        Self { cache, generations }
    }

    /// Cached balance for `user_id`, if present and fresh.
    #[must_use]
    pub fn get(&self, user_id: UserId) -> Option<WalletBalance> {
        self.cache.get(&user_id)
    }

    /// The invalidation generation for `user_id`; read it before loading a
    /// balance to cache.
    #[must_use]
    pub fn generation(&self, user_id: UserId) -> u64 {
        self.stripe(user_id).load(Ordering::SeqCst)
    }

    /// Caches a balance loaded at `generation`, unless the user was
    /// invalidated since. Returns whether the entry was kept.
    pub fn insert_if_current(&self, balance: WalletBalance, generation: u64) -> bool {
        let user_id = balance.user_id;
        if self.generation(user_id) != generation {
            return false;
        }
        self.cache.insert(user_id, balance);
        // An invalidation between the check and the insert must still win.
        if self.generation(user_id) != generation {
            self.cache.invalidate(&user_id);
            return false;
        }
        true
    }

    /// Drops the entry for `user_id`.
    pub fn invalidate(&self, user_id: UserId) {
        self.stripe(user_id).fetch_add(1, Ordering::SeqCst);
        self.cache.invalidate(&user_id);
    }

    fn stripe(&self, user_id: UserId) -> &AtomicU64 {
        // The last byte of a v7 id is random; one stripe per value.
        let index = usize::from(user_id.into_inner().as_bytes()[15]);
        &self.generations[index % self.generations.len()]
    }
}

impl std::fmt::Debug for BalanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}
