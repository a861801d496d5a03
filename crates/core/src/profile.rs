//! Player facts the compliance gate consumes.
//!
//! KYC status, jurisdiction, self-exclusion and session losses are owned by
//! other systems; the engine reads them through `PlayerProfileProvider`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wagerly_shared::types::{Currency, Money, UserId};

/// Identity verification status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    /// Verification never started.
    #[default]
    NotStarted,
    /// Documents being collected.
    InProgress,
    /// Waiting on manual review.
    PendingReview,
    /// Identity verified.
    Verified,
    /// Verification refused.
    Rejected,
}

impl KycStatus {
    /// Returns true only for `Verified`.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// Snapshot of a player's compliance-relevant facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// The player.
    pub user_id: UserId,
    /// Identity verification status.
    pub kyc_status: KycStatus,
    /// Two-letter state code.
    pub jurisdiction: Option<String>,
    /// Self-exclusion end, if the player excluded themselves.
    pub self_excluded_until: Option<DateTime<Utc>>,
    /// Date of birth, once known.
    pub date_of_birth: Option<NaiveDate>,
    /// Losses in the current gaming session, per currency.
    pub session_losses: HashMap<Currency, Money>,
}

impl PlayerProfile {
    /// A profile with nothing known: unverified, no jurisdiction.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            kyc_status: KycStatus::default(),
            jurisdiction: None,
            self_excluded_until: None,
            date_of_birth: None,
            session_losses: HashMap::new(),
        }
    }

    /// Sets the KYC status.
    #[must_use]
    pub fn with_kyc(mut self, status: KycStatus) -> Self {
        self.kyc_status = status;
        self
    }

    /// Sets the jurisdiction.
    #[must_use]
    pub fn with_jurisdiction(mut self, state: impl Into<String>) -> Self {
        self.jurisdiction = Some(state.into());
        self
    }

    /// Sets a self-exclusion end.
    #[must_use]
    pub fn with_self_exclusion(mut self, until: DateTime<Utc>) -> Self {
        self.self_excluded_until = Some(until);
        self
    }

    /// Sets the date of birth.
    #[must_use]
    pub fn with_date_of_birth(mut self, date: NaiveDate) -> Self {
        self.date_of_birth = Some(date);
        self
    }

    /// Sets the current session loss for `currency`.
    #[must_use]
    pub fn with_session_loss(mut self, currency: Currency, loss: Money) -> Self {
        self.session_losses.insert(currency, loss);
        self
    }

    /// Current session loss in `currency`.
    #[must_use]
    pub fn session_loss(&self, currency: Currency) -> Money {
        self.session_losses
            .get(&currency)
            .copied()
            .unwrap_or(Money::ZERO)
    }
}

/// Profile lookup failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    /// The backing service could not answer.
    #[error("Player profile service unavailable: {0}")]
    Unavailable(String),
}

/// Source of player profiles.
#[async_trait]
pub trait PlayerProfileProvider: Send + Sync {
    /// Loads the current profile for `user_id`.
    async fn profile(&self, user_id: UserId) -> Result<PlayerProfile, ProfileError>;
}

/// In-process profile directory.
///
/// Unknown players read as an empty profile (`PlayerProfile::new`).
#[derive(Debug, Default)]
pub struct ProfileDirectory {
    profiles: DashMap<UserId, PlayerProfile>,
}

impl ProfileDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a profile.
    pub fn upsert(&self, profile: PlayerProfile) {
        self.profiles.insert(profile.user_id, profile);
    }
}

#[async_trait]
impl PlayerProfileProvider for ProfileDirectory {
    async fn profile(&self, user_id: UserId) -> Result<PlayerProfile, ProfileError> {
        Ok(self
            .profiles
            .get(&user_id)
            .map_or_else(|| PlayerProfile::new(user_id), |p| p.value().clone()))
    }
}
