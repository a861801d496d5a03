//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;
use wagerly_core::account::Account;
use wagerly_core::actor::{Actor, StaffRole};
use wagerly_core::engine::{BonusRequest, DepositRequest, WalletEngine};
use wagerly_core::idempotency::InMemoryIdempotencyStore;
use wagerly_core::ledger::{LedgerEntry, TimeRange};
use wagerly_core::lock::KeyedLeaseLocks;
use wagerly_core::profile::{KycStatus, PlayerProfile, PlayerProfileProvider, ProfileDirectory, ProfileError};
use wagerly_core::store::{Commit, InMemoryWalletStore, StoreError, WalletStore};
use wagerly_core::transaction::WalletTransaction;
use wagerly_core::workflow::ApprovalWorkflow;
use wagerly_shared::config::WalletConfig;
use wagerly_shared::types::{
    AccountId, Currency, Money, PageRequest, PageResponse, TransactionId, UserId, WorkflowId,
};

/// An engine over in-memory collaborators, with handles to poke at them.
pub struct Harness {
    pub engine: Arc<WalletEngine>,
    pub store: Arc<InMemoryWalletStore>,
    pub profiles: Arc<ProfileDirectory>,
}

pub fn harness() -> Harness {
    harness_with(WalletConfig::default())
}

pub fn harness_with(config: WalletConfig) -> Harness {
    let store = Arc::new(InMemoryWalletStore::new());
    let profiles = Arc::new(ProfileDirectory::new());
    let engine = WalletEngine::new(
        &config,
        store.clone(),
        Arc::new(InMemoryIdempotencyStore::new()),
        Arc::new(KeyedLeaseLocks::new()),
        profiles.clone(),
    );
    Harness {
        engine: Arc::new(engine),
        store,
        profiles,
    }
}

impl Harness {
    /// Registers a KYC-verified player.
    pub fn verified_player(&self) -> UserId {
        let user_id = UserId::new();
        self.profiles
            .upsert(PlayerProfile::new(user_id).with_kyc(KycStatus::Verified));
        user_id
    }

    /// Credits promotional currency through the bonus path.
    pub async fn fund_promo(&self, user_id: UserId, amount: Decimal) -> WalletTransaction {
        self.engine
            .grant_bonus(
                BonusRequest {
                    user_id,
                    currency: Currency::Promo,
                    amount: money(amount),
                    promotion_reference: format!("promo-{}", Uuid::new_v4().simple()),
                    reason: "test funding".to_string(),
                    idempotency_key: None,
                },
                Actor::System,
            )
            .await
            .unwrap()
    }

    /// Credits play currency through the deposit path.
    pub async fn fund_play(&self, user_id: UserId, amount: Decimal) -> WalletTransaction {
        self.engine
            .deposit(
                DepositRequest::new(user_id, money(amount), "pay_test", key("deposit")),
                Actor::System,
            )
            .await
            .unwrap()
    }

    pub async fn account(&self, user_id: UserId, currency: Currency) -> Account {
        self.engine.get_account(user_id, currency).await.unwrap()
    }

    /// Every ledger entry for an account, oldest first.
    pub async fn ledger(&self, account_id: AccountId) -> Vec<LedgerEntry> {
        self.engine
            .ledger_entries(account_id, TimeRange::all(), PageRequest::new(1, 500))
            .await
            .unwrap()
            .data
    }
}

pub fn money(value: Decimal) -> Money {
    Money::normalize(value)
}

/// A fresh, valid idempotency key.
pub fn key(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

pub fn finance() -> Actor {
    Actor::staff(UserId::new(), StaffRole::FinanceManager)
}

pub fn compliance_officer() -> Actor {
    Actor::staff(UserId::new(), StaffRole::ComplianceOfficer)
}

pub fn admin() -> Actor {
    Actor::staff(UserId::new(), StaffRole::Admin)
}

/// Profile provider that can be switched off.
#[derive(Default)]
pub struct FlakyProfiles {
    pub down: AtomicBool,
}

#[async_trait]
impl PlayerProfileProvider for FlakyProfiles {
    async fn profile(&self, user_id: UserId) -> Result<PlayerProfile, ProfileError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ProfileError::Unavailable("connection refused".to_string()));
        }
        Ok(PlayerProfile::new(user_id))
    }
}

/// Store wrapper that can refuse commits carrying a ledger entry.
#[derive(Default)]
pub struct FailingStore {
    pub inner: InMemoryWalletStore,
    pub fail_ledger_commits: AtomicBool,
}

#[async_trait]
impl WalletStore for FailingStore {
    async fn find_account(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Option<Account>, StoreError> {
        self.inner.find_account(user_id, currency).await
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        self.inner.get_account(id).await
    }

    async fn create_account(&self, account: Account) -> Result<Account, StoreError> {
        self.inner.create_account(account).await
    }

    async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<WalletTransaction>, StoreError> {
        self.inner.get_transaction(id).await
    }

    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<ApprovalWorkflow>, StoreError> {
        self.inner.get_workflow(id).await
    }

    async fn commit(&self, commit: Commit) -> Result<(), StoreError> {
        if commit.ledger_entry.is_some() && self.fail_ledger_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.commit(commit).await
    }

    async fn ledger_entries(
        &self,
        account_id: AccountId,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<PageResponse<LedgerEntry>, StoreError> {
        self.inner.ledger_entries(account_id, range, page).await
    }

    async fn ledger_sum(&self, account_id: AccountId) -> Result<Money, StoreError> {
        self.inner.ledger_sum(account_id).await
    }

    async fn expirable_workflows(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<ApprovalWorkflow>, StoreError> {
        self.inner.expirable_workflows(now, limit).await
    }

    async fn accounts_due_for_reset(
        &self,
        day_start: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Account>, StoreError> {
        self.inner.accounts_due_for_reset(day_start, limit).await
    }

    async fn list_accounts(&self, page: PageRequest) -> Result<PageResponse<Account>, StoreError> {
        self.inner.list_accounts(page).await
    }

    async fn user_transactions(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<PageResponse<WalletTransaction>, StoreError> {
        self.inner.user_transactions(user_id, page).await
    }
}
