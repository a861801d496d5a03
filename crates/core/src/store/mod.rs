//! Persistence contract for accounts, ledger, transactions and workflows.
//!
//! The engine never writes piecemeal: each operation hands the store one
//! `Commit` that is applied atomically, with a compare-and-set on every
//! versioned row it touches. `wagerly-db` implements this over Postgres;
//! `InMemoryWalletStore` backs tests and single-process use.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use wagerly_shared::types::{
    AccountId, Currency, Money, PageRequest, PageResponse, TransactionId, UserId, WorkflowId,
};

use crate::account::Account;
use crate::ledger::{LedgerEntry, TimeRange};
use crate::transaction::WalletTransaction;
use crate::workflow::ApprovalWorkflow;

pub use memory::InMemoryWalletStore;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A versioned row changed since it was read.
    #[error("{entity} {id} is no longer at version {expected}")]
    VersionConflict {
        /// Entity kind.
        entity: &'static str,
        /// Row id.
        id: String,
        /// The version the writer expected.
        expected: i64,
    },

    /// An insert collided with an existing row.
    #[error("{entity} {id} already exists")]
    Duplicate {
        /// Entity kind.
        entity: &'static str,
        /// Row id.
        id: String,
    },

    /// The backend could not be reached or failed mid-operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded.
    #[error("Corrupt stored data: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns true for optimistic-concurrency conflicts.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// An account row to write; `expected_version: None` means insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountWrite {
    /// The new state.
    pub account: Account,
    /// Version the stored row must still have.
    pub expected_version: Option<i64>,
}

impl AccountWrite {
    /// Insert a new account.
    #[must_use]
    pub const fn insert(account: Account) -> Self {
        Self {
            account,
            expected_version: None,
        }
    }

    /// Update an account read at `expected_version`.
    #[must_use]
    pub const fn update(account: Account, expected_version: i64) -> Self {
        Self {
            account,
            expected_version: Some(expected_version),
        }
    }
}

/// A workflow row to write; `expected_version: None` means insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowWrite {
    /// The new state.
    pub workflow: ApprovalWorkflow,
    /// Version the stored row must still have.
    pub expected_version: Option<i64>,
}

impl WorkflowWrite {
    /// Insert a new workflow.
    #[must_use]
    pub const fn insert(workflow: ApprovalWorkflow) -> Self {
        Self {
            workflow,
            expected_version: None,
        }
    }

    /// Update a workflow read at `expected_version`.
    #[must_use]
    pub const fn update(workflow: ApprovalWorkflow, expected_version: i64) -> Self {
        Self {
            workflow,
            expected_version: Some(expected_version),
        }
    }
}

/// Everything one operation writes, applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Commit {
    /// Account state change.
    pub account: Option<AccountWrite>,
    /// Ledger entry to append.
    pub ledger_entry: Option<LedgerEntry>,
    /// Transactions to insert or replace by id.
    pub transactions: Vec<WalletTransaction>,
    /// Workflow state change.
    pub workflow: Option<WorkflowWrite>,
}

impl Commit {
    /// An empty commit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the account write.
    #[must_use]
    pub fn account(mut self, write: AccountWrite) -> Self {
        self.account = Some(write);
        self
    }

    /// Adds the ledger entry.
    #[must_use]
    pub fn ledger(mut self, entry: LedgerEntry) -> Self {
        self.ledger_entry = Some(entry);
        self
    }

    /// Adds a transaction upsert.
    #[must_use]
    pub fn transaction(mut self, transaction: WalletTransaction) -> Self {
        self.transactions.push(transaction);
        self
    }

    /// Adds the workflow write.
    #[must_use]
    pub fn workflow(mut self, write: WorkflowWrite) -> Self {
        self.workflow = Some(write);
        self
    }
}

/// Persistent wallet state.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// The account for `user_id` in `currency`, if opened.
    async fn find_account(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Option<Account>, StoreError>;

    /// An account by id.
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Inserts `account` unless the user already has one in that currency,
    /// returning whichever is stored.
    async fn create_account(&self, account: Account) -> Result<Account, StoreError>;

    /// A transaction by id.
    async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<WalletTransaction>, StoreError>;

    /// A workflow by id.
    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<ApprovalWorkflow>, StoreError>;

    /// Applies `commit` atomically.
    async fn commit(&self, commit: Commit) -> Result<(), StoreError>;

    /// Ledger entries for an account in ascending creation order.
    async fn ledger_entries(
        &self,
        account_id: AccountId,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<PageResponse<LedgerEntry>, StoreError>;

    /// Sum of every ledger entry for an account.
    async fn ledger_sum(&self, account_id: AccountId) -> Result<Money, StoreError>;

    /// Open workflows whose deadline is at or before `now`, oldest first.
    async fn expirable_workflows(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<ApprovalWorkflow>, StoreError>;

    /// Accounts whose daily totals were last reset before `day_start`.
    async fn accounts_due_for_reset(
        &self,
        day_start: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Account>, StoreError>;

    /// All accounts, in id order.
    async fn list_accounts(&self, page: PageRequest) -> Result<PageResponse<Account>, StoreError>;

    /// A user's transactions, newest first.
    async fn user_transactions(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<PageResponse<WalletTransaction>, StoreError>;
}
