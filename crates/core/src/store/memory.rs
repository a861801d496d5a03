//! In-memory `WalletStore`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use wagerly_shared::types::{
    AccountId, Currency, Money, PageRequest, PageResponse, TransactionId, UserId, WorkflowId,
};

use crate::account::Account;
use crate::ledger::{LedgerEntry, TimeRange};
use crate::store::{AccountWrite, Commit, StoreError, WalletStore, WorkflowWrite};
use crate::transaction::WalletTransaction;
use crate::workflow::ApprovalWorkflow;

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    account_index: HashMap<(UserId, Currency), AccountId>,
    ledger: HashMap<AccountId, Vec<LedgerEntry>>,
    transactions: HashMap<TransactionId, WalletTransaction>,
    user_transactions: HashMap<UserId, Vec<TransactionId>>,
    workflows: HashMap<WorkflowId, ApprovalWorkflow>,
}

impl State {
    fn check_account(&self, write: &AccountWrite) -> Result<(), StoreError> {
        let account = &write.account;
        match write.expected_version {
            None => {
                if self.accounts.contains_key(&account.id)
                    || self
                        .account_index
                        .contains_key(&(account.user_id, account.currency))
                {
                    // Someone opened it first; the caller reloads and retries.
                    return Err(StoreError::VersionConflict {
                        entity: "account",
                        id: account.id.to_string(),
                        expected: 0,
                    });
                }
            }
            Some(expected) => {
                let stored = self.accounts.get(&account.id);
                if stored.is_none_or(|stored| stored.version != expected) {
                    return Err(StoreError::VersionConflict {
                        entity: "account",
                        id: account.id.to_string(),
                        expected,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_workflow(&self, write: &WorkflowWrite) -> Result<(), StoreError> {
        let workflow = &write.workflow;
        let stored = self.workflows.get(&workflow.id);
        match (write.expected_version, stored) {
            (None, Some(_)) => Err(StoreError::Duplicate {
                entity: "workflow",
                id: workflow.id.to_string(),
            }),
            (None, None) => Ok(()),
            (Some(expected), Some(stored)) if stored.version == expected => Ok(()),
            (Some(expected), _) => Err(StoreError::VersionConflict {
                entity: "workflow",
                id: workflow.id.to_string(),
                expected,
            }),
        }
    }

    fn check_ledger(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let exists = self
            .ledger
            .get(&entry.account_id)
            .is_some_and(|entries| entries.iter().any(|e| e.id == entry.id));
        if exists {
            return Err(StoreError::Duplicate {
                entity: "ledger_entry",
                id: entry.id.to_string(),
            });
        }
        Ok(())
    }

    fn put_account(&mut self, account: Account) {
        self.account_index
            .insert((account.user_id, account.currency), account.id);
        self.accounts.insert(account.id, account);
    }

    fn put_transaction(&mut self, transaction: WalletTransaction) {
        if !self.transactions.contains_key(&transaction.id) {
            self.user_transactions
                .entry(transaction.user_id)
                .or_default()
                .push(transaction.id);
        }
        self.transactions.insert(transaction.id, transaction);
    }
}

/// `WalletStore` held in process memory.
///
/// A single mutex guards all state, so a commit is trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryWalletStore {
    state: Mutex<State>,
}

impl InMemoryWalletStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrites an account without any checks.
    ///
    /// For tests that need to simulate drift between balance and ledger.
    pub fn force_account(&self, account: Account) {
        self.state().put_account(account);
    }
}

fn page_of<T>(items: Vec<T>, page: PageRequest) -> PageResponse<T> {
    let total = u64::try_from(items.len()).unwrap_or(u64::MAX);
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    let data = items.into_iter().skip(offset).take(limit).collect();
    PageResponse::new(data, page, total)
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn find_account(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Option<Account>, StoreError> {
        let state = self.state();
        Ok(state
            .account_index
            .get(&(user_id, currency))
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.state().accounts.get(&id).cloned())
    }

    async fn create_account(&self, account: Account) -> Result<Account, StoreError> {
        let mut state = self.state();
        if let Some(existing) = state
            .account_index
            .get(&(account.user_id, account.currency))
            .and_then(|id| state.accounts.get(id))
        {
            return Ok(existing.clone());
        }
        state.put_account(account.clone());
        Ok(account)
    }

    async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<WalletTransaction>, StoreError> {
        Ok(self.state().transactions.get(&id).cloned())
    }

    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<ApprovalWorkflow>, StoreError> {
        Ok(self.state().workflows.get(&id).cloned())
    }

    async fn commit(&self, commit: Commit) -> Result<(), StoreError> {
        let mut state = self.state();

        // Validate everything before touching anything.
        if let Some(write) = &commit.account {
            state.check_account(write)?;
        }
        if let Some(write) = &commit.workflow {
            state.check_workflow(write)?;
        }
        if let Some(entry) = &commit.ledger_entry {
            state.check_ledger(entry)?;
        }

        if let Some(write) = commit.account {
            state.put_account(write.account);
        }
        if let Some(entry) = commit.ledger_entry {
            state.ledger.entry(entry.account_id).or_default().push(entry);
        }
        for transaction in commit.transactions {
            state.put_transaction(transaction);
        }
        if let Some(write) = commit.workflow {
            state.workflows.insert(write.workflow.id, write.workflow);
        }
        Ok(())
    }

    async fn ledger_entries(
        &self,
        account_id: AccountId,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<PageResponse<LedgerEntry>, StoreError> {
        let state = self.state();
        let entries: Vec<LedgerEntry> = state
            .ledger
            .get(&account_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| range.contains(e.created_at))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page_of(entries, page))
    }

    async fn ledger_sum(&self, account_id: AccountId) -> Result<Money, StoreError> {
        Ok(self
            .state()
            .ledger
            .get(&account_id)
            .map(|entries| entries.iter().map(|e| e.amount).sum())
            .unwrap_or(Money::ZERO))
    }

    async fn expirable_workflows(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<ApprovalWorkflow>, StoreError> {
        let mut due: Vec<ApprovalWorkflow> = self
            .state()
            .workflows
            .values()
            .filter(|w| w.status.is_open() && w.is_past_expiry(now))
            .cloned()
            .collect();
        due.sort_by_key(|w| w.expires_at);
        due.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(due)
    }

    async fn accounts_due_for_reset(
        &self,
        day_start: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Account>, StoreError> {
        let mut due: Vec<Account> = self
            .state()
            .accounts
            .values()
            .filter(|a| a.daily_reset_at < day_start)
            .cloned()
            .collect();
        due.sort_by_key(|a| a.id);
        due.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(due)
    }

    async fn list_accounts(&self, page: PageRequest) -> Result<PageResponse<Account>, StoreError> {
        let mut accounts: Vec<Account> = self.state().accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.id);
        Ok(page_of(accounts, page))
    }

    async fn user_transactions(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<PageResponse<WalletTransaction>, StoreError> {
        let state = self.state();
        let transactions: Vec<WalletTransaction> = state
            .user_transactions
            .get(&user_id)
            .map(|ids| {
                ids.iter()
                    .rev()
                    .filter_map(|id| state.transactions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(page_of(transactions, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountService;
    use rust_decimal_macros::dec;

    fn open(store: &InMemoryWalletStore) -> Account {
        let account = Account::open(UserId::new(), Currency::Promo, Utc::now());
        store.force_account(account.clone());
        account
    }

    #[tokio::test]
    async fn test_commit_rejects_stale_version_without_partial_writes() {
        let store = InMemoryWalletStore::new();
        let account = open(&store);
        let now = Utc::now();
        let credited = AccountService::credit(&account, Money::normalize(dec!(10)), 0, now).unwrap();
        store
            .commit(Commit::new().account(AccountWrite::update(credited.clone(), 0)))
            .await
            .unwrap();

        let stale = AccountService::credit(&account, Money::normalize(dec!(5)), 0, now).unwrap();
        let err = store
            .commit(Commit::new().account(AccountWrite::update(stale, 0)))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let stored = store.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(stored, credited);
    }

    #[tokio::test]
    async fn test_insert_conflicts_when_account_exists() {
        let store = InMemoryWalletStore::new();
        let account = open(&store);
        let twin = Account::open(account.user_id, account.currency, Utc::now());
        let err = store
            .commit(Commit::new().account(AccountWrite::insert(twin.clone())))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // create_account is idempotent per user and currency.
        let kept = store.create_account(twin).await.unwrap();
        assert_eq!(kept.id, account.id);
    }

    #[tokio::test]
    async fn test_list_accounts_pages() {
        let store = InMemoryWalletStore::new();
        for _ in 0..5 {
            open(&store);
        }
        let first = store.list_accounts(PageRequest::new(1, 2)).await.unwrap();
        assert_eq!(first.data.len(), 2);
        assert_eq!(first.meta.total, 5);
        assert_eq!(first.meta.total_pages, 3);
        let last = store.list_accounts(PageRequest::new(3, 2)).await.unwrap();
        assert_eq!(last.data.len(), 1);
        assert!(!last.has_next());
    }
}
