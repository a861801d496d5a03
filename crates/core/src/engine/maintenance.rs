//! Background sweeps: approval expiry, daily totals reset, reconciliation
//! and idempotency key purge.
//!
//! Each sweep processes rows one at a time under the owning player's lock,
//! rechecking the row after acquiring it, so sweeps can run concurrently
//! with live traffic and with each other.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use wagerly_shared::config::LockConfig;
use wagerly_shared::types::{AccountId, PageRequest, UserId, WorkflowId};

use crate::account::AccountService;
use crate::account::types::{indefinite_freeze, start_of_day};
use crate::engine::approval::close_parked;
use crate::engine::cache::BalanceCache;
use crate::engine::error::WalletError;
use crate::engine::service::with_user_lock;
use crate::idempotency::IdempotencyTracker;
use crate::ledger::{LedgerService, Reconciliation};
use crate::lock::LockProvider;
use crate::store::{AccountWrite, Commit, WalletStore};
use crate::workflow::WorkflowService;

/// Counters from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Rows changed.
    pub processed: u32,
    /// Rows that no longer needed work once locked.
    pub skipped: u32,
    /// Rows that errored; retried on the next pass.
    pub failed: u32,
}

/// Outcome of a full reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// Accounts checked.
    pub checked: u32,
    /// Accounts found drifted and frozen.
    pub drifted: Vec<AccountId>,
    /// Accounts that could not be checked.
    pub failed: u32,
}

/// Compares an account with its ledger and freezes it on drift.
///
/// The caller must hold the player's lock.
pub(crate) async fn reconcile_locked(
    store: &dyn WalletStore,
    account_id: AccountId,
    now: DateTime<Utc>,
) -> Result<Reconciliation, WalletError> {
    let account = store
        .get_account(account_id)
        .await?
        .ok_or_else(|| WalletError::NotFound(format!("account {account_id}")))?;
    let ledger_sum = store.ledger_sum(account_id).await?;
    let reconciliation = LedgerService::reconcile(&account, ledger_sum);
    if reconciliation.balanced {
        debug!(%account_id, balance = %account.balance, "Account reconciled");
        return Ok(reconciliation);
    }

    error!(
        %account_id,
        user_id = %account.user_id,
        balance = %account.balance,
        %ledger_sum,
        difference = %reconciliation.difference,
        "Ledger drift detected, freezing account"
    );
    let reason = format!("ledger drift of {}", reconciliation.difference);
    let frozen =
        AccountService::freeze(&account, indefinite_freeze(), &reason, account.version, now)?;
    store
        .commit(Commit::new().account(AccountWrite::update(frozen, account.version)))
        .await?;
    Err(WalletError::LedgerIntegrityViolation {
        account_id,
        difference: reconciliation.difference,
    })
}

/// Periodic maintenance over a wallet store.
#[derive(Clone)]
pub struct MaintenanceService {
    store: Arc<dyn WalletStore>,
    idempotency: IdempotencyTracker,
    locks: Arc<dyn LockProvider>,
    lock_config: LockConfig,
    batch_size: u32,
    balances: Option<BalanceCache>,
}

impl std::fmt::Debug for MaintenanceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceService")
            .field("lock_config", &self.lock_config)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl MaintenanceService {
    /// Creates a service that handles up to `batch_size` rows per pass.
    #[must_use]
    pub fn new(
        store: Arc<dyn WalletStore>,
        idempotency: IdempotencyTracker,
        locks: Arc<dyn LockProvider>,
        lock_config: LockConfig,
        batch_size: u32,
    ) -> Self {
        Self {
            store,
            idempotency,
            locks,
            lock_config,
            batch_size: batch_size.max(1),
            balances: None,
        }
    }

    /// Invalidates `cache` entries for every account a sweep touches.
    #[must_use]
    pub fn with_balance_cache(mut self, cache: BalanceCache) -> Self {
        self.balances = Some(cache);
        self
    }

    /// Expires open workflows past their deadline, rejecting their parked
    /// transactions and releasing holds.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<SweepReport, WalletError> {
        let due = self
            .store
            .expirable_workflows(now, u64::from(self.batch_size))
            .await?;
        let mut report = SweepReport::default();
        for workflow in due {
            let outcome = with_user_lock(
                self.locks.as_ref(),
                &self.lock_config,
                workflow.user_id,
                || self.expire_one(workflow.id, workflow.user_id, now),
            )
            .await;
            Self::tally(&mut report, outcome, "workflow", &workflow.id.to_string());
        }
        if report.processed > 0 || report.failed > 0 {
            info!(
                expired = report.processed,
                skipped = report.skipped,
                failed = report.failed,
                "Approval expiry sweep finished"
            );
        }
        Ok(report)
    }

    async fn expire_one(
        &self,
        workflow_id: WorkflowId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, WalletError> {
        let Some(workflow) = self.store.get_workflow(workflow_id).await? else {
            return Ok(false);
        };
        if !(workflow.status.is_open() && workflow.is_past_expiry(now)) {
            return Ok(false);
        }
        let next = WorkflowService::expire(&workflow, now)?;
        close_parked(self.store.as_ref(), &workflow, next, now).await?;
        self.invalidate(user_id);
        info!(%workflow_id, transaction_id = %workflow.transaction_id, "Workflow expired");
        Ok(true)
    }

    /// Zeroes daily totals that belong to an earlier day.
    pub async fn reset_daily_totals(&self, now: DateTime<Utc>) -> Result<SweepReport, WalletError> {
        let due = self
            .store
            .accounts_due_for_reset(start_of_day(now), u64::from(self.batch_size))
            .await?;
        let mut report = SweepReport::default();
        for account in due {
            let outcome = with_user_lock(
                self.locks.as_ref(),
                &self.lock_config,
                account.user_id,
                || self.reset_one(account.id, now),
            )
            .await;
            if matches!(outcome, Ok(true)) {
                self.invalidate(account.user_id);
            }
            Self::tally(&mut report, outcome, "account", &account.id.to_string());
        }
        if report.processed > 0 || report.failed > 0 {
            info!(
                reset = report.processed,
                failed = report.failed,
                "Daily totals reset sweep finished"
            );
        }
        Ok(report)
    }

    async fn reset_one(&self, account_id: AccountId, now: DateTime<Utc>) -> Result<bool, WalletError> {
        let Some(account) = self.store.get_account(account_id).await? else {
            return Ok(false);
        };
        if !account.daily_totals_stale(now) {
            return Ok(false);
        }
        let reset = AccountService::reset_daily_totals(&account, account.version, now)?;
        self.store
            .commit(Commit::new().account(AccountWrite::update(reset, account.version)))
            .await?;
        Ok(true)
    }

    /// Reconciles every account, freezing any that drifted.
    pub async fn reconcile_all(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationReport, WalletError> {
        let mut report = ReconciliationReport::default();
        let mut page = PageRequest::new(1, self.batch_size);
        loop {
            let accounts = self.store.list_accounts(page).await?;
            for account in &accounts.data {
                let outcome = with_user_lock(
                    self.locks.as_ref(),
                    &self.lock_config,
                    account.user_id,
                    || reconcile_locked(self.store.as_ref(), account.id, now),
                )
                .await;
                report.checked += 1;
                match outcome {
                    Ok(_) => {}
                    Err(WalletError::LedgerIntegrityViolation { account_id, .. }) => {
                        report.drifted.push(account_id);
                        self.invalidate(account.user_id);
                    }
                    Err(err) => {
                        report.failed += 1;
                        warn!(account_id = %account.id, error = %err, "Reconciliation failed");
                    }
                }
            }
            if !accounts.has_next() {
                break;
            }
            page = page.next();
        }
        info!(
            checked = report.checked,
            drifted = report.drifted.len(),
            failed = report.failed,
            "Reconciliation sweep finished"
        );
        Ok(report)
    }

    /// Deletes expired idempotency records.
    pub async fn purge_idempotency(&self, now: DateTime<Utc>) -> Result<u64, WalletError> {
        let purged = self.idempotency.purge_expired(now).await?;
        if purged > 0 {
            info!(purged, "Expired idempotency keys purged");
        }
        Ok(purged)
    }

    fn tally(
        report: &mut SweepReport,
        outcome: Result<bool, WalletError>,
        entity: &str,
        id: &str,
    ) {
        match outcome {
            Ok(true) => report.processed += 1,
            Ok(false) => report.skipped += 1,
            Err(err) => {
                report.failed += 1;
                warn!(entity, id, error = %err, "Sweep item failed");
            }
        }
    }

    fn invalidate(&self, user_id: UserId) {
        if let Some(cache) = &self.balances {
            cache.invalidate(user_id);
        }
    }
}
