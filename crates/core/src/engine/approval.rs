//! Approval workflow operations and their balance side effects.
//!
//! Workflow actions run under the lock of the workflow's player and reload
//! the workflow inside it, so two approvers racing for the final sign-off
//! serialize and the parked transaction executes exactly once.

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use wagerly_shared::types::WorkflowId;

use crate::account::AccountService;
use crate::actor::Actor;
use crate::engine::error::WalletError;
use crate::engine::service::{WalletEngine, ledger_reason, with_user_lock};
use crate::ledger::LedgerService;
use crate::store::{AccountWrite, Commit, WalletStore, WorkflowWrite};
use crate::transaction::Direction;
use crate::workflow::{ApprovalProgress, ApprovalWorkflow, WorkflowError, WorkflowService};

impl WalletEngine {
    /// Records an approval. The final approval executes the parked
    /// transaction in the same commit.
    #[instrument(skip(self, notes))]
    pub async fn submit_approval(
        &self,
        workflow_id: WorkflowId,
        approver: Actor,
        notes: Option<String>,
    ) -> Result<ApprovalWorkflow, WalletError> {
        let user_id = self.load_workflow(workflow_id).await?.user_id;
        with_user_lock(self.locks.as_ref(), &self.lock_config, user_id, || {
            self.approve_locked(workflow_id, approver, notes)
        })
        .await
    }

    /// Rejects a workflow; the parked transaction is rejected and any hold
    /// released.
    #[instrument(skip(self, reason))]
    pub async fn reject_workflow(
        &self,
        workflow_id: WorkflowId,
        approver: Actor,
        reason: &str,
    ) -> Result<ApprovalWorkflow, WalletError> {
        self.close_workflow(workflow_id, |workflow, now| {
            WorkflowService::reject(workflow, &approver, reason, now)
        })
        .await
    }

    /// Cancels a workflow on behalf of its initiator or an admin.
    #[instrument(skip(self, reason))]
    pub async fn cancel_workflow(
        &self,
        workflow_id: WorkflowId,
        actor: Actor,
        reason: &str,
    ) -> Result<ApprovalWorkflow, WalletError> {
        self.close_workflow(workflow_id, |workflow, now| {
            WorkflowService::cancel(workflow, &actor, reason, now)
        })
        .await
    }

    /// Escalates a pending workflow: one more approval, later deadline.
    #[instrument(skip(self, reason))]
    pub async fn escalate_workflow(
        &self,
        workflow_id: WorkflowId,
        officer: Actor,
        reason: &str,
    ) -> Result<ApprovalWorkflow, WalletError> {
        let config = self.approval_config;
        self.update_workflow(workflow_id, |workflow, now| {
            WorkflowService::escalate(workflow, &officer, reason, &config, now)
        })
        .await
    }

    /// Returns an escalated workflow to the approval queue.
    #[instrument(skip(self))]
    pub async fn reopen_workflow(
        &self,
        workflow_id: WorkflowId,
        officer: Actor,
    ) -> Result<ApprovalWorkflow, WalletError> {
        self.update_workflow(workflow_id, |workflow, _| {
            WorkflowService::reopen(workflow, &officer)
        })
        .await
    }

    async fn approve_locked(
        &self,
        workflow_id: WorkflowId,
        approver: Actor,
        notes: Option<String>,
    ) -> Result<ApprovalWorkflow, WalletError> {
        let workflow = self.load_workflow(workflow_id).await?;
        let now = Utc::now();
        let (next, progress) = WorkflowService::submit_approval(&workflow, &approver, notes, now)?;

        let mut commit =
            Commit::new().workflow(WorkflowWrite::update(next.clone(), workflow.version));
        let executes = progress == ApprovalProgress::Completed;
        if executes {
            let tx = self.load_transaction(next.transaction_id).await?;
            let account = self.load_account(tx.account_id).await?;
            let view = AccountService::current_day_view(&account, now);
            let after = match tx.direction {
                Direction::Debit => {
                    AccountService::confirm_hold(&view, tx.amount, view.version, now)?
                }
                Direction::Credit => AccountService::credit(&view, tx.amount, view.version, now)?,
            };
            // Daily totals were counted when the operation was parked.
            let after = AccountService::record_lifetime(after, tx.kind, tx.amount);
            let reason = format!("{} (approved)", ledger_reason(&tx));
            let entry = LedgerService::build_entry(&tx, &view, &after, &reason, now)?;
            let completed = tx.complete(view.balance, after.balance, now)?;
            commit = commit
                .account(AccountWrite::update(after, account.version))
                .ledger(entry)
                .transaction(completed);
        }
        self.store.commit(commit).await?;

        if executes {
            self.balances.invalidate(next.user_id);
            info!(
                workflow_id = %next.id,
                transaction_id = %next.transaction_id,
                approvals = next.approvals.len(),
                "Workflow approved; transaction executed"
            );
        } else {
            info!(
                workflow_id = %next.id,
                remaining = next.remaining_approvals(),
                "Approval recorded"
            );
        }
        Ok(next)
    }

    /// Applies a closing decision under the player lock and unwinds the
    /// parked transaction.
    async fn close_workflow<F>(
        &self,
        workflow_id: WorkflowId,
        decide: F,
    ) -> Result<ApprovalWorkflow, WalletError>
    where
        F: FnOnce(&ApprovalWorkflow, DateTime<Utc>) -> Result<ApprovalWorkflow, WorkflowError>
            + Send,
    {
        let user_id = self.load_workflow(workflow_id).await?.user_id;
        with_user_lock(self.locks.as_ref(), &self.lock_config, user_id, || async move {
            let workflow = self.load_workflow(workflow_id).await?;
            let now = Utc::now();
            let next = decide(&workflow, now)?;
            close_parked(self.store.as_ref(), &workflow, next.clone(), now).await?;
            self.balances.invalidate(user_id);
            warn!(
                workflow_id = %next.id,
                status = %next.status,
                "Workflow closed without execution"
            );
            Ok::<_, WalletError>(next)
        })
        .await
    }

    /// Applies a workflow-only change under the player lock.
    async fn update_workflow<F>(
        &self,
        workflow_id: WorkflowId,
        decide: F,
    ) -> Result<ApprovalWorkflow, WalletError>
    where
        F: FnOnce(&ApprovalWorkflow, DateTime<Utc>) -> Result<ApprovalWorkflow, WorkflowError>
            + Send,
    {
        let user_id = self.load_workflow(workflow_id).await?.user_id;
        with_user_lock(self.locks.as_ref(), &self.lock_config, user_id, || async move {
            let workflow = self.load_workflow(workflow_id).await?;
            let next = decide(&workflow, Utc::now())?;
            self.store
                .commit(Commit::new().workflow(WorkflowWrite::update(next.clone(), workflow.version)))
                .await?;
            info!(workflow_id = %next.id, status = %next.status, "Workflow updated");
            Ok::<_, WalletError>(next)
        })
        .await
    }
}

/// Persists a closed workflow and unwinds its parked transaction: the
/// transaction is rejected, a debit's hold is released and any amount
/// counted toward the daily limit is given back.
///
/// The caller must hold the player's lock.
pub(crate) async fn close_parked(
    store: &dyn WalletStore,
    workflow: &ApprovalWorkflow,
    next: ApprovalWorkflow,
    now: DateTime<Utc>,
) -> Result<(), WalletError> {
    let tx = store
        .get_transaction(workflow.transaction_id)
        .await?
        .ok_or_else(|| WalletError::NotFound(format!("transaction {}", workflow.transaction_id)))?;
    let reason = next
        .completion_notes
        .clone()
        .unwrap_or_else(|| format!("approval {}", next.status.as_str().to_lowercase()));
    let rejected = tx.reject(&reason, now)?;

    let mut commit = Commit::new()
        .workflow(WorkflowWrite::update(next, workflow.version))
        .transaction(rejected);
    let counts_daily = AccountService::has_daily_limit(tx.kind);
    if tx.direction == Direction::Debit || counts_daily {
        let account = store
            .get_account(tx.account_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(format!("account {}", tx.account_id)))?;
        let unwound = if tx.direction == Direction::Debit {
            let view = AccountService::current_day_view(&account, now);
            let released = AccountService::release(&view, tx.amount, account.version, now)?;
            AccountService::unrecord_daily(released, tx.kind, tx.amount, tx.created_at)
        } else {
            AccountService::release_daily_allowance(
                &account,
                tx.kind,
                tx.amount,
                tx.created_at,
                account.version,
                now,
            )?
        };
        commit = commit.account(AccountWrite::update(unwound, account.version));
    }
    store.commit(commit).await?;
    Ok(())
}
