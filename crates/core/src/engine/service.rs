//! The wallet engine.
//!
//! Every balance-affecting operation follows the same protocol:
//! 1. Validate the request and authorize the actor
//! 2. Reserve the idempotency key (a replay returns the recorded outcome)
//! 3. Take the per-user lock
//! 4. Load the account, evaluate compliance, build the next state
//! 5. Commit account, ledger entry, transaction and workflow atomically
//! 6. Record the outcome against the key and release the lock

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use wagerly_shared::config::{ApprovalConfig, LockConfig, WalletConfig};
use wagerly_shared::types::{
    AccountId, Currency, Money, PageRequest, PageResponse, TransactionId, UserId, WorkflowId,
};

use crate::account::types::indefinite_freeze;
use crate::account::{Account, AccountError, AccountService};
use crate::actor::Actor;
use crate::compliance::{ComplianceCheck, ComplianceGate, Decision};
use crate::engine::cache::{BalanceCache, CurrencyBalance, WalletBalance};
use crate::engine::error::WalletError;
use crate::engine::maintenance::{MaintenanceService, reconcile_locked};
use crate::engine::refusal::{RecordedRefusal, Refusal, RequestFingerprint};
use crate::engine::requests::{
    AdjustmentRequest, BetRequest, BonusRequest, DepositRequest, ReversalRequest, WinRequest,
    WithdrawalRequest,
};
use crate::idempotency::{IdempotencyOutcome, IdempotencyStore, IdempotencyTracker, Reservation};
use crate::ledger::{LedgerEntry, LedgerService, Reconciliation, TimeRange};
use crate::lock::{LockProvider, user_lock_key};
use crate::profile::{PlayerProfile, PlayerProfileProvider};
use crate::store::{AccountWrite, Commit, WalletStore, WorkflowWrite};
use crate::transaction::{
    Direction, NewTransaction, OperationKind, TransactionStatus, WalletTransaction,
};
use crate::workflow::{ApprovalType, ApprovalWorkflow, WorkflowService};

/// Runs `f` while holding the lock for `user_id`.
///
/// The lease is released on every path; a holder that dies mid-operation
/// is covered by lease expiry.
pub(crate) async fn with_user_lock<T, F, Fut>(
    locks: &dyn LockProvider,
    config: &LockConfig,
    user_id: UserId,
    f: F,
) -> Result<T, WalletError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, WalletError>>,
{
    let lease = locks
        .acquire(&user_lock_key(user_id), config.wait(), config.lease())
        .await?;
    let result = f().await;
    locks.release(&lease).await;
    result
}

/// One balance-affecting operation, normalized from its request.
#[derive(Debug, Clone)]
struct Operation {
    user_id: UserId,
    currency: Currency,
    kind: OperationKind,
    direction: Direction,
    amount: Money,
    idempotency_key: String,
    reference: Option<String>,
    description: Option<String>,
    actor: Actor,
    linked_transaction_id: Option<TransactionId>,
}

/// Entry point for every wallet operation.
pub struct WalletEngine {
    pub(super) store: Arc<dyn WalletStore>,
    pub(super) idempotency: IdempotencyTracker,
    pub(super) locks: Arc<dyn LockProvider>,
    profiles: Arc<dyn PlayerProfileProvider>,
    gate: ComplianceGate,
    pub(super) lock_config: LockConfig,
    pub(super) approval_config: ApprovalConfig,
    pub(super) balances: BalanceCache,
}

impl std::fmt::Debug for WalletEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletEngine")
            .field("gate", &self.gate)
            .field("lock_config", &self.lock_config)
            .field("approval_config", &self.approval_config)
            .finish_non_exhaustive()
    }
}

impl WalletEngine {
    /// Wires an engine over its collaborators.
    #[must_use]
    pub fn new(
        config: &WalletConfig,
        store: Arc<dyn WalletStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        locks: Arc<dyn LockProvider>,
        profiles: Arc<dyn PlayerProfileProvider>,
    ) -> Self {
        Self {
            store,
            idempotency: IdempotencyTracker::new(idempotency, config.idempotency.ttl()),
            locks,
            profiles,
            gate: ComplianceGate::new(config.compliance.clone()),
            lock_config: config.lock,
            approval_config: config.approval,
            balances: BalanceCache::new(&config.balance_cache),
        }
    }

    /// The compliance gate in use.
    #[must_use]
    pub const fn gate(&self) -> &ComplianceGate {
        &self.gate
    }

    /// Background sweeps sharing this engine's store, locks and cache.
    #[must_use]
    pub fn maintenance(&self, batch_size: u32) -> MaintenanceService {
        MaintenanceService::new(
            Arc::clone(&self.store),
            self.idempotency.clone(),
            Arc::clone(&self.locks),
            self.lock_config,
            batch_size,
        )
        .with_balance_cache(self.balances.clone())
    }

    // ========================================================================
    // Balance-affecting operations
    // ========================================================================

    /// Credits a confirmed purchase.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, amount = %request.amount))]
    pub async fn deposit(
        &self,
        request: DepositRequest,
        actor: Actor,
    ) -> Result<WalletTransaction, WalletError> {
        authorize(actor.can_act_for(request.user_id), "deposit for another player")?;
        IdempotencyTracker::validate_key(&request.idempotency_key)?;
        require_positive(request.amount)?;
        let reference = required_text(&request.payment_reference, "payment reference")?;

        self.execute(Operation {
            user_id: request.user_id,
            currency: request.currency,
            kind: OperationKind::Deposit,
            direction: Direction::Credit,
            amount: request.amount,
            idempotency_key: request.idempotency_key,
            reference: Some(reference),
            description: None,
            actor,
            linked_transaction_id: None,
        })
        .await
    }

    /// Grants promotional credit.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, amount = %request.amount))]
    pub async fn grant_bonus(
        &self,
        request: BonusRequest,
        actor: Actor,
    ) -> Result<WalletTransaction, WalletError> {
        authorize(actor.can_grant_bonus(), "grant bonuses")?;
        // A derived key carries the promotion reference and must pass the same rules.
        let idempotency_key = request.effective_key();
        IdempotencyTracker::validate_key(&idempotency_key)?;
        require_positive(request.amount)?;
        let reference = required_text(&request.promotion_reference, "promotion reference")?;
        let reason = required_text(&request.reason, "bonus reason")?;

        self.execute(Operation {
            user_id: request.user_id,
            currency: request.currency,
            kind: OperationKind::Bonus,
            direction: Direction::Credit,
            amount: request.amount,
            idempotency_key,
            reference: Some(reference),
            description: Some(reason),
            actor,
            linked_transaction_id: None,
        })
        .await
    }

    /// Debits a stake.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, amount = %request.amount))]
    pub async fn place_bet(
        &self,
        request: BetRequest,
        actor: Actor,
    ) -> Result<WalletTransaction, WalletError> {
        authorize(actor.can_act_for(request.user_id), "bet for another player")?;
        IdempotencyTracker::validate_key(&request.idempotency_key)?;
        require_positive(request.amount)?;
        let reference = required_text(&request.game_reference, "game reference")?;

        self.execute(Operation {
            user_id: request.user_id,
            currency: request.currency,
            kind: OperationKind::Bet,
            direction: Direction::Debit,
            amount: request.amount,
            idempotency_key: request.idempotency_key,
            reference: Some(reference),
            description: None,
            actor,
            linked_transaction_id: None,
        })
        .await
    }

    /// Credits a game payout. Players cannot credit their own wins.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, amount = %request.amount))]
    pub async fn credit_win(
        &self,
        request: WinRequest,
        actor: Actor,
    ) -> Result<WalletTransaction, WalletError> {
        authorize(
            !matches!(actor, Actor::Player { .. }),
            "credit wins; wins are reported by the game platform",
        )?;
        IdempotencyTracker::validate_key(&request.idempotency_key)?;
        require_positive(request.amount)?;
        let reference = required_text(&request.game_reference, "game reference")?;

        self.execute(Operation {
            user_id: request.user_id,
            currency: request.currency,
            kind: OperationKind::Win,
            direction: Direction::Credit,
            amount: request.amount,
            idempotency_key: request.idempotency_key,
            reference: Some(reference),
            description: None,
            actor,
            linked_transaction_id: request.linked_bet_id,
        })
        .await
    }

    /// Redeems promotional currency, or parks the request for approval.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, amount = %request.amount))]
    pub async fn withdraw(
        &self,
        request: WithdrawalRequest,
        actor: Actor,
    ) -> Result<WalletTransaction, WalletError> {
        authorize(actor.can_act_for(request.user_id), "withdraw for another player")?;
        IdempotencyTracker::validate_key(&request.idempotency_key)?;
        require_positive(request.amount)?;
        let method = required_text(&request.payment_method, "payment method")?;

        self.execute(Operation {
            user_id: request.user_id,
            currency: request.currency,
            kind: OperationKind::Withdrawal,
            direction: Direction::Debit,
            amount: request.amount,
            idempotency_key: request.idempotency_key,
            reference: Some(method),
            description: None,
            actor,
            linked_transaction_id: None,
        })
        .await
    }

    /// Posts a signed manual correction.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, amount = %request.amount))]
    pub async fn adjust(
        &self,
        request: AdjustmentRequest,
        actor: Actor,
    ) -> Result<WalletTransaction, WalletError> {
        authorize(actor.can_correct(), "post adjustments")?;
        IdempotencyTracker::validate_key(&request.idempotency_key)?;
        if request.amount.is_zero() {
            return Err(WalletError::Validation(
                "adjustment amount cannot be zero".to_string(),
            ));
        }
        let reason = required_text(&request.reason, "adjustment reason")?;
        let direction = if request.amount.is_negative() {
            Direction::Debit
        } else {
            Direction::Credit
        };

        self.execute(Operation {
            user_id: request.user_id,
            currency: request.currency,
            kind: OperationKind::Adjustment,
            direction,
            amount: request.amount.abs(),
            idempotency_key: request.idempotency_key,
            reference: None,
            description: Some(reason),
            actor,
            linked_transaction_id: None,
        })
        .await
    }

    /// Posts the inverse of a completed transaction. Each transaction can be
    /// reversed once.
    #[instrument(skip(self, request), fields(transaction_id = %request.transaction_id))]
    pub async fn reverse(
        &self,
        request: ReversalRequest,
        actor: Actor,
    ) -> Result<WalletTransaction, WalletError> {
        authorize(actor.can_correct(), "reverse transactions")?;
        IdempotencyTracker::validate_key(&request.idempotency_key)?;
        let reason = required_text(&request.reason, "reversal reason")?;
        let original = self.load_transaction(request.transaction_id).await?;

        self.execute(Operation {
            user_id: original.user_id,
            currency: original.currency,
            kind: OperationKind::Reversal,
            direction: original.direction.inverse(),
            amount: original.amount,
            idempotency_key: request.idempotency_key,
            reference: None,
            description: Some(reason),
            actor,
            linked_transaction_id: Some(original.id),
        })
        .await
    }

    // ========================================================================
    // Account administration
    // ========================================================================

    /// Opens both currency accounts for a player who passes the age check.
    ///
    /// Opening an existing wallet returns the stored accounts.
    #[instrument(skip(self))]
    pub async fn open_wallet(
        &self,
        user_id: UserId,
        actor: Actor,
    ) -> Result<Vec<Account>, WalletError> {
        authorize(actor.can_act_for(user_id), "open a wallet for another player")?;
        let now = Utc::now();
        let profile = self.profiles.profile(user_id).await?;
        self.check_age(&profile, now)?;

        let mut accounts = Vec::with_capacity(Currency::ALL.len());
        for currency in Currency::ALL {
            accounts.push(
                self.store
                    .create_account(Account::open(user_id, currency, now))
                    .await?,
            );
        }
        info!(%user_id, "Wallet opened");
        Ok(accounts)
    }

    /// Freezes an account; `None` freezes until explicitly lifted.
    #[instrument(skip(self, reason))]
    pub async fn freeze_account(
        &self,
        user_id: UserId,
        currency: Currency,
        until: Option<DateTime<Utc>>,
        reason: &str,
        actor: Actor,
    ) -> Result<Account, WalletError> {
        authorize(actor.can_correct(), "freeze accounts")?;
        let reason = required_text(reason, "freeze reason")?;
        let until = until.unwrap_or_else(indefinite_freeze);

        let frozen = with_user_lock(self.locks.as_ref(), &self.lock_config, user_id, || async {
            let account = self.find_existing_account(user_id, currency).await?;
            let next =
                AccountService::freeze(&account, until, &reason, account.version, Utc::now())?;
            self.store
                .commit(Commit::new().account(AccountWrite::update(next.clone(), account.version)))
                .await?;
            Ok::<_, WalletError>(next)
        })
        .await?;
        self.balances.invalidate(user_id);
        warn!(%user_id, %currency, %until, %actor, reason = %reason, "Account frozen");
        Ok(frozen)
    }

    /// Lifts any freeze on an account.
    #[instrument(skip(self))]
    pub async fn unfreeze_account(
        &self,
        user_id: UserId,
        currency: Currency,
        actor: Actor,
    ) -> Result<Account, WalletError> {
        authorize(actor.can_correct(), "unfreeze accounts")?;

        let account = with_user_lock(self.locks.as_ref(), &self.lock_config, user_id, || async {
            let account = self.find_existing_account(user_id, currency).await?;
            let next = AccountService::unfreeze(&account, account.version, Utc::now())?;
            self.store
                .commit(Commit::new().account(AccountWrite::update(next.clone(), account.version)))
                .await?;
            Ok::<_, WalletError>(next)
        })
        .await?;
        self.balances.invalidate(user_id);
        info!(%user_id, %currency, %actor, "Account unfrozen");
        Ok(account)
    }

    /// Compares an account's balance with its ledger; freezes it on drift.
    ///
    /// # Errors
    ///
    /// `LedgerIntegrityViolation` when the two disagree.
    #[instrument(skip(self))]
    pub async fn reconcile_account(
        &self,
        account_id: AccountId,
    ) -> Result<Reconciliation, WalletError> {
        let account = self.load_account(account_id).await?;
        let result = with_user_lock(
            self.locks.as_ref(),
            &self.lock_config,
            account.user_id,
            || reconcile_locked(self.store.as_ref(), account_id, Utc::now()),
        )
        .await;
        if result.is_err() {
            self.balances.invalidate(account.user_id);
        }
        result
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Both balances for a player; unopened accounts read as zero.
    pub async fn get_balance(&self, user_id: UserId) -> Result<WalletBalance, WalletError> {
        if let Some(balance) = self.balances.get(user_id) {
            return Ok(balance);
        }
        let generation = self.balances.generation(user_id);
        let play = self.store.find_account(user_id, Currency::Play).await?;
        let promo = self.store.find_account(user_id, Currency::Promo).await?;
        let balance = WalletBalance {
            user_id,
            play: play.as_ref().map_or(CurrencyBalance::EMPTY, CurrencyBalance::from),
            promo: promo.as_ref().map_or(CurrencyBalance::EMPTY, CurrencyBalance::from),
        };
        self.balances.insert_if_current(balance, generation);
        Ok(balance)
    }

    /// The stored account for a player and currency.
    pub async fn get_account(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Account, WalletError> {
        self.find_existing_account(user_id, currency).await
    }

    /// A transaction by id.
    pub async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<WalletTransaction, WalletError> {
        self.load_transaction(id).await
    }

    /// A player's transactions, newest first.
    pub async fn transactions_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<PageResponse<WalletTransaction>, WalletError> {
        Ok(self.store.user_transactions(user_id, page).await?)
    }

    /// Ledger entries for an account, oldest first.
    pub async fn ledger_entries(
        &self,
        account_id: AccountId,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<PageResponse<LedgerEntry>, WalletError> {
        Ok(self.store.ledger_entries(account_id, range, page).await?)
    }

    /// A workflow by id.
    pub async fn get_workflow(&self, id: WorkflowId) -> Result<ApprovalWorkflow, WalletError> {
        self.load_workflow(id).await
    }

    // ========================================================================
    // Execution protocol
    // ========================================================================

    async fn execute(&self, op: Operation) -> Result<WalletTransaction, WalletError> {
        let started = Instant::now();
        match self
            .idempotency
            .check_and_reserve(&op.idempotency_key, Utc::now())
            .await?
        {
            Reservation::Replay(outcome) => return self.replay(&op, outcome).await,
            Reservation::New => {}
        }

        let result = with_user_lock(self.locks.as_ref(), &self.lock_config, op.user_id, || {
            self.run_with_retry(&op)
        })
        .await;
        self.settle(&op, &result).await;

        match &result {
            Ok(tx) => info!(
                transaction_id = %tx.id,
                kind = %tx.kind,
                status = %tx.status,
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Wallet operation processed"
            ),
            Err(err) => warn!(
                kind = %op.kind,
                error_code = err.error_code(),
                error = %err,
                "Wallet operation refused"
            ),
        }
        result
    }

    /// Returns the first outcome recorded under the key, provided the key was
    /// first used for this same request.
    async fn replay(
        &self,
        op: &Operation,
        outcome: IdempotencyOutcome,
    ) -> Result<WalletTransaction, WalletError> {
        match outcome {
            IdempotencyOutcome::Transaction(id) => {
                let tx = self.load_transaction(id).await?;
                ensure_same_request(op, RequestFingerprint::of_transaction(&tx))?;
                if tx.status == TransactionStatus::Failed {
                    return Err(WalletError::ExecutionFailed {
                        transaction_id: tx.id,
                        reason: tx.failure_reason.unwrap_or_default(),
                    });
                }
                Ok(tx)
            }
            IdempotencyOutcome::Refused(payload) => {
                let recorded: RecordedRefusal = serde_json::from_value(payload).map_err(|e| {
                    WalletError::Internal(format!("unreadable recorded refusal: {e}"))
                })?;
                ensure_same_request(op, recorded.request)?;
                Err(recorded.refusal.into_error())
            }
        }
    }

    /// Records the outcome, or gives the key back after a transient failure.
    async fn settle(&self, op: &Operation, result: &Result<WalletTransaction, WalletError>) {
        let key = op.idempotency_key.as_str();
        let outcome = match result {
            Ok(tx) => Some(IdempotencyOutcome::Transaction(tx.id)),
            Err(WalletError::ExecutionFailed { transaction_id, .. }) => {
                Some(IdempotencyOutcome::Transaction(*transaction_id))
            }
            Err(err) => Refusal::from_error(err)
                .map(|refusal| RecordedRefusal {
                    request: op.fingerprint(),
                    refusal,
                })
                .and_then(|recorded| serde_json::to_value(recorded).ok())
                .map(IdempotencyOutcome::Refused),
        };
        let settled = match outcome {
            Some(outcome) => self.idempotency.record_outcome(key, outcome).await,
            None => self.idempotency.release(key).await,
        };
        if let Err(err) = settled {
            warn!(key, error = %err, "Failed to settle idempotency key");
        }
    }

    async fn run_with_retry(&self, op: &Operation) -> Result<WalletTransaction, WalletError> {
        match self.run_locked(op).await {
            Err(WalletError::OptimisticConflict(reason)) => {
                debug!(reason = %reason, "Concurrent modification, retrying once");
                self.run_locked(op).await
            }
            other => other,
        }
    }

    async fn run_locked(&self, op: &Operation) -> Result<WalletTransaction, WalletError> {
        let now = Utc::now();
        let profile = self.profiles.profile(op.user_id).await?;
        let (account, is_new) = self.load_or_open(op.user_id, op.currency, &profile, now).await?;
        let view = AccountService::current_day_view(&account, now);
        if let Some(until) = view.frozen_until.filter(|until| *until > now) {
            return Err(WalletError::AccountFrozen { until });
        }
        let original = self.check_links(op).await?;

        match self.evaluate(op, &profile, &view, now) {
            Decision::Allow => {}
            Decision::Deny { code, message } => {
                return Err(WalletError::Compliance { code, message });
            }
            Decision::RequireApproval(approval_type) => {
                return self
                    .park(op, &account, &view, is_new, approval_type, now)
                    .await;
            }
        }

        let tx = new_transaction(op, view.id, now);
        let after = apply_movement(&view, op.direction, op.amount, now)?;
        let after = AccountService::record_activity(after, op.kind, op.amount);
        let entry = LedgerService::build_entry(&tx, &view, &after, &ledger_reason(&tx), now)?;
        let completed = tx.complete(view.balance, after.balance, now)?;

        let mut commit = Commit::new()
            .account(account_write(after, &account, is_new))
            .ledger(entry)
            .transaction(completed.clone());
        if let Some(original) = original {
            commit = commit.transaction(original.mark_reversed(completed.id));
        }
        self.commit_or_fail(commit, &tx, now).await?;
        self.balances.invalidate(op.user_id);
        Ok(completed)
    }

    /// Parks the operation behind a new workflow. Debits hold their amount
    /// so it cannot be spent while approval is pending. Limited kinds count
    /// toward today's total now, so later requests see them.
    async fn park(
        &self,
        op: &Operation,
        account: &Account,
        view: &Account,
        is_new: bool,
        approval_type: ApprovalType,
        now: DateTime<Utc>,
    ) -> Result<WalletTransaction, WalletError> {
        let tx = new_transaction(op, view.id, now);
        let workflow = WorkflowService::open(&tx, approval_type, &self.approval_config, now);
        let parked = tx.park(workflow.id)?;

        let mut commit = Commit::new()
            .transaction(parked.clone())
            .workflow(WorkflowWrite::insert(workflow.clone()));
        let counts_daily = AccountService::has_daily_limit(op.kind);
        match op.direction {
            Direction::Debit => {
                let held = AccountService::hold(view, op.amount, view.version, now)?;
                let held = AccountService::record_daily(held, op.kind, op.amount);
                commit = commit.account(account_write(held, account, is_new));
            }
            Direction::Credit if counts_daily => {
                let counted = AccountService::reserve_daily_allowance(
                    view,
                    op.kind,
                    op.amount,
                    view.version,
                    now,
                )?;
                commit = commit.account(account_write(counted, account, is_new));
            }
            Direction::Credit if is_new => {
                commit = commit.account(AccountWrite::insert(view.clone()));
            }
            Direction::Credit => {}
        }
        self.commit_or_fail(commit, &tx, now).await?;
        self.balances.invalidate(op.user_id);

        info!(
            transaction_id = %parked.id,
            workflow_id = %workflow.id,
            approval_type = approval_type.as_str(),
            expires_at = %workflow.expires_at,
            "Operation parked for approval"
        );
        Ok(parked)
    }

    /// Commits, persisting a `Failed` transaction if the store rejects the
    /// write for any reason other than a version conflict.
    async fn commit_or_fail(
        &self,
        commit: Commit,
        tx: &WalletTransaction,
        now: DateTime<Utc>,
    ) -> Result<(), WalletError> {
        let Err(err) = self.store.commit(commit).await else {
            return Ok(());
        };
        if err.is_conflict() {
            return Err(err.into());
        }

        error!(transaction_id = %tx.id, error = %err, "Wallet commit failed");
        let reason = err.to_string();
        let failed = tx.fail(&reason, now)?;
        if let Err(persist_err) = self.store.commit(Commit::new().transaction(failed)).await {
            error!(
                transaction_id = %tx.id,
                error = %persist_err,
                "Could not record failed transaction"
            );
            return Err(err.into());
        }
        Err(WalletError::ExecutionFailed {
            transaction_id: tx.id,
            reason,
        })
    }

    async fn load_or_open(
        &self,
        user_id: UserId,
        currency: Currency,
        profile: &PlayerProfile,
        now: DateTime<Utc>,
    ) -> Result<(Account, bool), WalletError> {
        if let Some(account) = self.store.find_account(user_id, currency).await? {
            return Ok((account, false));
        }
        self.check_age(profile, now)?;
        Ok((Account::open(user_id, currency, now), true))
    }

    fn check_age(&self, profile: &PlayerProfile, now: DateTime<Utc>) -> Result<(), WalletError> {
        match self.gate.check_age(profile.date_of_birth, now.date_naive()) {
            Decision::Deny { code, message } => Err(WalletError::Compliance { code, message }),
            _ => Ok(()),
        }
    }

    /// Validates the linked transaction. Returns the original for reversals.
    async fn check_links(&self, op: &Operation) -> Result<Option<WalletTransaction>, WalletError> {
        let Some(linked_id) = op.linked_transaction_id else {
            return Ok(None);
        };
        let linked = self.load_transaction(linked_id).await?;
        match op.kind {
            OperationKind::Reversal => {
                if !linked.is_reversible() {
                    return Err(WalletError::Validation(format!(
                        "transaction {linked_id} cannot be reversed"
                    )));
                }
                Ok(Some(linked))
            }
            OperationKind::Win => {
                let settles = linked.kind == OperationKind::Bet
                    && linked.status == TransactionStatus::Completed
                    && linked.user_id == op.user_id
                    && linked.currency == op.currency;
                if !settles {
                    return Err(WalletError::Validation(format!(
                        "transaction {linked_id} is not a completed {} bet by this player",
                        op.currency
                    )));
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn evaluate(
        &self,
        op: &Operation,
        profile: &PlayerProfile,
        view: &Account,
        now: DateTime<Utc>,
    ) -> Decision {
        // Reversals restore a prior state and are never gated.
        if op.kind == OperationKind::Reversal {
            return Decision::Allow;
        }
        let daily_total = match op.kind {
            OperationKind::Deposit => view.daily_deposit_total,
            OperationKind::Withdrawal => view.daily_withdrawal_total,
            _ => Money::ZERO,
        };
        self.gate.evaluate(&ComplianceCheck {
            kind: op.kind,
            currency: op.currency,
            amount: op.amount,
            kyc_status: profile.kyc_status,
            jurisdiction: profile.jurisdiction.as_deref(),
            self_excluded_until: profile.self_excluded_until,
            daily_total,
            session_loss: profile.session_loss(op.currency),
            now,
        })
    }

    // ========================================================================
    // Loaders
    // ========================================================================

    pub(super) async fn load_transaction(
        &self,
        id: TransactionId,
    ) -> Result<WalletTransaction, WalletError> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or_else(|| WalletError::NotFound(format!("transaction {id}")))
    }

    pub(super) async fn load_workflow(
        &self,
        id: WorkflowId,
    ) -> Result<ApprovalWorkflow, WalletError> {
        self.store
            .get_workflow(id)
            .await?
            .ok_or_else(|| WalletError::NotFound(format!("workflow {id}")))
    }

    pub(super) async fn load_account(&self, id: AccountId) -> Result<Account, WalletError> {
        self.store
            .get_account(id)
            .await?
            .ok_or_else(|| WalletError::NotFound(format!("account {id}")))
    }

    async fn find_existing_account(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Account, WalletError> {
        self.store
            .find_account(user_id, currency)
            .await?
            .ok_or_else(|| WalletError::NotFound(format!("{currency} account for user {user_id}")))
    }
}

fn authorize(allowed: bool, action: &str) -> Result<(), WalletError> {
    if allowed {
        Ok(())
    } else {
        Err(WalletError::Forbidden(format!("not allowed to {action}")))
    }
}

fn require_positive(amount: Money) -> Result<(), WalletError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(WalletError::Validation(format!(
            "amount must be positive, got {amount}"
        )))
    }
}

fn required_text(value: &str, field: &str) -> Result<String, WalletError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(WalletError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

impl Operation {
    const fn fingerprint(&self) -> RequestFingerprint {
        RequestFingerprint {
            user_id: self.user_id,
            kind: self.kind,
            direction: self.direction,
            currency: self.currency,
            amount: self.amount,
        }
    }
}

fn ensure_same_request(op: &Operation, first: RequestFingerprint) -> Result<(), WalletError> {
    if first == op.fingerprint() {
        return Ok(());
    }
    warn!(
        key = %op.idempotency_key,
        user_id = %op.user_id,
        kind = %op.kind,
        "Idempotency key reused for a different request"
    );
    Err(WalletError::IdempotencyKeyReused(op.idempotency_key.clone()))
}

fn new_transaction(op: &Operation, account_id: AccountId, now: DateTime<Utc>) -> WalletTransaction {
    WalletTransaction::pending(
        NewTransaction {
            user_id: op.user_id,
            account_id,
            currency: op.currency,
            kind: op.kind,
            direction: op.direction,
            amount: op.amount,
            idempotency_key: Some(op.idempotency_key.clone()),
            reference: op.reference.clone(),
            description: op.description.clone(),
            actor: op.actor,
            linked_transaction_id: op.linked_transaction_id,
        },
        now,
    )
}

fn apply_movement(
    account: &Account,
    direction: Direction,
    amount: Money,
    now: DateTime<Utc>,
) -> Result<Account, AccountError> {
    match direction {
        Direction::Credit => AccountService::credit(account, amount, account.version, now),
        Direction::Debit => AccountService::debit(account, amount, account.version, now),
    }
}

fn account_write(next: Account, read: &Account, is_new: bool) -> AccountWrite {
    if is_new {
        AccountWrite::insert(next)
    } else {
        AccountWrite::update(next, read.version)
    }
}

/// Ledger reason: the transaction's description, else its kind.
pub(super) fn ledger_reason(tx: &WalletTransaction) -> String {
    tx.description
        .clone()
        .unwrap_or_else(|| tx.kind.as_str().to_lowercase())
}
