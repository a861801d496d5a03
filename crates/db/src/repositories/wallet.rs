//! Postgres-backed `WalletStore`.
//!
//! Each `Commit` runs in one database transaction. Versioned rows are
//! written with `UPDATE ... WHERE version = expected`; zero affected rows
//! means a concurrent writer won and the whole commit rolls back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, SqlErr, TransactionTrait,
};
use tracing::{debug, instrument};
use wagerly_core::account::Account;
use wagerly_core::ledger::{LedgerEntry, TimeRange};
use wagerly_core::store::{AccountWrite, Commit, StoreError, WalletStore, WorkflowWrite};
use wagerly_core::transaction::WalletTransaction;
use wagerly_core::workflow::{ApprovalWorkflow, WorkflowStatus};
use wagerly_shared::types::{
    AccountId, Currency, Money, PageRequest, PageResponse, TransactionId, UserId, WorkflowId,
};

use crate::convert;
use crate::entities::{
    accounts, approval_workflows, ledger_entries, wallet_transactions,
};

fn db_err(err: DbErr) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Wallet state in Postgres.
#[derive(Debug, Clone)]
pub struct PgWalletStore {
    db: DatabaseConnection,
}

impl PgWalletStore {
    /// Creates a new store over `db`.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn write_account<C: ConnectionTrait>(
        conn: &C,
        write: &AccountWrite,
    ) -> Result<(), StoreError> {
        let account = &write.account;
        let model = convert::account_model(account);
        let conflict = |expected| StoreError::VersionConflict {
            entity: "account",
            id: account.id.to_string(),
            expected,
        };
        match write.expected_version {
            None => {
                accounts::Entity::insert(model)
                    .exec_without_returning(conn)
                    .await
                    .map_err(|err| {
                        // Someone opened the (user, currency) pair first.
                        if is_unique_violation(&err) {
                            conflict(0)
                        } else {
                            db_err(err)
                        }
                    })?;
            }
            Some(expected) => {
                let result = accounts::Entity::update_many()
                    .set(model)
                    .filter(accounts::Column::Id.eq(account.id.into_inner()))
                    .filter(accounts::Column::Version.eq(expected))
                    .exec(conn)
                    .await
                    .map_err(db_err)?;
                if result.rows_affected == 0 {
                    return Err(conflict(expected));
                }
            }
        }
        Ok(())
    }

    async fn write_transaction<C: ConnectionTrait>(
        conn: &C,
        tx: &WalletTransaction,
    ) -> Result<(), StoreError> {
        // Identity columns never change; only lifecycle columns are updated.
        let on_conflict = OnConflict::column(wallet_transactions::Column::Id)
            .update_columns([
                wallet_transactions::Column::Status,
                wallet_transactions::Column::BalanceBefore,
                wallet_transactions::Column::BalanceAfter,
                wallet_transactions::Column::WorkflowId,
                wallet_transactions::Column::ReversedBy,
                wallet_transactions::Column::FailureReason,
                wallet_transactions::Column::ProcessedAt,
            ])
            .to_owned();
        wallet_transactions::Entity::insert(convert::transaction_model(tx))
            .on_conflict(on_conflict)
            .exec_without_returning(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn write_ledger_entry<C: ConnectionTrait>(
        conn: &C,
        entry: &LedgerEntry,
    ) -> Result<(), StoreError> {
        ledger_entries::Entity::insert(convert::ledger_entry_model(entry))
            .exec_without_returning(conn)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::Duplicate {
                        entity: "ledger_entry",
                        id: entry.id.to_string(),
                    }
                } else {
                    db_err(err)
                }
            })?;
        Ok(())
    }

    async fn write_workflow<C: ConnectionTrait>(
        conn: &C,
        write: &WorkflowWrite,
    ) -> Result<(), StoreError> {
        let workflow = &write.workflow;
        let model = convert::workflow_model(workflow)?;
        match write.expected_version {
            None => {
                approval_workflows::Entity::insert(model)
                    .exec_without_returning(conn)
                    .await
                    .map_err(|err| {
                        if is_unique_violation(&err) {
                            StoreError::Duplicate {
                                entity: "workflow",
                                id: workflow.id.to_string(),
                            }
                        } else {
                            db_err(err)
                        }
                    })?;
            }
            Some(expected) => {
                let result = approval_workflows::Entity::update_many()
                    .set(model)
                    .filter(approval_workflows::Column::Id.eq(workflow.id.into_inner()))
                    .filter(approval_workflows::Column::Version.eq(expected))
                    .exec(conn)
                    .await
                    .map_err(db_err)?;
                if result.rows_affected == 0 {
                    return Err(StoreError::VersionConflict {
                        entity: "workflow",
                        id: workflow.id.to_string(),
                        expected,
                    });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WalletStore for PgWalletStore {
    async fn find_account(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Option<Account>, StoreError> {
        accounts::Entity::find()
            .filter(accounts::Column::UserId.eq(user_id.into_inner()))
            .filter(accounts::Column::Currency.eq(currency.as_str()))
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(convert::into_account)
            .transpose()
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        accounts::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(convert::into_account)
            .transpose()
    }

    async fn create_account(&self, account: Account) -> Result<Account, StoreError> {
        let on_conflict =
            OnConflict::columns([accounts::Column::UserId, accounts::Column::Currency])
                .do_nothing()
                .to_owned();
        let inserted = accounts::Entity::insert(convert::account_model(&account))
            .on_conflict(on_conflict)
            .exec_without_returning(&self.db)
            .await
            .map_err(db_err)?;
        if inserted > 0 {
            debug!(account_id = %account.id, user_id = %account.user_id, currency = %account.currency, "Account created");
            return Ok(account);
        }
        self.find_account(account.user_id, account.currency)
            .await?
            .ok_or_else(|| StoreError::Unavailable(format!("account for {} vanished", account.user_id)))
    }

    async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<WalletTransaction>, StoreError> {
        wallet_transactions::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(convert::into_transaction)
            .transpose()
    }

    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<ApprovalWorkflow>, StoreError> {
        approval_workflows::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(convert::into_workflow)
            .transpose()
    }

    #[instrument(skip_all, fields(
        account = commit.account.is_some(),
        ledger = commit.ledger_entry.is_some(),
        transactions = commit.transactions.len(),
        workflow = commit.workflow.is_some(),
    ))]
    async fn commit(&self, commit: Commit) -> Result<(), StoreError> {
        let txn = self.db.begin().await.map_err(db_err)?;

        // Transactions go in before the ledger entry and workflow that
        // reference them. Dropping `txn` on error rolls everything back.
        if let Some(write) = &commit.account {
            Self::write_account(&txn, write).await?;
        }
        for tx in &commit.transactions {
            Self::write_transaction(&txn, tx).await?;
        }
        if let Some(entry) = &commit.ledger_entry {
            Self::write_ledger_entry(&txn, entry).await?;
        }
        if let Some(write) = &commit.workflow {
            Self::write_workflow(&txn, write).await?;
        }

        txn.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn ledger_entries(
        &self,
        account_id: AccountId,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<PageResponse<LedgerEntry>, StoreError> {
        let mut query = ledger_entries::Entity::find()
            .filter(ledger_entries::Column::AccountId.eq(account_id.into_inner()));
        if let Some(from) = range.from {
            query = query.filter(ledger_entries::Column::CreatedAt.gte(convert::tz(from)));
        }
        if let Some(to) = range.to {
            query = query.filter(ledger_entries::Column::CreatedAt.lt(convert::tz(to)));
        }

        let total = query.clone().count(&self.db).await.map_err(db_err)?;
        let rows = query
            .order_by_asc(ledger_entries::Column::CreatedAt)
            .order_by_asc(ledger_entries::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(db_err)?;

        let data = rows
            .into_iter()
            .map(convert::into_ledger_entry)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PageResponse::new(data, page, total))
    }

    async fn ledger_sum(&self, account_id: AccountId) -> Result<Money, StoreError> {
        let total: Option<Option<Decimal>> = ledger_entries::Entity::find()
            .select_only()
            .column_as(Expr::col(ledger_entries::Column::Amount).sum(), "total")
            .filter(ledger_entries::Column::AccountId.eq(account_id.into_inner()))
            .into_tuple()
            .one(&self.db)
            .await
            .map_err(db_err)?;
        Ok(Money::from(total.flatten().unwrap_or(Decimal::ZERO)))
    }

    async fn expirable_workflows(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<ApprovalWorkflow>, StoreError> {
        approval_workflows::Entity::find()
            .filter(approval_workflows::Column::Status.is_in([
                WorkflowStatus::Pending.as_str(),
                WorkflowStatus::Escalated.as_str(),
            ]))
            .filter(approval_workflows::Column::ExpiresAt.lte(convert::tz(now)))
            .order_by_asc(approval_workflows::Column::ExpiresAt)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(convert::into_workflow)
            .collect()
    }

    async fn accounts_due_for_reset(
        &self,
        day_start: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Account>, StoreError> {
        accounts::Entity::find()
            .filter(accounts::Column::DailyResetAt.lt(convert::tz(day_start)))
            .order_by_asc(accounts::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(convert::into_account)
            .collect()
    }

    async fn list_accounts(&self, page: PageRequest) -> Result<PageResponse<Account>, StoreError> {
        let query = accounts::Entity::find();
        let total = query.clone().count(&self.db).await.map_err(db_err)?;
        let data = query
            .order_by_asc(accounts::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(convert::into_account)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PageResponse::new(data, page, total))
    }

    async fn user_transactions(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<PageResponse<WalletTransaction>, StoreError> {
        let query = wallet_transactions::Entity::find()
            .filter(wallet_transactions::Column::UserId.eq(user_id.into_inner()));
        let total = query.clone().count(&self.db).await.map_err(db_err)?;
        let data = query
            .order_by_desc(wallet_transactions::Column::CreatedAt)
            .order_by_desc(wallet_transactions::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(convert::into_transaction)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PageResponse::new(data, page, total))
    }
}
