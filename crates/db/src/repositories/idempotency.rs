//! Postgres-backed `IdempotencyStore`.
//!
//! Reservation is a single `INSERT ... ON CONFLICT DO UPDATE ... WHERE`
//! statement: it either claims a free or expired key or touches nothing,
//! so two racing callers can never both reserve the same key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait, QueryFilter,
    Statement,
};
use tracing::debug;
use wagerly_core::idempotency::{
    IdempotencyError, IdempotencyOutcome, IdempotencyStore, ReserveAttempt,
};

use crate::convert::{self, COMPLETED, IN_FLIGHT};
use crate::entities::idempotency_keys;

/// Claims `$1` unless a live record holds it; returns a row only on success.
const RESERVE_SQL: &str = r"
INSERT INTO idempotency_keys (key, state, outcome, created_at, expires_at)
VALUES ($1, 'IN_FLIGHT', NULL, $2, $3)
ON CONFLICT (key) DO UPDATE
    SET state = 'IN_FLIGHT',
        outcome = NULL,
        created_at = EXCLUDED.created_at,
        expires_at = EXCLUDED.expires_at
    WHERE idempotency_keys.expires_at <= EXCLUDED.created_at
RETURNING key
";

/// A key released between the insert and the read is retried this often.
const RESERVE_ATTEMPTS: usize = 3;

fn store_err(err: DbErr) -> IdempotencyError {
    IdempotencyError::Store(err.to_string())
}

/// Idempotency keys in Postgres.
#[derive(Debug, Clone)]
pub struct PgIdempotencyStore {
    db: DatabaseConnection,
}

impl PgIdempotencyStore {
    /// Creates a new store over `db`.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn reserve(
        &self,
        key: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<ReserveAttempt, IdempotencyError> {
        for _ in 0..RESERVE_ATTEMPTS {
            let claimed = self
                .db
                .query_one(Statement::from_sql_and_values(
                    DbBackend::Postgres,
                    RESERVE_SQL,
                    [key.into(), now.into(), expires_at.into()],
                ))
                .await
                .map_err(store_err)?;
            if claimed.is_some() {
                return Ok(ReserveAttempt::Reserved);
            }

            let existing = idempotency_keys::Entity::find_by_id(key.to_string())
                .one(&self.db)
                .await
                .map_err(store_err)?;
            if let Some(row) = existing {
                return Ok(ReserveAttempt::Existing(convert::into_idempotency_record(
                    row,
                )?));
            }
            debug!(key, "Idempotency key released during reservation, retrying");
        }
        Err(IdempotencyError::Store(format!(
            "could not reserve key {key}"
        )))
    }

    async fn complete(
        &self,
        key: &str,
        outcome: IdempotencyOutcome,
    ) -> Result<(), IdempotencyError> {
        let outcome = serde_json::to_value(&outcome)
            .map_err(|err| IdempotencyError::Store(format!("invalid outcome: {err}")))?;
        let result = idempotency_keys::Entity::update_many()
            .col_expr(idempotency_keys::Column::State, Expr::value(COMPLETED))
            .col_expr(idempotency_keys::Column::Outcome, Expr::value(outcome))
            .filter(idempotency_keys::Column::Key.eq(key))
            .exec(&self.db)
            .await
            .map_err(store_err)?;
        if result.rows_affected == 0 {
            return Err(IdempotencyError::Store(format!(
                "no reservation for key {key}"
            )));
        }
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), IdempotencyError> {
        idempotency_keys::Entity::delete_many()
            .filter(idempotency_keys::Column::Key.eq(key))
            .filter(idempotency_keys::Column::State.eq(IN_FLIGHT))
            .exec(&self.db)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, IdempotencyError> {
        let result = idempotency_keys::Entity::delete_many()
            .filter(idempotency_keys::Column::ExpiresAt.lte(convert::tz(now)))
            .exec(&self.db)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected)
    }
}
