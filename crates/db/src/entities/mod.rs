//! `SeaORM` entity definitions for the wallet schema.

pub mod accounts;
pub mod approval_workflows;
pub mod idempotency_keys;
pub mod ledger_entries;
pub mod wallet_transactions;
