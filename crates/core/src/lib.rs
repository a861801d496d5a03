//! Core business logic for Wagerly.
//!
//! This crate contains the wallet engine and its pure domain logic with
//! ZERO web or database dependencies. Persistence, locking and player
//! profiles sit behind traits; in-memory implementations back the tests.
//!
//! # Modules
//!
//! - `account` - Balance split, holds, freezes and daily totals
//! - `ledger` - Append-only entries and reconciliation
//! - `transaction` - Wallet transactions and their lifecycle
//! - `compliance` - The gate every operation passes before execution
//! - `workflow` - Dual and triple approval workflows
//! - `idempotency` - Exactly-once delivery of client operations
//! - `lock` - Per-user exclusive locks with leases
//! - `store` - Atomic persistence contract
//! - `engine` - The operations themselves and background sweeps

pub mod account;
pub mod actor;
pub mod compliance;
pub mod engine;
pub mod idempotency;
pub mod ledger;
pub mod lock;
pub mod profile;
pub mod store;
pub mod transaction;
pub mod workflow;

pub use actor::{Actor, StaffRole};
pub use engine::{WalletEngine, WalletError};
