//! Append-only audit ledger.
//!
//! This module implements the ledger side of the wallet:
//! - Immutable ledger entries with before/after balance snapshots
//! - Entry construction that verifies the snapshot arithmetic
//! - Chain verification and reconciliation against live balances
//!
//! It knows nothing about locking or compliance.

pub mod entry;
pub mod error;
pub mod service;

#[cfg(test)]
mod service_props;

pub use entry::{LedgerEntry, TimeRange};
pub use error::LedgerError;
pub use service::{LedgerService, Reconciliation};
