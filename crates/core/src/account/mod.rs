//! Per-user, per-currency wallet accounts.
//!
//! An account is the mutable balance projection; the ledger is the record
//! it must always agree with. Every transition here is pure and
//! version-checked, and returns the next account state for the store to
//! persist with a compare-and-set on the previous version.

pub mod error;
pub mod service;
pub mod types;

#[cfg(test)]
mod service_props;

pub use error::AccountError;
pub use service::AccountService;
pub use types::Account;
