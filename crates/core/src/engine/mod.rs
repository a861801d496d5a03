//! Wallet engine: the single entry point for balance-affecting operations.
//!
//! The engine owns the execution protocol (idempotency, per-user locking,
//! compliance, atomic commit) and the side effects of approval decisions.
//! Pure state transitions live in `account`, `ledger` and `workflow`; the
//! engine only sequences them and persists the result.

pub mod approval;
pub mod cache;
pub mod error;
pub mod maintenance;
pub mod refusal;
pub mod requests;
pub mod service;

pub use cache::{BalanceCache, CurrencyBalance, WalletBalance};
pub use error::WalletError;
pub use maintenance::{MaintenanceService, ReconciliationReport, SweepReport};
pub use refusal::{RecordedRefusal, Refusal, RequestFingerprint};
pub use requests::{
    AdjustmentRequest, BetRequest, BonusRequest, DepositRequest, ReversalRequest, WinRequest,
    WithdrawalRequest,
};
pub use service::WalletEngine;
