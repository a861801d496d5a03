//! Compliance gate.
//!
//! A pure decision layer over configured thresholds:
//! - Currency legality and state restrictions
//! - Self-exclusion, amount bounds and daily limits
//! - KYC and session-loss checks
//! - Dual/triple approval tiers
//!
//! The gate performs no I/O. The engine gathers the inputs and acts on
//! the decision.

pub mod age;
pub mod gate;
pub mod types;

#[cfg(test)]
mod gate_props;

pub use gate::ComplianceGate;
pub use types::{ComplianceCheck, Decision, DenyCode};
