//! Shared types and configuration for Wagerly.
//!
//! This crate provides the vocabulary every other crate builds on:
//! - Fixed-point `Money` and the dual `Currency` enum
//! - Typed IDs for type-safe entity references
//! - Pagination types for ledger and history queries
//! - Configuration management

pub mod config;
pub mod types;

pub use config::AppConfig;
pub use types::{Currency, Money, MoneyError};
