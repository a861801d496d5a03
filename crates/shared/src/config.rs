//! Application configuration management.
//!
//! Every wallet threshold is plain data. Defaults mirror the production
//! compliance constants; any of them can be overridden from
//! `config/default.toml`, `config/{RUN_MODE}.toml` or `WAGERLY__*`
//! environment variables.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::types::Money;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Wallet engine configuration.
    #[serde(default)]
    pub wallet: WalletConfig,
    /// Background worker configuration.
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Wallet engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Compliance thresholds and per-operation rules.
    pub compliance: ComplianceConfig,
    /// Per-user lock timings.
    pub lock: LockConfig,
    /// Idempotency key retention.
    pub idempotency: IdempotencyConfig,
    /// Approval workflow expiry.
    pub approval: ApprovalConfig,
    /// Balance read cache.
    pub balance_cache: BalanceCacheConfig,
}

/// Limits that apply to one operation kind.
///
/// A `None` bound means the rule does not apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OperationRule {
    /// Smallest accepted amount.
    pub min_amount: Option<Money>,
    /// Largest accepted amount.
    pub max_amount: Option<Money>,
    /// Ceiling on today's running total including the proposed amount.
    pub daily_limit: Option<Money>,
    /// Whether the dual/triple approval thresholds apply.
    pub approval_gated: bool,
}

/// Compliance gate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Deposit rule.
    pub deposit: OperationRule,
    /// Withdrawal rule.
    pub withdrawal: OperationRule,
    /// Bet rule.
    pub bet: OperationRule,
    /// Win rule.
    pub win: OperationRule,
    /// Bonus rule.
    pub bonus: OperationRule,
    /// Manual adjustment rule.
    pub adjustment: OperationRule,
    /// Withdrawals at or above this amount need a verified KYC status.
    pub kyc_withdrawal_threshold: Money,
    /// Amounts at or above this need two approvers.
    pub dual_approval_threshold: Money,
    /// Amounts at or above this need three approvers.
    pub triple_approval_threshold: Money,
    /// Maximum session loss a bet may push a player to.
    pub session_loss_limit: Money,
    /// State codes where promotional currency may not be used.
    pub restricted_jurisdictions: Vec<String>,
    /// Minimum player age for opening a wallet.
    pub minimum_age: u32,
}

fn money(units: i64) -> Money {
    Money::normalize(Decimal::from(units))
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            deposit: OperationRule {
                min_amount: Some(money(5)),
                max_amount: Some(money(10_000)),
                daily_limit: Some(money(10_000)),
                approval_gated: true,
            },
            withdrawal: OperationRule {
                min_amount: Some(money(50)),
                max_amount: Some(money(5_000)),
                daily_limit: Some(money(5_000)),
                approval_gated: true,
            },
            bet: OperationRule::default(),
            win: OperationRule::default(),
            bonus: OperationRule::default(),
            adjustment: OperationRule {
                approval_gated: true,
                ..OperationRule::default()
            },
            kyc_withdrawal_threshold: money(50),
            dual_approval_threshold: money(500),
            triple_approval_threshold: money(10_000),
            session_loss_limit: money(500),
            restricted_jurisdictions: vec!["WA".to_string(), "ID".to_string()],
            minimum_age: 21,
        }
    }
}

impl ComplianceConfig {
    /// Returns true if `state` is in the restricted list (case-insensitive).
    #[must_use]
    pub fn is_restricted_jurisdiction(&self, state: &str) -> bool {
        let state = state.trim();
        self.restricted_jurisdictions
            .iter()
            .any(|restricted| restricted.eq_ignore_ascii_case(state))
    }
}

/// Per-user lock timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// How long an operation waits for the lock before failing.
    pub wait_ms: u64,
    /// How long a holder keeps the lock before it lapses.
    pub lease_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_ms: 5_000,
            lease_ms: 10_000,
        }
    }
}

impl LockConfig {
    /// Bounded wait as a duration.
    #[must_use]
    pub const fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    /// Lease as a duration.
    #[must_use]
    pub const fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }
}

/// Idempotency key retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// Time-to-live of a recorded key.
    pub ttl_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self { ttl_secs: 86_400 }
    }
}

impl IdempotencyConfig {
    /// TTL as a chrono duration.
    #[must_use]
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX))
    }
}

/// Approval workflow expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Lifetime of a dual-approval workflow.
    pub dual_expiry_hours: i64,
    /// Lifetime of a triple-approval workflow.
    pub triple_expiry_hours: i64,
    /// Extra time granted when a workflow is escalated.
    pub escalation_extension_hours: i64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            dual_expiry_hours: 48,
            triple_expiry_hours: 72,
            escalation_extension_hours: 24,
        }
    }
}

/// Balance read cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BalanceCacheConfig {
    /// Entry time-to-live.
    pub ttl_secs: u64,
    /// Maximum cached users.
    pub max_capacity: u64,
}

impl Default for BalanceCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 5,
            max_capacity: 100_000,
        }
    }
}

/// Background worker schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Approval expiry sweep interval.
    pub expiry_interval_secs: u64,
    /// Daily totals reset sweep interval.
    pub daily_reset_interval_secs: u64,
    /// Reconciliation sweep interval.
    pub reconciliation_interval_secs: u64,
    /// Expired idempotency key purge interval.
    pub idempotency_purge_interval_secs: u64,
    /// Rows handled per sweep pass.
    pub batch_size: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            expiry_interval_secs: 60,
            daily_reset_interval_secs: 300,
            reconciliation_interval_secs: 3_600,
            idempotency_purge_interval_secs: 3_600,
            batch_size: 100,
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("WAGERLY").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_compliance_defaults() {
        let config = ComplianceConfig::default();
        assert_eq!(config.dual_approval_threshold.amount(), dec!(500));
        assert_eq!(config.triple_approval_threshold.amount(), dec!(10000));
        assert_eq!(config.kyc_withdrawal_threshold.amount(), dec!(50));
        assert_eq!(
            config.withdrawal.min_amount.map(Money::amount),
            Some(dec!(50))
        );
        assert!(config.deposit.approval_gated);
        assert!(!config.bet.approval_gated);
        assert_eq!(config.minimum_age, 21);
    }

    #[test]
    fn test_restricted_jurisdiction_is_case_insensitive() {
        let config = ComplianceConfig::default();
        assert!(config.is_restricted_jurisdiction("wa"));
        assert!(config.is_restricted_jurisdiction(" ID "));
        assert!(!config.is_restricted_jurisdiction("NJ"));
    }

    #[test]
    fn test_durations() {
        let lock = LockConfig::default();
        assert_eq!(lock.wait(), Duration::from_secs(5));
        assert_eq!(lock.lease(), Duration::from_secs(10));
        assert_eq!(
            IdempotencyConfig::default().ttl(),
            chrono::Duration::hours(24)
        );
    }

    #[test]
    fn test_load_from_environment() {
        temp_env::with_vars(
            [
                ("WAGERLY__DATABASE__URL", Some("postgres://localhost/wagerly_test")),
                (
                    "WAGERLY__WALLET__COMPLIANCE__DUAL_APPROVAL_THRESHOLD",
                    Some("750.5"),
                ),
                ("WAGERLY__WALLET__LOCK__WAIT_MS", Some("250")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.database.url, "postgres://localhost/wagerly_test");
                assert_eq!(config.database.max_connections, 10);
                assert_eq!(
                    config.wallet.compliance.dual_approval_threshold.amount(),
                    dec!(750.5000)
                );
                assert_eq!(config.wallet.lock.wait_ms, 250);
                assert_eq!(config.wallet.lock.lease_ms, 10_000);
                assert_eq!(
                    config.wallet.compliance.triple_approval_threshold.amount(),
                    dec!(10000)
                );
            },
        );
    }
}
