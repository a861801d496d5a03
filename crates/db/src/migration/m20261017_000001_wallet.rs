//! Wallet schema.
//!
//! Creates accounts, the append-only ledger, wallet transactions, approval
//! workflows and idempotency keys, plus the triggers that keep the ledger
//! immutable.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ACCOUNTS
        // ============================================================
        db.execute_unprepared(ACCOUNTS_SQL).await?;

        // ============================================================
        // PART 2: TRANSACTIONS & LEDGER
        // ============================================================
        db.execute_unprepared(WALLET_TRANSACTIONS_SQL).await?;
        db.execute_unprepared(LEDGER_ENTRIES_SQL).await?;

        // ============================================================
        // PART 3: APPROVAL WORKFLOW
        // ============================================================
        db.execute_unprepared(APPROVAL_WORKFLOWS_SQL).await?;

        // ============================================================
        // PART 4: IDEMPOTENCY
        // ============================================================
        db.execute_unprepared(IDEMPOTENCY_KEYS_SQL).await?;

        // ============================================================
        // PART 5: TRIGGERS & FUNCTIONS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ACCOUNTS_SQL: &str = r"
CREATE TABLE accounts (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL,
    currency VARCHAR(8) NOT NULL,
    balance NUMERIC(19, 4) NOT NULL DEFAULT 0,
    available NUMERIC(19, 4) NOT NULL DEFAULT 0,
    held NUMERIC(19, 4) NOT NULL DEFAULT 0,
    lifetime_wagered NUMERIC(19, 4) NOT NULL DEFAULT 0,
    lifetime_won NUMERIC(19, 4) NOT NULL DEFAULT 0,
    daily_deposit_total NUMERIC(19, 4) NOT NULL DEFAULT 0,
    daily_withdrawal_total NUMERIC(19, 4) NOT NULL DEFAULT 0,
    daily_reset_at TIMESTAMPTZ NOT NULL,
    frozen_until TIMESTAMPTZ,
    freeze_reason VARCHAR(500),
    version BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (user_id, currency),
    CONSTRAINT chk_account_currency CHECK (currency IN ('PLAY', 'PROMO')),
    CONSTRAINT chk_balance_split CHECK (balance = available + held),
    CONSTRAINT chk_available_non_negative CHECK (available >= 0),
    CONSTRAINT chk_held_non_negative CHECK (held >= 0)
);

CREATE INDEX idx_accounts_daily_reset ON accounts(daily_reset_at);
";

// No foreign key to accounts: a transaction that failed while opening an
// account is still persisted as FAILED.
const WALLET_TRANSACTIONS_SQL: &str = r"
CREATE TABLE wallet_transactions (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL,
    account_id UUID NOT NULL,
    currency VARCHAR(8) NOT NULL,
    kind VARCHAR(16) NOT NULL,
    direction VARCHAR(8) NOT NULL,
    amount NUMERIC(19, 4) NOT NULL,
    status VARCHAR(24) NOT NULL,
    idempotency_key VARCHAR(255),
    reference VARCHAR(255),
    description VARCHAR(500),
    actor VARCHAR(128) NOT NULL,
    balance_before NUMERIC(19, 4),
    balance_after NUMERIC(19, 4),
    linked_transaction_id UUID REFERENCES wallet_transactions(id),
    workflow_id UUID,
    reversed_by UUID REFERENCES wallet_transactions(id),
    failure_reason VARCHAR(500),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    processed_at TIMESTAMPTZ,
    CONSTRAINT chk_tx_amount_positive CHECK (amount > 0),
    CONSTRAINT chk_tx_direction CHECK (direction IN ('CREDIT', 'DEBIT')),
    CONSTRAINT chk_tx_status CHECK (
        status IN ('PENDING', 'COMPLETED', 'FAILED', 'REQUIRES_APPROVAL', 'REJECTED')
    )
);

CREATE INDEX idx_wt_user_created ON wallet_transactions(user_id, created_at DESC);
CREATE INDEX idx_wt_account ON wallet_transactions(account_id);
CREATE INDEX idx_wt_idempotency_key ON wallet_transactions(idempotency_key);
";

const LEDGER_ENTRIES_SQL: &str = r"
CREATE TABLE ledger_entries (
    id UUID PRIMARY KEY,
    account_id UUID NOT NULL REFERENCES accounts(id),
    user_id UUID NOT NULL,
    currency VARCHAR(8) NOT NULL,
    kind VARCHAR(16) NOT NULL,
    amount NUMERIC(19, 4) NOT NULL,
    balance_before NUMERIC(19, 4) NOT NULL,
    balance_after NUMERIC(19, 4) NOT NULL,
    transaction_id UUID NOT NULL REFERENCES wallet_transactions(id),
    reference_id VARCHAR(255),
    actor VARCHAR(128) NOT NULL,
    reason VARCHAR(500) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_le_amount_non_zero CHECK (amount <> 0),
    CONSTRAINT chk_le_arithmetic CHECK (balance_after = balance_before + amount)
);

CREATE INDEX idx_le_account_created ON ledger_entries(account_id, created_at, id);
CREATE INDEX idx_le_transaction ON ledger_entries(transaction_id);
";

const APPROVAL_WORKFLOWS_SQL: &str = r"
CREATE TABLE approval_workflows (
    id UUID PRIMARY KEY,
    transaction_id UUID NOT NULL REFERENCES wallet_transactions(id),
    user_id UUID NOT NULL,
    approval_type VARCHAR(8) NOT NULL,
    required_approvals INTEGER NOT NULL,
    approvals JSONB NOT NULL DEFAULT '[]'::jsonb,
    status VARCHAR(16) NOT NULL,
    initiated_by VARCHAR(128) NOT NULL,
    reason VARCHAR(500) NOT NULL,
    amount NUMERIC(19, 4) NOT NULL,
    currency VARCHAR(8) NOT NULL,
    escalation_count INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    expires_at TIMESTAMPTZ NOT NULL,
    completed_at TIMESTAMPTZ,
    completed_by UUID,
    completion_notes VARCHAR(500),
    version BIGINT NOT NULL DEFAULT 0,
    UNIQUE (transaction_id),
    CONSTRAINT chk_wf_type CHECK (approval_type IN ('DUAL', 'TRIPLE')),
    CONSTRAINT chk_wf_status CHECK (
        status IN ('PENDING', 'APPROVED', 'REJECTED', 'ESCALATED', 'CANCELLED', 'EXPIRED')
    )
);

CREATE INDEX idx_wf_open_expiry ON approval_workflows(expires_at)
    WHERE status IN ('PENDING', 'ESCALATED');
CREATE INDEX idx_wf_user ON approval_workflows(user_id);
";

const IDEMPOTENCY_KEYS_SQL: &str = r"
CREATE TABLE idempotency_keys (
    key VARCHAR(255) PRIMARY KEY,
    state VARCHAR(16) NOT NULL,
    outcome JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    expires_at TIMESTAMPTZ NOT NULL,
    CONSTRAINT chk_idem_state CHECK (state IN ('IN_FLIGHT', 'COMPLETED')),
    CONSTRAINT chk_idem_outcome CHECK ((state = 'COMPLETED') = (outcome IS NOT NULL))
);

CREATE INDEX idx_idem_expires ON idempotency_keys(expires_at);
";

const TRIGGERS_SQL: &str = r"
-- ============================================================
-- FUNCTION: prevent_ledger_modification
-- Ledger entries are append-only; corrections are new entries
-- ============================================================
CREATE OR REPLACE FUNCTION prevent_ledger_modification()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'Ledger entries are immutable. Post a reversal or adjustment instead.';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_prevent_ledger_mod
BEFORE UPDATE OR DELETE ON ledger_entries
FOR EACH ROW
EXECUTE FUNCTION prevent_ledger_modification();

-- ============================================================
-- FUNCTION: update_updated_at
-- Keeps accounts.updated_at current on direct SQL edits
-- ============================================================
CREATE OR REPLACE FUNCTION update_updated_at()
RETURNS TRIGGER AS $$
BEGIN
    IF NEW.updated_at = OLD.updated_at THEN
        NEW.updated_at = now();
    END IF;
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_accounts_updated_at
BEFORE UPDATE ON accounts
FOR EACH ROW
EXECUTE FUNCTION update_updated_at();
";

const DROP_ALL_SQL: &str = r"
-- ============================================================
-- DROP ALL: Rollback migration
-- Order matters due to foreign key constraints
-- ============================================================
DROP TRIGGER IF EXISTS trg_prevent_ledger_mod ON ledger_entries;
DROP TRIGGER IF EXISTS trg_accounts_updated_at ON accounts;
DROP FUNCTION IF EXISTS prevent_ledger_modification();
DROP FUNCTION IF EXISTS update_updated_at();

DROP TABLE IF EXISTS idempotency_keys CASCADE;
DROP TABLE IF EXISTS approval_workflows CASCADE;
DROP TABLE IF EXISTS ledger_entries CASCADE;
DROP TABLE IF EXISTS wallet_transactions CASCADE;
DROP TABLE IF EXISTS accounts CASCADE;
";
