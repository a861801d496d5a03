//! `SeaORM` Entity for wallet_transactions table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "wallet_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub currency: String,
    pub kind: String,
    pub direction: String,
    pub amount: Decimal,
    pub status: String,
    pub idempotency_key: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub actor: String,
    pub balance_before: Option<Decimal>,
    pub balance_after: Option<Decimal>,
    pub linked_transaction_id: Option<Uuid>,
    pub workflow_id: Option<Uuid>,
    pub reversed_by: Option<Uuid>,
    pub failure_reason: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub processed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ledger_entries::Entity")]
    LedgerEntries,
    #[sea_orm(has_one = "super::approval_workflows::Entity")]
    ApprovalWorkflows,
}

impl Related<super::ledger_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LedgerEntries.def()
    }
}

impl Related<super::approval_workflows::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalWorkflows.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
