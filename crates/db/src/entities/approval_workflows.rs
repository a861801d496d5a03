//! `SeaORM` Entity for approval_workflows table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "approval_workflows")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub approval_type: String,
    pub required_approvals: i32,
    /// Ordered sign-offs as a JSON array.
    #[sea_orm(column_type = "JsonBinary")]
    pub approvals: Json,
    pub status: String,
    pub initiated_by: String,
    pub reason: String,
    pub amount: Decimal,
    pub currency: String,
    pub escalation_count: i32,
    pub created_at: DateTimeWithTimeZone,
    pub expires_at: DateTimeWithTimeZone,
    pub completed_at: Option<DateTimeWithTimeZone>,
    pub completed_by: Option<Uuid>,
    pub completion_notes: Option<String>,
    pub version: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::wallet_transactions::Entity",
        from = "Column::TransactionId",
        to = "super::wallet_transactions::Column::Id"
    )]
    WalletTransactions,
}

impl Related<super::wallet_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WalletTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
