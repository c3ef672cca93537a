//! Allocation entity - A member's final owed amount for a settled transaction.
//!
//! The full set for a transaction is replaced wholesale at finalize time and
//! carries a breakdown (item subtotal, tax share, tip share) for display.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Allocation database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "allocations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub transaction_id: i64,
    /// Discord user ID of the member who owes `amount_cents`
    pub member_id: String,
    /// Final owed amount, never negative
    pub amount_cents: i64,
    /// Portion for items (claimed plus unclaimed share)
    pub item_subtotal_cents: i64,
    /// Portion for tax and other receipt charges
    pub tax_cents: i64,
    /// Portion for tip
    pub tip_cents: i64,
    /// JSON list of `{ "name", "share_cents" }` for item split, `[]` otherwise
    pub claimed_items: String,
    /// Member order at allocation time
    pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transaction::Entity",
        from = "Column::TransactionId",
        to = "super::transaction::Column::Id"
    )]
    Transaction,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
