//! Receipt entity - A structured receipt attached to a group's bill.
//!
//! Receipts are `pending` while their transaction is open and become
//! `completed` (immutable) when the transaction settles.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Whether the receipt can still be edited
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum ReceiptStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
}

/// Receipt database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "receipts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning group
    pub group_id: i64,
    /// Discord user ID of the uploader
    pub uploader_id: String,
    /// Transaction this receipt is linked to, if any
    pub transaction_id: Option<i64>,
    pub status: ReceiptStatus,
    /// Merchant name as extracted
    pub merchant: Option<String>,
    /// Date printed on the receipt
    pub receipt_date: Option<Date>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub tip_cents: i64,
    /// Printed total, if one was found
    pub total_cents: Option<i64>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One receipt has many line items
    #[sea_orm(has_many = "super::line_item::Entity")]
    LineItems,
}

impl Related<super::line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
