//! Transaction entity - One settlement attempt for a group's bill.
//!
//! A transaction starts in `PENDING_ALLOCATION`, accepts tip/subtotal/receipt and
//! claim changes until it is finalized (by its creator) or until its
//! `allocation_deadline` passes and the even-split fallback runs. Both paths end
//! in `SETTLED`, after which the row is append-only. All amounts are in cents.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How the bill is divided among members
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum SplitMode {
    /// Everyone pays the same share of the full total
    #[sea_orm(string_value = "EVEN_SPLIT")]
    EvenSplit,
    /// Members pay for what they claimed, plus proportional tax and tip
    #[sea_orm(string_value = "ITEM_SPLIT")]
    ItemSplit,
}

/// Lifecycle state of a transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
pub enum TransactionStatus {
    /// Open for receipt, tip, subtotal and claim changes
    #[sea_orm(string_value = "PENDING_ALLOCATION")]
    PendingAllocation,
    /// Allocations are fixed
    #[sea_orm(string_value = "SETTLED")]
    Settled,
}

/// Transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Group being billed
    pub group_id: i64,
    /// Discord user ID of the creator (always the group host)
    pub creator_id: String,
    /// Configured split mode (forced to even split by the deadline fallback)
    pub split_mode: SplitMode,
    /// Pre-tip bill amount (receipt subtotal plus tax, or set manually)
    pub subtotal_cents: i64,
    /// Part of `subtotal_cents` that is tax, for breakdown display
    pub tax_cents: i64,
    /// Tip amount
    pub tip_cents: i64,
    /// `subtotal_cents + tip_cents`
    pub total_cents: i64,
    /// Once this passes while still pending, the fallback may run
    pub allocation_deadline: DateTimeUtc,
    /// Current lifecycle state
    pub status: TransactionStatus,
    /// True when the allocations came from the deadline fallback
    pub fallback_applied: bool,
    /// When the transaction was created
    pub created_at: DateTimeUtc,
    /// When allocations were fixed
    pub settled_at: Option<DateTimeUtc>,
    /// When settlement bookkeeping was recorded via `settle`
    pub recorded_at: Option<DateTimeUtc>,
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one group
    #[sea_orm(
        belongs_to = "super::group::Entity",
        from = "Column::GroupId",
        to = "super::group::Column::Id"
    )]
    Group,
    /// One transaction has many allocations
    #[sea_orm(has_many = "super::allocation::Entity")]
    Allocations,
}

impl Related<super::group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Group.def()
    }
}

impl Related<super::allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Allocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
