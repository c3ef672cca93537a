//! Claim entity - A member's assertion that they ordered (part of) a line item.
//!
//! Several members may claim the same item; its price is then split evenly
//! among them.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Claim database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "claims")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub line_item_id: i64,
    /// Discord user ID of the claimant
    pub member_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::line_item::Entity",
        from = "Column::LineItemId",
        to = "super::line_item::Column::Id"
    )]
    LineItem,
}

impl Related<super::line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
