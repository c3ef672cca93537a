//! Group entity - A set of people who split bills together.
//!
//! Each group is bound to one Discord channel and has a single host. The host
//! is always a member and cannot leave the group.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Group database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "groups")]
pub struct Model {
    /// Unique identifier for the group
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable name (e.g., "Friday dinner crew")
    pub name: String,
    /// Discord user ID of the host who created the group
    pub host_id: String,
    /// Discord channel the group lives in, used for notifications
    #[sea_orm(unique)]
    pub channel_id: Option<String>,
    /// When the group was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Group and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One group has many members
    #[sea_orm(has_many = "super::group_member::Entity")]
    Members,
    /// One group has many settlement transactions
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::group_member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
