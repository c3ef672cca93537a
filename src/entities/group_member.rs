//! Group member entity - Membership of a Discord user in a group.
//!
//! Rows are ordered by `id`, which doubles as join order. The host's row is
//! inserted together with the group, so the host is always first.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Group membership database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "group_members")]
pub struct Model {
    /// Unique identifier, also the join order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Group this membership belongs to
    pub group_id: i64,
    /// Discord user ID of the member
    pub member_id: String,
    /// When the member joined
    pub joined_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::group::Entity",
        from = "Column::GroupId",
        to = "super::group::Column::Id"
    )]
    Group,
}

impl Related<super::group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Group.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
