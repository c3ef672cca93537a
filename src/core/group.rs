//! Group membership operations.
//!
//! Groups are a collaborator of the settlement engine: it only needs to know
//! who the host is and who the members are, in join order.

use crate::{
    entities::{Group, GroupMember, group, group_member},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::info;

/// Creates a group with `host_id` as its host and first member.
pub async fn create_group(
    db: &DatabaseConnection,
    name: String,
    host_id: String,
    channel_id: Option<String>,
) -> Result<group::Model> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput {
            message: "Group name cannot be empty".to_string(),
        });
    }

    if let Some(channel) = channel_id.as_deref() {
        if get_group_by_channel(db, channel).await?.is_some() {
            return Err(Error::invalid_state("this channel already has a group"));
        }
    }

    let txn = db.begin().await?;
    let now = chrono::Utc::now();

    let group = group::ActiveModel {
        name: Set(name.trim().to_string()),
        host_id: Set(host_id.clone()),
        channel_id: Set(channel_id),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    group_member::ActiveModel {
        group_id: Set(group.id),
        member_id: Set(host_id),
        joined_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!("Created group {} ({}) hosted by {}", group.id, group.name, group.host_id);
    Ok(group)
}

/// Looks up a group by ID
pub async fn get_group<C>(db: &C, group_id: i64) -> Result<Option<group::Model>>
where
    C: ConnectionTrait,
{
    Group::find_by_id(group_id).one(db).await.map_err(Into::into)
}

/// Looks up the group bound to a Discord channel
pub async fn get_group_by_channel<C>(db: &C, channel_id: &str) -> Result<Option<group::Model>>
where
    C: ConnectionTrait,
{
    Group::find()
        .filter(group::Column::ChannelId.eq(channel_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Returns the member IDs of a group in join order. The host comes first.
pub async fn get_member_ids<C>(db: &C, group_id: i64) -> Result<Vec<String>>
where
    C: ConnectionTrait,
{
    let members = GroupMember::find()
        .filter(group_member::Column::GroupId.eq(group_id))
        .order_by_asc(group_member::Column::Id)
        .all(db)
        .await?;
    Ok(members.into_iter().map(|m| m.member_id).collect())
}

/// Whether `member_id` belongs to the group
pub async fn is_member<C>(db: &C, group_id: i64, member_id: &str) -> Result<bool>
where
    C: ConnectionTrait,
{
    let found = GroupMember::find()
        .filter(group_member::Column::GroupId.eq(group_id))
        .filter(group_member::Column::MemberId.eq(member_id))
        .one(db)
        .await?;
    Ok(found.is_some())
}

/// Loads the group and checks that `member_id` belongs to it.
///
/// Non-members get the same [`Error::NotFound`] as a missing group.
pub async fn require_member<C>(db: &C, group_id: i64, member_id: &str) -> Result<group::Model>
where
    C: ConnectionTrait,
{
    let group = get_group(db, group_id)
        .await?
        .ok_or_else(|| Error::not_found("group", group_id))?;
    if !is_member(db, group_id, member_id).await? {
        return Err(Error::not_found("group", group_id));
    }
    Ok(group)
}

/// Adds a member. Adding an existing member is a no-op.
pub async fn add_member(db: &DatabaseConnection, group_id: i64, member_id: String) -> Result<()> {
    get_group(db, group_id)
        .await?
        .ok_or_else(|| Error::not_found("group", group_id))?;

    if is_member(db, group_id, &member_id).await? {
        return Ok(());
    }

    group_member::ActiveModel {
        group_id: Set(group_id),
        member_id: Set(member_id.clone()),
        joined_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!("Member {member_id} joined group {group_id}");
    Ok(())
}

/// Removes a member. The host cannot leave their own group.
pub async fn remove_member(db: &DatabaseConnection, group_id: i64, member_id: &str) -> Result<()> {
    let group = require_member(db, group_id, member_id).await?;
    if group.host_id == member_id {
        return Err(Error::forbidden("the host cannot leave the group"));
    }

    GroupMember::delete_many()
        .filter(group_member::Column::GroupId.eq(group_id))
        .filter(group_member::Column::MemberId.eq(member_id))
        .exec(db)
        .await?;

    info!("Member {member_id} left group {group_id}");
    Ok(())
}
