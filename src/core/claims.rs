//! Claim ledger - Which members claim which line items of a receipt.
//!
//! [`set_claims`] replaces an item's whole claimant set in one database
//! transaction. Calls for different items touch different rows and are
//! independent; two calls for the same item are last-write-wins.
//! [`add_claim`] and [`remove_claim`] change a single member's claim.

use crate::{
    core::{group, receipt},
    entities::{Claim, claim, line_item, receipt::ReceiptStatus},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Line item ID to claimant member IDs, in claim order
pub type ClaimMap = BTreeMap<i64, Vec<String>>;

/// Loads an item whose receipt is still pending, returning it with the
/// receipt's group ID.
async fn editable_item<C>(db: &C, item_id: i64) -> Result<(line_item::Model, i64)>
where
    C: ConnectionTrait,
{
    let item = receipt::get_line_item(db, item_id)
        .await?
        .ok_or_else(|| Error::not_found("line item", item_id))?;
    let receipt = receipt::get_receipt(db, item.receipt_id)
        .await?
        .ok_or_else(|| Error::not_found("receipt", item.receipt_id))?;
    if receipt.status == ReceiptStatus::Completed {
        return Err(Error::invalid_state("receipt is already completed"));
    }
    Ok((item, receipt.group_id))
}

/// Returns the current claimants of one item, in claim order
pub async fn get_item_claimants<C>(db: &C, item_id: i64) -> Result<Vec<String>>
where
    C: ConnectionTrait,
{
    let claims = Claim::find()
        .filter(claim::Column::LineItemId.eq(item_id))
        .order_by_asc(claim::Column::Id)
        .all(db)
        .await?;
    Ok(claims.into_iter().map(|c| c.member_id).collect())
}

async fn replace_claimants<C>(db: &C, item_id: i64, member_ids: &[String]) -> Result<()>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    Claim::delete_many()
        .filter(claim::Column::LineItemId.eq(item_id))
        .exec(&txn)
        .await?;

    for member_id in member_ids {
        claim::ActiveModel {
            line_item_id: Set(item_id),
            member_id: Set(member_id.clone()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;
    Ok(())
}

/// Replaces the full claimant set of an item.
///
/// IDs that are not members of the receipt's group are dropped, as are
/// duplicates. Returns the claimant set that was stored.
pub async fn set_claims<C>(db: &C, item_id: i64, member_ids: &[String]) -> Result<Vec<String>>
where
    C: ConnectionTrait + TransactionTrait,
{
    let (item, group_id) = editable_item(db, item_id).await?;
    let members = group::get_member_ids(db, group_id).await?;

    let mut accepted: Vec<String> = Vec::with_capacity(member_ids.len());
    for member_id in member_ids {
        if !members.contains(member_id) {
            warn!("Dropping non-member {member_id} from claims on item {}", item.id);
            continue;
        }
        if !accepted.contains(member_id) {
            accepted.push(member_id.clone());
        }
    }

    replace_claimants(db, item.id, &accepted).await?;
    debug!("Item {} now claimed by {:?}", item.id, accepted);
    Ok(accepted)
}

/// Adds one member's claim on an item. Claiming twice is a no-op.
pub async fn add_claim<C>(db: &C, item_id: i64, member_id: &str) -> Result<Vec<String>>
where
    C: ConnectionTrait,
{
    let (item, group_id) = editable_item(db, item_id).await?;
    if !group::is_member(db, group_id, member_id).await? {
        return Err(Error::not_found("group member", member_id));
    }

    let mut claimants = get_item_claimants(db, item.id).await?;
    if !claimants.iter().any(|c| c == member_id) {
        claim::ActiveModel {
            line_item_id: Set(item.id),
            member_id: Set(member_id.to_string()),
            ..Default::default()
        }
        .insert(db)
        .await?;
        claimants.push(member_id.to_string());
    }
    Ok(claimants)
}

/// Removes one member's claim on an item. Removing a missing claim is a no-op.
pub async fn remove_claim<C>(db: &C, item_id: i64, member_id: &str) -> Result<Vec<String>>
where
    C: ConnectionTrait,
{
    let (item, _) = editable_item(db, item_id).await?;

    Claim::delete_many()
        .filter(claim::Column::LineItemId.eq(item.id))
        .filter(claim::Column::MemberId.eq(member_id))
        .exec(db)
        .await?;

    get_item_claimants(db, item.id).await
}

/// Returns the claim map of a receipt.
///
/// Every item of the receipt has an entry, with an empty list when nobody
/// claimed it.
pub async fn get_claims<C>(db: &C, receipt_id: i64) -> Result<ClaimMap>
where
    C: ConnectionTrait,
{
    let items = receipt::get_line_items(db, receipt_id).await?;
    let mut map: ClaimMap = items.iter().map(|item| (item.id, Vec::new())).collect();
    if map.is_empty() {
        return Ok(map);
    }

    let claims = Claim::find()
        .filter(claim::Column::LineItemId.is_in(map.keys().copied().collect::<Vec<_>>()))
        .order_by_asc(claim::Column::Id)
        .all(db)
        .await?;

    for claim in claims {
        if let Some(claimants) = map.get_mut(&claim.line_item_id) {
            claimants.push(claim.member_id);
        }
    }
    Ok(map)
}
