//! Receipt persistence - Stores structured receipts and their line items.
//!
//! A receipt is `pending` while its transaction is open. Once completed it is
//! immutable: no new items and no claim changes.

use crate::{
    core::normalizer::{StructuredReceipt, accept_item_price, clean_item_name},
    entities::{
        Claim, LineItem, Receipt, claim, line_item,
        receipt::{self, ReceiptStatus},
    },
    errors::{Error, Result},
};
use sea_orm::{ActiveEnum, QueryOrder, Set, prelude::*, sea_query::Expr};
use tracing::{debug, info};

/// Persists a normalized receipt and its items as a new pending receipt.
pub async fn insert_receipt<C>(
    db: &C,
    group_id: i64,
    uploader_id: &str,
    transaction_id: Option<i64>,
    structured: &StructuredReceipt,
) -> Result<(receipt::Model, Vec<line_item::Model>)>
where
    C: ConnectionTrait,
{
    let totals = structured.totals;
    let receipt = receipt::ActiveModel {
        group_id: Set(group_id),
        uploader_id: Set(uploader_id.to_string()),
        transaction_id: Set(transaction_id),
        status: Set(ReceiptStatus::Pending),
        merchant: Set(structured.merchant.clone()),
        receipt_date: Set(structured.date),
        subtotal_cents: Set(totals.subtotal_cents),
        tax_cents: Set(totals.tax_cents),
        tip_cents: Set(totals.tip_cents),
        total_cents: Set(Some(totals.total_cents)),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let mut items = Vec::with_capacity(structured.items.len());
    for (position, item) in structured.items.iter().enumerate() {
        let model = line_item::ActiveModel {
            receipt_id: Set(receipt.id),
            name: Set(item.name.clone()),
            price_cents: Set(item.price_cents),
            position: Set(i32::try_from(position).unwrap_or(i32::MAX)),
            ..Default::default()
        }
        .insert(db)
        .await?;
        items.push(model);
    }

    info!(
        "Stored receipt {} for group {} with {} items",
        receipt.id,
        group_id,
        items.len()
    );
    Ok((receipt, items))
}

/// Looks up a receipt by ID
pub async fn get_receipt<C>(db: &C, receipt_id: i64) -> Result<Option<receipt::Model>>
where
    C: ConnectionTrait,
{
    Receipt::find_by_id(receipt_id).one(db).await.map_err(Into::into)
}

/// Returns the receipt linked to a transaction, if one was uploaded
pub async fn get_receipt_for_transaction<C>(
    db: &C,
    transaction_id: i64,
) -> Result<Option<receipt::Model>>
where
    C: ConnectionTrait,
{
    Receipt::find()
        .filter(receipt::Column::TransactionId.eq(transaction_id))
        .order_by_desc(receipt::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Returns a receipt's items in receipt order
pub async fn get_line_items<C>(db: &C, receipt_id: i64) -> Result<Vec<line_item::Model>>
where
    C: ConnectionTrait,
{
    LineItem::find()
        .filter(line_item::Column::ReceiptId.eq(receipt_id))
        .order_by_asc(line_item::Column::Position)
        .order_by_asc(line_item::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Looks up a single line item
pub async fn get_line_item<C>(db: &C, item_id: i64) -> Result<Option<line_item::Model>>
where
    C: ConnectionTrait,
{
    LineItem::find_by_id(item_id).one(db).await.map_err(Into::into)
}

/// Appends a manually entered item to a pending receipt.
///
/// The name and price follow the same rules as OCR-extracted items.
pub async fn add_line_item<C>(
    db: &C,
    receipt_id: i64,
    name: &str,
    price_cents: i64,
) -> Result<line_item::Model>
where
    C: ConnectionTrait,
{
    let receipt = get_receipt(db, receipt_id)
        .await?
        .ok_or_else(|| Error::not_found("receipt", receipt_id))?;
    if receipt.status == ReceiptStatus::Completed {
        return Err(Error::invalid_state("receipt is already completed"));
    }

    let name = clean_item_name(name).ok_or_else(|| Error::InvalidInput {
        message: "Item name must be 1 to 120 characters".to_string(),
    })?;
    let price_cents =
        accept_item_price(price_cents).ok_or(Error::InvalidAmount { cents: price_cents })?;

    let last_position = LineItem::find()
        .filter(line_item::Column::ReceiptId.eq(receipt_id))
        .order_by_desc(line_item::Column::Position)
        .one(db)
        .await?
        .map(|item| item.position);

    let item = line_item::ActiveModel {
        receipt_id: Set(receipt_id),
        name: Set(name),
        price_cents: Set(price_cents),
        position: Set(last_position.map_or(0, |p| p + 1)),
        ..Default::default()
    }
    .insert(db)
    .await?;

    debug!("Added item {} to receipt {receipt_id}", item.id);
    Ok(item)
}

/// Deletes a receipt together with its items and their claims.
pub async fn delete_receipt<C>(db: &C, receipt_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let item_ids: Vec<i64> = get_line_items(db, receipt_id)
        .await?
        .into_iter()
        .map(|item| item.id)
        .collect();

    if !item_ids.is_empty() {
        Claim::delete_many()
            .filter(claim::Column::LineItemId.is_in(item_ids))
            .exec(db)
            .await?;
    }
    LineItem::delete_many()
        .filter(line_item::Column::ReceiptId.eq(receipt_id))
        .exec(db)
        .await?;
    Receipt::delete_by_id(receipt_id).exec(db).await?;
    Ok(())
}

/// Marks a receipt as completed, freezing its items and claims.
pub async fn mark_completed<C>(db: &C, receipt_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    Receipt::update_many()
        .col_expr(
            receipt::Column::Status,
            Expr::value(ReceiptStatus::Completed.into_value()),
        )
        .filter(receipt::Column::Id.eq(receipt_id))
        .exec(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_add_line_item_receipt_not_found() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([Vec::<receipt::Model>::new()])
            .into_connection();
        let result = add_line_item(&db, 9, "Fries", 400).await;
        assert!(matches!(result, Err(Error::NotFound { entity: "receipt", .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_receipt_keeps_item_order() -> Result<()> {
        let db = setup_test_db().await?;
        let group = create_test_group(&db, &[]).await?;
        let structured = test_receipt(&[("Pizza", 1899), ("Soda", 598)], 225);

        let (receipt, items) = insert_receipt(&db, group.id, TEST_HOST, None, &structured).await?;
        assert_eq!(receipt.status, ReceiptStatus::Pending);
        assert_eq!(receipt.subtotal_cents, 2497);
        assert_eq!(receipt.total_cents, Some(2722));

        let stored = get_line_items(&db, receipt.id).await?;
        assert_eq!(stored, items);
        assert_eq!(stored[0].name, "Pizza");
        assert_eq!(stored[1].position, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_add_line_item_appends_and_validates() -> Result<()> {
        let db = setup_test_db().await?;
        let group = create_test_group(&db, &[]).await?;
        let (receipt, _) = insert_receipt(
            &db,
            group.id,
            TEST_HOST,
            None,
            &test_receipt(&[("Pizza", 1899)], 0),
        )
        .await?;

        let item = add_line_item(&db, receipt.id, "  Garlic   bread ", 550).await?;
        assert_eq!(item.name, "Garlic bread");
        assert_eq!(item.position, 1);

        assert!(matches!(
            add_line_item(&db, receipt.id, "Free", 0).await,
            Err(Error::InvalidAmount { cents: 0 })
        ));
        assert!(matches!(
            add_line_item(&db, receipt.id, "", 100).await,
            Err(Error::InvalidInput { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_completed_receipt_rejects_items() -> Result<()> {
        let db = setup_test_db().await?;
        let group = create_test_group(&db, &[]).await?;
        let (receipt, _) =
            insert_receipt(&db, group.id, TEST_HOST, None, &test_receipt(&[], 0)).await?;

        mark_completed(&db, receipt.id).await?;
        let stored = get_receipt(&db, receipt.id).await?.unwrap();
        assert_eq!(stored.status, ReceiptStatus::Completed);

        let result = add_line_item(&db, receipt.id, "Late", 100).await;
        assert!(matches!(result, Err(Error::InvalidState { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_receipt_removes_items() -> Result<()> {
        let db = setup_test_db().await?;
        let group = create_test_group(&db, &[]).await?;
        let (receipt, _) = insert_receipt(
            &db,
            group.id,
            TEST_HOST,
            None,
            &test_receipt(&[("A", 100), ("B", 200)], 0),
        )
        .await?;

        delete_receipt(&db, receipt.id).await?;
        assert!(get_receipt(&db, receipt.id).await?.is_none());
        assert!(get_line_items(&db, receipt.id).await?.is_empty());
        Ok(())
    }
}
