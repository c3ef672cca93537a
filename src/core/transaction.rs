//! Transaction lifecycle - The settlement state machine.
//!
//! A transaction is created by the group host in `PENDING_ALLOCATION`. While
//! pending, the creator may set the tip and subtotal and add items, any member
//! may upload a receipt or set claims. It reaches `SETTLED` in one of two ways:
//!
//! - [`SettlementEngine::finalize`], triggered by the creator, runs the
//!   allocation engine in the configured split mode
//! - [`SettlementEngine::run_deadline_fallback`], once the allocation deadline
//!   has passed, forces an even split with no tip
//!
//! Every mutation reads the transaction row with an exclusive lock inside a
//! database transaction and re-checks its status there. Settling flips the
//! status with a compare-and-set, so finalize and fallback can never both write
//! an allocation set for the same transaction.

use crate::{
    config::settings::SettlementSettings,
    core::{
        allocation::{self, AllocationRequest, ItemClaims},
        bank_link::BankLinkCheck,
        claims::{self, ClaimMap},
        group,
        normalizer::StructuredReceipt,
        notify::{GroupEvent, GroupNotifier},
        receipt,
        validator::{self, ValidationReport},
    },
    entities::{
        Allocation, Transaction, allocation as allocation_entity, line_item,
        receipt as receipt_entity,
        transaction::{self, SplitMode, TransactionStatus},
    },
    errors::{Error, Result},
};
use chrono::{DateTime, TimeDelta, Utc};
use sea_orm::{
    ActiveEnum, QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Result of a receipt upload
#[derive(Debug, Clone)]
pub struct UploadedReceipt {
    pub receipt: receipt_entity::Model,
    pub items: Vec<line_item::Model>,
    /// Transaction subtotal after the upload (receipt subtotal plus tax)
    pub subtotal_cents: i64,
    /// Advisory reconciliation result
    pub report: ValidationReport,
}

/// A settled transaction together with its allocations
#[derive(Debug, Clone)]
pub struct SettlementRecord {
    pub transaction: transaction::Model,
    pub allocations: Vec<allocation_entity::Model>,
}

/// Owns the settlement lifecycle and its collaborators.
#[derive(Clone)]
pub struct SettlementEngine {
    db: Arc<DatabaseConnection>,
    notifier: Arc<dyn GroupNotifier>,
    bank_links: Arc<dyn BankLinkCheck>,
    settings: SettlementSettings,
}

/// Reads a transaction row for update.
async fn lock_transaction<C>(db: &C, transaction_id: i64) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    Transaction::find_by_id(transaction_id)
        .lock_exclusive()
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("transaction", transaction_id))
}

/// SQLite ignores `FOR UPDATE`, so a racing writer on a file database fails
/// with a busy or locked error instead of waiting. Those are reported as the
/// same `InvalidState` the status re-check gives the losing side.
fn contention_as_conflict(err: Error, transaction_id: i64) -> Error {
    match err {
        Error::Database(ref db_err) if is_lock_contention(db_err) => Error::invalid_state(
            format!("transaction {transaction_id} is being settled concurrently"),
        ),
        other => other,
    }
}

fn is_lock_contention(err: &DbErr) -> bool {
    let message = err.to_string();
    message.contains("database is locked") || message.contains("database table is locked")
}

fn ensure_pending(model: &transaction::Model) -> Result<()> {
    if model.status != TransactionStatus::PendingAllocation {
        return Err(Error::invalid_state(format!(
            "transaction {} is already settled",
            model.id
        )));
    }
    Ok(())
}

fn ensure_creator(model: &transaction::Model, requester_id: &str, action: &str) -> Result<()> {
    if model.creator_id != requester_id {
        return Err(Error::forbidden(format!(
            "only the creator of transaction {} can {action}",
            model.id
        )));
    }
    Ok(())
}

async fn load_item_claims<C>(db: &C, receipt_id: i64) -> Result<Vec<ItemClaims>>
where
    C: ConnectionTrait,
{
    let items = receipt::get_line_items(db, receipt_id).await?;
    let mut claim_map = claims::get_claims(db, receipt_id).await?;
    Ok(items
        .into_iter()
        .map(|item| ItemClaims {
            claimants: claim_map.remove(&item.id).unwrap_or_default(),
            name: item.name,
            price_cents: item.price_cents,
        })
        .collect())
}

/// Replaces the allocation set of a transaction wholesale.
async fn write_allocations<C>(
    db: &C,
    transaction_id: i64,
    shares: Vec<allocation::MemberShare>,
) -> Result<Vec<allocation_entity::Model>>
where
    C: ConnectionTrait,
{
    Allocation::delete_many()
        .filter(allocation_entity::Column::TransactionId.eq(transaction_id))
        .exec(db)
        .await?;

    let mut stored = Vec::with_capacity(shares.len());
    for (position, share) in shares.into_iter().enumerate() {
        let model = allocation_entity::ActiveModel {
            transaction_id: Set(transaction_id),
            member_id: Set(share.member_id),
            amount_cents: Set(share.amount_cents),
            item_subtotal_cents: Set(share.item_subtotal_cents),
            tax_cents: Set(share.tax_cents),
            tip_cents: Set(share.tip_cents),
            claimed_items: Set(serde_json::to_string(&share.claimed_items)?),
            position: Set(i32::try_from(position).unwrap_or(i32::MAX)),
            ..Default::default()
        }
        .insert(db)
        .await?;
        stored.push(model);
    }
    Ok(stored)
}

/// Figures the settled row is written with
struct SettledFigures {
    split_mode: SplitMode,
    tip_cents: i64,
    total_cents: i64,
    fallback: bool,
}

/// Flips a pending transaction to `SETTLED`. Fails if another writer got there first.
async fn mark_settled<C>(
    db: &C,
    transaction_id: i64,
    figures: &SettledFigures,
    now: DateTime<Utc>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = Transaction::update_many()
        .col_expr(
            transaction::Column::Status,
            Expr::value(TransactionStatus::Settled.into_value()),
        )
        .col_expr(transaction::Column::SettledAt, Expr::value(now))
        .col_expr(
            transaction::Column::SplitMode,
            Expr::value(figures.split_mode.into_value()),
        )
        .col_expr(transaction::Column::TipCents, Expr::value(figures.tip_cents))
        .col_expr(transaction::Column::TotalCents, Expr::value(figures.total_cents))
        .col_expr(
            transaction::Column::FallbackApplied,
            Expr::value(figures.fallback),
        )
        .filter(transaction::Column::Id.eq(transaction_id))
        .filter(
            transaction::Column::Status.eq(TransactionStatus::PendingAllocation.into_value()),
        )
        .exec(db)
        .await?;

    if result.rows_affected != 1 {
        return Err(Error::invalid_state(format!(
            "transaction {transaction_id} was settled concurrently"
        )));
    }
    Ok(())
}

async fn apply_subtotal<C>(
    db: &C,
    model: transaction::Model,
    subtotal_cents: i64,
    tax_cents: Option<i64>,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    let total_cents = subtotal_cents + model.tip_cents;
    let tax_cents = tax_cents.unwrap_or(model.tax_cents).min(subtotal_cents);
    let mut active: transaction::ActiveModel = model.into();
    active.subtotal_cents = Set(subtotal_cents);
    active.tax_cents = Set(tax_cents);
    active.total_cents = Set(total_cents);
    active.update(db).await.map_err(Into::into)
}

/// Settles `model` and stores its allocations. The linked receipt is marked completed.
async fn settle_with<C>(
    db: &C,
    model: &transaction::Model,
    figures: &SettledFigures,
    linked: Option<&receipt_entity::Model>,
    shares: Vec<allocation::MemberShare>,
) -> Result<Vec<allocation_entity::Model>>
where
    C: ConnectionTrait,
{
    mark_settled(db, model.id, figures, Utc::now()).await?;
    let allocations = write_allocations(db, model.id, shares).await?;
    if let Some(found) = linked {
        receipt::mark_completed(db, found.id).await?;
    }
    Ok(allocations)
}

fn allocation_summary(allocations: &[allocation_entity::Model]) -> Vec<(String, i64)> {
    allocations
        .iter()
        .map(|a| (a.member_id.clone(), a.amount_cents))
        .collect()
}

impl SettlementEngine {
    /// Creates an engine over a database connection and its collaborators
    pub fn new(
        db: Arc<DatabaseConnection>,
        notifier: Arc<dyn GroupNotifier>,
        bank_links: Arc<dyn BankLinkCheck>,
        settings: SettlementSettings,
    ) -> Self {
        Self {
            db,
            notifier,
            bank_links,
            settings,
        }
    }

    /// Starts a settlement for a group.
    ///
    /// Only the group host may do this, only with an active bank link, and
    /// only while the group has no other pending transaction. The allocation
    /// deadline is set to now plus the configured window.
    #[instrument(skip(self))]
    pub async fn create_transaction(
        &self,
        group_id: i64,
        creator_id: &str,
        split_mode: SplitMode,
    ) -> Result<transaction::Model> {
        let group = group::require_member(&*self.db, group_id, creator_id).await?;
        if group.host_id != creator_id {
            return Err(Error::forbidden("only the group host can start a bill"));
        }
        if !self.bank_links.has_active_link(creator_id) {
            return Err(Error::invalid_state(
                "an active bank link is required to start a bill",
            ));
        }
        if self.get_pending_for_group(group_id).await?.is_some() {
            return Err(Error::invalid_state("this group already has an open bill"));
        }

        let window = TimeDelta::try_minutes(self.settings.allocation_window_minutes).ok_or_else(
            || Error::Config {
                message: "allocation window is out of range".to_string(),
            },
        )?;
        let now = Utc::now();

        let model = transaction::ActiveModel {
            group_id: Set(group_id),
            creator_id: Set(creator_id.to_string()),
            split_mode: Set(split_mode),
            subtotal_cents: Set(0),
            tax_cents: Set(0),
            tip_cents: Set(0),
            total_cents: Set(0),
            allocation_deadline: Set(now + window),
            status: Set(TransactionStatus::PendingAllocation),
            fallback_applied: Set(false),
            created_at: Set(now),
            settled_at: Set(None),
            recorded_at: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(
            "Transaction {} created for group {group_id} ({split_mode:?})",
            model.id
        );
        self.notifier.notify(
            group_id,
            GroupEvent::TransactionCreated {
                transaction_id: model.id,
                split_mode,
                deadline: model.allocation_deadline,
            },
        );
        Ok(model)
    }

    /// Looks up a transaction by ID
    pub async fn get_transaction(&self, transaction_id: i64) -> Result<Option<transaction::Model>> {
        Transaction::find_by_id(transaction_id)
            .one(&*self.db)
            .await
            .map_err(Into::into)
    }

    /// Returns the group's open transaction, if any
    pub async fn get_pending_for_group(&self, group_id: i64) -> Result<Option<transaction::Model>> {
        Transaction::find()
            .filter(transaction::Column::GroupId.eq(group_id))
            .filter(
                transaction::Column::Status.eq(TransactionStatus::PendingAllocation.into_value()),
            )
            .order_by_desc(transaction::Column::Id)
            .one(&*self.db)
            .await
            .map_err(Into::into)
    }

    /// Returns the group's most recent transaction, pending or settled
    pub async fn get_latest_for_group(&self, group_id: i64) -> Result<Option<transaction::Model>> {
        Transaction::find()
            .filter(transaction::Column::GroupId.eq(group_id))
            .order_by_desc(transaction::Column::Id)
            .one(&*self.db)
            .await
            .map_err(Into::into)
    }

    /// Returns a transaction's allocations in member order
    pub async fn get_allocations(
        &self,
        transaction_id: i64,
    ) -> Result<Vec<allocation_entity::Model>> {
        Allocation::find()
            .filter(allocation_entity::Column::TransactionId.eq(transaction_id))
            .order_by_asc(allocation_entity::Column::Position)
            .all(&*self.db)
            .await
            .map_err(Into::into)
    }

    /// Returns the receipt of a transaction with its items
    pub async fn get_receipt(
        &self,
        transaction_id: i64,
    ) -> Result<Option<(receipt_entity::Model, Vec<line_item::Model>)>> {
        let Some(found) = receipt::get_receipt_for_transaction(&*self.db, transaction_id).await?
        else {
            return Ok(None);
        };
        let items = receipt::get_line_items(&*self.db, found.id).await?;
        Ok(Some((found, items)))
    }

    /// Returns the claim map of the transaction's receipt (empty without one)
    pub async fn get_claims(&self, transaction_id: i64) -> Result<ClaimMap> {
        match receipt::get_receipt_for_transaction(&*self.db, transaction_id).await? {
            Some(found) => claims::get_claims(&*self.db, found.id).await,
            None => Ok(ClaimMap::new()),
        }
    }

    /// Sets the tip. Creator only, while pending.
    #[instrument(skip(self))]
    pub async fn set_tip(
        &self,
        transaction_id: i64,
        requester_id: &str,
        tip_cents: i64,
    ) -> Result<transaction::Model> {
        crate::core::money::check_bill_amount(tip_cents)?;

        let txn = self.db.begin().await?;
        let model = lock_transaction(&txn, transaction_id).await?;
        group::require_member(&txn, model.group_id, requester_id).await?;
        ensure_creator(&model, requester_id, "set the tip")?;
        ensure_pending(&model)?;

        let total_cents = model.subtotal_cents + tip_cents;
        let mut active: transaction::ActiveModel = model.into();
        active.tip_cents = Set(tip_cents);
        active.total_cents = Set(total_cents);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        self.notifier.notify(
            updated.group_id,
            GroupEvent::TipUpdated {
                transaction_id,
                tip_cents,
                total_cents,
            },
        );
        Ok(updated)
    }

    /// Overrides the subtotal by hand. Creator only, while pending.
    #[instrument(skip(self))]
    pub async fn set_subtotal(
        &self,
        transaction_id: i64,
        requester_id: &str,
        subtotal_cents: i64,
    ) -> Result<transaction::Model> {
        crate::core::money::check_bill_amount(subtotal_cents)?;

        let txn = self.db.begin().await?;
        let model = lock_transaction(&txn, transaction_id).await?;
        group::require_member(&txn, model.group_id, requester_id).await?;
        ensure_creator(&model, requester_id, "set the subtotal")?;
        ensure_pending(&model)?;

        let updated = apply_subtotal(&txn, model, subtotal_cents, None).await?;
        txn.commit().await?;

        self.notify_subtotal(&updated);
        Ok(updated)
    }

    fn notify_subtotal(&self, model: &transaction::Model) {
        self.notifier.notify(
            model.group_id,
            GroupEvent::SubtotalUpdated {
                transaction_id: model.id,
                subtotal_cents: model.subtotal_cents,
                total_cents: model.total_cents,
            },
        );
    }

    /// Attaches a structured receipt to a pending transaction.
    ///
    /// Any group member may upload. A previous receipt is replaced along with
    /// its items and claims. The transaction subtotal becomes the receipt
    /// subtotal plus tax. Reconciliation issues are returned, never raised.
    #[instrument(skip(self, structured))]
    pub async fn upload_receipt(
        &self,
        transaction_id: i64,
        uploader_id: &str,
        structured: &StructuredReceipt,
    ) -> Result<UploadedReceipt> {
        let report = validator::validate(structured);
        if !report.is_valid {
            warn!(
                "Receipt for transaction {transaction_id} has {} reconciliation issue(s)",
                report.issues.len()
            );
        }

        let subtotal_cents = crate::core::money::check_bill_amount(
            structured
                .totals
                .subtotal_cents
                .saturating_add(structured.totals.tax_cents),
        )?;

        let txn = self.db.begin().await?;
        let model = lock_transaction(&txn, transaction_id).await?;
        group::require_member(&txn, model.group_id, uploader_id).await?;
        ensure_pending(&model)?;

        if let Some(previous) = receipt::get_receipt_for_transaction(&txn, transaction_id).await?
        {
            debug!("Replacing receipt {} of transaction {transaction_id}", previous.id);
            receipt::delete_receipt(&txn, previous.id).await?;
        }

        let (stored, items) = receipt::insert_receipt(
            &txn,
            model.group_id,
            uploader_id,
            Some(transaction_id),
            structured,
        )
        .await?;
        let updated =
            apply_subtotal(&txn, model, subtotal_cents, Some(structured.totals.tax_cents)).await?;
        txn.commit().await?;

        self.notifier.notify(
            updated.group_id,
            GroupEvent::ReceiptUploaded {
                transaction_id,
                receipt_id: stored.id,
                item_count: items.len(),
                issues: report.issues.clone(),
            },
        );

        Ok(UploadedReceipt {
            receipt: stored,
            items,
            subtotal_cents: updated.subtotal_cents,
            report,
        })
    }

    /// Adds a manually entered item, creating an empty receipt if needed.
    /// The item price is added to the subtotal. Creator only, while pending.
    #[instrument(skip(self))]
    pub async fn add_line_item(
        &self,
        transaction_id: i64,
        requester_id: &str,
        name: &str,
        price_cents: i64,
    ) -> Result<line_item::Model> {
        let txn = self.db.begin().await?;
        let model = lock_transaction(&txn, transaction_id).await?;
        group::require_member(&txn, model.group_id, requester_id).await?;
        ensure_creator(&model, requester_id, "add items")?;
        ensure_pending(&model)?;

        let target = match receipt::get_receipt_for_transaction(&txn, transaction_id).await? {
            Some(existing) => existing,
            None => {
                let empty = StructuredReceipt {
                    merchant: None,
                    date: None,
                    totals: crate::core::normalizer::ReceiptTotals::default(),
                    items: Vec::new(),
                };
                receipt::insert_receipt(
                    &txn,
                    model.group_id,
                    requester_id,
                    Some(transaction_id),
                    &empty,
                )
                .await?
                .0
            }
        };

        let item = receipt::add_line_item(&txn, target.id, name, price_cents).await?;
        let subtotal_cents =
            crate::core::money::check_bill_amount(model.subtotal_cents + item.price_cents)?;
        let updated = apply_subtotal(&txn, model, subtotal_cents, None).await?;
        txn.commit().await?;

        self.notify_subtotal(&updated);
        Ok(item)
    }

    /// Checks that `item_id` belongs to the receipt of `model`.
    async fn require_transaction_item<C>(
        db: &C,
        model: &transaction::Model,
        item_id: i64,
    ) -> Result<line_item::Model>
    where
        C: ConnectionTrait,
    {
        let found = receipt::get_receipt_for_transaction(db, model.id)
            .await?
            .ok_or_else(|| Error::not_found("receipt for transaction", model.id))?;
        receipt::get_line_item(db, item_id)
            .await?
            .filter(|item| item.receipt_id == found.id)
            .ok_or_else(|| Error::not_found("line item", item_id))
    }

    /// Replaces the claimants of one item. Any member, while pending.
    ///
    /// Non-member IDs are dropped. Returns the stored claimant set.
    #[instrument(skip(self))]
    pub async fn set_claims(
        &self,
        transaction_id: i64,
        requester_id: &str,
        item_id: i64,
        member_ids: &[String],
    ) -> Result<Vec<String>> {
        let txn = self.db.begin().await?;
        let model = lock_transaction(&txn, transaction_id).await?;
        group::require_member(&txn, model.group_id, requester_id).await?;
        ensure_pending(&model)?;
        Self::require_transaction_item(&txn, &model, item_id).await?;

        let stored = claims::set_claims(&txn, item_id, member_ids).await?;
        txn.commit().await?;

        self.notifier.notify(
            model.group_id,
            GroupEvent::ClaimsUpdated {
                transaction_id,
                line_item_id: item_id,
                member_ids: stored.clone(),
            },
        );
        Ok(stored)
    }

    /// Claims the item for the requester, or releases it if already claimed.
    ///
    /// Returns whether the requester now claims the item, and its claimants.
    #[instrument(skip(self))]
    pub async fn toggle_claim(
        &self,
        transaction_id: i64,
        requester_id: &str,
        item_id: i64,
    ) -> Result<(bool, Vec<String>)> {
        let txn = self.db.begin().await?;
        let model = lock_transaction(&txn, transaction_id).await?;
        group::require_member(&txn, model.group_id, requester_id).await?;
        ensure_pending(&model)?;
        Self::require_transaction_item(&txn, &model, item_id).await?;

        let current = claims::get_item_claimants(&txn, item_id).await?;
        let (claimed, stored) = if current.iter().any(|c| c == requester_id) {
            (false, claims::remove_claim(&txn, item_id, requester_id).await?)
        } else {
            (true, claims::add_claim(&txn, item_id, requester_id).await?)
        };
        txn.commit().await?;

        self.notifier.notify(
            model.group_id,
            GroupEvent::ClaimsUpdated {
                transaction_id,
                line_item_id: item_id,
                member_ids: stored.clone(),
            },
        );
        Ok((claimed, stored))
    }

    /// Computes and stores the final allocations, then settles the transaction.
    ///
    /// Creator only. Item split requires an uploaded receipt. The linked
    /// receipt is marked completed.
    #[instrument(skip(self))]
    pub async fn finalize(
        &self,
        transaction_id: i64,
        requester_id: &str,
    ) -> Result<Vec<allocation_entity::Model>> {
        self.try_finalize(transaction_id, requester_id)
            .await
            .map_err(|e| contention_as_conflict(e, transaction_id))
    }

    async fn try_finalize(
        &self,
        transaction_id: i64,
        requester_id: &str,
    ) -> Result<Vec<allocation_entity::Model>> {
        let txn = self.db.begin().await?;
        let model = lock_transaction(&txn, transaction_id).await?;
        let group = group::require_member(&txn, model.group_id, requester_id).await?;
        ensure_creator(&model, requester_id, "finalize")?;
        ensure_pending(&model)?;

        let members = group::get_member_ids(&txn, model.group_id).await?;
        let linked = receipt::get_receipt_for_transaction(&txn, transaction_id).await?;
        let items = match (model.split_mode, linked.as_ref()) {
            (SplitMode::ItemSplit, None) => {
                return Err(Error::invalid_state(
                    "item split needs a receipt before it can be finalized",
                ));
            }
            (SplitMode::ItemSplit, Some(found)) => load_item_claims(&txn, found.id).await?,
            (SplitMode::EvenSplit, _) => Vec::new(),
        };

        let shares = allocation::allocate(
            &AllocationRequest {
                mode: model.split_mode,
                members: &members,
                host_id: &group.host_id,
                subtotal_cents: model.subtotal_cents,
                tax_cents: model.tax_cents,
                tip_cents: model.tip_cents,
                items: &items,
            },
            self.settings.remainder_policy,
        )?;

        let figures = SettledFigures {
            split_mode: model.split_mode,
            tip_cents: model.tip_cents,
            total_cents: model.subtotal_cents + model.tip_cents,
            fallback: false,
        };
        let allocations = settle_with(&txn, &model, &figures, linked.as_ref(), shares).await?;
        txn.commit().await?;

        info!(
            "Transaction {transaction_id} finalized with {} allocations",
            allocations.len()
        );
        self.notifier.notify(
            model.group_id,
            GroupEvent::Finalized {
                transaction_id,
                fallback: false,
                allocations: allocation_summary(&allocations),
            },
        );
        Ok(allocations)
    }

    /// Settles an expired transaction with an even split and no tip.
    ///
    /// The configured split mode is ignored. Fails with
    /// [`Error::InvalidState`] if the transaction is already settled or its
    /// deadline is still ahead of `now`.
    #[instrument(skip(self))]
    pub async fn run_deadline_fallback(
        &self,
        transaction_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<allocation_entity::Model>> {
        self.try_deadline_fallback(transaction_id, now)
            .await
            .map_err(|e| contention_as_conflict(e, transaction_id))
    }

    async fn try_deadline_fallback(
        &self,
        transaction_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<allocation_entity::Model>> {
        let txn = self.db.begin().await?;
        let model = lock_transaction(&txn, transaction_id).await?;
        ensure_pending(&model)?;
        if now < model.allocation_deadline {
            return Err(Error::invalid_state(format!(
                "transaction {transaction_id} is open until {}",
                model.allocation_deadline
            )));
        }

        let group = group::get_group(&txn, model.group_id)
            .await?
            .ok_or_else(|| Error::not_found("group", model.group_id))?;
        let members = group::get_member_ids(&txn, model.group_id).await?;
        let linked = receipt::get_receipt_for_transaction(&txn, transaction_id).await?;

        let shares = allocation::allocate(
            &AllocationRequest {
                mode: SplitMode::EvenSplit,
                members: &members,
                host_id: &group.host_id,
                subtotal_cents: model.subtotal_cents,
                tax_cents: model.tax_cents,
                tip_cents: 0,
                items: &[],
            },
            self.settings.remainder_policy,
        )?;

        let figures = SettledFigures {
            split_mode: SplitMode::EvenSplit,
            tip_cents: 0,
            total_cents: model.subtotal_cents,
            fallback: true,
        };
        let allocations = settle_with(&txn, &model, &figures, linked.as_ref(), shares).await?;
        txn.commit().await?;

        warn!(
            "Transaction {transaction_id} passed its deadline and was split evenly without tip"
        );
        self.notifier.notify(
            model.group_id,
            GroupEvent::Finalized {
                transaction_id,
                fallback: true,
                allocations: allocation_summary(&allocations),
            },
        );
        Ok(allocations)
    }

    /// Runs the deadline fallback for every pending transaction that expired
    /// at or before `now`. Returns the IDs that were settled.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let expired = Transaction::find()
            .filter(
                transaction::Column::Status.eq(TransactionStatus::PendingAllocation.into_value()),
            )
            .filter(transaction::Column::AllocationDeadline.lte(now))
            .order_by_asc(transaction::Column::Id)
            .all(&*self.db)
            .await?;

        let mut settled = Vec::with_capacity(expired.len());
        for model in expired {
            match self.run_deadline_fallback(model.id, now).await {
                Ok(_) => settled.push(model.id),
                // Finalized between the query and the fallback
                Err(Error::InvalidState { message }) => debug!("Skipping {}: {message}", model.id),
                Err(e) => error!("Deadline fallback failed for transaction {}: {e}", model.id),
            }
        }
        Ok(settled)
    }

    /// Records settlement bookkeeping for a settled transaction.
    ///
    /// Creator only. The amounts are already fixed; this stamps `recorded_at`
    /// once and fails on a second call.
    #[instrument(skip(self))]
    pub async fn settle(&self, transaction_id: i64, requester_id: &str) -> Result<SettlementRecord> {
        let txn = self.db.begin().await?;
        let model = lock_transaction(&txn, transaction_id).await?;
        group::require_member(&txn, model.group_id, requester_id).await?;
        ensure_creator(&model, requester_id, "record the settlement")?;
        if model.status != TransactionStatus::Settled {
            return Err(Error::invalid_state(format!(
                "transaction {transaction_id} has not been finalized"
            )));
        }
        if model.recorded_at.is_some() {
            return Err(Error::invalid_state(format!(
                "transaction {transaction_id} was already recorded"
            )));
        }

        let result = Transaction::update_many()
            .col_expr(transaction::Column::RecordedAt, Expr::value(Utc::now()))
            .filter(transaction::Column::Id.eq(transaction_id))
            .filter(transaction::Column::RecordedAt.is_null())
            .exec(&txn)
            .await?;
        if result.rows_affected != 1 {
            return Err(Error::invalid_state(format!(
                "transaction {transaction_id} was already recorded"
            )));
        }

        let updated = lock_transaction(&txn, transaction_id).await?;
        let allocations = Allocation::find()
            .filter(allocation_entity::Column::TransactionId.eq(transaction_id))
            .order_by_asc(allocation_entity::Column::Position)
            .all(&txn)
            .await?;
        txn.commit().await?;

        self.notifier.notify(
            updated.group_id,
            GroupEvent::Recorded {
                transaction_id,
                total_cents: updated.total_cents,
            },
        );
        Ok(SettlementRecord {
            transaction: updated,
            allocations,
        })
    }
}

/// Polls for expired transactions every `sweep_interval_seconds` and runs the
/// deadline fallback on them.
pub fn spawn_deadline_sweeper(engine: SettlementEngine) -> tokio::task::JoinHandle<()> {
    let period = std::time::Duration::from_secs(engine.settings.sweep_interval_seconds);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match engine.sweep_expired(Utc::now()).await {
                Ok(settled) if !settled.is_empty() => {
                    info!("Deadline sweep settled transactions {settled:?}");
                }
                Ok(_) => {}
                Err(e) => error!("Deadline sweep failed: {e}"),
            }
        }
    })
}
