//! Shared test utilities for `SplitBuddy`.
//!
//! This module provides common helper functions for setting up test databases
//! and creating groups, receipts and engines with sensible defaults.

use crate::{
    config::settings::SettlementSettings,
    core::{
        bank_link::ConfiguredBankLinks,
        group,
        normalizer::{ReceiptItem, ReceiptTotals, StructuredReceipt},
        notify::{GroupEvent, GroupNotifier},
        receipt,
        transaction::SettlementEngine,
    },
    entities,
    errors::Result,
};
use sea_orm::DatabaseConnection;
use std::sync::{Arc, Mutex};

/// Discord ID of the host in every test group
pub const TEST_HOST: &str = "host";

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a group hosted by [`TEST_HOST`] with `others` joined in order.
pub async fn create_test_group(
    db: &DatabaseConnection,
    others: &[&str],
) -> Result<entities::group::Model> {
    let group = group::create_group(db, "Test Group".to_string(), TEST_HOST.to_string(), None)
        .await?;
    for member in others {
        group::add_member(db, group.id, (*member).to_string()).await?;
    }
    Ok(group)
}

/// Builds a reconciled receipt: subtotal is the item sum, total adds `tax_cents`.
pub fn test_receipt(items: &[(&str, i64)], tax_cents: i64) -> StructuredReceipt {
    let items: Vec<ReceiptItem> = items
        .iter()
        .map(|(name, price_cents)| ReceiptItem {
            name: (*name).to_string(),
            price_cents: *price_cents,
        })
        .collect();
    let subtotal_cents = items.iter().map(|i| i.price_cents).sum();
    StructuredReceipt {
        merchant: Some("Test Diner".to_string()),
        date: None,
        totals: ReceiptTotals {
            subtotal_cents,
            tax_cents,
            tip_cents: 0,
            total_cents: subtotal_cents + tax_cents,
        },
        items,
    }
}

/// Sets up a group and a standalone receipt with a burger and fries.
/// Returns (db, receipt, items).
pub async fn setup_with_receipt(
    others: &[&str],
) -> Result<(
    DatabaseConnection,
    entities::receipt::Model,
    Vec<entities::line_item::Model>,
)> {
    let db = setup_test_db().await?;
    let group = create_test_group(&db, others).await?;
    let structured = test_receipt(&[("Burger", 1200), ("Fries", 450)], 0);
    let (receipt, items) =
        receipt::insert_receipt(&db, group.id, TEST_HOST, None, &structured).await?;
    Ok((db, receipt, items))
}

/// Owned member ID list
pub fn ids(members: &[&str]) -> Vec<String> {
    members.iter().map(|m| (*m).to_string()).collect()
}

/// Notifier that keeps every event for later assertions
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(i64, GroupEvent)>>,
}

impl RecordingNotifier {
    /// Events received so far
    #[allow(clippy::unwrap_used)]
    pub fn events(&self) -> Vec<(i64, GroupEvent)> {
        self.events.lock().unwrap().clone()
    }
}

impl GroupNotifier for RecordingNotifier {
    #[allow(clippy::unwrap_used)]
    fn notify(&self, group_id: i64, event: GroupEvent) {
        self.events.lock().unwrap().push((group_id, event));
    }
}

/// Builds an engine with default settings and no bank-link requirement.
/// The engine takes ownership of the connection.
pub fn test_engine(db: DatabaseConnection) -> (SettlementEngine, Arc<RecordingNotifier>) {
    test_engine_with(db, SettlementSettings::default())
}

/// Builds an engine with custom settlement settings.
pub fn test_engine_with(
    db: DatabaseConnection,
    settings: SettlementSettings,
) -> (SettlementEngine, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = SettlementEngine::new(
        Arc::new(db),
        Arc::clone(&notifier) as Arc<dyn GroupNotifier>,
        Arc::new(ConfiguredBankLinks::default()),
        settings,
    );
    (engine, notifier)
}
