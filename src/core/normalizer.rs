//! Line-item normalizer - Turns raw OCR extraction output into a structured receipt.
//!
//! The extraction payload is loose: any total may be missing, prices arrive as
//! floats and item rows may be junk. Normalization is pure and deterministic:
//!
//! - items with a non-positive price, a price above [`MAX_ITEM_PRICE_CENTS`], or
//!   an empty or overlong name are discarded
//! - a missing subtotal defaults to the sum of accepted items
//! - missing tax and tip default to zero
//! - a missing total defaults to the largest of subtotal, tax and tip

use crate::core::money::{MAX_BILL_AMOUNT_CENTS, MAX_ITEM_PRICE_CENTS, dollars_to_cents};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Longest accepted line-item name, in characters
pub const MAX_ITEM_NAME_CHARS: usize = 120;

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%d.%m.%Y", "%Y/%m/%d"];

/// One row as produced by the extraction collaborator
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawLineItem {
    /// Printed description
    #[serde(default, alias = "name")]
    pub description: Option<String>,
    /// Line total, when printed
    #[serde(default)]
    pub price: Option<f64>,
    /// Unit price, used with `quantity` when no line total is present
    #[serde(default)]
    pub unit_price: Option<f64>,
    /// Quantity, defaults to 1
    #[serde(default)]
    pub quantity: Option<f64>,
}

impl RawLineItem {
    fn line_total(&self) -> Option<f64> {
        self.price
            .or_else(|| self.unit_price.map(|unit| unit * self.quantity.unwrap_or(1.0)))
    }
}

/// Raw extraction output for a whole receipt
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawExtraction {
    #[serde(default, alias = "merchant")]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub subtotal: Option<f64>,
    #[serde(default)]
    pub tax: Option<f64>,
    #[serde(default)]
    pub tip: Option<f64>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default, alias = "items")]
    pub line_items: Vec<RawLineItem>,
}

/// Receipt-level figures in cents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReceiptTotals {
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub tip_cents: i64,
    pub total_cents: i64,
}

/// An accepted line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptItem {
    pub name: String,
    pub price_cents: i64,
}

/// Normalized receipt ready to be validated and persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredReceipt {
    pub merchant: Option<String>,
    pub date: Option<NaiveDate>,
    pub totals: ReceiptTotals,
    pub items: Vec<ReceiptItem>,
}

impl StructuredReceipt {
    /// Sum of all line-item prices
    #[must_use]
    pub fn items_sum_cents(&self) -> i64 {
        self.items
            .iter()
            .fold(0_i64, |sum, item| sum.saturating_add(item.price_cents))
    }
}

/// Cleans up an item name, returning `None` when it is empty or too long.
#[must_use]
pub fn clean_item_name(name: &str) -> Option<String> {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    let length = collapsed.chars().count();
    (length > 0 && length <= MAX_ITEM_NAME_CHARS).then_some(collapsed)
}

/// Returns the price when it is positive and below the item ceiling.
#[must_use]
pub const fn accept_item_price(price_cents: i64) -> Option<i64> {
    if price_cents > 0 && price_cents <= MAX_ITEM_PRICE_CENTS {
        Some(price_cents)
    } else {
        None
    }
}

fn normalize_item(raw: &RawLineItem) -> Option<ReceiptItem> {
    let name = clean_item_name(raw.description.as_deref()?)?;
    let price_cents = accept_item_price(dollars_to_cents(raw.line_total()?)?)?;
    Some(ReceiptItem { name, price_cents })
}

/// Non-finite figures and those outside `0..=MAX_BILL_AMOUNT_CENTS` are treated as absent.
fn known_amount(value: Option<f64>) -> Option<i64> {
    value
        .and_then(dollars_to_cents)
        .filter(|cents| (0..=MAX_BILL_AMOUNT_CENTS).contains(cents))
}

fn parse_receipt_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// Normalizes a raw extraction into a [`StructuredReceipt`].
#[must_use]
pub fn normalize(raw: &RawExtraction) -> StructuredReceipt {
    let items: Vec<ReceiptItem> = raw.line_items.iter().filter_map(normalize_item).collect();
    let sum_items: i64 = items.iter().map(|item| item.price_cents).sum();

    if items.len() < raw.line_items.len() {
        debug!(
            "Discarded {} of {} extracted line items",
            raw.line_items.len() - items.len(),
            raw.line_items.len()
        );
    }

    let subtotal_cents = known_amount(raw.subtotal).unwrap_or(sum_items);
    let tax_cents = known_amount(raw.tax).unwrap_or(0);
    let tip_cents = known_amount(raw.tip).unwrap_or(0);
    let total_cents = known_amount(raw.total)
        .unwrap_or_else(|| subtotal_cents.max(tax_cents).max(tip_cents));

    StructuredReceipt {
        merchant: raw
            .merchant_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string),
        date: raw.date.as_deref().and_then(parse_receipt_date),
        totals: ReceiptTotals {
            subtotal_cents,
            tax_cents,
            tip_cents,
            total_cents,
        },
        items,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn item(description: &str, price: f64) -> RawLineItem {
        RawLineItem {
            description: Some(description.to_string()),
            price: Some(price),
            ..Default::default()
        }
    }

    #[test]
    fn test_discards_implausible_items() {
        let raw = RawExtraction {
            line_items: vec![
                item("Burger", 12.5),
                item("Refund", -3.0),
                item("Free water", 0.0),
                item("Typo", 150_000.0),
                item("   ", 4.0),
                item(&"x".repeat(121), 2.0),
                RawLineItem {
                    description: Some("No price".to_string()),
                    ..Default::default()
                },
                item("Fries", 4.0),
            ],
            ..Default::default()
        };

        let receipt = normalize(&raw);
        let names: Vec<&str> = receipt.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Burger", "Fries"]);
        assert_eq!(receipt.items_sum_cents(), 1650);
    }

    #[test]
    fn test_accepts_name_at_length_limit() {
        let raw = RawExtraction {
            line_items: vec![item(&"y".repeat(MAX_ITEM_NAME_CHARS), 1.0)],
            ..Default::default()
        };
        assert_eq!(normalize(&raw).items.len(), 1);
    }

    #[test]
    fn test_unit_price_times_quantity() {
        let raw = RawExtraction {
            line_items: vec![RawLineItem {
                description: Some("Tacos".to_string()),
                unit_price: Some(3.25),
                quantity: Some(3.0),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(normalize(&raw).items[0].price_cents, 975);
    }

    #[test]
    fn test_defaults_when_totals_missing() {
        let raw = RawExtraction {
            line_items: vec![item("A", 10.0), item("B", 5.5)],
            ..Default::default()
        };

        let totals = normalize(&raw).totals;
        assert_eq!(totals.subtotal_cents, 1550);
        assert_eq!(totals.tax_cents, 0);
        assert_eq!(totals.tip_cents, 0);
        assert_eq!(totals.total_cents, 1550);
    }

    #[test]
    fn test_missing_total_takes_largest_known_figure() {
        let raw = RawExtraction {
            subtotal: Some(20.0),
            tax: Some(1.8),
            tip: Some(4.0),
            line_items: vec![item("A", 20.0)],
            ..Default::default()
        };
        assert_eq!(normalize(&raw).totals.total_cents, 2000);

        let empty = normalize(&RawExtraction::default());
        assert_eq!(empty.totals, ReceiptTotals::default());
        assert!(empty.items.is_empty());
    }

    #[test]
    fn test_keeps_printed_figures() {
        let raw = RawExtraction {
            merchant_name: Some("  Luigi's  ".to_string()),
            date: Some("03/14/2025".to_string()),
            subtotal: Some(24.97),
            tax: Some(2.25),
            total: Some(27.22),
            line_items: vec![item("Pizza", 18.99), item("Soda", 5.98)],
            ..Default::default()
        };

        let receipt = normalize(&raw);
        assert_eq!(receipt.merchant.as_deref(), Some("Luigi's"));
        assert_eq!(receipt.date, NaiveDate::from_ymd_opt(2025, 3, 14));
        assert_eq!(
            receipt.totals,
            ReceiptTotals {
                subtotal_cents: 2497,
                tax_cents: 225,
                tip_cents: 0,
                total_cents: 2722,
            }
        );
    }

    #[test]
    fn test_negative_figures_treated_as_absent() {
        let raw = RawExtraction {
            subtotal: Some(-1.0),
            tax: Some(f64::NAN),
            line_items: vec![item("A", 3.0)],
            ..Default::default()
        };
        let totals = normalize(&raw).totals;
        assert_eq!(totals.subtotal_cents, 300);
        assert_eq!(totals.tax_cents, 0);
    }

    #[test]
    fn test_unparseable_date_is_dropped() {
        let raw = RawExtraction {
            date: Some("sometime last week".to_string()),
            ..Default::default()
        };
        assert!(normalize(&raw).date.is_none());
    }

    #[test]
    fn test_deserializes_extraction_json() {
        let json = r#"{
            "merchant": "Cafe",
            "total": 9.5,
            "items": [{ "name": "Latte", "price": 4.75 }, { "name": "Scone", "unit_price": 2.375, "quantity": 2 }]
        }"#;
        let raw: RawExtraction = serde_json::from_str(json).unwrap();
        let receipt = normalize(&raw);
        assert_eq!(receipt.merchant.as_deref(), Some("Cafe"));
        assert_eq!(receipt.items_sum_cents(), 950);
        assert_eq!(receipt.totals.total_cents, 950);
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = RawExtraction {
            subtotal: Some(7.0),
            line_items: vec![item("A", 3.0), item("B", 4.0), item("", 1.0)],
            ..Default::default()
        };
        assert_eq!(normalize(&raw), normalize(&raw));
    }

    #[test]
    fn test_out_of_range_totals_are_treated_as_absent() {
        let json = r#"{"subtotal": 6e16, "tax": 6e16, "total": 1.0,
            "line_items": [{"description": "Soup", "price": 8.0}]}"#;
        let raw: RawExtraction = serde_json::from_str(json).unwrap();
        let receipt = normalize(&raw);
        assert_eq!(receipt.totals.subtotal_cents, 800);
        assert_eq!(receipt.totals.tax_cents, 0);
        assert_eq!(receipt.totals.total_cents, 100);

        let report = crate::core::validator::validate(&receipt);
        assert!(!report.is_valid);
    }

    #[test]
    fn test_accepts_totals_at_bill_limit() {
        let raw = RawExtraction {
            subtotal: Some(999_999.0),
            total: Some(1_000_000.0),
            ..Default::default()
        };
        let receipt = normalize(&raw);
        assert_eq!(receipt.totals.subtotal_cents, MAX_BILL_AMOUNT_CENTS);
        assert_eq!(receipt.totals.total_cents, MAX_BILL_AMOUNT_CENTS);
    }
}
