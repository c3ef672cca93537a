//! Reconciliation validator - Checks OCR figures for internal consistency.
//!
//! The report is advisory. It is shown to members so a human can fix an OCR
//! mismatch; it never blocks receipt upload or settlement.

use crate::core::{
    money::format_cents,
    normalizer::{RawExtraction, StructuredReceipt},
};
use serde::Serialize;
use std::fmt;

/// Allowed drift between figures, in cents
pub const TOLERANCE_CENTS: i64 = 2;

/// A receipt field a human should double-check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReviewField {
    Subtotal,
    Tax,
    Tip,
    Total,
    /// Price of the line item at this position
    LineItemPrice(usize),
}

impl fmt::Display for ReviewField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subtotal => f.write_str("subtotal"),
            Self::Tax => f.write_str("tax"),
            Self::Tip => f.write_str("tip"),
            Self::Total => f.write_str("total"),
            Self::LineItemPrice(index) => write!(f, "items[{index}].price"),
        }
    }
}

/// Outcome of [`validate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
    /// Deduplicated, in the order the checks flagged them
    pub suggested_fields_to_review: Vec<ReviewField>,
}

const fn within_tolerance(a: i64, b: i64) -> bool {
    a.abs_diff(b) <= TOLERANCE_CENTS.unsigned_abs()
}

/// Runs the three reconciliation checks on a structured receipt.
///
/// 1. `subtotal + tax + tip` matches `total`
/// 2. the line items add up to `subtotal`
/// 3. `total` is at least as large as every other figure
#[must_use]
pub fn validate(receipt: &StructuredReceipt) -> ValidationReport {
    let totals = receipt.totals;
    let sum_items = receipt.items_sum_cents();
    let mut issues = Vec::new();
    let mut fields = Vec::new();

    let computed_total = totals
        .subtotal_cents
        .saturating_add(totals.tax_cents)
        .saturating_add(totals.tip_cents);
    if !within_tolerance(computed_total, totals.total_cents) {
        issues.push(format!(
            "subtotal + tax + tip ({}) does not match total ({})",
            format_cents(computed_total),
            format_cents(totals.total_cents)
        ));
        fields.extend([
            ReviewField::Subtotal,
            ReviewField::Tax,
            ReviewField::Tip,
            ReviewField::Total,
        ]);
    }

    if !within_tolerance(sum_items, totals.subtotal_cents) {
        issues.push(format!(
            "line items add up to {} but subtotal is {}",
            format_cents(sum_items),
            format_cents(totals.subtotal_cents)
        ));
        fields.push(ReviewField::Subtotal);
        fields.extend((0..receipt.items.len()).map(ReviewField::LineItemPrice));
    }

    let largest = [
        totals.subtotal_cents,
        totals.tax_cents,
        totals.tip_cents,
        totals.total_cents,
        sum_items,
    ]
    .into_iter()
    .max()
    .unwrap_or_default();
    if largest > totals.total_cents.saturating_add(TOLERANCE_CENTS) {
        issues.push(format!(
            "total ({}) is smaller than another figure ({})",
            format_cents(totals.total_cents),
            format_cents(largest)
        ));
        fields.push(ReviewField::Total);
    }

    let mut suggested_fields_to_review: Vec<ReviewField> = Vec::with_capacity(fields.len());
    for field in fields {
        if !suggested_fields_to_review.contains(&field) {
            suggested_fields_to_review.push(field);
        }
    }

    ValidationReport {
        is_valid: issues.is_empty(),
        issues,
        suggested_fields_to_review,
    }
}

const ABSENT_SCORE: f64 = 0.2;
const PRESENT_SCORE: f64 = 0.6;
const RECONCILED_SCORE: f64 = 0.95;

/// Heuristic per-field confidence in `[0, 1]`.
///
/// This is a UI hint, not a calibrated probability. Printed fields start at a
/// baseline; fields that reconcile exactly with the others are boosted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldConfidence {
    pub merchant: f64,
    pub date: f64,
    pub subtotal: f64,
    pub tax: f64,
    pub tip: f64,
    pub total: f64,
    pub line_items: Vec<f64>,
}

const fn presence(printed: bool) -> f64 {
    if printed { PRESENT_SCORE } else { ABSENT_SCORE }
}

/// Scores each field of a normalized receipt against its raw extraction.
#[must_use]
pub fn score_confidence(raw: &RawExtraction, receipt: &StructuredReceipt) -> FieldConfidence {
    let totals = receipt.totals;
    let totals_reconcile = totals
        .subtotal_cents
        .saturating_add(totals.tax_cents)
        .saturating_add(totals.tip_cents)
        == totals.total_cents;
    let items_reconcile = receipt.items_sum_cents() == totals.subtotal_cents;

    let boosted = |printed: bool, reconciles: bool| {
        if printed && reconciles {
            RECONCILED_SCORE
        } else {
            presence(printed)
        }
    };

    let item_score = if items_reconcile {
        RECONCILED_SCORE
    } else {
        PRESENT_SCORE
    };

    FieldConfidence {
        merchant: presence(receipt.merchant.is_some()),
        date: presence(receipt.date.is_some()),
        subtotal: boosted(raw.subtotal.is_some(), totals_reconcile && items_reconcile),
        tax: boosted(raw.tax.is_some(), totals_reconcile),
        tip: boosted(raw.tip.is_some(), totals_reconcile),
        total: boosted(raw.total.is_some(), totals_reconcile),
        line_items: vec![item_score; receipt.items.len()],
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::normalizer::{ReceiptItem, ReceiptTotals, normalize};

    fn receipt(subtotal: i64, tax: i64, tip: i64, total: i64, items: &[i64]) -> StructuredReceipt {
        StructuredReceipt {
            merchant: None,
            date: None,
            totals: ReceiptTotals {
                subtotal_cents: subtotal,
                tax_cents: tax,
                tip_cents: tip,
                total_cents: total,
            },
            items: items
                .iter()
                .enumerate()
                .map(|(i, price)| ReceiptItem {
                    name: format!("item {i}"),
                    price_cents: *price,
                })
                .collect(),
        }
    }

    #[test]
    fn test_consistent_receipt_is_valid() {
        let report = validate(&receipt(2497, 225, 0, 2722, &[1299, 699, 499]));
        assert!(report.is_valid);
        assert!(report.issues.is_empty());
        assert!(report.suggested_fields_to_review.is_empty());
    }

    #[test]
    fn test_item_sum_mismatch_flags_subtotal_and_items() {
        let report = validate(&receipt(1000, 100, 0, 1100, &[500, 300]));
        assert!(!report.is_valid);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].contains("subtotal"));
        assert!(report.issues[0].contains("line items"));
        assert_eq!(
            report.suggested_fields_to_review,
            vec![
                ReviewField::Subtotal,
                ReviewField::LineItemPrice(0),
                ReviewField::LineItemPrice(1)
            ]
        );
    }

    #[test]
    fn test_tolerance_absorbs_small_drift() {
        let report = validate(&receipt(1000, 80, 0, 1082, &[999]));
        assert!(report.is_valid);

        let report = validate(&receipt(1000, 80, 0, 1083, &[1000]));
        assert!(!report.is_valid);
    }

    #[test]
    fn test_total_must_dominate() {
        // Totals check and dominance both fail; total is listed once
        let report = validate(&receipt(5000, 0, 0, 1000, &[5000]));
        assert!(!report.is_valid);
        assert_eq!(report.issues.len(), 2);
        assert_eq!(
            report.suggested_fields_to_review,
            vec![
                ReviewField::Subtotal,
                ReviewField::Tax,
                ReviewField::Tip,
                ReviewField::Total
            ]
        );
    }

    #[test]
    fn test_review_field_display() {
        assert_eq!(ReviewField::Subtotal.to_string(), "subtotal");
        assert_eq!(ReviewField::LineItemPrice(3).to_string(), "items[3].price");
    }

    #[test]
    fn test_confidence_boosts_reconciled_fields() {
        let raw = RawExtraction {
            merchant_name: Some("Diner".to_string()),
            subtotal: Some(10.0),
            tax: Some(1.0),
            total: Some(11.0),
            line_items: vec![crate::core::normalizer::RawLineItem {
                description: Some("Plate".to_string()),
                price: Some(10.0),
                ..Default::default()
            }],
            ..Default::default()
        };
        let normalized = normalize(&raw);
        let confidence = score_confidence(&raw, &normalized);

        assert_eq!(confidence.subtotal, RECONCILED_SCORE);
        assert_eq!(confidence.total, RECONCILED_SCORE);
        assert_eq!(confidence.tip, ABSENT_SCORE);
        assert_eq!(confidence.date, ABSENT_SCORE);
        assert_eq!(confidence.merchant, PRESENT_SCORE);
        assert_eq!(confidence.line_items, vec![RECONCILED_SCORE]);
    }

    #[test]
    fn test_confidence_stays_at_baseline_on_mismatch() {
        let raw = RawExtraction {
            subtotal: Some(10.0),
            total: Some(12.0),
            ..Default::default()
        };
        let normalized = normalize(&raw);
        let confidence = score_confidence(&raw, &normalized);
        assert_eq!(confidence.subtotal, PRESENT_SCORE);
        assert_eq!(confidence.total, PRESENT_SCORE);
        assert!(confidence.line_items.is_empty());
    }

    #[test]
    fn test_huge_figures_are_reported_not_overflowed() {
        let huge = i64::MAX / 2;
        let structured = receipt(huge, huge, huge, 100, &[huge, huge, huge]);

        let report = validate(&structured);
        assert!(!report.is_valid);
        assert!(report.suggested_fields_to_review.contains(&ReviewField::Total));

        let confidence = score_confidence(&RawExtraction::default(), &structured);
        assert_eq!(confidence.total, ABSENT_SCORE);
    }
}
