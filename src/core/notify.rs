//! Group notifications - State-change events pushed to a group's channel.
//!
//! The engine only depends on the [`GroupNotifier`] trait. Delivery is
//! fire-and-forget: implementations must not block and cannot fail the
//! operation that produced the event.

use crate::core::money::format_cents;
use crate::entities::transaction::SplitMode;
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::info;

/// Something that happened to a group's settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupEvent {
    /// A bill was opened
    TransactionCreated {
        /// ID of the new transaction
        transaction_id: i64,
        /// How the bill will be divided
        split_mode: SplitMode,
        /// When the deadline fallback takes over
        deadline: DateTime<Utc>,
    },
    /// The creator changed the tip
    TipUpdated {
        /// ID of the updated transaction
        transaction_id: i64,
        /// New tip in cents
        tip_cents: i64,
        /// Subtotal plus the new tip, in cents
        total_cents: i64,
    },
    /// The subtotal changed through a manual item or receipt
    SubtotalUpdated {
        /// ID of the updated transaction
        transaction_id: i64,
        /// New subtotal in cents, tax included
        subtotal_cents: i64,
        /// New subtotal plus the tip, in cents
        total_cents: i64,
    },
    /// A receipt was attached to the bill
    ReceiptUploaded {
        /// ID of the transaction the receipt belongs to
        transaction_id: i64,
        /// ID of the stored receipt
        receipt_id: i64,
        /// Line items kept after normalization
        item_count: usize,
        /// Advisory reconciliation issues
        issues: Vec<String>,
    },
    /// The claimants of one line item changed
    ClaimsUpdated {
        /// ID of the transaction the item belongs to
        transaction_id: i64,
        /// ID of the claimed line item
        line_item_id: i64,
        /// Members now claiming the item
        member_ids: Vec<String>,
    },
    /// Allocations were computed and the bill settled
    Finalized {
        /// ID of the settled transaction
        transaction_id: i64,
        /// True when the deadline fallback produced the allocations
        fallback: bool,
        /// `(member_id, amount_cents)` in member order
        allocations: Vec<(String, i64)>,
    },
    /// The creator recorded the settlement
    Recorded {
        /// ID of the recorded transaction
        transaction_id: i64,
        /// Settled total in cents
        total_cents: i64,
    },
}

impl GroupEvent {
    /// Transaction the event is about
    #[must_use]
    pub const fn transaction_id(&self) -> i64 {
        match self {
            Self::TransactionCreated { transaction_id, .. }
            | Self::TipUpdated { transaction_id, .. }
            | Self::SubtotalUpdated { transaction_id, .. }
            | Self::ReceiptUploaded { transaction_id, .. }
            | Self::ClaimsUpdated { transaction_id, .. }
            | Self::Finalized { transaction_id, .. }
            | Self::Recorded { transaction_id, .. } => *transaction_id,
        }
    }
}

impl fmt::Display for GroupEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransactionCreated {
                transaction_id,
                split_mode,
                deadline,
            } => {
                let mode = match split_mode {
                    SplitMode::EvenSplit => "even split",
                    SplitMode::ItemSplit => "item split",
                };
                write!(
                    f,
                    "Bill #{transaction_id} started ({mode}). Allocation closes at {}.",
                    deadline.format("%H:%M UTC")
                )
            }
            Self::TipUpdated {
                transaction_id,
                tip_cents,
                total_cents,
            } => write!(
                f,
                "Bill #{transaction_id}: tip set to {}, total now {}.",
                format_cents(*tip_cents),
                format_cents(*total_cents)
            ),
            Self::SubtotalUpdated {
                transaction_id,
                subtotal_cents,
                total_cents,
            } => write!(
                f,
                "Bill #{transaction_id}: subtotal set to {}, total now {}.",
                format_cents(*subtotal_cents),
                format_cents(*total_cents)
            ),
            Self::ReceiptUploaded {
                transaction_id,
                receipt_id,
                item_count,
                issues,
            } => {
                write!(
                    f,
                    "Bill #{transaction_id}: receipt #{receipt_id} uploaded with {item_count} items."
                )?;
                if !issues.is_empty() {
                    write!(f, " Please double-check: {}.", issues.join("; "))?;
                }
                Ok(())
            }
            Self::ClaimsUpdated {
                transaction_id,
                line_item_id,
                member_ids,
            } => write!(
                f,
                "Bill #{transaction_id}: item #{line_item_id} now claimed by {} member(s).",
                member_ids.len()
            ),
            Self::Finalized {
                transaction_id,
                fallback,
                allocations,
            } => {
                if *fallback {
                    write!(
                        f,
                        "Bill #{transaction_id} timed out and was split evenly without tip:"
                    )?;
                } else {
                    write!(f, "Bill #{transaction_id} finalized:")?;
                }
                for (member_id, amount_cents) in allocations {
                    write!(f, "\n• <@{member_id}> owes {}", format_cents(*amount_cents))?;
                }
                Ok(())
            }
            Self::Recorded {
                transaction_id,
                total_cents,
            } => write!(
                f,
                "Bill #{transaction_id} recorded as settled ({}).",
                format_cents(*total_cents)
            ),
        }
    }
}

/// Abstract "notify group" collaborator
pub trait GroupNotifier: Send + Sync {
    /// Publishes an event to everyone watching the group.
    fn notify(&self, group_id: i64, event: GroupEvent);
}

/// Notifier that only writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl GroupNotifier for LoggingNotifier {
    fn notify(&self, group_id: i64, event: GroupEvent) {
        info!(group_id, transaction_id = event.transaction_id(), "{event}");
    }
}
