//! Bank-link precondition - Whether a member may start a settlement.
//!
//! The real virtual-card/bank service is an external collaborator. The engine
//! asks it a single question through [`BankLinkCheck`].

use crate::config::settings::BankLinkSettings;
use std::collections::HashSet;

/// Answers whether a member has an active bank link
pub trait BankLinkCheck: Send + Sync {
    /// True when `member_id` can be charged
    fn has_active_link(&self, member_id: &str) -> bool;
}

/// Bank-link check driven by the `[bank_link]` settings section
#[derive(Debug, Clone, Default)]
pub struct ConfiguredBankLinks {
    required: bool,
    linked: HashSet<String>,
}

impl ConfiguredBankLinks {
    /// Builds the check from settings
    #[must_use]
    pub fn from_settings(settings: &BankLinkSettings) -> Self {
        Self {
            required: settings.required,
            linked: settings.linked_members.iter().cloned().collect(),
        }
    }
}

impl BankLinkCheck for ConfiguredBankLinks {
    fn has_active_link(&self, member_id: &str) -> bool {
        !self.required || self.linked.contains(member_id)
    }
}
