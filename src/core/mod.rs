//! Core business logic - framework-agnostic settlement operations.
//!
//! Nothing in here knows about Discord. The bot layer calls into these modules
//! and renders their results.

pub mod allocation;
pub mod bank_link;
pub mod claims;
pub mod group;
pub mod money;
pub mod normalizer;
pub mod notify;
pub mod receipt;
pub mod transaction;
pub mod validator;
