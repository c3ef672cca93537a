//! Discord command implementations organized by category.

#![allow(clippy::too_long_first_doc_paragraph)]

/// Bill lifecycle commands
pub mod bill;

/// General utility commands
pub mod general;

/// Group membership commands
pub mod group;

/// Helpers shared by command modules
pub mod utils;

// Export commands
pub use bill::*;
pub use general::*;
pub use group::*;
