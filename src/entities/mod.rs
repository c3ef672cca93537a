//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod allocation;
pub mod claim;
pub mod group;
pub mod group_member;
pub mod line_item;
pub mod receipt;
pub mod transaction;

// Re-export specific types to avoid conflicts
pub use allocation::{Column as AllocationColumn, Entity as Allocation, Model as AllocationModel};
pub use claim::{Column as ClaimColumn, Entity as Claim, Model as ClaimModel};
pub use group::{Column as GroupColumn, Entity as Group, Model as GroupModel};
pub use group_member::{
    Column as GroupMemberColumn, Entity as GroupMember, Model as GroupMemberModel,
};
pub use line_item::{Column as LineItemColumn, Entity as LineItem, Model as LineItemModel};
pub use receipt::{Column as ReceiptColumn, Entity as Receipt, Model as ReceiptModel};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel, SplitMode,
    TransactionStatus,
};
