//! Database configuration module for `SplitBuddy`.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust
//! structs without hand-written SQL.

use crate::entities::{Allocation, Claim, Group, GroupMember, LineItem, Receipt, Transaction};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use std::path::Path;
use tracing::debug;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/split_buddy.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable or the
/// default local `SQLite` file.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by [`get_database_url`].
///
/// For `SQLite` file URLs the parent directory is created if it is missing.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    if let Some(parent) = sqlite_file_parent(&database_url) {
        std::fs::create_dir_all(parent)?;
    }
    debug!("Connecting to database at {database_url}");
    Database::connect(&database_url).await.map_err(Into::into)
}

fn sqlite_file_parent(url: &str) -> Option<&Path> {
    let path = url.strip_prefix("sqlite://")?.split('?').next()?;
    Path::new(path).parent().filter(|p| !p.as_os_str().is_empty())
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates every table the settlement engine needs, skipping ones that exist.
///
/// Parent tables are created before the tables that reference them.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, Group).await?;
    create_table(db, &schema, GroupMember).await?;
    create_table(db, &schema, Transaction).await?;
    create_table(db, &schema, Receipt).await?;
    create_table(db, &schema, LineItem).await?;
    create_table(db, &schema, Claim).await?;
    create_table(db, &schema, Allocation).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        AllocationModel, ClaimModel, GroupMemberModel, GroupModel, LineItemModel, ReceiptModel,
        TransactionModel,
    };
    use sea_orm::QuerySelect;

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<GroupModel> = Group::find().limit(1).all(&db).await?;
        let _: Vec<GroupMemberModel> = GroupMember::find().limit(1).all(&db).await?;
        let _: Vec<TransactionModel> = Transaction::find().limit(1).all(&db).await?;
        let _: Vec<ReceiptModel> = Receipt::find().limit(1).all(&db).await?;
        let _: Vec<LineItemModel> = LineItem::find().limit(1).all(&db).await?;
        let _: Vec<ClaimModel> = Claim::find().limit(1).all(&db).await?;
        let _: Vec<AllocationModel> = Allocation::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_repeatable() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[test]
    fn test_sqlite_file_parent() {
        assert_eq!(
            sqlite_file_parent("sqlite://data/split_buddy.sqlite?mode=rwc"),
            Some(Path::new("data"))
        );
        assert_eq!(sqlite_file_parent("sqlite://bills.sqlite"), None);
        assert_eq!(sqlite_file_parent("sqlite::memory:"), None);
    }
}
