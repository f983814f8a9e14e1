//! Database migration runner.
//!
//! Embeds the SQL migration files at compile time and executes them on
//! database open. All statements use `IF NOT EXISTS` for idempotent re-running.

use super::error::StoreError;
use super::Store;

/// Members, bills, subjects, amendments, roll calls, votes, cosponsors.
const MIGRATION_001: &str = include_str!("../../migrations/001_initial.sql");

impl Store {
    /// Run all embedded migrations in sequence.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(MIGRATION_001)
            .await
            .map_err(|e| StoreError::Migration(format!("001_initial: {e}")))?;
        Ok(())
    }
}
