//! libSQL storage for congressional records.
//!
//! Holds members, bills, subjects, amendments, roll calls, votes and
//! cosponsorships. Every loader writes through the upserts in this module
//! and every reader (analysis, API) goes through its queries.

pub mod error;
pub mod helpers;
mod migrations;

mod api;
mod bills;
mod history;
mod members;
mod rollcalls;
mod window;

pub use api::TableCounts;
pub use history::YeaHistory;
pub use rollcalls::SaveOutcome;
pub use window::{AnalysisData, AnalysisWindow};

use error::StoreError;
use libsql::Builder;
use tracing::debug;

/// Tables in dependency order.
pub const TABLES: [&str; 7] = [
    "members",
    "bills",
    "bill_subjects",
    "amendments",
    "rollcalls",
    "votes",
    "cosponsors",
];

/// Database handle.
pub struct Store {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: libsql::Connection,
}

impl Store {
    /// Open (or create) a local database file and apply migrations.
    ///
    /// `:memory:` gives a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        debug!("Opening database at {}", path);
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Must be set per connection.
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| StoreError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        let store = Self { db, conn };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Write a consistent copy of the database to `dest`.
    pub async fn vacuum_into(&self, dest: &str) -> Result<(), StoreError> {
        self.conn
            .execute("VACUUM INTO ?1", [dest])
            .await
            .map_err(|e| StoreError::Query(format!("VACUUM INTO {dest}: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::Member;

    pub async fn memory_store() -> Store {
        Store::open(":memory:").await.unwrap()
    }

    pub fn member(id: &str, party: &str, state: &str, district: Option<i64>) -> Member {
        Member {
            member_id: id.to_string(),
            lis_id: None,
            first: "First".to_string(),
            last: id.to_string(),
            party: Some(party.to_string()),
            state: state.to_string(),
            district,
            start_date: None,
            end_date: None,
        }
    }

    pub fn house_member(id: &str, party: &str) -> Member {
        member(id, party, "OH", Some(1))
    }

    pub fn senator(id: &str, party: &str, state: &str) -> Member {
        member(id, party, state, None)
    }
}
