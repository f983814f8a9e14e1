//! Member repository.

use std::collections::HashMap;

use crate::models::{Chamber, Member};

use super::error::StoreError;
use super::helpers::{date_param, get_opt_date, get_opt_string};
use super::Store;

pub(super) const MEMBER_COLUMNS: &str =
    "member_id, lis_id, first, last, party, state, district, start_date, end_date";

/// Matches House rows (district set) or Senate rows (district null).
pub(super) const CHAMBER_FILTER: &str = "(?1 IS NULL OR (?1 = 'house' AND district IS NOT NULL) OR (?1 = 'senate' AND district IS NULL))";

pub(super) fn row_to_member(row: &libsql::Row) -> Result<Member, StoreError> {
    Ok(Member {
        member_id: row.get::<String>(0)?,
        lis_id: get_opt_string(row, 1)?,
        first: row.get::<String>(2)?,
        last: row.get::<String>(3)?,
        party: get_opt_string(row, 4)?,
        state: row.get::<String>(5)?,
        district: row.get::<Option<i64>>(6)?,
        start_date: get_opt_date(row, 7)?,
        end_date: get_opt_date(row, 8)?,
    })
}

impl Store {
    /// Insert or update a member keyed by bioguide ID.
    ///
    /// Nullable fields keep their stored value when the new row leaves them empty.
    pub async fn upsert_member(&self, member: &Member) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO members (member_id, lis_id, first, last, party, state, district, start_date, end_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(member_id) DO UPDATE SET
                    lis_id = COALESCE(excluded.lis_id, members.lis_id),
                    first = excluded.first,
                    last = excluded.last,
                    party = COALESCE(excluded.party, members.party),
                    state = excluded.state,
                    district = excluded.district,
                    start_date = COALESCE(excluded.start_date, members.start_date),
                    end_date = COALESCE(excluded.end_date, members.end_date),
                    updated_at = datetime('now')",
                libsql::params![
                    member.member_id.as_str(),
                    member.lis_id.as_deref(),
                    member.first.as_str(),
                    member.last.as_str(),
                    member.party.as_deref(),
                    member.state.as_str(),
                    member.district,
                    date_param(member.start_date),
                    date_param(member.end_date)
                ],
            )
            .await?;
        Ok(())
    }

    /// Fetch one member.
    pub async fn get_member(&self, member_id: &str) -> Result<Option<Member>, StoreError> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE member_id = ?1");
        let mut rows = self.conn.query(&sql, [member_id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_member(&row)?)),
            None => Ok(None),
        }
    }

    /// All members, optionally limited to one chamber, ordered by name.
    pub async fn list_members(&self, chamber: Option<Chamber>) -> Result<Vec<Member>, StoreError> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE {CHAMBER_FILTER} ORDER BY last, first"
        );
        let mut rows = self
            .conn
            .query(&sql, libsql::params![chamber.map(|c| c.as_str())])
            .await?;
        let mut members = Vec::new();
        while let Some(row) = rows.next().await? {
            members.push(row_to_member(&row)?);
        }
        Ok(members)
    }

    /// Members of a chamber keyed by bioguide ID.
    pub async fn member_map(&self, chamber: Chamber) -> Result<HashMap<String, Member>, StoreError> {
        Ok(self
            .list_members(Some(chamber))
            .await?
            .into_iter()
            .map(|m| (m.member_id.clone(), m))
            .collect())
    }

    /// Resolve a Senate roll-call entry to a bioguide ID.
    ///
    /// Tries the stored LIS ID first, then a unique (last name, state) match
    /// among senators. A name match records the LIS ID for next time.
    pub async fn resolve_senator(
        &self,
        lis_id: &str,
        last: &str,
        state: &str,
    ) -> Result<Option<String>, StoreError> {
        if !lis_id.is_empty() {
            let mut rows = self
                .conn
                .query("SELECT member_id FROM members WHERE lis_id = ?1", [lis_id])
                .await?;
            if let Some(row) = rows.next().await? {
                return Ok(Some(row.get::<String>(0)?));
            }
        }

        let mut rows = self
            .conn
            .query(
                "SELECT member_id FROM members
                 WHERE district IS NULL AND lower(last) = lower(?1) AND upper(state) = upper(?2)",
                [last, state],
            )
            .await?;
        let mut matches = Vec::new();
        while let Some(row) = rows.next().await? {
            matches.push(row.get::<String>(0)?);
        }
        if matches.len() != 1 {
            return Ok(None);
        }
        let member_id = matches.remove(0);

        if !lis_id.is_empty() {
            self.conn
                .execute(
                    "UPDATE members SET lis_id = ?1 WHERE member_id = ?2",
                    [lis_id, member_id.as_str()],
                )
                .await?;
        }
        Ok(Some(member_id))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{house_member, memory_store, senator};
    use super::*;

    #[tokio::test]
    async fn test_upsert_and_get_member() {
        let store = memory_store().await;
        let member = house_member("A000001", "D");
        store.upsert_member(&member).await.unwrap();
        store.upsert_member(&member).await.unwrap();

        let loaded = store.get_member("A000001").await.unwrap().unwrap();
        assert_eq!(loaded, member);
        assert!(store.get_member("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_existing_party() {
        let store = memory_store().await;
        store.upsert_member(&house_member("A1", "R")).await.unwrap();

        let mut partial = house_member("A1", "R");
        partial.party = None;
        store.upsert_member(&partial).await.unwrap();

        let loaded = store.get_member("A1").await.unwrap().unwrap();
        assert_eq!(loaded.party.as_deref(), Some("R"));
    }

    #[tokio::test]
    async fn test_list_members_by_chamber() {
        let store = memory_store().await;
        store.upsert_member(&house_member("H1", "D")).await.unwrap();
        store.upsert_member(&house_member("H2", "R")).await.unwrap();
        store.upsert_member(&senator("S1", "R", "TX")).await.unwrap();

        assert_eq!(store.list_members(None).await.unwrap().len(), 3);
        assert_eq!(store.list_members(Some(Chamber::House)).await.unwrap().len(), 2);

        let senate = store.member_map(Chamber::Senate).await.unwrap();
        assert_eq!(senate.len(), 1);
        assert!(senate.contains_key("S1"));
    }

    #[tokio::test]
    async fn test_resolve_senator_by_name_records_lis() {
        let store = memory_store().await;
        let mut s = senator("C001098", "R", "TX");
        s.last = "Cruz".to_string();
        store.upsert_member(&s).await.unwrap();

        let found = store.resolve_senator("S355", "CRUZ", "tx").await.unwrap();
        assert_eq!(found.as_deref(), Some("C001098"));

        // Second lookup goes through the stored LIS ID.
        let found = store.resolve_senator("S355", "Other", "ZZ").await.unwrap();
        assert_eq!(found.as_deref(), Some("C001098"));

        assert!(store
            .resolve_senator("S999", "Nobody", "TX")
            .await
            .unwrap()
            .is_none());
    }
}
