//! Roll-call and vote repository.

use crate::models::{Rollcall, Vote};

use super::error::StoreError;
use super::helpers::{date_param, get_opt_date, get_opt_string, get_parsed};
use super::Store;

pub(super) const ROLLCALL_COLUMNS: &str =
    "rollcall_id, congress, chamber, session, rc_number, date, question, bill_id";

pub(super) fn row_to_rollcall(row: &libsql::Row) -> Result<Rollcall, StoreError> {
    Ok(Rollcall {
        rollcall_id: row.get::<String>(0)?,
        congress: row.get::<i64>(1)?,
        chamber: get_parsed(row, 2)?,
        session: row.get::<i64>(3)?,
        rc_number: row.get::<i64>(4)?,
        date: get_opt_date(row, 5)?,
        question: get_opt_string(row, 6)?,
        bill_id: get_opt_string(row, 7)?,
    })
}

/// Result of saving one roll call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Votes written.
    pub votes: usize,
    /// Votes dropped because the member is not in the database.
    pub skipped: usize,
}

impl Store {
    /// Save a roll call and its votes in one transaction.
    ///
    /// Re-saving replaces vote codes in place. Votes by unknown members
    /// are counted and dropped.
    pub async fn save_rollcall(
        &self,
        rollcall: &Rollcall,
        votes: &[Vote],
    ) -> Result<SaveOutcome, StoreError> {
        let tx = self.conn.transaction().await?;

        tx.execute(
            "INSERT INTO rollcalls (rollcall_id, congress, chamber, session, rc_number, date, question, bill_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(rollcall_id) DO UPDATE SET
                date = COALESCE(excluded.date, rollcalls.date),
                question = COALESCE(excluded.question, rollcalls.question),
                bill_id = COALESCE(excluded.bill_id, rollcalls.bill_id)",
            libsql::params![
                rollcall.rollcall_id.as_str(),
                rollcall.congress,
                rollcall.chamber.as_str(),
                rollcall.session,
                rollcall.rc_number,
                date_param(rollcall.date),
                rollcall.question.as_deref(),
                rollcall.bill_id.as_deref()
            ],
        )
        .await?;

        let mut outcome = SaveOutcome::default();
        for vote in votes {
            let changed = tx
                .execute(
                    "INSERT INTO votes (rollcall_id, member_id, vote_code)
                     SELECT ?1, ?2, ?3
                     WHERE EXISTS (SELECT 1 FROM members WHERE member_id = ?2)
                     ON CONFLICT(rollcall_id, member_id) DO UPDATE SET vote_code = excluded.vote_code",
                    [
                        rollcall.rollcall_id.as_str(),
                        vote.member_id.as_str(),
                        vote.vote_code.as_str(),
                    ],
                )
                .await?;
            if changed > 0 {
                outcome.votes += 1;
            } else {
                outcome.skipped += 1;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    /// Whether a roll call is already stored.
    pub async fn rollcall_exists(&self, rollcall_id: &str) -> Result<bool, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM rollcalls WHERE rollcall_id = ?1", [rollcall_id])
            .await?;
        Ok(rows.next().await?.is_some())
    }

    pub async fn get_rollcall(&self, rollcall_id: &str) -> Result<Option<Rollcall>, StoreError> {
        let sql = format!("SELECT {ROLLCALL_COLUMNS} FROM rollcalls WHERE rollcall_id = ?1");
        let mut rows = self.conn.query(&sql, [rollcall_id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_rollcall(&row)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{house_member, memory_store};
    use super::*;
    use crate::models::{Chamber, VoteCode};
    use chrono::NaiveDate;

    fn rollcall() -> Rollcall {
        Rollcall {
            rollcall_id: "h119-1-5".to_string(),
            congress: 119,
            chamber: Chamber::House,
            session: 1,
            rc_number: 5,
            date: NaiveDate::from_ymd_opt(2025, 1, 7),
            question: Some("On Passage".to_string()),
            bill_id: Some("hr-5-119".to_string()),
        }
    }

    fn vote(member: &str, code: VoteCode) -> Vote {
        Vote {
            rollcall_id: "h119-1-5".to_string(),
            member_id: member.to_string(),
            vote_code: code,
        }
    }

    #[tokio::test]
    async fn test_save_rollcall_skips_unknown_members() {
        let store = memory_store().await;
        store.upsert_member(&house_member("M1", "D")).await.unwrap();
        store.upsert_member(&house_member("M2", "R")).await.unwrap();

        let votes = vec![
            vote("M1", VoteCode::Yea),
            vote("M2", VoteCode::Nay),
            vote("GHOST", VoteCode::Yea),
        ];
        let outcome = store.save_rollcall(&rollcall(), &votes).await.unwrap();
        assert_eq!(outcome, SaveOutcome { votes: 2, skipped: 1 });

        // The bill does not exist yet; the soft reference is kept.
        let loaded = store.get_rollcall("h119-1-5").await.unwrap().unwrap();
        assert_eq!(loaded, rollcall());
        assert!(store.rollcall_exists("h119-1-5").await.unwrap());
        assert!(!store.rollcall_exists("h119-1-6").await.unwrap());
    }

    #[tokio::test]
    async fn test_save_rollcall_is_idempotent() {
        let store = memory_store().await;
        store.upsert_member(&house_member("M1", "D")).await.unwrap();

        store
            .save_rollcall(&rollcall(), &[vote("M1", VoteCode::Yea)])
            .await
            .unwrap();
        store
            .save_rollcall(&rollcall(), &[vote("M1", VoteCode::Nay)])
            .await
            .unwrap();

        let votes = store.rollcall_positions("h119-1-5").await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].vote_code, Some(VoteCode::Nay));
    }
}
