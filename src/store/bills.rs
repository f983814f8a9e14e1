//! Bill, subject, amendment and cosponsor repository.

use crate::models::{Amendment, Bill, BillId, Chamber, Cosponsor};

use super::error::StoreError;
use super::helpers::{date_param, get_opt_date, get_opt_string, get_parsed};
use super::Store;

const BILL_COLUMNS: &str = "bill_id, congress, chamber, number, bill_type, title, introduced_date, sponsor_bioguide, policy_area";

fn row_to_bill(row: &libsql::Row) -> Result<Bill, StoreError> {
    Ok(Bill {
        bill_id: row.get::<String>(0)?,
        congress: row.get::<i64>(1)?,
        chamber: get_parsed(row, 2)?,
        number: row.get::<i64>(3)?,
        bill_type: row.get::<String>(4)?,
        title: get_opt_string(row, 5)?,
        introduced_date: get_opt_date(row, 6)?,
        sponsor_bioguide: get_opt_string(row, 7)?,
        policy_area: get_opt_string(row, 8)?,
    })
}

impl Store {
    /// Insert or update a bill.
    ///
    /// A sponsor that is not in `members` is stored as NULL rather than
    /// failing the foreign key.
    pub async fn upsert_bill(&self, bill: &Bill) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO bills (bill_id, congress, chamber, number, bill_type, title, introduced_date, sponsor_bioguide, policy_area)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                         (SELECT member_id FROM members WHERE member_id = ?8), ?9)
                 ON CONFLICT(bill_id) DO UPDATE SET
                    title = COALESCE(excluded.title, bills.title),
                    introduced_date = COALESCE(excluded.introduced_date, bills.introduced_date),
                    sponsor_bioguide = COALESCE(excluded.sponsor_bioguide, bills.sponsor_bioguide),
                    policy_area = COALESCE(excluded.policy_area, bills.policy_area),
                    updated_at = datetime('now')",
                libsql::params![
                    bill.bill_id.as_str(),
                    bill.congress,
                    bill.chamber.as_str(),
                    bill.number,
                    bill.bill_type.as_str(),
                    bill.title.as_deref(),
                    date_param(bill.introduced_date),
                    bill.sponsor_bioguide.as_deref(),
                    bill.policy_area.as_deref()
                ],
            )
            .await?;
        Ok(())
    }

    /// Make sure a placeholder row exists for a bill referenced by a vote feed.
    pub async fn ensure_bill(&self, id: &BillId) -> Result<(), StoreError> {
        let bill = Bill::from_id(id);
        self.conn
            .execute(
                "INSERT OR IGNORE INTO bills (bill_id, congress, chamber, number, bill_type)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                libsql::params![
                    bill.bill_id.as_str(),
                    bill.congress,
                    bill.chamber.as_str(),
                    bill.number,
                    bill.bill_type.as_str()
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn get_bill(&self, bill_id: &str) -> Result<Option<Bill>, StoreError> {
        let sql = format!("SELECT {BILL_COLUMNS} FROM bills WHERE bill_id = ?1");
        let mut rows = self.conn.query(&sql, [bill_id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_bill(&row)?)),
            None => Ok(None),
        }
    }

    /// Bills of a congress, optionally one chamber.
    pub async fn list_bills(
        &self,
        congress: Option<i64>,
        chamber: Option<Chamber>,
    ) -> Result<Vec<Bill>, StoreError> {
        let sql = format!(
            "SELECT {BILL_COLUMNS} FROM bills
             WHERE (?1 IS NULL OR congress = ?1) AND (?2 IS NULL OR chamber = ?2)
             ORDER BY congress, bill_type, number"
        );
        let mut rows = self
            .conn
            .query(&sql, libsql::params![congress, chamber.map(|c| c.as_str())])
            .await?;
        let mut bills = Vec::new();
        while let Some(row) = rows.next().await? {
            bills.push(row_to_bill(&row)?);
        }
        Ok(bills)
    }

    /// Replace the subject terms of a bill.
    pub async fn replace_subjects(&self, bill_id: &str, subjects: &[String]) -> Result<(), StoreError> {
        let tx = self.conn.transaction().await?;
        tx.execute("DELETE FROM bill_subjects WHERE bill_id = ?1", [bill_id])
            .await?;
        for subject in subjects {
            tx.execute(
                "INSERT OR IGNORE INTO bill_subjects (bill_id, subject_term) VALUES (?1, ?2)",
                [bill_id, subject.as_str()],
            )
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Subject terms of a bill, alphabetically.
    pub async fn bill_subjects(&self, bill_id: &str) -> Result<Vec<String>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT subject_term FROM bill_subjects WHERE bill_id = ?1 ORDER BY subject_term",
                [bill_id],
            )
            .await?;
        let mut subjects = Vec::new();
        while let Some(row) = rows.next().await? {
            subjects.push(row.get::<String>(0)?);
        }
        Ok(subjects)
    }

    /// Insert or update a cosponsorship.
    ///
    /// Returns `false` when the member is unknown and the row was skipped.
    pub async fn upsert_cosponsor(&self, cosponsor: &Cosponsor) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute(
                "INSERT INTO cosponsors (bill_id, member_id, cosponsor_date, is_original)
                 SELECT ?1, ?2, ?3, ?4
                 WHERE EXISTS (SELECT 1 FROM members WHERE member_id = ?2)
                 ON CONFLICT(bill_id, member_id) DO UPDATE SET
                    cosponsor_date = COALESCE(excluded.cosponsor_date, cosponsors.cosponsor_date),
                    is_original = excluded.is_original",
                libsql::params![
                    cosponsor.bill_id.as_str(),
                    cosponsor.member_id.as_str(),
                    date_param(cosponsor.date),
                    i64::from(cosponsor.is_original)
                ],
            )
            .await?;
        Ok(changed > 0)
    }

    /// Cosponsors of one bill.
    pub async fn bill_cosponsors(&self, bill_id: &str) -> Result<Vec<Cosponsor>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT bill_id, member_id, cosponsor_date, is_original FROM cosponsors
                 WHERE bill_id = ?1 ORDER BY cosponsor_date, member_id",
                [bill_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(super::window::row_to_cosponsor(&row)?);
        }
        Ok(out)
    }

    /// Insert or update an amendment.
    pub async fn upsert_amendment(&self, amendment: &Amendment) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO amendments (amendment_id, bill_id, sponsor_bioguide, amendment_type, purpose, introduced_date)
                 VALUES (?1, ?2, (SELECT member_id FROM members WHERE member_id = ?3), ?4, ?5, ?6)
                 ON CONFLICT(amendment_id) DO UPDATE SET
                    sponsor_bioguide = COALESCE(excluded.sponsor_bioguide, amendments.sponsor_bioguide),
                    amendment_type = COALESCE(excluded.amendment_type, amendments.amendment_type),
                    purpose = COALESCE(excluded.purpose, amendments.purpose),
                    introduced_date = COALESCE(excluded.introduced_date, amendments.introduced_date)",
                libsql::params![
                    amendment.amendment_id.as_str(),
                    amendment.bill_id.as_str(),
                    amendment.sponsor_bioguide.as_deref(),
                    amendment.amendment_type.as_deref(),
                    amendment.purpose.as_deref(),
                    date_param(amendment.introduced_date)
                ],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{house_member, memory_store};
    use super::*;
    use chrono::NaiveDate;

    fn sample_bill() -> Bill {
        Bill {
            bill_id: "hr-1-119".to_string(),
            congress: 119,
            chamber: Chamber::House,
            number: 1,
            bill_type: "hr".to_string(),
            title: Some("Lower Energy Costs Act".to_string()),
            introduced_date: NaiveDate::from_ymd_opt(2025, 1, 9),
            sponsor_bioguide: Some("S1".to_string()),
            policy_area: Some("Energy".to_string()),
        }
    }

    #[tokio::test]
    async fn test_upsert_bill_with_unknown_sponsor() {
        let store = memory_store().await;
        store.upsert_bill(&sample_bill()).await.unwrap();

        let loaded = store.get_bill("hr-1-119").await.unwrap().unwrap();
        assert_eq!(loaded.sponsor_bioguide, None);
        assert_eq!(loaded.title.as_deref(), Some("Lower Energy Costs Act"));
    }

    #[tokio::test]
    async fn test_ensure_bill_does_not_clobber() {
        let store = memory_store().await;
        store.upsert_member(&house_member("S1", "R")).await.unwrap();
        store.upsert_bill(&sample_bill()).await.unwrap();

        let id: BillId = "hr-1-119".parse().unwrap();
        store.ensure_bill(&id).await.unwrap();

        let loaded = store.get_bill("hr-1-119").await.unwrap().unwrap();
        assert_eq!(loaded, sample_bill());
        assert_eq!(store.list_bills(Some(119), None).await.unwrap().len(), 1);
        assert!(store
            .list_bills(None, Some(Chamber::Senate))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_replace_subjects() {
        let store = memory_store().await;
        store.upsert_bill(&sample_bill()).await.unwrap();
        store
            .replace_subjects("hr-1-119", &["Oil".to_string(), "Gas".to_string()])
            .await
            .unwrap();
        store
            .replace_subjects("hr-1-119", &["Oil".to_string(), "Coal".to_string()])
            .await
            .unwrap();

        let subjects = store.bill_subjects("hr-1-119").await.unwrap();
        assert_eq!(subjects, vec!["Coal".to_string(), "Oil".to_string()]);
    }

    #[tokio::test]
    async fn test_cosponsor_skips_unknown_member() {
        let store = memory_store().await;
        store.upsert_bill(&sample_bill()).await.unwrap();
        store.upsert_member(&house_member("C1", "D")).await.unwrap();

        let mut cosponsor = Cosponsor {
            bill_id: "hr-1-119".to_string(),
            member_id: "C1".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, 10),
            is_original: true,
        };
        assert!(store.upsert_cosponsor(&cosponsor).await.unwrap());
        assert!(store.upsert_cosponsor(&cosponsor).await.unwrap());

        cosponsor.member_id = "NOPE".to_string();
        assert!(!store.upsert_cosponsor(&cosponsor).await.unwrap());

        let all = store.bill_cosponsors("hr-1-119").await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_original);
    }
}
