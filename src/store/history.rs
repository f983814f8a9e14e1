//! Aggregates used by the vote predictor.

use std::collections::HashMap;

use super::error::StoreError;
use super::Store;

/// A member's Yea record on a set of roll calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YeaHistory {
    pub yea: i64,
    pub total: i64,
}

impl YeaHistory {
    pub fn yea_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.yea as f64 / self.total as f64
        }
    }
}

impl Store {
    /// Share of each member's cosponsorships on bills whose sponsor is from another party.
    ///
    /// Rows where either party is unknown are ignored. Members with no usable
    /// cosponsorships are absent from the map.
    pub async fn cross_party_propensity(&self) -> Result<HashMap<String, f64>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT c.member_id,
                        COUNT(*),
                        SUM(upper(m.party) <> upper(s.party))
                 FROM cosponsors c
                 JOIN members m ON m.member_id = c.member_id
                 JOIN bills b ON b.bill_id = c.bill_id
                 JOIN members s ON s.member_id = b.sponsor_bioguide
                 WHERE m.party IS NOT NULL AND m.party <> ''
                   AND s.party IS NOT NULL AND s.party <> ''
                 GROUP BY c.member_id",
                (),
            )
            .await?;
        let mut out = HashMap::new();
        while let Some(row) = rows.next().await? {
            let total = row.get::<i64>(1)?;
            let cross = row.get::<i64>(2)?;
            if total > 0 {
                out.insert(row.get::<String>(0)?, cross as f64 / total as f64);
            }
        }
        Ok(out)
    }

    /// Yea record of every member on roll calls about bills similar to `bill_id`.
    ///
    /// Similar means the same policy area or at least one shared subject term
    /// (case-insensitive). The bill itself is excluded.
    pub async fn issue_history(
        &self,
        bill_id: &str,
    ) -> Result<HashMap<String, YeaHistory>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "WITH target AS (
                    SELECT lower(trim(COALESCE(policy_area, ''))) AS area FROM bills WHERE bill_id = ?1
                 ),
                 similar AS (
                    SELECT b.bill_id FROM bills b, target t
                    WHERE t.area <> '' AND lower(trim(b.policy_area)) = t.area
                    UNION
                    SELECT s.bill_id FROM bill_subjects s
                    WHERE lower(trim(s.subject_term)) IN (
                        SELECT lower(trim(subject_term)) FROM bill_subjects WHERE bill_id = ?1
                    )
                 )
                 SELECT v.member_id, SUM(v.vote_code = 'Yea'), COUNT(*)
                 FROM votes v
                 JOIN rollcalls r ON r.rollcall_id = v.rollcall_id
                 WHERE r.bill_id IN (SELECT bill_id FROM similar WHERE bill_id <> ?1)
                   AND v.vote_code IN ('Yea', 'Nay')
                 GROUP BY v.member_id",
                [bill_id],
            )
            .await?;
        let mut out = HashMap::new();
        while let Some(row) = rows.next().await? {
            out.insert(
                row.get::<String>(0)?,
                YeaHistory {
                    yea: row.get::<i64>(1)?,
                    total: row.get::<i64>(2)?,
                },
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{house_member, memory_store};
    use super::*;
    use crate::models::{Bill, BillId, Chamber, Cosponsor, Rollcall, Vote, VoteCode};

    async fn add_bill(store: &Store, id: &str, sponsor: &str, area: Option<&str>) {
        let parsed: BillId = id.parse().unwrap();
        let mut bill = Bill::from_id(&parsed);
        bill.sponsor_bioguide = Some(sponsor.to_string());
        bill.policy_area = area.map(String::from);
        store.upsert_bill(&bill).await.unwrap();
    }

    async fn cosponsor(store: &Store, bill: &str, member: &str) {
        store
            .upsert_cosponsor(&Cosponsor {
                bill_id: bill.to_string(),
                member_id: member.to_string(),
                date: None,
                is_original: false,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cross_party_propensity() {
        let store = memory_store().await;
        for (id, party) in [("D1", "D"), ("R1", "R"), ("R2", "R")] {
            store.upsert_member(&house_member(id, party)).await.unwrap();
        }
        add_bill(&store, "hr-1-119", "D1", None).await;
        add_bill(&store, "hr-2-119", "R1", None).await;

        cosponsor(&store, "hr-1-119", "R2").await;
        cosponsor(&store, "hr-2-119", "R2").await;
        cosponsor(&store, "hr-2-119", "D1").await;

        let propensity = store.cross_party_propensity().await.unwrap();
        assert!((propensity["R2"] - 0.5).abs() < 1e-9);
        assert!((propensity["D1"] - 1.0).abs() < 1e-9);
        assert!(!propensity.contains_key("R1"));
    }

    #[tokio::test]
    async fn test_issue_history_by_policy_area_and_subject() {
        let store = memory_store().await;
        for (id, party) in [("D1", "D"), ("R1", "R")] {
            store.upsert_member(&house_member(id, party)).await.unwrap();
        }
        add_bill(&store, "hr-1-119", "D1", Some("Health")).await;
        add_bill(&store, "hr-2-119", "D1", Some("health")).await;
        add_bill(&store, "hr-3-119", "D1", Some("Energy")).await;
        add_bill(&store, "hr-4-119", "D1", None).await;
        store
            .replace_subjects("hr-1-119", &["Medicare".to_string()])
            .await
            .unwrap();
        store
            .replace_subjects("hr-4-119", &["MEDICARE".to_string()])
            .await
            .unwrap();

        for (n, bill) in ["hr-1-119", "hr-2-119", "hr-3-119", "hr-4-119"].iter().enumerate() {
            let rc = Rollcall {
                rollcall_id: Rollcall::make_id(Chamber::House, 119, 1, n as i64 + 1),
                congress: 119,
                chamber: Chamber::House,
                session: 1,
                rc_number: n as i64 + 1,
                date: None,
                question: None,
                bill_id: Some(bill.to_string()),
            };
            let votes = vec![
                Vote {
                    rollcall_id: rc.rollcall_id.clone(),
                    member_id: "D1".to_string(),
                    vote_code: VoteCode::Yea,
                },
                Vote {
                    rollcall_id: rc.rollcall_id.clone(),
                    member_id: "R1".to_string(),
                    vote_code: if n == 1 { VoteCode::Yea } else { VoteCode::Nay },
                },
            ];
            store.save_rollcall(&rc, &votes).await.unwrap();
        }

        let history = store.issue_history("hr-1-119").await.unwrap();
        // hr-2 (same area) and hr-4 (shared subject); not hr-1 itself, not hr-3.
        assert_eq!(history["D1"], YeaHistory { yea: 2, total: 2 });
        assert_eq!(history["R1"], YeaHistory { yea: 1, total: 2 });
        assert!((history["R1"].yea_rate() - 0.5).abs() < 1e-9);
    }
}
