//! Read-side queries backing the JSON API.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{Bill, Chamber, Member, Rollcall, VoteCode};

use super::error::StoreError;
use super::helpers::{get_opt_date, get_opt_string, get_parsed};
use super::members::{row_to_member, CHAMBER_FILTER, MEMBER_COLUMNS};
use super::rollcalls::row_to_rollcall;
use super::{Store, TABLES};

/// Row counts for every table plus the party split of members.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableCounts {
    pub tables: BTreeMap<String, i64>,
    pub parties: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberActivity {
    #[serde(flatten)]
    pub member: Member,
    pub name: String,
    pub vote_count: i64,
    pub cosponsor_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BillListing {
    #[serde(flatten)]
    pub bill: Bill,
    pub sponsor_name: Option<String>,
    pub sponsor_party: Option<String>,
    pub cosponsor_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollcallTally {
    #[serde(flatten)]
    pub rollcall: Rollcall,
    pub yea: i64,
    pub nay: i64,
    pub present: i64,
    pub not_voting: i64,
}

/// One vote or cosponsorship joined with the member who cast it.
#[derive(Debug, Clone, Serialize)]
pub struct MemberPosition {
    pub member_id: String,
    pub name: String,
    pub party: Option<String>,
    pub state: String,
    pub district: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_code: Option<VoteCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cosponsor_date: Option<chrono::NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_original: Option<bool>,
}

fn chamber_param(chamber: Option<Chamber>) -> libsql::Value {
    match chamber {
        Some(c) => libsql::Value::Text(c.as_str().to_string()),
        None => libsql::Value::Null,
    }
}

impl Store {
    /// Counts for the summary endpoint.
    pub async fn table_counts(&self) -> Result<TableCounts, StoreError> {
        let mut counts = TableCounts::default();
        for table in TABLES {
            let mut rows = self
                .conn
                .query(&format!("SELECT COUNT(*) FROM {table}"), ())
                .await?;
            let row = rows.next().await?.ok_or(StoreError::NoResult)?;
            counts.tables.insert(table.to_string(), row.get::<i64>(0)?);
        }

        let mut rows = self
            .conn
            .query(
                "SELECT COALESCE(party, 'Unknown'), COUNT(*) FROM members GROUP BY 1 ORDER BY 1",
                (),
            )
            .await?;
        while let Some(row) = rows.next().await? {
            counts
                .parties
                .insert(row.get::<String>(0)?, row.get::<i64>(1)?);
        }
        Ok(counts)
    }

    /// Members with how many votes and cosponsorships they have on record.
    pub async fn member_activity(
        &self,
        chamber: Option<Chamber>,
    ) -> Result<Vec<MemberActivity>, StoreError> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS},
                (SELECT COUNT(*) FROM votes v WHERE v.member_id = members.member_id),
                (SELECT COUNT(*) FROM cosponsors c WHERE c.member_id = members.member_id)
             FROM members WHERE {CHAMBER_FILTER} ORDER BY last, first"
        );
        let mut rows = self.conn.query(&sql, [chamber_param(chamber)]).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            let member = row_to_member(&row)?;
            out.push(MemberActivity {
                name: member.name(),
                member,
                vote_count: row.get::<i64>(9)?,
                cosponsor_count: row.get::<i64>(10)?,
            });
        }
        Ok(out)
    }

    /// Bills with sponsor details and cosponsor counts.
    pub async fn bill_listings(
        &self,
        chamber: Option<Chamber>,
    ) -> Result<Vec<BillListing>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT b.bill_id, b.congress, b.chamber, b.number, b.bill_type, b.title,
                        b.introduced_date, b.sponsor_bioguide, b.policy_area,
                        CASE WHEN m.member_id IS NULL THEN NULL ELSE m.first || ' ' || m.last END,
                        m.party,
                        (SELECT COUNT(*) FROM cosponsors c WHERE c.bill_id = b.bill_id)
                 FROM bills b LEFT JOIN members m ON m.member_id = b.sponsor_bioguide
                 WHERE (?1 IS NULL OR b.chamber = ?1)
                 ORDER BY b.congress DESC, b.introduced_date DESC, b.bill_id",
                [chamber_param(chamber)],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(BillListing {
                bill: Bill {
                    bill_id: row.get::<String>(0)?,
                    congress: row.get::<i64>(1)?,
                    chamber: get_parsed(&row, 2)?,
                    number: row.get::<i64>(3)?,
                    bill_type: row.get::<String>(4)?,
                    title: get_opt_string(&row, 5)?,
                    introduced_date: get_opt_date(&row, 6)?,
                    sponsor_bioguide: get_opt_string(&row, 7)?,
                    policy_area: get_opt_string(&row, 8)?,
                },
                sponsor_name: get_opt_string(&row, 9)?,
                sponsor_party: get_opt_string(&row, 10)?,
                cosponsor_count: row.get::<i64>(11)?,
            });
        }
        Ok(out)
    }

    /// Roll calls with their vote tallies, newest first.
    pub async fn rollcall_tallies(
        &self,
        chamber: Option<Chamber>,
    ) -> Result<Vec<RollcallTally>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT r.rollcall_id, r.congress, r.chamber, r.session, r.rc_number, r.date, r.question, r.bill_id,
                        COALESCE(SUM(v.vote_code = 'Yea'), 0),
                        COALESCE(SUM(v.vote_code = 'Nay'), 0),
                        COALESCE(SUM(v.vote_code = 'Present'), 0),
                        COALESCE(SUM(v.vote_code = 'Not Voting'), 0)
                 FROM rollcalls r LEFT JOIN votes v ON v.rollcall_id = r.rollcall_id
                 WHERE (?1 IS NULL OR r.chamber = ?1)
                 GROUP BY r.rollcall_id
                 ORDER BY r.date DESC, r.rc_number DESC",
                [chamber_param(chamber)],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(RollcallTally {
                rollcall: row_to_rollcall(&row)?,
                yea: row.get::<i64>(8)?,
                nay: row.get::<i64>(9)?,
                present: row.get::<i64>(10)?,
                not_voting: row.get::<i64>(11)?,
            });
        }
        Ok(out)
    }

    /// Individual votes on a roll call with member details.
    pub async fn rollcall_positions(
        &self,
        rollcall_id: &str,
    ) -> Result<Vec<MemberPosition>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT m.member_id, m.first || ' ' || m.last, m.party, m.state, m.district, v.vote_code
                 FROM votes v JOIN members m ON m.member_id = v.member_id
                 WHERE v.rollcall_id = ?1
                 ORDER BY m.party, m.last",
                [rollcall_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(MemberPosition {
                member_id: row.get::<String>(0)?,
                name: row.get::<String>(1)?,
                party: get_opt_string(&row, 2)?,
                state: row.get::<String>(3)?,
                district: row.get::<Option<i64>>(4)?,
                vote_code: Some(get_parsed(&row, 5)?),
                cosponsor_date: None,
                is_original: None,
            });
        }
        Ok(out)
    }

    /// Cosponsors of a bill with member details.
    pub async fn cosponsor_positions(
        &self,
        bill_id: &str,
    ) -> Result<Vec<MemberPosition>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT m.member_id, m.first || ' ' || m.last, m.party, m.state, m.district,
                        c.cosponsor_date, c.is_original
                 FROM cosponsors c JOIN members m ON m.member_id = c.member_id
                 WHERE c.bill_id = ?1
                 ORDER BY c.cosponsor_date, m.last",
                [bill_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(MemberPosition {
                member_id: row.get::<String>(0)?,
                name: row.get::<String>(1)?,
                party: get_opt_string(&row, 2)?,
                state: row.get::<String>(3)?,
                district: row.get::<Option<i64>>(4)?,
                vote_code: None,
                cosponsor_date: get_opt_date(&row, 5)?,
                is_original: Some(row.get::<i64>(6)? != 0),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{house_member, memory_store, senator};
    use super::*;
    use crate::models::{BillId, Cosponsor, Vote};

    async fn seed(store: &Store) {
        store.upsert_member(&house_member("D1", "D")).await.unwrap();
        store.upsert_member(&house_member("R1", "R")).await.unwrap();
        store.upsert_member(&senator("S1", "I", "VT")).await.unwrap();

        let id: BillId = "hr-2-119".parse().unwrap();
        let mut bill = Bill::from_id(&id);
        bill.sponsor_bioguide = Some("D1".to_string());
        store.upsert_bill(&bill).await.unwrap();
        store
            .upsert_cosponsor(&Cosponsor {
                bill_id: "hr-2-119".to_string(),
                member_id: "R1".to_string(),
                date: None,
                is_original: true,
            })
            .await
            .unwrap();

        let rc = Rollcall {
            rollcall_id: "h119-1-1".to_string(),
            congress: 119,
            chamber: Chamber::House,
            session: 1,
            rc_number: 1,
            date: None,
            question: None,
            bill_id: Some("hr-2-119".to_string()),
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
                vote_code: VoteCode::NotVoting,
            },
        ];
        store.save_rollcall(&rc, &votes).await.unwrap();
    }

    #[tokio::test]
    async fn test_table_counts() {
        let store = memory_store().await;
        seed(&store).await;

        let counts = store.table_counts().await.unwrap();
        assert_eq!(counts.tables["members"], 3);
        assert_eq!(counts.tables["votes"], 2);
        assert_eq!(counts.tables["amendments"], 0);
        assert_eq!(counts.parties["I"], 1);
    }

    #[tokio::test]
    async fn test_member_activity() {
        let store = memory_store().await;
        seed(&store).await;

        let house = store.member_activity(Some(Chamber::House)).await.unwrap();
        assert_eq!(house.len(), 2);
        let r1 = house.iter().find(|m| m.member.member_id == "R1").unwrap();
        assert_eq!(r1.vote_count, 1);
        assert_eq!(r1.cosponsor_count, 1);
    }

    #[tokio::test]
    async fn test_bill_listings_and_tallies() {
        let store = memory_store().await;
        seed(&store).await;

        let bills = store.bill_listings(None).await.unwrap();
        assert_eq!(bills.len(), 1);
        assert_eq!(bills[0].sponsor_party.as_deref(), Some("D"));
        assert_eq!(bills[0].sponsor_name.as_deref(), Some("First D1"));
        assert_eq!(bills[0].cosponsor_count, 1);

        let tallies = store.rollcall_tallies(Some(Chamber::House)).await.unwrap();
        assert_eq!(tallies.len(), 1);
        assert_eq!((tallies[0].yea, tallies[0].nay, tallies[0].not_voting), (1, 0, 1));
        assert!(store
            .rollcall_tallies(Some(Chamber::Senate))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_positions() {
        let store = memory_store().await;
        seed(&store).await;

        let votes = store.rollcall_positions("h119-1-1").await.unwrap();
        assert_eq!(votes.len(), 2);
        assert_eq!(votes[0].vote_code, Some(VoteCode::Yea));

        let cosponsors = store.cosponsor_positions("hr-2-119").await.unwrap();
        assert_eq!(cosponsors.len(), 1);
        assert_eq!(cosponsors[0].is_original, Some(true));
        assert!(store.cosponsor_positions("hr-9-119").await.unwrap().is_empty());
    }
}
