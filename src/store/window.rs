//! Bulk reads for the analysis passes.
//!
//! The analysis code is pure; it works on an [`AnalysisData`] snapshot
//! loaded here with a handful of set-oriented queries.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::models::{Amendment, Chamber, Cosponsor, Member, Rollcall, Vote};

use super::error::StoreError;
use super::helpers::{date_param, get_opt_date, get_opt_string, get_parsed};
use super::rollcalls::{row_to_rollcall, ROLLCALL_COLUMNS};
use super::Store;

/// Which slice of the record an analysis looks at. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisWindow {
    pub congress: i64,
    pub chamber: Chamber,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl AnalysisWindow {
    pub fn new(congress: i64, chamber: Chamber) -> Self {
        Self {
            congress,
            chamber,
            start: None,
            end: None,
        }
    }

    pub fn with_dates(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    fn params(&self) -> Vec<libsql::Value> {
        let date = |d: Option<NaiveDate>| match date_param(d) {
            Some(text) => libsql::Value::Text(text),
            None => libsql::Value::Null,
        };
        vec![
            libsql::Value::Integer(self.congress),
            libsql::Value::Text(self.chamber.as_str().to_string()),
            date(self.start),
            date(self.end),
        ]
    }
}

/// Everything the outlier and coalition passes read.
#[derive(Debug, Clone)]
pub struct AnalysisData {
    pub window: AnalysisWindow,
    /// Members of the chamber keyed by bioguide ID.
    pub members: HashMap<String, Member>,
    /// Roll calls in the window, ordered by date then number.
    pub rollcalls: Vec<Rollcall>,
    /// All votes on those roll calls.
    pub votes: Vec<Vote>,
    /// Cosponsors of the bills those roll calls are about, keyed by bill.
    pub rollcall_bill_cosponsors: HashMap<String, Vec<String>>,
    /// Cosponsorships of chamber bills introduced in the window.
    pub cosponsorships: Vec<Cosponsor>,
    /// Amendments to chamber bills introduced in the window.
    pub amendments: Vec<Amendment>,
    /// Subject terms of the bills in `cosponsorships`.
    pub bill_subjects: HashMap<String, Vec<String>>,
}

impl AnalysisData {
    /// Empty data for a window, used by tests and as a starting point.
    pub fn empty(window: AnalysisWindow) -> Self {
        Self {
            window,
            members: HashMap::new(),
            rollcalls: Vec::new(),
            votes: Vec::new(),
            rollcall_bill_cosponsors: HashMap::new(),
            cosponsorships: Vec::new(),
            amendments: Vec::new(),
            bill_subjects: HashMap::new(),
        }
    }

    /// Votes grouped by roll call.
    pub fn votes_by_rollcall(&self) -> HashMap<&str, Vec<&Vote>> {
        let mut grouped: HashMap<&str, Vec<&Vote>> = HashMap::new();
        for vote in &self.votes {
            grouped.entry(vote.rollcall_id.as_str()).or_default().push(vote);
        }
        grouped
    }

    /// Members whose term overlaps the window. Open-ended terms always overlap.
    pub fn active_members(&self) -> HashMap<&str, &Member> {
        self.members
            .iter()
            .filter(|(_, m)| {
                let started = match (m.start_date, self.window.end) {
                    (Some(s), Some(end)) => s <= end,
                    _ => true,
                };
                let not_ended = match (m.end_date, self.window.start) {
                    (Some(e), Some(start)) => e >= start,
                    _ => true,
                };
                started && not_ended
            })
            .map(|(id, m)| (id.as_str(), m))
            .collect()
    }
}

pub(super) fn row_to_vote(row: &libsql::Row) -> Result<Vote, StoreError> {
    Ok(Vote {
        rollcall_id: row.get::<String>(0)?,
        member_id: row.get::<String>(1)?,
        vote_code: get_parsed(row, 2)?,
    })
}

pub(super) fn row_to_cosponsor(row: &libsql::Row) -> Result<Cosponsor, StoreError> {
    Ok(Cosponsor {
        bill_id: row.get::<String>(0)?,
        member_id: row.get::<String>(1)?,
        date: get_opt_date(row, 2)?,
        is_original: row.get::<i64>(3)? != 0,
    })
}

fn row_to_amendment(row: &libsql::Row) -> Result<Amendment, StoreError> {
    Ok(Amendment {
        amendment_id: row.get::<String>(0)?,
        bill_id: row.get::<String>(1)?,
        sponsor_bioguide: get_opt_string(row, 2)?,
        amendment_type: get_opt_string(row, 3)?,
        purpose: get_opt_string(row, 4)?,
        introduced_date: get_opt_date(row, 5)?,
    })
}

const ROLLCALL_WINDOW: &str = "r.congress = ?1 AND r.chamber = ?2
    AND (?3 IS NULL OR r.date >= ?3) AND (?4 IS NULL OR r.date <= ?4)";

const BILL_WINDOW: &str = "b.congress = ?1 AND b.chamber = ?2
    AND (?3 IS NULL OR b.introduced_date >= ?3) AND (?4 IS NULL OR b.introduced_date <= ?4)";

const AMENDMENT_WINDOW: &str = "b.congress = ?1 AND b.chamber = ?2
    AND (?3 IS NULL OR a.introduced_date >= ?3) AND (?4 IS NULL OR a.introduced_date <= ?4)";

impl Store {
    /// Load the records an analysis run needs for one window.
    pub async fn load_analysis_data(
        &self,
        window: AnalysisWindow,
    ) -> Result<AnalysisData, StoreError> {
        let mut data = AnalysisData::empty(window);

        data.members = self.member_map(window.chamber).await?;

        let columns = ROLLCALL_COLUMNS
            .split(", ")
            .map(|c| format!("r.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {columns} FROM rollcalls r WHERE {ROLLCALL_WINDOW} ORDER BY r.date, r.session, r.rc_number"
        );
        let mut rows = self.conn.query(&sql, libsql::params_from_iter(window.params())).await?;
        while let Some(row) = rows.next().await? {
            data.rollcalls.push(row_to_rollcall(&row)?);
        }

        let sql = format!(
            "SELECT v.rollcall_id, v.member_id, v.vote_code
             FROM votes v JOIN rollcalls r ON r.rollcall_id = v.rollcall_id
             WHERE {ROLLCALL_WINDOW}"
        );
        let mut rows = self.conn.query(&sql, libsql::params_from_iter(window.params())).await?;
        while let Some(row) = rows.next().await? {
            data.votes.push(row_to_vote(&row)?);
        }

        let sql = format!(
            "SELECT c.bill_id, c.member_id FROM cosponsors c
             WHERE c.bill_id IN (SELECT r.bill_id FROM rollcalls r WHERE {ROLLCALL_WINDOW} AND r.bill_id IS NOT NULL)"
        );
        let mut rows = self.conn.query(&sql, libsql::params_from_iter(window.params())).await?;
        while let Some(row) = rows.next().await? {
            data.rollcall_bill_cosponsors
                .entry(row.get::<String>(0)?)
                .or_default()
                .push(row.get::<String>(1)?);
        }

        let sql = format!(
            "SELECT c.bill_id, c.member_id, c.cosponsor_date, c.is_original
             FROM cosponsors c JOIN bills b ON b.bill_id = c.bill_id
             WHERE {BILL_WINDOW}"
        );
        let mut rows = self.conn.query(&sql, libsql::params_from_iter(window.params())).await?;
        while let Some(row) = rows.next().await? {
            data.cosponsorships.push(row_to_cosponsor(&row)?);
        }

        let sql = format!(
            "SELECT a.amendment_id, a.bill_id, a.sponsor_bioguide, a.amendment_type, a.purpose, a.introduced_date
             FROM amendments a JOIN bills b ON b.bill_id = a.bill_id
             WHERE {AMENDMENT_WINDOW}"
        );
        let mut rows = self.conn.query(&sql, libsql::params_from_iter(window.params())).await?;
        while let Some(row) = rows.next().await? {
            data.amendments.push(row_to_amendment(&row)?);
        }

        let sql = format!(
            "SELECT s.bill_id, s.subject_term FROM bill_subjects s JOIN bills b ON b.bill_id = s.bill_id
             WHERE {BILL_WINDOW}"
        );
        let mut rows = self.conn.query(&sql, libsql::params_from_iter(window.params())).await?;
        let cosponsored: HashSet<&str> = data
            .cosponsorships
            .iter()
            .map(|c| c.bill_id.as_str())
            .collect();
        let mut subjects: HashMap<String, Vec<String>> = HashMap::new();
        while let Some(row) = rows.next().await? {
            let bill_id = row.get::<String>(0)?;
            if cosponsored.contains(bill_id.as_str()) {
                subjects.entry(bill_id).or_default().push(row.get::<String>(1)?);
            }
        }
        data.bill_subjects = subjects;

        info!(
            "Loaded {} {} members, {} roll calls, {} votes",
            data.members.len(),
            window.chamber,
            data.rollcalls.len(),
            data.votes.len()
        );
        debug!(
            "{} cosponsorships, {} amendments, {} bills with subjects",
            data.cosponsorships.len(),
            data.amendments.len(),
            data.bill_subjects.len()
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{house_member, memory_store, senator};
    use super::*;
    use crate::models::{Bill, BillId, VoteCode};

    fn day(d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2025, 3, d)
    }

    async fn seed(store: &Store) {
        for (id, party) in [("D1", "D"), ("D2", "D"), ("R1", "R")] {
            store.upsert_member(&house_member(id, party)).await.unwrap();
        }
        store.upsert_member(&senator("S1", "R", "TX")).await.unwrap();

        let bill_id: BillId = "hr-10-119".parse().unwrap();
        let mut bill = Bill::from_id(&bill_id);
        bill.introduced_date = day(1);
        store.upsert_bill(&bill).await.unwrap();
        store
            .replace_subjects("hr-10-119", &["Taxation".to_string()])
            .await
            .unwrap();
        for member in ["D1", "R1"] {
            store
                .upsert_cosponsor(&Cosponsor {
                    bill_id: "hr-10-119".to_string(),
                    member_id: member.to_string(),
                    date: day(2),
                    is_original: false,
                })
                .await
                .unwrap();
        }

        for (n, d) in [(1, 5), (2, 20)] {
            let rc = Rollcall {
                rollcall_id: Rollcall::make_id(Chamber::House, 119, 1, n),
                congress: 119,
                chamber: Chamber::House,
                session: 1,
                rc_number: n,
                date: day(d),
                question: None,
                bill_id: Some("hr-10-119".to_string()),
            };
            let votes: Vec<Vote> = ["D1", "D2", "R1"]
                .iter()
                .map(|m| Vote {
                    rollcall_id: rc.rollcall_id.clone(),
                    member_id: m.to_string(),
                    vote_code: VoteCode::Yea,
                })
                .collect();
            store.save_rollcall(&rc, &votes).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_load_whole_congress() {
        let store = memory_store().await;
        seed(&store).await;

        let data = store
            .load_analysis_data(AnalysisWindow::new(119, Chamber::House))
            .await
            .unwrap();
        assert_eq!(data.members.len(), 3);
        assert_eq!(data.rollcalls.len(), 2);
        assert_eq!(data.votes.len(), 6);
        assert_eq!(data.rollcall_bill_cosponsors["hr-10-119"].len(), 2);
        assert_eq!(data.cosponsorships.len(), 2);
        assert_eq!(data.bill_subjects["hr-10-119"], vec!["Taxation".to_string()]);
    }

    #[tokio::test]
    async fn test_load_date_window() {
        let store = memory_store().await;
        seed(&store).await;

        let window = AnalysisWindow::new(119, Chamber::House).with_dates(day(10), day(31));
        let data = store.load_analysis_data(window).await.unwrap();
        assert_eq!(data.rollcalls.len(), 1);
        assert_eq!(data.rollcalls[0].rc_number, 2);
        assert_eq!(data.votes.len(), 3);
        // Bill was introduced before the window.
        assert!(data.cosponsorships.is_empty());
        assert!(data.votes_by_rollcall().contains_key("h119-1-2"));
    }

    #[tokio::test]
    async fn test_load_other_chamber_is_empty() {
        let store = memory_store().await;
        seed(&store).await;

        let data = store
            .load_analysis_data(AnalysisWindow::new(119, Chamber::Senate))
            .await
            .unwrap();
        assert_eq!(data.members.len(), 1);
        assert!(data.rollcalls.is_empty());
        assert!(data.votes.is_empty());
    }

    #[test]
    fn test_active_members_respects_terms() {
        let window = AnalysisWindow::new(119, Chamber::House).with_dates(day(10), day(20));
        let mut data = AnalysisData::empty(window);

        let mut retired = house_member("OLD", "D");
        retired.end_date = day(1);
        let mut current = house_member("NOW", "R");
        current.start_date = day(5);
        let mut future = house_member("NEW", "R");
        future.start_date = day(25);
        for m in [retired, current, future] {
            data.members.insert(m.member_id.clone(), m);
        }

        let active = data.active_members();
        assert_eq!(active.len(), 1);
        assert!(active.contains_key("NOW"));
    }
}
