//! Congress.gov v3 API loader for bill metadata, cosponsors and subjects.
//!
//! Requests are authenticated with the `X-Api-Key` header. Each bill takes
//! three requests (four or more with amendments).

use anyhow::{bail, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::models::{Amendment, Bill, BillId, Cosponsor};
use crate::store::Store;

use super::{parse_feed_date, progress_bar, LoadSummary, SourceClient};

#[derive(Debug, Deserialize)]
pub struct BillResponse {
    pub bill: BillDetail,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillDetail {
    pub title: Option<String>,
    pub introduced_date: Option<String>,
    #[serde(default)]
    pub sponsors: Vec<PersonRef>,
    pub policy_area: Option<Named>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRef {
    pub bioguide_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Named {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CosponsorsResponse {
    #[serde(default)]
    pub cosponsors: Vec<CosponsorEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CosponsorEntry {
    pub bioguide_id: Option<String>,
    pub sponsorship_date: Option<String>,
    #[serde(default)]
    pub is_original_cosponsor: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubjectsResponse {
    pub subjects: SubjectsBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectsBody {
    #[serde(default)]
    pub legislative_subjects: Vec<Named>,
}

#[derive(Debug, Deserialize)]
pub struct AmendmentsResponse {
    #[serde(default)]
    pub amendments: Vec<AmendmentEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmendmentEntry {
    pub number: String,
    #[serde(rename = "type")]
    pub amendment_type: String,
    pub congress: i64,
    pub description: Option<String>,
    pub purpose: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AmendmentResponse {
    pub amendment: AmendmentDetail,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmendmentDetail {
    #[serde(default)]
    pub sponsors: Vec<PersonRef>,
    pub purpose: Option<String>,
    pub submitted_date: Option<String>,
}

/// Bill row built from the detail endpoint.
pub fn bill_from_detail(id: &BillId, detail: &BillDetail) -> Bill {
    let mut bill = Bill::from_id(id);
    bill.title = detail.title.clone().filter(|t| !t.trim().is_empty());
    bill.introduced_date = detail.introduced_date.as_deref().and_then(parse_feed_date);
    bill.sponsor_bioguide = detail
        .sponsors
        .iter()
        .find_map(|s| s.bioguide_id.clone());
    bill.policy_area = detail.policy_area.as_ref().and_then(|p| p.name.clone());
    bill
}

pub fn cosponsors_from(id: &BillId, entries: &[CosponsorEntry]) -> Vec<Cosponsor> {
    entries
        .iter()
        .filter_map(|entry| {
            Some(Cosponsor {
                bill_id: id.to_string(),
                member_id: entry.bioguide_id.clone()?,
                date: entry.sponsorship_date.as_deref().and_then(parse_feed_date),
                is_original: entry.is_original_cosponsor,
            })
        })
        .collect()
}

/// Distinct subject names, sorted.
pub fn subject_names(body: &SubjectsBody) -> Vec<String> {
    let mut names: Vec<String> = body
        .legislative_subjects
        .iter()
        .filter_map(|s| s.name.as_ref())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Amendment ID in the bill ID style, e.g. `samdt-7-119`.
pub fn amendment_id(entry: &AmendmentEntry) -> String {
    format!(
        "{}-{}-{}",
        entry.amendment_type.to_lowercase(),
        entry.number.trim(),
        entry.congress
    )
}

pub fn amendment_from(
    id: &BillId,
    entry: &AmendmentEntry,
    detail: Option<&AmendmentDetail>,
) -> Amendment {
    Amendment {
        amendment_id: amendment_id(entry),
        bill_id: id.to_string(),
        sponsor_bioguide: detail.and_then(|d| d.sponsors.iter().find_map(|s| s.bioguide_id.clone())),
        amendment_type: Some(entry.amendment_type.to_lowercase()),
        purpose: detail
            .and_then(|d| d.purpose.clone())
            .or_else(|| entry.purpose.clone())
            .or_else(|| entry.description.clone()),
        introduced_date: detail
            .and_then(|d| d.submitted_date.as_deref())
            .and_then(parse_feed_date),
    }
}

/// Everything fetched for one bill.
#[derive(Debug, Clone, Default)]
pub struct BillRecord {
    pub bill: Option<Bill>,
    pub cosponsors: Vec<Cosponsor>,
    pub subjects: Vec<String>,
    pub amendments: Vec<Amendment>,
}

/// Write a bill record. Returns (rows written, cosponsors skipped).
pub async fn save_bill_record(store: &Store, record: &BillRecord) -> Result<(usize, usize)> {
    let Some(ref bill) = record.bill else {
        return Ok((0, 0));
    };
    store.upsert_bill(bill).await?;
    let mut written = 1;
    let mut unmatched = 0;

    for cosponsor in &record.cosponsors {
        if store.upsert_cosponsor(cosponsor).await? {
            written += 1;
        } else {
            unmatched += 1;
        }
    }
    if !record.subjects.is_empty() {
        store.replace_subjects(&bill.bill_id, &record.subjects).await?;
        written += record.subjects.len();
    }
    for amendment in &record.amendments {
        store.upsert_amendment(amendment).await?;
        written += 1;
    }
    Ok((written, unmatched))
}

/// Endpoint URLs under the API base.
pub struct CongressGovApi {
    base: String,
}

impl CongressGovApi {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn bill_url(&self, id: &BillId) -> String {
        format!(
            "{}/bill/{}/{}/{}?format=json",
            self.base, id.congress, id.bill_type, id.number
        )
    }

    /// A sub-resource of a bill such as `cosponsors` or `subjects`.
    pub fn bill_part_url(&self, id: &BillId, part: &str) -> String {
        format!(
            "{}/bill/{}/{}/{}/{}?format=json&limit=250",
            self.base, id.congress, id.bill_type, id.number, part
        )
    }

    pub fn amendment_url(&self, entry: &AmendmentEntry) -> String {
        format!(
            "{}/amendment/{}/{}/{}?format=json",
            self.base,
            entry.congress,
            entry.amendment_type.to_lowercase(),
            entry.number.trim()
        )
    }
}

async fn fetch_bill(
    client: &SourceClient,
    api: &CongressGovApi,
    id: &BillId,
    with_amendments: bool,
) -> Result<BillRecord> {
    let Some(response) = client.fetch_json::<BillResponse>(&api.bill_url(id)).await? else {
        return Ok(BillRecord::default());
    };
    let mut record = BillRecord {
        bill: Some(bill_from_detail(id, &response.bill)),
        ..BillRecord::default()
    };
    client.pause().await;

    if let Some(cosponsors) = client
        .fetch_json::<CosponsorsResponse>(&api.bill_part_url(id, "cosponsors"))
        .await?
    {
        record.cosponsors = cosponsors_from(id, &cosponsors.cosponsors);
    }
    client.pause().await;

    if let Some(subjects) = client
        .fetch_json::<SubjectsResponse>(&api.bill_part_url(id, "subjects"))
        .await?
    {
        record.subjects = subject_names(&subjects.subjects);
    }

    if with_amendments {
        client.pause().await;
        if let Some(list) = client
            .fetch_json::<AmendmentsResponse>(&api.bill_part_url(id, "amendments"))
            .await?
        {
            for entry in &list.amendments {
                client.pause().await;
                let detail = client
                    .fetch_json::<AmendmentResponse>(&api.amendment_url(entry))
                    .await?;
                record
                    .amendments
                    .push(amendment_from(id, entry, detail.as_ref().map(|d| &d.amendment)));
            }
        }
    }
    Ok(record)
}

#[derive(Debug, Clone)]
pub struct BillsLoad {
    /// Bills to fetch; when empty, every bill of `congress` in the store.
    pub bill_ids: Vec<BillId>,
    pub congress: i64,
    pub with_amendments: bool,
    pub show_progress: bool,
}

/// Fill in metadata, cosponsors and subjects for a set of bills.
pub async fn load_bills(
    store: &Store,
    client: &SourceClient,
    api_base: &str,
    opts: &BillsLoad,
) -> Result<LoadSummary> {
    if !client.has_api_key() {
        bail!("A Congress.gov API key is required (set CONGRESS_API_KEY)");
    }
    let api = CongressGovApi::new(api_base);

    let bill_ids = if opts.bill_ids.is_empty() {
        store
            .list_bills(Some(opts.congress), None)
            .await?
            .iter()
            .filter_map(|b| b.bill_id.parse::<BillId>().ok())
            .collect()
    } else {
        opts.bill_ids.clone()
    };
    info!("Fetching Congress.gov data for {} bills", bill_ids.len());

    let pb = progress_bar(bill_ids.len() as u64, opts.show_progress, "Bills");
    let mut summary = LoadSummary::default();

    for id in &bill_ids {
        pb.inc(1);
        let result = match fetch_bill(client, &api, id, opts.with_amendments).await {
            Ok(record) if record.bill.is_none() => {
                warn!("Bill {} not found on Congress.gov", id);
                summary.skipped += 1;
                client.pause().await;
                continue;
            }
            Ok(record) => save_bill_record(store, &record).await,
            Err(e) => Err(e),
        };
        match result {
            Ok((written, unmatched)) => {
                summary.loaded += 1;
                summary.records += written;
                summary.unmatched += unmatched;
            }
            Err(e) => {
                warn!("Failed to load bill {}: {:#}", id, e);
                summary.failed += 1;
            }
        }
        client.pause().await;
    }
    pb.finish_and_clear();

    info!("Bill load complete: {}", summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{house_member, memory_store, senator};
    use chrono::NaiveDate;

    const BILL: &str = include_str!("../../fixtures/congress_gov_bill_hr23.json");
    const COSPONSORS: &str = include_str!("../../fixtures/congress_gov_cosponsors_hr23.json");
    const SUBJECTS: &str = include_str!("../../fixtures/congress_gov_subjects_hr23.json");
    const AMENDMENTS: &str = include_str!("../../fixtures/congress_gov_amendments_hr23.json");
    const AMENDMENT: &str = include_str!("../../fixtures/congress_gov_amendment_samdt7.json");

    fn hr23() -> BillId {
        BillId::new("hr", 23, 119)
    }

    fn record() -> BillRecord {
        let id = hr23();
        let bill: BillResponse = serde_json::from_str(BILL).unwrap();
        let cosponsors: CosponsorsResponse = serde_json::from_str(COSPONSORS).unwrap();
        let subjects: SubjectsResponse = serde_json::from_str(SUBJECTS).unwrap();
        let amendments: AmendmentsResponse = serde_json::from_str(AMENDMENTS).unwrap();
        let detail: AmendmentResponse = serde_json::from_str(AMENDMENT).unwrap();
        BillRecord {
            bill: Some(bill_from_detail(&id, &bill.bill)),
            cosponsors: cosponsors_from(&id, &cosponsors.cosponsors),
            subjects: subject_names(&subjects.subjects),
            amendments: vec![
                amendment_from(&id, &amendments.amendments[0], None),
                amendment_from(&id, &amendments.amendments[1], Some(&detail.amendment)),
            ],
        }
    }

    #[test]
    fn test_urls() {
        let api = CongressGovApi::new("https://api.congress.gov/v3/");
        assert_eq!(
            api.bill_url(&hr23()),
            "https://api.congress.gov/v3/bill/119/hr/23?format=json"
        );
        assert_eq!(
            api.bill_part_url(&hr23(), "cosponsors"),
            "https://api.congress.gov/v3/bill/119/hr/23/cosponsors?format=json&limit=250"
        );
    }

    #[test]
    fn test_parse_bill_detail() {
        let bill = record().bill.unwrap();
        assert_eq!(bill.bill_id, "hr-23-119");
        assert_eq!(bill.title.as_deref(), Some("Illegitimate Court Counteraction Act"));
        assert_eq!(bill.introduced_date, NaiveDate::from_ymd_opt(2025, 1, 3));
        assert_eq!(bill.sponsor_bioguide.as_deref(), Some("R000575"));
        assert_eq!(bill.policy_area.as_deref(), Some("International Affairs"));
    }

    #[test]
    fn test_parse_cosponsors_and_subjects() {
        let record = record();
        assert_eq!(record.cosponsors.len(), 3);
        assert!(record.cosponsors[0].is_original);
        assert!(!record.cosponsors[1].is_original);
        assert_eq!(record.cosponsors[1].date, NaiveDate::from_ymd_opt(2025, 1, 8));
        assert_eq!(
            record.subjects,
            vec!["International law and treaties".to_string(), "Sanctions".to_string()]
        );
    }

    #[test]
    fn test_parse_amendments() {
        let record = record();
        let house = &record.amendments[0];
        assert_eq!(house.amendment_id, "hamdt-3-119");
        assert_eq!(house.purpose.as_deref(), Some("Amendment to strike section 2."));
        assert_eq!(house.sponsor_bioguide, None);

        let senate = &record.amendments[1];
        assert_eq!(senate.amendment_id, "samdt-7-119");
        assert_eq!(senate.sponsor_bioguide.as_deref(), Some("B001230"));
        assert_eq!(senate.introduced_date, NaiveDate::from_ymd_opt(2025, 1, 12));
    }

    #[test]
    fn test_missing_optional_fields() {
        let bill: BillResponse = serde_json::from_str(r#"{"bill": {"number": "1"}}"#).unwrap();
        let parsed = bill_from_detail(&BillId::new("s", 1, 119), &bill.bill);
        assert_eq!(parsed.title, None);
        assert_eq!(parsed.sponsor_bioguide, None);
        let empty: CosponsorsResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.cosponsors.is_empty());
    }

    #[tokio::test]
    async fn test_save_bill_record() {
        let store = memory_store().await;
        for id in ["R000575", "A000055", "S001176"] {
            store.upsert_member(&house_member(id, "R")).await.unwrap();
        }
        store
            .upsert_member(&senator("B001230", "D", "WI"))
            .await
            .unwrap();

        let (written, unmatched) = save_bill_record(&store, &record()).await.unwrap();
        // bill + 2 cosponsors + 2 subjects + 2 amendments
        assert_eq!(written, 7);
        assert_eq!(unmatched, 1);

        let bill = store.get_bill("hr-23-119").await.unwrap().unwrap();
        assert_eq!(bill.sponsor_bioguide.as_deref(), Some("R000575"));
        assert_eq!(store.bill_cosponsors("hr-23-119").await.unwrap().len(), 2);
        assert_eq!(store.bill_subjects("hr-23-119").await.unwrap().len(), 2);

        // Second save is idempotent.
        save_bill_record(&store, &record()).await.unwrap();
        assert_eq!(store.bill_cosponsors("hr-23-119").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_record_writes_nothing() {
        let store = memory_store().await;
        let (written, unmatched) = save_bill_record(&store, &BillRecord::default()).await.unwrap();
        assert_eq!((written, unmatched), (0, 0));
    }
}
