//! Loaders for government data sources.
//!
//! Each loader fetches one source over HTTP, parses it and upserts the
//! result. A failed item is logged and skipped; the run continues.

pub mod congress_gov;
pub mod house;
pub mod members;
pub mod senate;
pub mod xml;

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::SourcesConfig;
use crate::models::{BillId, Rollcall, Vote, VoteCode};
use crate::store::{SaveOutcome, Store};

/// Bill types that get a placeholder row when a vote references them.
const LEGISLATION_TYPES: [&str; 8] = [
    "hr", "s", "hres", "sres", "hjres", "sjres", "hconres", "sconres",
];

/// Counts reported at the end of a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Items fetched and written.
    pub loaded: usize,
    /// Items already present or not published.
    pub skipped: usize,
    /// Items that failed to fetch, parse or save.
    pub failed: usize,
    /// Child rows written (votes, cosponsors, members).
    pub records: usize,
    /// Child rows dropped because the member is unknown.
    pub unmatched: usize,
}

impl LoadSummary {
    pub fn merge(&mut self, other: LoadSummary) {
        self.loaded += other.loaded;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.records += other.records;
        self.unmatched += other.unmatched;
    }
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} loaded, {} skipped, {} failed ({} records, {} unmatched)",
            self.loaded, self.skipped, self.failed, self.records, self.unmatched
        )
    }
}

/// One member's recorded position as it appears in a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPosition {
    /// Bioguide ID, or the LIS ID for Senate entries.
    pub member_ref: String,
    pub first: Option<String>,
    pub last: Option<String>,
    pub party: Option<String>,
    pub state: Option<String>,
    pub vote: VoteCode,
}

/// A roll call parsed from a feed, before member resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRollcall {
    pub rollcall: Rollcall,
    pub positions: Vec<RecordedPosition>,
}

/// Save a roll call, creating a placeholder for the bill it concerns.
///
/// Nominations and other non-legislation references stay as a bare
/// `bill_id` on the roll call.
pub async fn save_with_bill(store: &Store, rollcall: &Rollcall, votes: &[Vote]) -> Result<SaveOutcome> {
    if let Some(id) = rollcall
        .bill_id
        .as_deref()
        .and_then(|b| b.parse::<BillId>().ok())
        .filter(|b| LEGISLATION_TYPES.contains(&b.bill_type.as_str()))
    {
        store.ensure_bill(&id).await?;
    }
    Ok(store.save_rollcall(rollcall, votes).await?)
}

/// HTTP client shared by the loaders.
pub struct SourceClient {
    http: reqwest::Client,
    delay: Duration,
    api_key: Option<String>,
}

impl SourceClient {
    pub fn new(config: &SourcesConfig, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            delay: Duration::from_millis(config.request_delay_ms),
            api_key,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// GET a document. `Ok(None)` means the source has no such document.
    pub async fn fetch_text(&self, url: &str) -> Result<Option<String>> {
        debug!("GET {}", url);
        let mut request = self.http.get(url);
        if let Some(ref key) = self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow::anyhow!("Request timed out: {}", url)
            } else if e.is_connect() {
                anyhow::anyhow!("Cannot connect to {}", url)
            } else {
                anyhow::anyhow!("Failed to send request: {}", e)
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(anyhow::anyhow!("HTTP {} from {}", status, url));
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;
        // Some feeds answer a missing roll call with an HTML page.
        if body.trim_start().starts_with("<!DOCTYPE html") || body.trim_start().starts_with("<html") {
            return Ok(None);
        }
        Ok(Some(body))
    }

    /// GET and decode a JSON document.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        match self.fetch_text(url).await? {
            Some(body) => {
                let value = serde_json::from_str(&body)
                    .with_context(|| format!("Failed to parse JSON from {}", url))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Sleep between requests.
    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Stops a sequential scan after too many consecutive misses.
#[derive(Debug, Clone)]
pub struct MissTracker {
    limit: usize,
    consecutive: usize,
}

impl MissTracker {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            consecutive: 0,
        }
    }

    pub fn hit(&mut self) {
        self.consecutive = 0;
    }

    /// Record a miss; true once the limit is reached.
    pub fn miss(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= self.limit
    }
}

/// Progress bar for a load, hidden when progress output is off.
pub fn progress_bar(len: u64, show: bool, message: &str) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Parse the date formats used across the feeds.
///
/// Handles `17-Jan-2025`, `January 9, 2025`, `2025-01-09`, `01/09/2025`
/// and a trailing time such as `January 9, 2025, 02:37 PM`.
pub fn parse_feed_date(raw: &str) -> Option<NaiveDate> {
    const FORMATS: [&str; 4] = ["%d-%b-%Y", "%B %d, %Y", "%Y-%m-%d", "%m/%d/%Y"];
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut candidates = vec![raw.to_string()];
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() > 2 {
        candidates.push(format!("{},{}", parts[0], parts[1]));
    }
    if raw.len() > 10 && raw.is_char_boundary(10) {
        candidates.push(raw[..10].to_string());
    }

    candidates.iter().find_map(|candidate| {
        FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(candidate.trim(), fmt).ok())
    })
}

/// Session number from `1st`, `2nd` or a bare digit.
pub fn parse_session(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Calendar years spanned by a congress (first and second session).
pub fn congress_years(congress: i64) -> [i64; 2] {
    let first = 2i64
        .saturating_mul(congress.saturating_sub(1))
        .saturating_add(1789);
    [first, first.saturating_add(1)]
}

/// Session of `congress` held in `year`.
pub fn session_for_year(congress: i64, year: i64) -> i64 {
    if year > congress_years(congress)[0] {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feed_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 9);
        assert_eq!(parse_feed_date("09-Jan-2025"), expected);
        assert_eq!(parse_feed_date("January 9, 2025"), expected);
        assert_eq!(parse_feed_date("January 9, 2025, 02:37 PM"), expected);
        assert_eq!(parse_feed_date("2025-01-09"), expected);
        assert_eq!(parse_feed_date("2025-01-09T14:00:00Z"), expected);
        assert_eq!(parse_feed_date("01/09/2025"), expected);
        assert_eq!(parse_feed_date(""), None);
        assert_eq!(parse_feed_date("soon"), None);
    }

    #[test]
    fn test_parse_session() {
        assert_eq!(parse_session("1st"), Some(1));
        assert_eq!(parse_session("2nd"), Some(2));
        assert_eq!(parse_session("2"), Some(2));
        assert_eq!(parse_session("first"), None);
    }

    #[test]
    fn test_congress_years() {
        assert_eq!(congress_years(119), [2025, 2026]);
        assert_eq!(congress_years(1), [1789, 1790]);
        assert_eq!(congress_years(i64::MAX), [i64::MAX, i64::MAX]);
        assert_eq!(session_for_year(119, 2025), 1);
        assert_eq!(session_for_year(119, 2026), 2);
    }

    #[test]
    fn test_miss_tracker() {
        let mut misses = MissTracker::new(3);
        assert!(!misses.miss());
        assert!(!misses.miss());
        misses.hit();
        assert!(!misses.miss());
        assert!(!misses.miss());
        assert!(misses.miss());
    }

    #[test]
    fn test_summary_merge_and_display() {
        let mut total = LoadSummary {
            loaded: 2,
            records: 10,
            ..LoadSummary::default()
        };
        total.merge(LoadSummary {
            loaded: 1,
            failed: 1,
            unmatched: 3,
            ..LoadSummary::default()
        });
        assert_eq!(total.loaded, 3);
        assert_eq!(
            total.to_string(),
            "3 loaded, 0 skipped, 1 failed (10 records, 3 unmatched)"
        );
    }

    #[test]
    fn test_hidden_progress_bar() {
        let pb = progress_bar(10, false, "test");
        assert!(pb.is_hidden());
    }
}
