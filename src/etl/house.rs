//! House Clerk roll-call loader.
//!
//! Votes are published one XML document per roll call under
//! `{base}/{year}/roll{NNN}.xml`.

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::models::{party_code, BillId, Chamber, Rollcall, Vote, VoteCode};
use crate::store::{SaveOutcome, Store};

use super::xml::Tag;
use super::{
    parse_feed_date, parse_session, progress_bar, session_for_year, LoadSummary, MissTracker,
    ParsedRollcall, RecordedPosition, SourceClient,
};

/// URL of one House roll call.
pub fn rollcall_url(base: &str, year: i64, number: i64) -> String {
    format!("{}/{}/roll{:03}.xml", base.trim_end_matches('/'), year, number)
}

/// Parser for the Clerk roll-call format.
pub struct HouseParser {
    rollcall_num: Tag,
    congress: Tag,
    session: Tag,
    question: Tag,
    action_date: Tag,
    legis_num: Tag,
    recorded_vote: Tag,
    legislator: Tag,
    vote: Tag,
}

impl HouseParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rollcall_num: Tag::new("rollcall-num")?,
            congress: Tag::new("congress")?,
            session: Tag::new("session")?,
            question: Tag::new("vote-question")?,
            action_date: Tag::new("action-date")?,
            legis_num: Tag::new("legis-num")?,
            recorded_vote: Tag::new("recorded-vote")?,
            legislator: Tag::new("legislator")?,
            vote: Tag::new("vote")?,
        })
    }

    /// Parse one document. `congress` and `session` are used when the
    /// document omits them.
    pub fn parse(&self, xml: &str, congress: i64, session: i64) -> Result<ParsedRollcall> {
        let Some(number) = self
            .rollcall_num
            .text(xml)
            .and_then(|n| n.parse::<i64>().ok())
        else {
            bail!("Roll-call document has no rollcall-num");
        };
        let congress = self
            .congress
            .text(xml)
            .and_then(|c| c.parse().ok())
            .unwrap_or(congress);
        let session = self
            .session
            .text(xml)
            .and_then(|s| parse_session(&s))
            .unwrap_or(session);

        let bill_id = self
            .legis_num
            .text(xml)
            .and_then(|legis| BillId::from_legis_num(&legis, congress))
            .map(|id| id.to_string());

        let rollcall = Rollcall {
            rollcall_id: Rollcall::make_id(Chamber::House, congress, session, number),
            congress,
            chamber: Chamber::House,
            session,
            rc_number: number,
            date: self.action_date.text(xml).and_then(|d| parse_feed_date(&d)),
            question: self.question.text(xml),
            bill_id,
        };

        let mut positions = Vec::new();
        for entry in self.recorded_vote.find_all(xml) {
            let Some(legislator) = self.legislator.first(entry.body) else {
                continue;
            };
            let Some(member_ref) = legislator.attr("name-id").filter(|id| !id.is_empty()) else {
                continue;
            };
            let vote = self
                .vote
                .text(entry.body)
                .map(|v| VoteCode::normalize(&v))
                .unwrap_or(VoteCode::NotVoting);
            let last = legislator
                .attr("unaccented-name")
                .or_else(|| Some(legislator.text()))
                .filter(|n| !n.is_empty());
            positions.push(RecordedPosition {
                member_ref,
                first: None,
                last,
                party: legislator.attr("party").as_deref().and_then(party_code),
                state: legislator.attr("state"),
                vote,
            });
        }

        Ok(ParsedRollcall {
            rollcall,
            positions,
        })
    }
}

/// Write a parsed House roll call. Positions are keyed by bioguide ID.
pub async fn save_house_rollcall(store: &Store, parsed: &ParsedRollcall) -> Result<SaveOutcome> {
    let votes: Vec<Vote> = parsed
        .positions
        .iter()
        .map(|p| Vote {
            rollcall_id: parsed.rollcall.rollcall_id.clone(),
            member_id: p.member_ref.clone(),
            vote_code: p.vote,
        })
        .collect();
    super::save_with_bill(store, &parsed.rollcall, &votes).await
}

/// What to scan.
#[derive(Debug, Clone)]
pub struct HouseLoad {
    pub congress: i64,
    pub years: Vec<i64>,
    pub max_rollcall: i64,
    pub miss_limit: usize,
    /// Re-fetch roll calls already in the database.
    pub force: bool,
    pub show_progress: bool,
}

/// Scan the Clerk feed year by year until too many consecutive misses.
pub async fn load_house(
    store: &Store,
    client: &SourceClient,
    base_url: &str,
    opts: &HouseLoad,
) -> Result<LoadSummary> {
    let parser = HouseParser::new()?;
    let mut summary = LoadSummary::default();

    for &year in &opts.years {
        let session = session_for_year(opts.congress, year);
        info!(
            "Loading House roll calls for Congress {} ({}, session {})",
            opts.congress, year, session
        );
        let pb = progress_bar(opts.max_rollcall as u64, opts.show_progress, &format!("House {}", year));
        let mut misses = MissTracker::new(opts.miss_limit);

        for number in 1..=opts.max_rollcall {
            pb.inc(1);
            let rollcall_id = Rollcall::make_id(Chamber::House, opts.congress, session, number);
            if !opts.force && store.rollcall_exists(&rollcall_id).await? {
                summary.skipped += 1;
                misses.hit();
                continue;
            }

            let url = rollcall_url(base_url, year, number);
            match client.fetch_text(&url).await {
                Ok(Some(xml)) => {
                    misses.hit();
                    let saved = match parser.parse(&xml, opts.congress, session) {
                        Ok(parsed) => save_house_rollcall(store, &parsed).await,
                        Err(e) => Err(e),
                    };
                    match saved {
                        Ok(outcome) => {
                            summary.loaded += 1;
                            summary.records += outcome.votes;
                            summary.unmatched += outcome.skipped;
                        }
                        Err(e) => {
                            warn!("Failed to load House roll call {}: {:#}", rollcall_id, e);
                            summary.failed += 1;
                        }
                    }
                }
                Ok(None) => {
                    if misses.miss() {
                        info!("Stopping after {} consecutive misses at roll {}", opts.miss_limit, number);
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to fetch {}: {:#}", url, e);
                    summary.failed += 1;
                    if misses.miss() {
                        break;
                    }
                }
            }
            client.pause().await;
        }
        pb.finish_and_clear();
    }

    info!("House load complete: {}", summary);
    Ok(summary)
}
