//! Senate LIS roll-call loader.

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::models::{party_code, Chamber, Rollcall, Vote, VoteCode};
use crate::store::{SaveOutcome, Store};

use super::xml::Tag;
use super::{
    congress_years, parse_feed_date, progress_bar, LoadSummary, MissTracker, ParsedRollcall,
    RecordedPosition, SourceClient,
};

pub fn vote_url(base: &str, congress: i64, session: i64, number: i64) -> String {
    format!(
        "{base}/vote{congress}{session}/vote_{congress}_{session}_{number:05}.xml",
        base = base.trim_end_matches('/'),
    )
}

/// Bill reference from `document_type` / `document_number`.
///
/// `S.` 5 becomes `s-5-119`; nominations (`PN`) keep their own prefix.
pub fn document_bill_id(doc_type: &str, number: &str, congress: i64) -> Option<String> {
    let bill_type: String = doc_type
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_lowercase();
    let number: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if bill_type.is_empty() || number.is_empty() {
        return None;
    }
    let number: i64 = number.parse().ok()?;
    Some(format!("{}-{}-{}", bill_type, number, congress))
}

pub struct SenateParser {
    vote_number: Tag,
    congress: Tag,
    session: Tag,
    question_text: Tag,
    question: Tag,
    title: Tag,
    document_text: Tag,
    vote_date: Tag,
    document: Tag,
    document_type: Tag,
    document_number: Tag,
    member: Tag,
    lis_member_id: Tag,
    bioguide_id: Tag,
    first_name: Tag,
    last_name: Tag,
    party: Tag,
    state: Tag,
    vote_cast: Tag,
}

impl SenateParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            vote_number: Tag::new("vote_number")?,
            congress: Tag::new("congress")?,
            session: Tag::new("session")?,
            question_text: Tag::new("vote_question_text")?,
            question: Tag::new("question")?,
            title: Tag::new("vote_title")?,
            document_text: Tag::new("vote_document_text")?,
            vote_date: Tag::new("vote_date")?,
            document: Tag::new("document")?,
            document_type: Tag::new("document_type")?,
            document_number: Tag::new("document_number")?,
            member: Tag::new("member")?,
            lis_member_id: Tag::new("lis_member_id")?,
            bioguide_id: Tag::new("bioguide_id")?,
            first_name: Tag::new("first_name")?,
            last_name: Tag::new("last_name")?,
            party: Tag::new("party")?,
            state: Tag::new("state")?,
            vote_cast: Tag::new("vote_cast")?,
        })
    }

    fn question_of(&self, xml: &str) -> Option<String> {
        let base = self
            .question_text
            .text(xml)
            .or_else(|| self.question.text(xml))
            .or_else(|| self.title.text(xml))?;
        match self.document_text.text(xml) {
            Some(doc) if !base.contains(&doc) => Some(format!("{}: {}", base, doc)),
            _ => Some(base),
        }
    }

    pub fn parse(&self, xml: &str, congress: i64, session: i64) -> Result<ParsedRollcall> {
        let Some(number) = self
            .vote_number
            .text(xml)
            .and_then(|n| n.parse::<i64>().ok())
        else {
            bail!("Senate vote document has no vote_number");
        };
        let congress = self
            .congress
            .text(xml)
            .and_then(|c| c.parse().ok())
            .unwrap_or(congress);
        let session = self
            .session
            .text(xml)
            .and_then(|s| s.parse().ok())
            .unwrap_or(session);

        let bill_id = self.document.first(xml).and_then(|doc| {
            let doc_type = self.document_type.text(doc.body)?;
            let doc_number = self.document_number.text(doc.body)?;
            document_bill_id(&doc_type, &doc_number, congress)
        });

        let rollcall = Rollcall {
            rollcall_id: Rollcall::make_id(Chamber::Senate, congress, session, number),
            congress,
            chamber: Chamber::Senate,
            session,
            rc_number: number,
            date: self.vote_date.text(xml).and_then(|d| parse_feed_date(&d)),
            question: self.question_of(xml),
            bill_id,
        };

        let positions = self
            .member
            .find_all(xml)
            .into_iter()
            .filter_map(|m| {
                let member_ref = self
                    .bioguide_id
                    .text(m.body)
                    .or_else(|| self.lis_member_id.text(m.body))?;
                Some(RecordedPosition {
                    member_ref,
                    first: self.first_name.text(m.body),
                    last: self.last_name.text(m.body),
                    party: self.party.text(m.body).as_deref().and_then(party_code),
                    state: self.state.text(m.body),
                    vote: self
                        .vote_cast
                        .text(m.body)
                        .map(|v| VoteCode::normalize(&v))
                        .unwrap_or(VoteCode::NotVoting),
                })
            })
            .collect();

        Ok(ParsedRollcall {
            rollcall,
            positions,
        })
    }
}

/// Map a Senate entry to a bioguide ID, keeping the raw reference when
/// nothing matches.
async fn resolve(store: &Store, position: &RecordedPosition) -> Result<String> {
    if store.get_member(&position.member_ref).await?.is_some() {
        return Ok(position.member_ref.clone());
    }
    let last = position.last.as_deref().unwrap_or_default();
    let state = position.state.as_deref().unwrap_or_default();
    match store.resolve_senator(&position.member_ref, last, state).await? {
        Some(id) => Ok(id),
        None => {
            debug!(
                "No senator matches {} ({} {})",
                position.member_ref, last, state
            );
            Ok(position.member_ref.clone())
        }
    }
}

/// Resolve members and write a parsed Senate vote.
pub async fn save_senate_rollcall(store: &Store, parsed: &ParsedRollcall) -> Result<SaveOutcome> {
    let mut votes = Vec::with_capacity(parsed.positions.len());
    for position in &parsed.positions {
        votes.push(Vote {
            rollcall_id: parsed.rollcall.rollcall_id.clone(),
            member_id: resolve(store, position).await?,
            vote_code: position.vote,
        });
    }
    super::save_with_bill(store, &parsed.rollcall, &votes).await
}

#[derive(Debug, Clone)]
pub struct SenateLoad {
    pub congress: i64,
    pub sessions: Vec<i64>,
    pub max_rollcall: i64,
    pub miss_limit: usize,
    pub force: bool,
    pub show_progress: bool,
}

/// Scan each session's votes until too many consecutive misses.
pub async fn load_senate(
    store: &Store,
    client: &SourceClient,
    base_url: &str,
    opts: &SenateLoad,
) -> Result<LoadSummary> {
    let parser = SenateParser::new()?;
    let mut summary = LoadSummary::default();

    for &session in &opts.sessions {
        let year = congress_years(opts.congress)[if session > 1 { 1 } else { 0 }];
        info!(
            "Loading Senate votes for Congress {} session {} ({})",
            opts.congress, session, year
        );
        let pb = progress_bar(
            opts.max_rollcall as u64,
            opts.show_progress,
            &format!("Senate session {}", session),
        );
        let mut misses = MissTracker::new(opts.miss_limit);

        for number in 1..=opts.max_rollcall {
            pb.inc(1);
            let rollcall_id = Rollcall::make_id(Chamber::Senate, opts.congress, session, number);
            if !opts.force && store.rollcall_exists(&rollcall_id).await? {
                summary.skipped += 1;
                misses.hit();
                continue;
            }

            let url = vote_url(base_url, opts.congress, session, number);
            match client.fetch_text(&url).await {
                Ok(Some(xml)) => {
                    misses.hit();
                    let saved = match parser.parse(&xml, opts.congress, session) {
                        Ok(parsed) => save_senate_rollcall(store, &parsed).await,
                        Err(e) => Err(e),
                    };
                    match saved {
                        Ok(outcome) => {
                            summary.loaded += 1;
                            summary.records += outcome.votes;
                            summary.unmatched += outcome.skipped;
                        }
                        Err(e) => {
                            warn!("Failed to load Senate vote {}: {:#}", rollcall_id, e);
                            summary.failed += 1;
                        }
                    }
                }
                Ok(None) => {
                    if misses.miss() {
                        info!("Stopping after {} consecutive misses at vote {}", opts.miss_limit, number);
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

    info!("Senate load complete: {}", summary);
    Ok(summary)
}
