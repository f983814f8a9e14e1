//! Baseline Yea-probability predictor for a single bill.
//!
//! Starts from a party-line prior and adjusts it by the party mix of the
//! cosponsors, the member's own role on the bill, their habit of crossing
//! party lines and their record on similar bills.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::models::{Bill, Chamber, Member, MemberPrediction};
use crate::store::{Store, YeaHistory};

const MIN_PROB: f64 = 0.02;
const MAX_PROB: f64 = 0.98;

fn clamp(p: f64) -> f64 {
    p.clamp(MIN_PROB, MAX_PROB)
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Uppercased party code, `None` when missing or blank.
fn known_party(party: Option<&str>) -> Option<String> {
    party
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_uppercase)
}

/// Cosponsors of a bill by party.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CosponsorCounts {
    pub dem: usize,
    pub rep: usize,
    /// Independents and cosponsors with unknown party.
    pub other: usize,
}

impl CosponsorCounts {
    pub fn from_parties<'a>(parties: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        let mut counts = Self::default();
        for party in parties {
            match known_party(party).as_deref() {
                Some("D") => counts.dem += 1,
                Some("R") => counts.rep += 1,
                _ => counts.other += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.dem + self.rep + self.other
    }

    /// Share of cosponsors from across the aisle relative to the sponsor.
    ///
    /// For a sponsor outside D/R the smaller of the two major parties counts.
    pub fn cross_party_share(&self, sponsor_party: Option<&str>) -> f64 {
        let cross = match known_party(sponsor_party).as_deref() {
            Some("D") => self.rep,
            Some("R") => self.dem,
            _ => self.dem.min(self.rep),
        };
        self.share(cross)
    }

    /// Like [`cross_party_share`](Self::cross_party_share), but zero for a
    /// sponsor outside D/R.
    fn strict_cross_party_share(&self, sponsor_party: Option<&str>) -> f64 {
        let cross = match known_party(sponsor_party).as_deref() {
            Some("D") => self.rep,
            Some("R") => self.dem,
            _ => 0,
        };
        self.share(cross)
    }

    fn share(&self, n: usize) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            n as f64 / self.total() as f64
        }
    }
}

/// Probability that a member votes Yea, from party and cosponsor mix alone.
pub fn predict_member_vote_probability(
    member_party: Option<&str>,
    sponsor_party: Option<&str>,
    counts: &CosponsorCounts,
    is_sponsor: bool,
    is_cosponsor: bool,
) -> f64 {
    let member = known_party(member_party);
    let sponsor = known_party(sponsor_party);
    let same_party = match (&member, &sponsor) {
        (Some(m), Some(s)) => Some(m == s),
        _ => None,
    };
    let base = match same_party {
        Some(true) => 0.85,
        Some(false) => 0.15,
        None => 0.5,
    };

    if counts.total() == 0 {
        return clamp(base);
    }

    let mut prob = base + 0.3 * (counts.cross_party_share(sponsor_party) - 0.5);
    if is_sponsor {
        prob += 0.1;
    }
    if is_cosponsor {
        prob += 0.15;
    }

    // Near party-line bills pull members toward their party's position.
    if counts.strict_cross_party_share(sponsor_party) <= 0.05 {
        match same_party {
            Some(true) => {
                let floor = if is_cosponsor { 0.96 } else { 0.92 };
                prob = prob.max(floor);
            }
            Some(false) if !is_cosponsor => prob = prob.min(0.08),
            _ => {}
        }
    }

    clamp(prob)
}

/// Everything about a bill the per-member scoring needs.
#[derive(Debug, Clone)]
pub struct BillContext {
    pub bill: Bill,
    pub sponsor_party: Option<String>,
    pub counts: CosponsorCounts,
    pub cosponsors: HashSet<String>,
    /// Cross-party cosponsorship share per member; missing means 0.
    pub propensity: HashMap<String, f64>,
    pub history: HashMap<String, YeaHistory>,
}

/// Score each member for a Yea vote on the bill.
pub fn score_members(ctx: &BillContext, members: &[Member]) -> Vec<MemberPrediction> {
    let sponsor_party = ctx.sponsor_party.as_deref();
    let cross_share = ctx.counts.cross_party_share(sponsor_party);

    members
        .iter()
        .map(|m| {
            let is_sponsor = ctx.bill.sponsor_bioguide.as_deref() == Some(m.member_id.as_str());
            let is_cosponsor = ctx.cosponsors.contains(&m.member_id);
            let mut p = predict_member_vote_probability(
                m.party.as_deref(),
                sponsor_party,
                &ctx.counts,
                is_sponsor,
                is_cosponsor,
            );

            if let (Some(member), Some(sponsor)) =
                (known_party(m.party.as_deref()), known_party(sponsor_party))
            {
                if cross_share >= 0.15 {
                    let propensity = ctx.propensity.get(&m.member_id).copied().unwrap_or(0.0);
                    let shift = 0.2 * (propensity - 0.5);
                    p = if member == sponsor { p - shift } else { p + shift };
                    p = clamp(p);
                }
            }

            if let Some(hist) = ctx.history.get(&m.member_id) {
                let n = hist.total.clamp(0, 30) as f64;
                let w = 0.15 * n / 30.0;
                p = clamp((1.0 - w) * p + w * hist.yea_rate());
            }

            MemberPrediction {
                member_id: m.member_id.clone(),
                name: m.name(),
                party: m.party.clone(),
                state: m.state.clone(),
                chamber: m.chamber(),
                probability_yea: round4(p),
                is_sponsor,
                is_cosponsor,
                defection_score: None,
            }
        })
        .collect()
}

/// Attach a defection score and sort most likely defectors first.
///
/// For a D or R sponsor, members of the sponsor's party defect by voting
/// Nay and everyone else by voting Yea. With no usable sponsor party the
/// score is the distance from a coin flip.
pub fn rank_likely_defectors(
    scores: Vec<MemberPrediction>,
    sponsor_party: Option<&str>,
) -> Vec<MemberPrediction> {
    let sponsor = known_party(sponsor_party);
    let mut ranked: Vec<MemberPrediction> = scores
        .into_iter()
        .map(|mut s| {
            let p = s.probability_yea;
            let member = known_party(s.party.as_deref());
            let score = match sponsor.as_deref() {
                Some(sp @ ("D" | "R")) => {
                    if member.as_deref() == Some(sp) {
                        1.0 - p
                    } else {
                        p
                    }
                }
                _ => (p - 0.5).abs(),
            };
            s.defection_score = Some(round4(score));
            s
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.defection_score
            .unwrap_or(0.0)
            .total_cmp(&a.defection_score.unwrap_or(0.0))
    });
    ranked
}

/// Prediction for every member of a chamber on one bill.
#[derive(Debug, Clone, Serialize)]
pub struct BillPrediction {
    pub bill_id: String,
    pub title: Option<String>,
    pub sponsor: Option<String>,
    pub sponsor_party: Option<String>,
    pub chamber: Chamber,
    pub cosponsor_counts: CosponsorCounts,
    pub subjects: Vec<String>,
    pub members: Vec<MemberPrediction>,
}

impl BillPrediction {
    /// Mean Yea probability over all scored members.
    pub fn expected_yea_share(&self) -> f64 {
        if self.members.is_empty() {
            return 0.0;
        }
        self.members.iter().map(|m| m.probability_yea).sum::<f64>() / self.members.len() as f64
    }
}

/// Load what the predictor needs for `bill_id` from the store.
pub async fn load_bill_context(store: &Store, bill_id: &str) -> Result<BillContext> {
    let bill = store
        .get_bill(bill_id)
        .await?
        .with_context(|| format!("Bill not found: {}", bill_id))?;

    let sponsor_party = match bill.sponsor_bioguide.as_deref() {
        Some(sponsor) => store.get_member(sponsor).await?.and_then(|m| m.party),
        None => None,
    };

    let cosponsor_rows = store.bill_cosponsors(bill_id).await?;
    let mut parties = Vec::with_capacity(cosponsor_rows.len());
    for c in &cosponsor_rows {
        parties.push(store.get_member(&c.member_id).await?.and_then(|m| m.party));
    }
    let counts = CosponsorCounts::from_parties(parties.iter().map(|p| p.as_deref()));
    let cosponsors = cosponsor_rows.into_iter().map(|c| c.member_id).collect();

    let propensity = store.cross_party_propensity().await?;
    let history = store.issue_history(bill_id).await?;
    debug!(
        "Bill {} has {} cosponsors, {} members with issue history",
        bill_id,
        counts.total(),
        history.len()
    );

    Ok(BillContext {
        bill,
        sponsor_party,
        counts,
        cosponsors,
        propensity,
        history,
    })
}

/// Score the members of `chamber` (default: the bill's chamber) on a bill.
///
/// With `rank` set the members come back ordered by defection score.
pub async fn predict_bill(
    store: &Store,
    bill_id: &str,
    chamber: Option<Chamber>,
    rank: bool,
) -> Result<BillPrediction> {
    let ctx = load_bill_context(store, bill_id).await?;
    let chamber = chamber.unwrap_or(ctx.bill.chamber);
    let members = store
        .list_members(Some(chamber))
        .await
        .context("Failed to load chamber members")?;

    let mut scores = score_members(&ctx, &members);
    if rank {
        scores = rank_likely_defectors(scores, ctx.sponsor_party.as_deref());
    }
    info!("Scored {} members on {}", scores.len(), bill_id);
    let subjects = store.bill_subjects(bill_id).await?;

    Ok(BillPrediction {
        bill_id: ctx.bill.bill_id.clone(),
        title: ctx.bill.title.clone(),
        sponsor: ctx.bill.sponsor_bioguide.clone(),
        sponsor_party: ctx.sponsor_party.clone(),
        chamber,
        cosponsor_counts: ctx.counts,
        subjects,
        members: scores,
    })
}
