//! Vote outlier detection.
//!
//! Two independent rules flag individual votes:
//!
//! - **Party-line deviation**: on a roll call where a party votes at least
//!   `threshold` one way, members of that party who voted the other way.
//! - **Model-based**: a logistic regression over party membership and
//!   roll-call context predicts each Yea/Nay vote; votes the model got
//!   badly wrong are flagged.
//!
//! The model is refit on every run, so outlier status is relative to the
//! chosen window.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::models::{Member, Outlier, OutlierMethod, OutlierReport, Rollcall, Vote, VoteCode};
use crate::store::AnalysisData;

use super::regression::{FitError, FitOptions, ScaledModel};

/// Tunables for an outlier run.
#[derive(Debug, Clone, Copy)]
pub struct OutlierParams {
    /// Minimum party share for a party-line position.
    pub threshold: f64,
    /// Parties with fewer votes on a roll call are skipped.
    pub min_party_votes: usize,
    /// Prediction error above which a vote is flagged.
    pub error_threshold: f64,
    pub fit: FitOptions,
}

impl Default for OutlierParams {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            min_party_votes: 5,
            error_threshold: 0.5,
            fit: FitOptions::default(),
        }
    }
}

/// Vote counts of one party on one roll call.
#[derive(Debug, Default, Clone, Copy)]
pub struct PartyTally {
    yea: usize,
    nay: usize,
    present: usize,
    not_voting: usize,
}

impl PartyTally {
    fn add(&mut self, code: VoteCode) {
        match code {
            VoteCode::Yea => self.yea += 1,
            VoteCode::Nay => self.nay += 1,
            VoteCode::Present => self.present += 1,
            VoteCode::NotVoting => self.not_voting += 1,
        }
    }

    fn total(&self) -> usize {
        self.yea + self.nay + self.present + self.not_voting
    }

    fn decisive(&self) -> usize {
        self.yea + self.nay
    }
}

/// Roll-call level inputs to the vote model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollcallContext {
    /// Yea share of every vote on the roll call; 0.5 when there are none.
    pub yea_pct: f64,
    /// Closest agreement between any two parties, in [0, 1].
    pub bipartisan_score: f64,
    /// Cosponsors of the bill come from more than one party.
    pub bipartisan_cosponsorship: bool,
    pub has_bill: bool,
}

impl RollcallContext {
    /// Feature vector for one member on this roll call.
    pub fn features(&self, member: &Member) -> Vec<f64> {
        let party = member.party.as_deref();
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        vec![
            flag(party == Some("D")),
            flag(party == Some("R")),
            flag(party == Some("I")),
            self.yea_pct,
            self.bipartisan_score,
            flag(self.bipartisan_cosponsorship),
            flag(self.has_bill),
        ]
    }
}

fn party_tallies(votes: &[&Vote], members: &HashMap<String, Member>) -> BTreeMap<String, PartyTally> {
    let mut tallies: BTreeMap<String, PartyTally> = BTreeMap::new();
    for vote in votes {
        if let Some(member) = members.get(&vote.member_id) {
            tallies
                .entry(member.party_label())
                .or_default()
                .add(vote.vote_code);
        }
    }
    tallies
}

/// Maximum over party pairs of `1 - |yea_pct_a - yea_pct_b|`.
///
/// Only Yea/Nay count, and parties without any are ignored.
pub fn bipartisan_score(tallies: &BTreeMap<String, PartyTally>) -> f64 {
    let shares: Vec<f64> = tallies
        .values()
        .filter(|t| t.decisive() > 0)
        .map(|t| t.yea as f64 / t.decisive() as f64)
        .collect();

    let mut best = 0.0_f64;
    for (i, a) in shares.iter().enumerate() {
        for b in &shares[i + 1..] {
            best = best.max(1.0 - (a - b).abs());
        }
    }
    best
}

/// Whether a bill's known cosponsors span more than one party.
pub fn bipartisan_cosponsorship(cosponsors: &[String], members: &HashMap<String, Member>) -> bool {
    let parties: HashSet<String> = cosponsors
        .iter()
        .filter_map(|id| members.get(id))
        .map(Member::party_label)
        .collect();
    parties.len() > 1
}

fn rollcall_context(
    rollcall: &Rollcall,
    votes: &[&Vote],
    tallies: &BTreeMap<String, PartyTally>,
    data: &AnalysisData,
) -> RollcallContext {
    let yea = votes.iter().filter(|v| v.vote_code == VoteCode::Yea).count();
    let yea_pct = if votes.is_empty() {
        0.5
    } else {
        yea as f64 / votes.len() as f64
    };

    let bipartisan_cosponsorship = rollcall
        .bill_id
        .as_ref()
        .and_then(|bill| data.rollcall_bill_cosponsors.get(bill))
        .map(|cosponsors| bipartisan_cosponsorship(cosponsors, &data.members))
        .unwrap_or(false);

    RollcallContext {
        yea_pct,
        bipartisan_score: bipartisan_score(tallies),
        bipartisan_cosponsorship,
        has_bill: rollcall.bill_id.is_some(),
    }
}

fn base_outlier(rollcall: &Rollcall, member: &Member, vote: VoteCode, method: OutlierMethod) -> Outlier {
    Outlier {
        rollcall_id: rollcall.rollcall_id.clone(),
        member_id: member.member_id.clone(),
        member_name: member.name(),
        party: member.party_label(),
        vote,
        method,
        party_position: None,
        party_yea_pct: None,
        party_nay_pct: None,
        predicted_yea_prob: None,
        prediction_error: None,
        date: rollcall.date,
        question: rollcall.question.clone(),
        bill_id: rollcall.bill_id.clone(),
    }
}

/// Roll calls in order, each with its votes sorted by member.
fn grouped_votes(data: &AnalysisData) -> Vec<(&Rollcall, Vec<&Vote>)> {
    let mut by_rollcall = data.votes_by_rollcall();
    data.rollcalls
        .iter()
        .map(|rc| {
            let mut votes = by_rollcall.remove(rc.rollcall_id.as_str()).unwrap_or_default();
            votes.sort_by(|a, b| a.member_id.cmp(&b.member_id));
            (rc, votes)
        })
        .collect()
}

/// Members who voted against a lopsided majority of their own party.
pub fn detect_party_line_deviations(data: &AnalysisData, params: &OutlierParams) -> Vec<Outlier> {
    info!(
        "Detecting party line deviations with {:.0}% threshold...",
        params.threshold * 100.0
    );
    let mut outliers = Vec::new();

    for (rollcall, votes) in grouped_votes(data) {
        let tallies = party_tallies(&votes, &data.members);

        for (party, tally) in &tallies {
            let total = tally.total();
            if total < params.min_party_votes {
                continue;
            }
            let yea_pct = tally.yea as f64 / total as f64;
            let nay_pct = tally.nay as f64 / total as f64;

            let position = if yea_pct >= params.threshold {
                VoteCode::Yea
            } else if nay_pct >= params.threshold {
                VoteCode::Nay
            } else {
                continue;
            };

            for vote in &votes {
                let Some(member) = data.members.get(&vote.member_id) else {
                    continue;
                };
                if &member.party_label() != party
                    || !vote.vote_code.is_decisive()
                    || vote.vote_code == position
                {
                    continue;
                }
                let mut outlier =
                    base_outlier(rollcall, member, vote.vote_code, OutlierMethod::PartyLineDeviation);
                outlier.party_position = Some(position);
                outlier.party_yea_pct = Some(yea_pct);
                outlier.party_nay_pct = Some(nay_pct);
                outliers.push(outlier);
            }
        }
    }

    info!("Found {} party line deviations", outliers.len());
    outliers
}

/// One Yea/Nay vote by a known member with its feature vector.
struct Sample<'a> {
    rollcall: &'a Rollcall,
    member: &'a Member,
    vote: VoteCode,
    features: Vec<f64>,
}

fn build_samples(data: &AnalysisData) -> Vec<Sample<'_>> {
    let mut samples = Vec::new();
    for (rollcall, votes) in grouped_votes(data) {
        let tallies = party_tallies(&votes, &data.members);
        let context = rollcall_context(rollcall, &votes, &tallies, data);
        for vote in votes {
            let Some(member) = data.members.get(&vote.member_id) else {
                continue;
            };
            if !vote.vote_code.is_decisive() {
                continue;
            }
            samples.push(Sample {
                rollcall,
                member,
                vote: vote.vote_code,
                features: context.features(member),
            });
        }
    }
    samples
}

/// Votes the window's own logistic model predicted the wrong way.
///
/// Returns nothing when there is no usable training data.
pub fn detect_model_outliers(data: &AnalysisData, params: &OutlierParams) -> Vec<Outlier> {
    info!("Building vote prediction model...");
    let samples = build_samples(data);
    let x: Vec<Vec<f64>> = samples.iter().map(|s| s.features.clone()).collect();
    let y: Vec<f64> = samples
        .iter()
        .map(|s| if s.vote == VoteCode::Yea { 1.0 } else { 0.0 })
        .collect();

    let model = match ScaledModel::train(&x, &y, &params.fit) {
        Ok(model) => model,
        Err(FitError::Empty) => {
            warn!("No training data found");
            return Vec::new();
        }
        Err(e) => {
            warn!("Skipping model-based outliers: {}", e);
            return Vec::new();
        }
    };
    info!("Trained vote prediction model on {} samples", samples.len());

    let mut outliers = Vec::new();
    for (sample, actual) in samples.iter().zip(&y) {
        let p = model.predict_proba(&sample.features);
        let error = (actual - p).abs();
        if error > params.error_threshold {
            let mut outlier =
                base_outlier(sample.rollcall, sample.member, sample.vote, OutlierMethod::ModelBased);
            outlier.predicted_yea_prob = Some(p);
            outlier.prediction_error = Some(error);
            outliers.push(outlier);
        }
    }

    info!("Found {} model-based outliers", outliers.len());
    outliers
}

/// Keep the first outlier for each (roll call, member) pair.
pub fn dedup_outliers(outliers: Vec<Outlier>) -> Vec<Outlier> {
    let mut seen = BTreeSet::new();
    outliers
        .into_iter()
        .filter(|o| seen.insert(o.key()))
        .collect()
}

/// Run both rules and merge, party-line results first.
pub fn analyze_outliers(data: &AnalysisData, params: &OutlierParams) -> OutlierReport {
    let window = data.window;
    info!(
        "Starting outlier analysis for {} in Congress {}",
        window.chamber, window.congress
    );

    let party_line = detect_party_line_deviations(data, params);
    let model = detect_model_outliers(data, params);
    let party_line_outliers = party_line.len();
    let model_outliers = model.len();

    let outliers = dedup_outliers(party_line.into_iter().chain(model).collect());
    debug!(
        "{} outliers after removing {} duplicates",
        outliers.len(),
        party_line_outliers + model_outliers - outliers.len()
    );

    OutlierReport {
        congress: window.congress,
        chamber: window.chamber,
        analysis_date: Utc::now(),
        start_date: window.start,
        end_date: window.end,
        total_outliers: outliers.len(),
        party_line_outliers,
        model_outliers,
        outliers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chamber;
    use crate::store::AnalysisWindow;

    fn member(id: &str, party: &str) -> Member {
        Member {
            member_id: id.to_string(),
            lis_id: None,
            first: "Rep".to_string(),
            last: id.to_string(),
            party: Some(party.to_string()),
            state: "CA".to_string(),
            district: Some(1),
            start_date: None,
            end_date: None,
        }
    }

    fn rollcall(n: i64, bill: Option<&str>) -> Rollcall {
        Rollcall {
            rollcall_id: Rollcall::make_id(Chamber::House, 119, 1, n),
            congress: 119,
            chamber: Chamber::House,
            session: 1,
            rc_number: n,
            date: None,
            question: Some("On Passage".to_string()),
            bill_id: bill.map(String::from),
        }
    }

    fn data_with(members: &[Member]) -> AnalysisData {
        let mut data = AnalysisData::empty(AnalysisWindow::new(119, Chamber::House));
        for m in members {
            data.members.insert(m.member_id.clone(), m.clone());
        }
        data
    }

    fn cast(data: &mut AnalysisData, rc: &Rollcall, member: &str, code: VoteCode) {
        data.votes.push(Vote {
            rollcall_id: rc.rollcall_id.clone(),
            member_id: member.to_string(),
            vote_code: code,
        });
    }

    /// 10 R all Yea except the given defectors; 10 D all Nay.
    fn partisan_rollcall(data: &mut AnalysisData, n: i64, r_defectors: &[&str]) {
        let rc = rollcall(n, None);
        for i in 0..10 {
            let id = format!("R{i}");
            let code = if r_defectors.contains(&id.as_str()) {
                VoteCode::Nay
            } else {
                VoteCode::Yea
            };
            cast(data, &rc, &id, code);
            cast(data, &rc, &format!("D{i}"), VoteCode::Nay);
        }
        data.rollcalls.push(rc);
    }

    fn chamber_members() -> Vec<Member> {
        (0..10)
            .flat_map(|i| [member(&format!("R{i}"), "R"), member(&format!("D{i}"), "D")])
            .collect()
    }

    #[test]
    fn test_party_line_flags_defector() {
        let mut data = data_with(&chamber_members());
        partisan_rollcall(&mut data, 1, &["R3"]);

        let outliers = detect_party_line_deviations(&data, &OutlierParams::default());
        assert_eq!(outliers.len(), 1);
        let o = &outliers[0];
        assert_eq!(o.member_id, "R3");
        assert_eq!(o.vote, VoteCode::Nay);
        assert_eq!(o.party_position, Some(VoteCode::Yea));
        assert!((o.party_yea_pct.unwrap() - 0.9).abs() < 1e-9);
        assert!((o.party_nay_pct.unwrap() - 0.1).abs() < 1e-9);
        assert_eq!(o.method, OutlierMethod::PartyLineDeviation);
    }

    #[test]
    fn test_split_party_has_no_position() {
        // 10 R Yea, 5 D Yea, 5 D Nay at threshold 0.8: nobody is flagged.
        let mut data = data_with(&chamber_members());
        let rc = rollcall(1, None);
        for i in 0..10 {
            cast(&mut data, &rc, &format!("R{i}"), VoteCode::Yea);
            let code = if i < 5 { VoteCode::Yea } else { VoteCode::Nay };
            cast(&mut data, &rc, &format!("D{i}"), code);
        }
        data.rollcalls.push(rc);

        let outliers = detect_party_line_deviations(&data, &OutlierParams::default());
        assert!(outliers.iter().all(|o| o.party != "R"));
        assert!(outliers.iter().all(|o| o.party != "D"));
        assert!(outliers.is_empty());
    }

    #[test]
    fn test_small_party_and_abstentions_ignored() {
        let mut members = chamber_members();
        members.extend((0..4).map(|i| member(&format!("I{i}"), "I")));
        let mut data = data_with(&members);

        let rc = rollcall(1, None);
        for i in 0..10 {
            let code = match i {
                0 => VoteCode::Present,
                1 => VoteCode::NotVoting,
                _ => VoteCode::Yea,
            };
            cast(&mut data, &rc, &format!("R{i}"), code);
        }
        // Independents split but number fewer than five.
        for i in 0..4 {
            let code = if i == 0 { VoteCode::Nay } else { VoteCode::Yea };
            cast(&mut data, &rc, &format!("I{i}"), code);
        }
        data.rollcalls.push(rc);

        let outliers = detect_party_line_deviations(&data, &OutlierParams::default());
        assert!(outliers.is_empty(), "got {outliers:?}");
    }

    #[test]
    fn test_unknown_members_are_ignored() {
        let mut data = data_with(&chamber_members());
        let rc = rollcall(1, None);
        for i in 0..10 {
            cast(&mut data, &rc, &format!("R{i}"), VoteCode::Yea);
        }
        cast(&mut data, &rc, "STRANGER", VoteCode::Nay);
        data.rollcalls.push(rc);

        assert!(detect_party_line_deviations(&data, &OutlierParams::default()).is_empty());
    }

    #[test]
    fn test_bipartisan_score() {
        let mut tallies = BTreeMap::new();
        tallies.insert(
            "D".to_string(),
            PartyTally {
                yea: 8,
                nay: 2,
                ..Default::default()
            },
        );
        tallies.insert(
            "R".to_string(),
            PartyTally {
                yea: 2,
                nay: 8,
                ..Default::default()
            },
        );
        assert!((bipartisan_score(&tallies) - 0.4).abs() < 1e-9);

        tallies.insert(
            "I".to_string(),
            PartyTally {
                yea: 1,
                nay: 0,
                ..Default::default()
            },
        );
        // I vs D: 1 - |1.0 - 0.8| = 0.8
        assert!((bipartisan_score(&tallies) - 0.8).abs() < 1e-9);

        tallies.insert(
            "L".to_string(),
            PartyTally {
                present: 3,
                ..Default::default()
            },
        );
        let score = bipartisan_score(&tallies);
        assert!((0.0..=1.0).contains(&score));
        assert!((score - 0.8).abs() < 1e-9);

        let single: BTreeMap<String, PartyTally> =
            [("D".to_string(), PartyTally { yea: 3, ..Default::default() })].into();
        assert_eq!(bipartisan_score(&single), 0.0);
    }

    #[test]
    fn test_bipartisan_cosponsorship() {
        let members: HashMap<String, Member> = [member("D1", "D"), member("R1", "R"), member("D2", "D")]
            .into_iter()
            .map(|m| (m.member_id.clone(), m))
            .collect();

        assert!(bipartisan_cosponsorship(&["D1".into(), "R1".into()], &members));
        assert!(!bipartisan_cosponsorship(&["D1".into(), "D2".into()], &members));
        // Unknown cosponsors do not count.
        assert!(!bipartisan_cosponsorship(&["D1".into(), "GHOST".into()], &members));
        assert!(!bipartisan_cosponsorship(&[], &members));
    }

    #[test]
    fn test_features_layout() {
        let context = RollcallContext {
            yea_pct: 0.6,
            bipartisan_score: 0.3,
            bipartisan_cosponsorship: true,
            has_bill: false,
        };
        assert_eq!(
            context.features(&member("X", "I")),
            vec![0.0, 0.0, 1.0, 0.6, 0.3, 1.0, 0.0]
        );
    }

    #[test]
    fn test_model_needs_two_classes() {
        let mut data = data_with(&chamber_members());
        let rc = rollcall(1, None);
        for i in 0..10 {
            cast(&mut data, &rc, &format!("R{i}"), VoteCode::Yea);
        }
        data.rollcalls.push(rc);
        assert!(detect_model_outliers(&data, &OutlierParams::default()).is_empty());

        let empty = data_with(&[]);
        assert!(detect_model_outliers(&empty, &OutlierParams::default()).is_empty());
    }

    #[test]
    fn test_model_flags_defector_against_party_pattern() {
        let mut data = data_with(&chamber_members());
        for n in 1..=6 {
            let defectors: &[&str] = if n == 3 { &["R7"] } else { &[] };
            partisan_rollcall(&mut data, n, defectors);
        }

        let outliers = detect_model_outliers(&data, &OutlierParams::default());
        assert!(outliers
            .iter()
            .any(|o| o.member_id == "R7" && o.rollcall_id == "h119-1-3"));
        for o in &outliers {
            let p = o.predicted_yea_prob.unwrap();
            assert!(p > 0.0 && p < 1.0);
            assert!(o.prediction_error.unwrap() > 0.5);
        }
    }

    #[test]
    fn test_analyze_dedups_party_line_first() {
        let mut data = data_with(&chamber_members());
        for n in 1..=6 {
            let defectors: &[&str] = if n == 3 { &["R7"] } else { &[] };
            partisan_rollcall(&mut data, n, defectors);
        }

        let report = analyze_outliers(&data, &OutlierParams::default());
        let r7: Vec<&Outlier> = report
            .outliers
            .iter()
            .filter(|o| o.member_id == "R7" && o.rollcall_id == "h119-1-3")
            .collect();
        assert_eq!(r7.len(), 1);
        assert_eq!(r7[0].method, OutlierMethod::PartyLineDeviation);
        assert_eq!(report.total_outliers, report.outliers.len());
        assert!(report.party_line_outliers >= 1);
        assert!(report.total_outliers <= report.party_line_outliers + report.model_outliers);
        assert_eq!(report.congress, 119);
    }

    #[test]
    fn test_dedup_keeps_first() {
        let rc = rollcall(1, None);
        let m = member("A", "D");
        let first = base_outlier(&rc, &m, VoteCode::Nay, OutlierMethod::PartyLineDeviation);
        let second = base_outlier(&rc, &m, VoteCode::Nay, OutlierMethod::ModelBased);
        let other = base_outlier(&rollcall(2, None), &m, VoteCode::Nay, OutlierMethod::ModelBased);

        let deduped = dedup_outliers(vec![first, second, other]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].method, OutlierMethod::PartyLineDeviation);
        assert_eq!(deduped[1].rollcall_id, "h119-1-2");
    }
}
