//! Data models for congressional records and analysis results.
//!
//! This module contains the core data structures used throughout
//! the application: the relational entities loaded from government
//! sources and the reports produced by the analysis passes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Legislative chamber.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Chamber {
    House,
    Senate,
}

impl Chamber {
    /// Lowercase name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Chamber::House => "house",
            Chamber::Senate => "senate",
        }
    }

    /// Single-letter prefix used in roll-call IDs.
    pub fn prefix(&self) -> char {
        match self {
            Chamber::House => 'h',
            Chamber::Senate => 's',
        }
    }
}

impl fmt::Display for Chamber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chamber::House => write!(f, "House"),
            Chamber::Senate => write!(f, "Senate"),
        }
    }
}

impl FromStr for Chamber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "house" | "h" => Ok(Chamber::House),
            "senate" | "s" => Ok(Chamber::Senate),
            other => Err(format!("Unknown chamber: {}", other)),
        }
    }
}

/// A recorded position on a roll call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteCode {
    Yea,
    Nay,
    Present,
    #[serde(rename = "Not Voting")]
    NotVoting,
}

impl VoteCode {
    /// Database/JSON spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteCode::Yea => "Yea",
            VoteCode::Nay => "Nay",
            VoteCode::Present => "Present",
            VoteCode::NotVoting => "Not Voting",
        }
    }

    /// Map the many spellings used by the House and Senate feeds.
    ///
    /// Anything unrecognised is treated as not voting.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "yea" | "aye" | "yes" | "y" => VoteCode::Yea,
            "nay" | "no" | "n" => VoteCode::Nay,
            "present" | "present - announced" => VoteCode::Present,
            _ => VoteCode::NotVoting,
        }
    }

    /// True for Yea and Nay.
    pub fn is_decisive(&self) -> bool {
        matches!(self, VoteCode::Yea | VoteCode::Nay)
    }
}

impl fmt::Display for VoteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Yea" => Ok(VoteCode::Yea),
            "Nay" => Ok(VoteCode::Nay),
            "Present" => Ok(VoteCode::Present),
            "Not Voting" => Ok(VoteCode::NotVoting),
            other => Err(format!("Unknown vote code: {}", other)),
        }
    }
}

/// Normalise a party label to its one-letter code.
pub fn party_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let code = match trimmed.to_lowercase().as_str() {
        "democratic" | "democrat" | "d" => "D".to_string(),
        "republican" | "r" => "R".to_string(),
        "independent" | "independent democrat" | "i" | "id" => "I".to_string(),
        _ => trimmed[..1].to_uppercase(),
    };
    Some(code)
}

/// A member of Congress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Bioguide ID.
    pub member_id: String,
    /// Senate LIS ID, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lis_id: Option<String>,
    pub first: String,
    pub last: String,
    pub party: Option<String>,
    pub state: String,
    /// District number; `None` for senators.
    pub district: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

impl Member {
    /// Display name.
    pub fn name(&self) -> String {
        format!("{} {}", self.first, self.last).trim().to_string()
    }

    /// Chamber inferred from the district column.
    pub fn chamber(&self) -> Chamber {
        if self.district.is_some() {
            Chamber::House
        } else {
            Chamber::Senate
        }
    }

    /// Party code, or `"Unknown"`.
    pub fn party_label(&self) -> String {
        self.party.clone().unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Parsed form of a bill ID such as `hr-1-119`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BillId {
    pub bill_type: String,
    pub number: i64,
    pub congress: i64,
}

impl BillId {
    pub fn new(bill_type: &str, number: i64, congress: i64) -> Self {
        Self {
            bill_type: bill_type.to_lowercase(),
            number,
            congress,
        }
    }

    /// Build from a legislative number as printed in vote feeds, e.g. `"H R 5"`.
    pub fn from_legis_num(legis: &str, congress: i64) -> Option<Self> {
        let compact: String = legis
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '.')
            .collect();
        let bill_type: String = compact.chars().filter(|c| c.is_ascii_alphabetic()).collect();
        let digits: String = compact.chars().filter(|c| c.is_ascii_digit()).collect();
        if bill_type.is_empty() || digits.is_empty() {
            return None;
        }
        let number = digits.parse().ok()?;
        Some(Self::new(&bill_type, number, congress))
    }

    /// Chamber of origin implied by the bill type prefix.
    pub fn chamber(&self) -> Chamber {
        if self.bill_type.starts_with('s') {
            Chamber::Senate
        } else {
            Chamber::House
        }
    }
}

impl fmt::Display for BillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.bill_type, self.number, self.congress)
    }
}

impl FromStr for BillId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('-').collect();
        if parts.len() != 3 {
            return Err(format!("Bill ID must look like 'hr-1-119': {}", s));
        }
        let number = parts[1]
            .parse()
            .map_err(|_| format!("Invalid bill number in {}", s))?;
        let congress = parts[2]
            .parse()
            .map_err(|_| format!("Invalid congress in {}", s))?;
        if parts[0].is_empty() || !parts[0].chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(format!("Invalid bill type in {}", s));
        }
        Ok(Self::new(parts[0], number, congress))
    }
}

/// A bill or resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub bill_id: String,
    pub congress: i64,
    pub chamber: Chamber,
    pub number: i64,
    pub bill_type: String,
    pub title: Option<String>,
    pub introduced_date: Option<NaiveDate>,
    pub sponsor_bioguide: Option<String>,
    pub policy_area: Option<String>,
}

impl Bill {
    /// A bill row with only its identity filled in.
    pub fn from_id(id: &BillId) -> Self {
        Self {
            bill_id: id.to_string(),
            congress: id.congress,
            chamber: id.chamber(),
            number: id.number,
            bill_type: id.bill_type.clone(),
            title: None,
            introduced_date: None,
            sponsor_bioguide: None,
            policy_area: None,
        }
    }
}

/// An amendment sponsored by a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amendment {
    pub amendment_id: String,
    pub bill_id: String,
    pub sponsor_bioguide: Option<String>,
    pub amendment_type: Option<String>,
    pub purpose: Option<String>,
    pub introduced_date: Option<NaiveDate>,
}

/// A recorded floor vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollcall {
    pub rollcall_id: String,
    pub congress: i64,
    pub chamber: Chamber,
    pub session: i64,
    pub rc_number: i64,
    pub date: Option<NaiveDate>,
    pub question: Option<String>,
    pub bill_id: Option<String>,
}

impl Rollcall {
    /// Canonical roll-call ID, e.g. `h119-1-42`.
    pub fn make_id(chamber: Chamber, congress: i64, session: i64, number: i64) -> String {
        format!("{}{}-{}-{}", chamber.prefix(), congress, session, number)
    }
}

/// One member's position on one roll call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub rollcall_id: String,
    pub member_id: String,
    pub vote_code: VoteCode,
}

/// A member's cosponsorship of a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cosponsor {
    pub bill_id: String,
    pub member_id: String,
    pub date: Option<NaiveDate>,
    pub is_original: bool,
}

/// How an outlier was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    PartyLineDeviation,
    ModelBased,
}

impl fmt::Display for OutlierMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutlierMethod::PartyLineDeviation => write!(f, "Party-line deviation"),
            OutlierMethod::ModelBased => write!(f, "Model-based"),
        }
    }
}

/// A single unexpected vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outlier {
    pub rollcall_id: String,
    pub member_id: String,
    pub member_name: String,
    pub party: String,
    pub vote: VoteCode,
    pub method: OutlierMethod,
    /// Party majority position (party-line rule only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_position: Option<VoteCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_yea_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_nay_pct: Option<f64>,
    /// Model probability of a Yea vote (model rule only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_yea_prob: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_error: Option<f64>,
    pub date: Option<NaiveDate>,
    pub question: Option<String>,
    pub bill_id: Option<String>,
}

impl Outlier {
    /// Deduplication key.
    pub fn key(&self) -> (String, String) {
        (self.rollcall_id.clone(), self.member_id.clone())
    }
}

/// Counts of outliers by party and by member.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutlierSummary {
    pub total: usize,
    pub party_line: usize,
    pub model_based: usize,
    pub by_party: BTreeMap<String, usize>,
    pub by_member: BTreeMap<String, usize>,
}

impl OutlierSummary {
    /// Creates a summary from a list of outliers.
    pub fn from_outliers(outliers: &[Outlier]) -> Self {
        let mut summary = Self {
            total: outliers.len(),
            ..Self::default()
        };

        for outlier in outliers {
            match outlier.method {
                OutlierMethod::PartyLineDeviation => summary.party_line += 1,
                OutlierMethod::ModelBased => summary.model_based += 1,
            }
            *summary.by_party.entry(outlier.party.clone()).or_insert(0) += 1;
            *summary
                .by_member
                .entry(outlier.member_name.clone())
                .or_insert(0) += 1;
        }

        summary
    }
}

/// Result of one outlier analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierReport {
    pub congress: i64,
    pub chamber: Chamber,
    pub analysis_date: DateTime<Utc>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_outliers: usize,
    /// Flags raised by the party-line rule, before deduplication.
    pub party_line_outliers: usize,
    /// Flags raised by the model rule, before deduplication.
    pub model_outliers: usize,
    pub outliers: Vec<Outlier>,
}

/// Public fields of a coalition member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDetail {
    pub id: String,
    pub name: String,
    pub party: String,
    pub state: String,
    pub district: Option<i64>,
}

impl From<&Member> for MemberDetail {
    fn from(m: &Member) -> Self {
        Self {
            id: m.member_id.clone(),
            name: m.name(),
            party: m.party_label(),
            state: m.state.clone(),
            district: m.district,
        }
    }
}

/// A detected voting bloc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coalition {
    pub size: usize,
    pub members: Vec<String>,
    pub member_details: Vec<MemberDetail>,
    pub party_composition: BTreeMap<String, usize>,
    pub bipartisan: bool,
    pub avg_vote_agreement: f64,
    pub avg_cosponsorship: f64,
    pub top_subjects: Vec<(String, usize)>,
}

/// Shape of the multiplex network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkStats {
    pub nodes: usize,
    pub edges: usize,
    pub density: f64,
    pub modularity: f64,
}

/// Result of one coalition analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoalitionReport {
    pub congress: i64,
    pub chamber: Chamber,
    pub analysis_date: DateTime<Utc>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_members: usize,
    pub coalitions: BTreeMap<usize, Coalition>,
    pub network_stats: NetworkStats,
}

/// Predicted Yea probability for one member on one bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberPrediction {
    pub member_id: String,
    pub name: String,
    pub party: Option<String>,
    pub state: String,
    pub chamber: Chamber,
    pub probability_yea: f64,
    pub is_sponsor: bool,
    pub is_cosponsor: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defection_score: Option<f64>,
}
