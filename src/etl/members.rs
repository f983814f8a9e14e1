//! Member rosters from the House Clerk and the Senate.
//!
//! Loading members first lets the vote and cosponsor loaders match
//! positions to bioguide IDs.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::models::{party_code, Chamber, Member};
use crate::store::Store;

use super::xml::Tag;
use super::{LoadSummary, SourceClient};

/// District number from a Clerk `statedistrict` code such as `NC01`.
///
/// At-large seats (`AK00`) are stored as district 1.
pub fn district_number(statedistrict: &str) -> Option<i64> {
    let digits: String = statedistrict
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.parse::<i64>() {
        Ok(0) => Some(1),
        Ok(n) => Some(n),
        Err(_) if statedistrict.to_lowercase().contains("at large") => Some(1),
        Err(_) => None,
    }
}

pub struct RosterParser {
    member: Tag,
    statedistrict: Tag,
    bioguide_house: Tag,
    bioguide_senate: Tag,
    firstname: Tag,
    lastname: Tag,
    first_name: Tag,
    last_name: Tag,
    party: Tag,
    state: Tag,
}

impl RosterParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            member: Tag::new("member")?,
            statedistrict: Tag::new("statedistrict")?,
            bioguide_house: Tag::new("bioguideID")?,
            bioguide_senate: Tag::new("bioguide_id")?,
            firstname: Tag::new("firstname")?,
            lastname: Tag::new("lastname")?,
            first_name: Tag::new("first_name")?,
            last_name: Tag::new("last_name")?,
            party: Tag::new("party")?,
            state: Tag::new("state")?,
        })
    }

    /// Parse the Clerk `MemberData.xml`. Vacant seats are skipped.
    pub fn parse_house(&self, xml: &str) -> Vec<Member> {
        self.member
            .find_all(xml)
            .into_iter()
            .filter_map(|m| {
                let member_id = self.bioguide_house.text(m.body)?;
                let state_el = self.state.first(m.body);
                let statedistrict = self.statedistrict.text(m.body).unwrap_or_default();
                let state = state_el
                    .and_then(|s| s.attr("postal-code"))
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| statedistrict.chars().take(2).collect());
                Some(Member {
                    member_id,
                    lis_id: None,
                    first: self.firstname.text(m.body).unwrap_or_default(),
                    last: self.lastname.text(m.body).unwrap_or_default(),
                    party: self.party.text(m.body).as_deref().and_then(party_code),
                    state,
                    district: Some(district_number(&statedistrict).unwrap_or(1)),
                    start_date: None,
                    end_date: None,
                })
            })
            .collect()
    }

    /// Parse the Senate `senators_cfm.xml` contact list.
    pub fn parse_senate(&self, xml: &str) -> Vec<Member> {
        self.member
            .find_all(xml)
            .into_iter()
            .filter_map(|m| {
                Some(Member {
                    member_id: self.bioguide_senate.text(m.body)?,
                    lis_id: None,
                    first: self.first_name.text(m.body).unwrap_or_default(),
                    last: self.last_name.text(m.body).unwrap_or_default(),
                    party: self.party.text(m.body).as_deref().and_then(party_code),
                    state: self.state.text(m.body).unwrap_or_default(),
                    district: None,
                    start_date: None,
                    end_date: None,
                })
            })
            .collect()
    }
}

pub async fn save_members(store: &Store, members: &[Member]) -> LoadSummary {
    let mut summary = LoadSummary::default();
    for member in members {
        match store.upsert_member(member).await {
            Ok(()) => {
                summary.loaded += 1;
                summary.records += 1;
            }
            Err(e) => {
                warn!("Failed to save member {}: {}", member.member_id, e);
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Fetch and upsert the roster of each chamber.
pub async fn load_members(
    store: &Store,
    client: &SourceClient,
    house_url: &str,
    senate_url: &str,
    chambers: &[Chamber],
) -> Result<LoadSummary> {
    let parser = RosterParser::new()?;
    let mut summary = LoadSummary::default();

    for &chamber in chambers {
        let url = match chamber {
            Chamber::House => house_url,
            Chamber::Senate => senate_url,
        };
        info!("Fetching {} roster from {}", chamber, url);
        let xml = client
            .fetch_text(url)
            .await?
            .with_context(|| format!("{} roster not found at {}", chamber, url))?;
        let members = match chamber {
            Chamber::House => parser.parse_house(&xml),
            Chamber::Senate => parser.parse_senate(&xml),
        };
        info!("Parsed {} {} members", members.len(), chamber);
        summary.merge(save_members(store, &members).await);
        client.pause().await;
    }

    info!("Member load complete: {}", summary);
    Ok(summary)
}
