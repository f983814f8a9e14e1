//! Coalition detection on a multiplex member network.
//!
//! Three member × member similarity layers are combined into one weighted
//! graph: roll-call agreement, cosponsorship overlap and amendment overlap.
//! Louvain communities of that graph are reported as coalitions.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use petgraph::graph::UnGraph;
use tracing::{info, warn};

use crate::models::{Coalition, CoalitionReport, Member, MemberDetail, NetworkStats, VoteCode};
use crate::store::AnalysisData;

use super::louvain::{louvain, modularity};

/// Layer weights and reporting options.
#[derive(Debug, Clone, Copy)]
pub struct CoalitionParams {
    /// Weight of vote agreement.
    pub alpha: f64,
    /// Weight of cosponsorship similarity.
    pub beta: f64,
    /// Weight of amendment similarity.
    pub gamma: f64,
    pub top_subjects: usize,
    /// Smaller communities are dropped.
    pub min_size: usize,
}

impl Default for CoalitionParams {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta: 0.3,
            gamma: 0.1,
            top_subjects: 5,
            min_size: 2,
        }
    }
}

/// Symmetric member × member matrix.
#[derive(Debug, Clone, Default)]
pub struct SimilarityMatrix {
    members: Vec<String>,
    index: HashMap<String, usize>,
    values: Vec<Vec<f64>>,
}

impl SimilarityMatrix {
    fn with_members(members: Vec<String>) -> Self {
        let index = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.clone(), i))
            .collect();
        let n = members.len();
        Self {
            members,
            index,
            values: vec![vec![0.0; n]; n],
        }
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        self.values[i][j] = value;
        self.values[j][i] = value;
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn contains(&self, member: &str) -> bool {
        self.index.contains_key(member)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = *self.index.get(a)?;
        let j = *self.index.get(b)?;
        Some(self.values[i][j])
    }

    /// Mean over distinct pairs of `members` present in the matrix.
    pub fn mean_within(&self, members: &[String]) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                if let Some(v) = self.get(a, b) {
                    sum += v;
                    count += 1;
                }
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }
}

/// Share of common roll calls on which two members both voted Yea or both Nay.
///
/// Only members in `active` with at least one vote appear. Pairs with no
/// common roll call get 0.
pub fn vote_agreement_matrix(data: &AnalysisData, active: &HashMap<&str, &Member>) -> SimilarityMatrix {
    let positions: HashMap<&str, usize> = data
        .rollcalls
        .iter()
        .enumerate()
        .map(|(i, rc)| (rc.rollcall_id.as_str(), i))
        .collect();

    // 0 = no vote row, 1 = Yea, 2 = Nay, 3 = Present / Not Voting.
    let mut records: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
    for vote in &data.votes {
        if !active.contains_key(vote.member_id.as_str()) {
            continue;
        }
        let Some(&pos) = positions.get(vote.rollcall_id.as_str()) else {
            continue;
        };
        let row = records
            .entry(vote.member_id.as_str())
            .or_insert_with(|| vec![0; data.rollcalls.len()]);
        row[pos] = match vote.vote_code {
            VoteCode::Yea => 1,
            VoteCode::Nay => 2,
            _ => 3,
        };
    }

    let members: Vec<String> = records.keys().map(|m| m.to_string()).collect();
    let rows: Vec<&Vec<u8>> = records.values().collect();
    let mut matrix = SimilarityMatrix::with_members(members);

    for i in 0..rows.len() {
        for j in i..rows.len() {
            let mut common = 0usize;
            let mut agree = 0usize;
            for (a, b) in rows[i].iter().zip(rows[j].iter()) {
                if *a == 0 || *b == 0 {
                    continue;
                }
                common += 1;
                if a == b && *a != 3 {
                    agree += 1;
                }
            }
            let value = if common == 0 {
                0.0
            } else {
                agree as f64 / common as f64
            };
            matrix.set(i, j, value);
        }
    }

    info!("Built vote agreement matrix with {} members", matrix.members.len());
    matrix
}

/// Jaccard similarity of per-member item sets.
pub fn jaccard_matrix(sets: &BTreeMap<String, BTreeSet<String>>) -> SimilarityMatrix {
    let members: Vec<String> = sets.keys().cloned().collect();
    let items: Vec<&BTreeSet<String>> = sets.values().collect();
    let mut matrix = SimilarityMatrix::with_members(members);

    for i in 0..items.len() {
        for j in i..items.len() {
            let intersection = items[i].intersection(items[j]).count();
            let union = items[i].union(items[j]).count();
            let value = if union == 0 {
                0.0
            } else {
                intersection as f64 / union as f64
            };
            matrix.set(i, j, value);
        }
    }
    matrix
}

/// Cosponsored-bill sets of active members.
pub fn cosponsorship_matrix(data: &AnalysisData, active: &HashMap<&str, &Member>) -> SimilarityMatrix {
    let mut sets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for c in &data.cosponsorships {
        if active.contains_key(c.member_id.as_str()) {
            sets.entry(c.member_id.clone())
                .or_default()
                .insert(c.bill_id.clone());
        }
    }
    let matrix = jaccard_matrix(&sets);
    info!(
        "Built cosponsorship similarity matrix with {} members",
        matrix.members.len()
    );
    matrix
}

/// Sponsored-amendment sets of active members.
pub fn amendment_matrix(data: &AnalysisData, active: &HashMap<&str, &Member>) -> SimilarityMatrix {
    let mut sets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for a in &data.amendments {
        if let Some(sponsor) = a.sponsor_bioguide.as_deref() {
            if active.contains_key(sponsor) {
                sets.entry(sponsor.to_string())
                    .or_default()
                    .insert(a.amendment_id.clone());
            }
        }
    }
    jaccard_matrix(&sets)
}

/// The three layers for one window.
#[derive(Debug, Clone, Default)]
pub struct Layers {
    pub votes: SimilarityMatrix,
    pub cosponsors: SimilarityMatrix,
    pub amendments: SimilarityMatrix,
}

/// Combine the layers into a weighted member graph.
///
/// Nodes are members present in both the vote and cosponsor layers, and in
/// the amendment layer when it is non-empty. Zero-weight edges are omitted.
pub fn build_multiplex_network(layers: &Layers, params: &CoalitionParams) -> UnGraph<String, f64> {
    let mut members: Vec<&String> = layers
        .votes
        .members()
        .iter()
        .filter(|m| layers.cosponsors.contains(m))
        .filter(|m| layers.amendments.is_empty() || layers.amendments.contains(m))
        .collect();
    members.sort();

    let mut graph = UnGraph::new_undirected();
    let nodes: Vec<_> = members
        .iter()
        .map(|m| graph.add_node((*m).clone()))
        .collect();

    for i in 0..members.len() {
        for j in i + 1..members.len() {
            let (a, b) = (members[i].as_str(), members[j].as_str());
            let mut weight = params.alpha * layers.votes.get(a, b).unwrap_or(0.0)
                + params.beta * layers.cosponsors.get(a, b).unwrap_or(0.0);
            if !layers.amendments.is_empty() {
                weight += params.gamma * layers.amendments.get(a, b).unwrap_or(0.0);
            }
            if weight > 0.0 {
                graph.add_edge(nodes[i], nodes[j], weight);
            }
        }
    }

    info!(
        "Built multiplex network with {} nodes and {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    graph
}

/// Most frequent subject terms of the bills a group cosponsored.
pub fn coalition_subjects(data: &AnalysisData, members: &[String], top_n: usize) -> Vec<(String, usize)> {
    let group: BTreeSet<&str> = members.iter().map(String::as_str).collect();
    let bills: BTreeSet<&str> = data
        .cosponsorships
        .iter()
        .filter(|c| group.contains(c.member_id.as_str()))
        .map(|c| c.bill_id.as_str())
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for bill in bills {
        for subject in data.bill_subjects.get(bill).into_iter().flatten() {
            *counts.entry(subject.as_str()).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(s, c)| (s.to_string(), c))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(top_n);
    ranked
}

/// Edge density `2E / (N(N-1))`.
pub fn density(nodes: usize, edges: usize) -> f64 {
    if nodes < 2 {
        0.0
    } else {
        2.0 * edges as f64 / (nodes as f64 * (nodes as f64 - 1.0))
    }
}

/// Full pipeline: layers, network, communities, summaries.
pub fn analyze_coalitions(data: &AnalysisData, params: &CoalitionParams) -> CoalitionReport {
    let window = data.window;
    info!(
        "Starting coalition analysis for {} in Congress {}",
        window.chamber, window.congress
    );

    let active = data.active_members();
    let layers = Layers {
        votes: vote_agreement_matrix(data, &active),
        cosponsors: cosponsorship_matrix(data, &active),
        amendments: amendment_matrix(data, &active),
    };
    if layers.votes.is_empty() {
        warn!("No roll-call votes found for the specified criteria");
    }
    if layers.cosponsors.is_empty() {
        warn!("No cosponsorships found for the specified criteria");
    }

    let graph = build_multiplex_network(&layers, params);
    let labels = louvain(&graph);

    let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for node in graph.node_indices() {
        groups
            .entry(labels[node.index()])
            .or_default()
            .push(graph[node].clone());
    }

    let mut coalitions = BTreeMap::new();
    for (id, members) in groups {
        if members.len() < params.min_size {
            continue;
        }
        let details: Vec<MemberDetail> = members
            .iter()
            .filter_map(|m| active.get(m.as_str()))
            .map(|m| MemberDetail::from(*m))
            .collect();
        let mut party_composition: BTreeMap<String, usize> = BTreeMap::new();
        for d in &details {
            *party_composition.entry(d.party.clone()).or_default() += 1;
        }

        coalitions.insert(
            id,
            Coalition {
                size: members.len(),
                bipartisan: party_composition.len() > 1,
                party_composition,
                avg_vote_agreement: layers.votes.mean_within(&members),
                avg_cosponsorship: layers.cosponsors.mean_within(&members),
                top_subjects: coalition_subjects(data, &members, params.top_subjects),
                member_details: details,
                members,
            },
        );
    }
    info!("Detected {} coalitions", coalitions.len());

    let network_stats = NetworkStats {
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        density: density(graph.node_count(), graph.edge_count()),
        modularity: modularity(&graph, &labels),
    };

    CoalitionReport {
        congress: window.congress,
        chamber: window.chamber,
        analysis_date: Utc::now(),
        start_date: window.start,
        end_date: window.end,
        total_members: active.len(),
        coalitions,
        network_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Amendment, Chamber, Cosponsor, Rollcall, Vote};
    use crate::store::AnalysisWindow;

    fn member(id: &str, party: &str) -> Member {
        Member {
            member_id: id.to_string(),
            lis_id: None,
            first: "Sen".to_string(),
            last: id.to_string(),
            party: Some(party.to_string()),
            state: "NY".to_string(),
            district: None,
            start_date: None,
            end_date: None,
        }
    }

    fn data() -> AnalysisData {
        let mut data = AnalysisData::empty(AnalysisWindow::new(119, Chamber::Senate));
        for (id, party) in [("A", "D"), ("B", "D"), ("C", "D"), ("X", "R"), ("Y", "R"), ("Z", "R")] {
            data.members.insert(id.to_string(), member(id, party));
        }
        data
    }

    fn add_rollcall(data: &mut AnalysisData, n: i64, votes: &[(&str, VoteCode)]) {
        let rc = Rollcall {
            rollcall_id: Rollcall::make_id(Chamber::Senate, 119, 1, n),
            congress: 119,
            chamber: Chamber::Senate,
            session: 1,
            rc_number: n,
            date: None,
            question: None,
            bill_id: None,
        };
        for (member, code) in votes {
            data.votes.push(Vote {
                rollcall_id: rc.rollcall_id.clone(),
                member_id: member.to_string(),
                vote_code: *code,
            });
        }
        data.rollcalls.push(rc);
    }

    fn cosponsor(data: &mut AnalysisData, bill: &str, member: &str) {
        data.cosponsorships.push(Cosponsor {
            bill_id: bill.to_string(),
            member_id: member.to_string(),
            date: None,
            is_original: false,
        });
    }

    fn polarised() -> AnalysisData {
        use VoteCode::{Nay, Yea};
        let mut data = data();
        for n in 1..=4 {
            add_rollcall(
                &mut data,
                n,
                &[("A", Yea), ("B", Yea), ("C", Yea), ("X", Nay), ("Y", Nay), ("Z", Nay)],
            );
        }
        for m in ["A", "B", "C"] {
            cosponsor(&mut data, "s-1-119", m);
        }
        for m in ["X", "Y", "Z"] {
            cosponsor(&mut data, "s-2-119", m);
        }
        data.bill_subjects
            .insert("s-1-119".to_string(), vec!["Health".to_string(), "Medicare".to_string()]);
        data.bill_subjects
            .insert("s-2-119".to_string(), vec!["Taxation".to_string()]);
        data
    }

    #[test]
    fn test_vote_agreement_values() {
        use VoteCode::{Nay, NotVoting, Yea};
        let mut data = data();
        add_rollcall(&mut data, 1, &[("A", Yea), ("B", Yea), ("X", Nay)]);
        add_rollcall(&mut data, 2, &[("A", Yea), ("B", Nay), ("X", NotVoting)]);
        add_rollcall(&mut data, 3, &[("A", Nay), ("B", Nay)]);
        let active = data.active_members();

        let m = vote_agreement_matrix(&data, &active);
        assert_eq!(m.members(), &["A".to_string(), "B".to_string(), "X".to_string()]);
        assert!((m.get("A", "B").unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(m.get("B", "A"), m.get("A", "B"));
        assert_eq!(m.get("A", "X"), Some(0.0));
        // X voted Not Voting on its only other roll call.
        assert_eq!(m.get("X", "X"), Some(0.5));
        assert_eq!(m.get("A", "C"), None);
    }

    #[test]
    fn test_jaccard() {
        let mut sets = BTreeMap::new();
        sets.insert("A".to_string(), BTreeSet::from(["b1".to_string(), "b2".to_string()]));
        sets.insert("B".to_string(), BTreeSet::from(["b2".to_string(), "b3".to_string()]));
        sets.insert("C".to_string(), BTreeSet::from(["b9".to_string()]));

        let m = jaccard_matrix(&sets);
        assert!((m.get("A", "B").unwrap() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(m.get("A", "C"), Some(0.0));
        assert_eq!(m.get("C", "C"), Some(1.0));
    }

    #[test]
    fn test_multiplex_uses_common_members() {
        use VoteCode::Yea;
        let mut data = data();
        add_rollcall(&mut data, 1, &[("A", Yea), ("B", Yea), ("X", Yea)]);
        cosponsor(&mut data, "s-1-119", "A");
        cosponsor(&mut data, "s-1-119", "B");
        let active = data.active_members();

        let layers = Layers {
            votes: vote_agreement_matrix(&data, &active),
            cosponsors: cosponsorship_matrix(&data, &active),
            amendments: amendment_matrix(&data, &active),
        };
        let graph = build_multiplex_network(&layers, &CoalitionParams::default());
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        let edge = graph.edge_indices().next().unwrap();
        assert!((graph[edge] - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_amendment_layer_restricts_nodes() {
        use VoteCode::Yea;
        let mut data = data();
        add_rollcall(&mut data, 1, &[("A", Yea), ("B", Yea)]);
        cosponsor(&mut data, "s-1-119", "A");
        cosponsor(&mut data, "s-1-119", "B");
        data.amendments.push(Amendment {
            amendment_id: "samdt-1-119".to_string(),
            bill_id: "s-1-119".to_string(),
            sponsor_bioguide: Some("A".to_string()),
            amendment_type: None,
            purpose: None,
            introduced_date: None,
        });
        let active = data.active_members();

        let layers = Layers {
            votes: vote_agreement_matrix(&data, &active),
            cosponsors: cosponsorship_matrix(&data, &active),
            amendments: amendment_matrix(&data, &active),
        };
        let graph = build_multiplex_network(&layers, &CoalitionParams::default());
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_polarised_chamber_has_two_coalitions() {
        let data = polarised();
        let report = analyze_coalitions(&data, &CoalitionParams::default());

        assert_eq!(report.coalitions.len(), 2);
        assert_eq!(report.total_members, 6);
        for coalition in report.coalitions.values() {
            assert_eq!(coalition.size, 3);
            assert!(!coalition.bipartisan);
            assert_eq!(coalition.party_composition.len(), 1);
            assert!((coalition.avg_vote_agreement - 1.0).abs() < 1e-9);
            assert!((coalition.avg_cosponsorship - 1.0).abs() < 1e-9);
            assert_eq!(coalition.member_details.len(), 3);
        }

        let dems = report
            .coalitions
            .values()
            .find(|c| c.members.contains(&"A".to_string()))
            .unwrap();
        assert_eq!(
            dems.top_subjects,
            vec![("Health".to_string(), 1), ("Medicare".to_string(), 1)]
        );

        let stats = &report.network_stats;
        assert_eq!(stats.nodes, 6);
        // Cross-party pairs agree on nothing and share no bills.
        assert_eq!(stats.edges, 6);
        assert!((stats.density - 0.4).abs() < 1e-9);
        assert!(stats.modularity > 0.4);
    }

    #[test]
    fn test_no_data_yields_empty_report() {
        let report = analyze_coalitions(&data(), &CoalitionParams::default());
        assert!(report.coalitions.is_empty());
        assert_eq!(report.network_stats.nodes, 0);
        assert_eq!(report.network_stats.density, 0.0);
    }

    #[test]
    fn test_coalition_subjects_ranking() {
        let mut data = polarised();
        cosponsor(&mut data, "s-3-119", "A");
        data.bill_subjects
            .insert("s-3-119".to_string(), vec!["Medicare".to_string()]);

        let subjects = coalition_subjects(&data, &["A".to_string(), "B".to_string()], 1);
        assert_eq!(subjects, vec![("Medicare".to_string(), 2)]);
    }

    #[test]
    fn test_density() {
        assert_eq!(density(0, 0), 0.0);
        assert_eq!(density(1, 0), 0.0);
        assert!((density(4, 6) - 1.0).abs() < 1e-9);
    }
}
