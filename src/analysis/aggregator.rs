//! Outlier aggregation and statistics.
//!
//! Helpers for slicing an outlier list into the views used by the reports
//! and the API.

use crate::models::{CoalitionReport, Outlier, OutlierMethod, OutlierSummary};
use std::collections::HashMap;

/// Sort outliers chronologically, then by roll call and member.
pub fn sort_outliers(outliers: &mut [Outlier]) {
    outliers.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.rollcall_id.cmp(&b.rollcall_id))
            .then_with(|| a.member_id.cmp(&b.member_id))
    });
}

/// Group outliers by member ID.
pub fn group_by_member(outliers: &[Outlier]) -> HashMap<String, Vec<Outlier>> {
    let mut grouped: HashMap<String, Vec<Outlier>> = HashMap::new();

    for outlier in outliers {
        grouped
            .entry(outlier.member_id.clone())
            .or_default()
            .push(outlier.clone());
    }

    for flagged in grouped.values_mut() {
        sort_outliers(flagged);
    }

    grouped
}

/// Group outliers by roll call.
pub fn group_by_rollcall(outliers: &[Outlier]) -> HashMap<String, Vec<Outlier>> {
    let mut grouped: HashMap<String, Vec<Outlier>> = HashMap::new();

    for outlier in outliers {
        grouped
            .entry(outlier.rollcall_id.clone())
            .or_default()
            .push(outlier.clone());
    }

    grouped
}

/// Only the outliers raised by one rule.
pub fn filter_by_method(outliers: &[Outlier], method: OutlierMethod) -> Vec<Outlier> {
    outliers
        .iter()
        .filter(|o| o.method == method)
        .cloned()
        .collect()
}

/// Members with the most flagged votes as `(member_id, name, party, count)`.
pub fn top_defectors(outliers: &[Outlier], n: usize) -> Vec<(String, String, String, usize)> {
    let mut counts: HashMap<&str, (&Outlier, usize)> = HashMap::new();
    for outlier in outliers {
        counts
            .entry(outlier.member_id.as_str())
            .or_insert((outlier, 0))
            .1 += 1;
    }

    let mut ranked: Vec<_> = counts
        .into_values()
        .map(|(o, count)| (o.member_id.clone(), o.member_name.clone(), o.party.clone(), count))
        .collect();
    ranked.sort_by(|a, b| b.3.cmp(&a.3).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}

/// Roll calls with the most flagged votes.
pub fn most_contested_rollcalls(outliers: &[Outlier], n: usize) -> Vec<(String, usize)> {
    let mut ranked: Vec<(String, usize)> = group_by_rollcall(outliers)
        .into_iter()
        .map(|(id, flagged)| (id, flagged.len()))
        .collect();

    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}

/// Generate a text summary of outlier statistics.
pub fn generate_summary_text(summary: &OutlierSummary) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Total Outliers: {}", summary.total));
    lines.push(format!("- Party-line deviations: {}", summary.party_line));
    lines.push(format!("- Model-based: {}", summary.model_based));

    if !summary.by_party.is_empty() {
        lines.push(String::new());
        lines.push("By Party:".to_string());

        let mut parties: Vec<_> = summary.by_party.iter().collect();
        parties.sort_by_key(|(_, count)| std::cmp::Reverse(*count));

        for (party, count) in parties {
            lines.push(format!("- {}: {}", party, count));
        }
    }

    lines.join("\n")
}

/// One line per coalition: size, party mix and bipartisan flag.
pub fn coalition_overview(report: &CoalitionReport) -> Vec<String> {
    report
        .coalitions
        .iter()
        .map(|(id, c)| {
            let parties: Vec<String> = c
                .party_composition
                .iter()
                .map(|(party, count)| format!("{}:{}", party, count))
                .collect();
            format!(
                "Coalition {}: {} members ({}){}",
                id,
                c.size,
                parties.join(", "),
                if c.bipartisan { " [bipartisan]" } else { "" }
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chamber, Coalition, NetworkStats, VoteCode};
    use chrono::{NaiveDate, Utc};
    use std::collections::BTreeMap;

    fn create_test_outlier(rollcall: &str, member: &str, party: &str, method: OutlierMethod) -> Outlier {
        Outlier {
            rollcall_id: rollcall.to_string(),
            member_id: member.to_string(),
            member_name: format!("Rep {}", member),
            party: party.to_string(),
            vote: VoteCode::Nay,
            method,
            party_position: None,
            party_yea_pct: None,
            party_nay_pct: None,
            predicted_yea_prob: None,
            prediction_error: None,
            date: None,
            question: None,
            bill_id: None,
        }
    }

    fn sample() -> Vec<Outlier> {
        vec![
            create_test_outlier("h119-1-1", "A", "R", OutlierMethod::PartyLineDeviation),
            create_test_outlier("h119-1-2", "A", "R", OutlierMethod::ModelBased),
            create_test_outlier("h119-1-2", "B", "D", OutlierMethod::PartyLineDeviation),
            create_test_outlier("h119-1-2", "C", "D", OutlierMethod::ModelBased),
        ]
    }

    #[test]
    fn test_group_by_member() {
        let grouped = group_by_member(&sample());
        assert_eq!(grouped.get("A").map(|v| v.len()), Some(2));
        assert_eq!(grouped.get("B").map(|v| v.len()), Some(1));
    }

    #[test]
    fn test_sort_outliers_by_date() {
        let mut outliers = sample();
        outliers[3].date = NaiveDate::from_ymd_opt(2025, 1, 3);
        outliers[0].date = NaiveDate::from_ymd_opt(2025, 2, 1);
        sort_outliers(&mut outliers);
        // Undated sort first.
        assert_eq!(outliers[0].member_id, "A");
        assert_eq!(outliers[0].rollcall_id, "h119-1-2");
        assert_eq!(outliers[2].member_id, "C");
        assert_eq!(outliers[3].rollcall_id, "h119-1-1");
    }

    #[test]
    fn test_filter_by_method() {
        let model = filter_by_method(&sample(), OutlierMethod::ModelBased);
        assert_eq!(model.len(), 2);
        assert!(model.iter().all(|o| o.method == OutlierMethod::ModelBased));
    }

    #[test]
    fn test_top_defectors() {
        let top = top_defectors(&sample(), 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0], ("A".to_string(), "Rep A".to_string(), "R".to_string(), 2));
        assert_eq!(top[1].0, "B");
    }

    #[test]
    fn test_most_contested_rollcalls() {
        let ranked = most_contested_rollcalls(&sample(), 5);
        assert_eq!(ranked[0], ("h119-1-2".to_string(), 3));
        assert_eq!(ranked[1], ("h119-1-1".to_string(), 1));
    }

    #[test]
    fn test_generate_summary_text() {
        let summary = OutlierSummary::from_outliers(&sample());
        let text = generate_summary_text(&summary);
        assert!(text.contains("Total Outliers: 4"));
        assert!(text.contains("- Party-line deviations: 2"));
        assert!(text.contains("- D: 2"));
    }

    #[test]
    fn test_coalition_overview() {
        let mut coalitions = BTreeMap::new();
        coalitions.insert(
            0,
            Coalition {
                size: 3,
                members: vec!["A".into(), "B".into(), "C".into()],
                member_details: Vec::new(),
                party_composition: BTreeMap::from([("D".to_string(), 2), ("R".to_string(), 1)]),
                bipartisan: true,
                avg_vote_agreement: 0.9,
                avg_cosponsorship: 0.2,
                top_subjects: Vec::new(),
            },
        );
        let report = CoalitionReport {
            congress: 119,
            chamber: Chamber::House,
            analysis_date: Utc::now(),
            start_date: None,
            end_date: None,
            total_members: 3,
            coalitions,
            network_stats: NetworkStats::default(),
        };
        assert_eq!(
            coalition_overview(&report),
            vec!["Coalition 0: 3 members (D:2, R:1) [bipartisan]".to_string()]
        );
    }
}
