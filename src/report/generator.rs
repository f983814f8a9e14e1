//! Markdown and JSON report generation.
//!
//! This module renders the results of the analysis passes for the
//! command line and for files written with `--output`.

use crate::analysis::aggregator::{
    coalition_overview, generate_summary_text, most_contested_rollcalls, sort_outliers,
    top_defectors,
};
use crate::analysis::BillPrediction;
use crate::models::{Coalition, CoalitionReport, Outlier, OutlierReport, OutlierSummary};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::Path;

/// Generate a complete Markdown outlier report.
pub fn generate_outlier_markdown(report: &OutlierReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "# Vote Outliers: {} {}th Congress\n\n",
        report.chamber, report.congress
    ));

    output.push_str(&generate_metadata_section(
        report.analysis_date,
        report.start_date,
        report.end_date,
    ));
    output.push_str(&format!(
        "- **Flags:** {} party-line, {} model-based, {} after deduplication\n\n",
        report.party_line_outliers, report.model_outliers, report.total_outliers
    ));

    let summary = OutlierSummary::from_outliers(&report.outliers);
    output.push_str("## Summary\n\n```\n");
    output.push_str(&generate_summary_text(&summary));
    output.push_str("\n```\n\n");

    output.push_str(&generate_defectors_section(&report.outliers));
    output.push_str(&generate_contested_section(&report.outliers));
    output.push_str(&generate_outlier_table(&report.outliers));
    output.push_str(&generate_footer());

    output
}

/// Metadata lines shared by the analysis reports.
fn generate_metadata_section(
    analysis_date: DateTime<Utc>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    let bound = |d: Option<NaiveDate>| d.map_or_else(|| "open".to_string(), |d| d.to_string());
    section.push_str(&format!("- **Window:** {} to {}\n", bound(start), bound(end)));

    section
}

fn generate_defectors_section(outliers: &[Outlier]) -> String {
    let defectors = top_defectors(outliers, 10);
    if defectors.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Most Frequent Defectors\n\n");
    section.push_str("| Member | Party | Flagged Votes |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for (id, name, party, count) in defectors {
        section.push_str(&format!("| {} (`{}`) | {} | {} |\n", name, id, party, count));
    }
    section.push('\n');
    section
}

fn generate_contested_section(outliers: &[Outlier]) -> String {
    let contested = most_contested_rollcalls(outliers, 10);
    if contested.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Most Contested Roll Calls\n\n");
    section.push_str("| Roll Call | Flagged Votes |\n");
    section.push_str("|:---|:---:|\n");
    for (rollcall_id, count) in contested {
        section.push_str(&format!("| `{}` | {} |\n", rollcall_id, count));
    }
    section.push('\n');
    section
}

/// One row per flagged vote, in date order.
fn generate_outlier_table(outliers: &[Outlier]) -> String {
    let mut section = String::new();
    section.push_str("## Flagged Votes\n\n");

    if outliers.is_empty() {
        section.push_str("No outlier votes were found in this window.\n\n");
        return section;
    }

    let mut sorted = outliers.to_vec();
    sort_outliers(&mut sorted);

    section.push_str("| Date | Roll Call | Member | Party | Vote | Method | Detail |\n");
    section.push_str("|:---|:---|:---|:---:|:---:|:---|:---|\n");
    for o in &sorted {
        section.push_str(&format!(
            "| {} | `{}` | {} | {} | {} | {} | {} |\n",
            o.date.map(|d| d.to_string()).unwrap_or_default(),
            o.rollcall_id,
            o.member_name,
            o.party,
            o.vote,
            o.method,
            outlier_detail(o)
        ));
    }
    section.push('\n');
    section
}

fn outlier_detail(o: &Outlier) -> String {
    match (o.party_position, o.party_yea_pct, o.predicted_yea_prob) {
        (Some(position), Some(yea), _) => {
            format!("party voted {} ({:.0}% Yea)", position, yea * 100.0)
        }
        (_, _, Some(p)) => format!("P(Yea) = {:.2}", p),
        _ => String::new(),
    }
}

/// Generate a complete Markdown coalition report.
pub fn generate_coalition_markdown(report: &CoalitionReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "# Coalitions: {} {}th Congress\n\n",
        report.chamber, report.congress
    ));
    output.push_str(&generate_metadata_section(
        report.analysis_date,
        report.start_date,
        report.end_date,
    ));
    output.push_str(&format!("- **Members:** {}\n\n", report.total_members));

    let stats = &report.network_stats;
    output.push_str("## Network\n\n");
    output.push_str("| Nodes | Edges | Density | Modularity |\n");
    output.push_str("|:---:|:---:|:---:|:---:|\n");
    output.push_str(&format!(
        "| {} | {} | {:.3} | {:.3} |\n\n",
        stats.nodes, stats.edges, stats.density, stats.modularity
    ));

    output.push_str("## Overview\n\n");
    if report.coalitions.is_empty() {
        output.push_str("No coalitions of two or more members were detected.\n\n");
    } else {
        for line in coalition_overview(report) {
            output.push_str(&format!("- {}\n", line));
        }
        output.push('\n');
        for (id, coalition) in &report.coalitions {
            output.push_str(&generate_coalition_block(*id, coalition));
        }
    }

    output.push_str(&generate_footer());
    output
}

fn generate_coalition_block(id: usize, coalition: &Coalition) -> String {
    let mut block = String::new();

    block.push_str(&format!("### Coalition {}\n\n", id));
    block.push_str(&format!(
        "*Size: {} | Vote agreement: {:.2} | Cosponsorship: {:.2}*\n\n",
        coalition.size, coalition.avg_vote_agreement, coalition.avg_cosponsorship
    ));

    if !coalition.top_subjects.is_empty() {
        let subjects: Vec<String> = coalition
            .top_subjects
            .iter()
            .map(|(subject, count)| format!("{} ({})", subject, count))
            .collect();
        block.push_str(&format!("**Top subjects:** {}\n\n", subjects.join(", ")));
    }

    block.push_str("<details>\n<summary>Members</summary>\n\n");
    for m in &coalition.member_details {
        let seat = match m.district {
            Some(d) => format!("{}-{}", m.state, d),
            None => m.state.clone(),
        };
        block.push_str(&format!("- {} ({}, {})\n", m.name, m.party, seat));
    }
    block.push_str("\n</details>\n\n---\n\n");

    block
}

/// Generate a Markdown vote prediction.
pub fn generate_prediction_markdown(prediction: &BillPrediction) -> String {
    let mut output = String::new();

    output.push_str(&format!("# Vote Prediction: {}\n\n", prediction.bill_id));
    if let Some(ref title) = prediction.title {
        output.push_str(&format!("*{}*\n\n", title));
    }

    let counts = &prediction.cosponsor_counts;
    output.push_str(&format!(
        "- **Sponsor:** {} ({})\n",
        prediction.sponsor.as_deref().unwrap_or("unknown"),
        prediction.sponsor_party.as_deref().unwrap_or("?")
    ));
    output.push_str(&format!(
        "- **Cosponsors:** {} (D:{}, R:{}, other:{})\n",
        counts.total(),
        counts.dem,
        counts.rep,
        counts.other
    ));
    if !prediction.subjects.is_empty() {
        output.push_str(&format!(
            "- **Subjects:** {}\n",
            prediction.subjects.join(", ")
        ));
    }
    output.push_str(&format!(
        "- **Expected Yea share ({}):** {:.1}%\n\n",
        prediction.chamber,
        prediction.expected_yea_share() * 100.0
    ));

    output.push_str("| Member | Party | State | P(Yea) | Defection |\n");
    output.push_str("|:---|:---:|:---:|:---:|:---:|\n");
    for m in &prediction.members {
        let mut name = m.name.clone();
        if m.is_sponsor {
            name.push_str(" (sponsor)");
        } else if m.is_cosponsor {
            name.push_str(" (cosponsor)");
        }
        output.push_str(&format!(
            "| {} | {} | {} | {:.2} | {} |\n",
            name,
            m.party.as_deref().unwrap_or("?"),
            m.state,
            m.probability_yea,
            m.defection_score
                .map(|s| format!("{:.2}", s))
                .unwrap_or_default()
        ));
    }
    output.push('\n');
    output.push_str(&generate_footer());
    output
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by congress-coalitions v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Pretty-printed JSON for any report.
pub fn generate_json_report<T: Serialize>(report: &T) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write rendered report content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    std::fs::write(path, content)?;
    Ok(())
}
