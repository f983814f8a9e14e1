//! JSON analysis snapshots used as the API cache.
//!
//! One file per (congress, chamber) under the cache directory. A snapshot
//! is served while younger than the configured TTL.

use crate::analysis::{analyze_coalitions, analyze_outliers, CoalitionParams, OutlierParams};
use crate::models::{Chamber, CoalitionReport, OutlierReport};
use crate::store::{AnalysisWindow, Store};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Outlier and coalition results for one chamber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub congress: i64,
    pub chamber: Chamber,
    pub generated_at: DateTime<Utc>,
    pub outliers: OutlierReport,
    pub coalitions: CoalitionReport,
}

/// Run both analyses over a whole congress.
pub async fn build_snapshot(
    store: &Store,
    congress: i64,
    chamber: Chamber,
    outlier_params: &OutlierParams,
    coalition_params: &CoalitionParams,
) -> Result<AnalysisSnapshot> {
    let data = store
        .load_analysis_data(AnalysisWindow::new(congress, chamber))
        .await
        .with_context(|| format!("Failed to load {} data for Congress {}", chamber, congress))?;

    Ok(AnalysisSnapshot {
        congress,
        chamber,
        generated_at: Utc::now(),
        outliers: analyze_outliers(&data, outlier_params),
        coalitions: analyze_coalitions(&data, coalition_params),
    })
}

/// A century; keeps the TTL inside chrono's range.
const MAX_TTL_HOURS: u64 = 876_000;

pub struct SnapshotCache {
    dir: PathBuf,
    ttl: Duration,
}

impl SnapshotCache {
    pub fn new(dir: impl Into<PathBuf>, ttl_hours: u64) -> Self {
        Self {
            dir: dir.into(),
            ttl: Duration::hours(ttl_hours.min(MAX_TTL_HOURS) as i64),
        }
    }

    pub fn path_for(&self, congress: i64, chamber: Chamber) -> PathBuf {
        self.dir
            .join(format!("analysis_{}_{}.json", congress, chamber.as_str()))
    }

    /// Read a snapshot if present and not older than the TTL.
    ///
    /// An unreadable file is treated as missing.
    pub fn load_fresh(&self, congress: i64, chamber: Chamber) -> Option<AnalysisSnapshot> {
        let path = self.path_for(congress, chamber);
        let content = std::fs::read_to_string(&path).ok()?;
        let snapshot: AnalysisSnapshot = match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                warn!("Ignoring corrupt snapshot {}: {}", path.display(), e);
                return None;
            }
        };

        let age = Utc::now() - snapshot.generated_at;
        if age > self.ttl {
            debug!("Snapshot {} is stale ({}m old)", path.display(), age.num_minutes());
            return None;
        }
        Some(snapshot)
    }

    /// Write a snapshot atomically.
    pub fn save(&self, snapshot: &AnalysisSnapshot) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache dir {}", self.dir.display()))?;
        let path = self.path_for(snapshot.congress, snapshot.chamber);

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .context("Failed to create temporary snapshot file")?;
        let json = serde_json::to_vec(snapshot)?;
        tmp.write_all(&json)?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;

        info!("Wrote snapshot {}", path.display());
        Ok(path)
    }

    /// Delete every snapshot file. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_snapshot = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("analysis_") && n.ends_with(".json"));
            if is_snapshot {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed += 1;
            }
        }
        info!("Cleared {} snapshot(s)", removed);
        Ok(removed)
    }
}
