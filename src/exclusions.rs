//! Candidate exclusion list.
//!
//! A small JSON file of (state, district, name) entries. Matching ignores
//! case on state and name and compares the district string exactly.

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub state: String,
    pub district: String,
    pub fec_name: String,
    pub reason: String,
    pub excluded_date: String,
}

impl Exclusion {
    fn matches(&self, state: &str, district: &str, name: &str) -> bool {
        self.state.to_uppercase() == state.to_uppercase()
            && self.district == district
            && self.fec_name.to_uppercase() == name.to_uppercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExclusionFile {
    #[serde(default)]
    pub excluded_candidates: Vec<Exclusion>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// Reads and writes the exclusion file.
pub struct ExclusionList {
    path: PathBuf,
}

impl ExclusionList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file; a missing file is an empty list.
    pub fn load(&self) -> Result<ExclusionFile> {
        if !self.path.exists() {
            debug!("No exclusion file at {}", self.path.display());
            return Ok(ExclusionFile::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    fn save(&self, file: &ExclusionFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(file)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    pub fn is_excluded(&self, state: &str, district: &str, name: &str) -> Result<bool> {
        Ok(self
            .load()?
            .excluded_candidates
            .iter()
            .any(|e| e.matches(state, district, name)))
    }

    /// Add an entry. Adding an existing entry changes nothing.
    pub fn add(&self, state: &str, district: &str, name: &str, reason: &str) -> Result<bool> {
        let mut file = self.load()?;
        if file
            .excluded_candidates
            .iter()
            .any(|e| e.matches(state, district, name))
        {
            info!("{} ({}-{}) is already excluded", name, state, district);
            return Ok(false);
        }

        file.excluded_candidates.push(Exclusion {
            state: state.to_uppercase(),
            district: district.to_string(),
            fec_name: name.to_uppercase(),
            reason: reason.to_string(),
            excluded_date: Local::now().format("%Y-%m-%d").to_string(),
        });
        file.last_updated = Some(Utc::now().to_rfc3339());
        self.save(&file)?;
        info!("Added exclusion for {} ({}-{})", name, state, district);
        Ok(true)
    }

    /// Remove matching entries. Returns whether anything was removed.
    pub fn remove(&self, state: &str, district: &str, name: &str) -> Result<bool> {
        let mut file = self.load()?;
        let before = file.excluded_candidates.len();
        file.excluded_candidates
            .retain(|e| !e.matches(state, district, name));
        if file.excluded_candidates.len() == before {
            return Ok(false);
        }
        file.last_updated = Some(Utc::now().to_rfc3339());
        self.save(&file)?;
        info!("Removed exclusion for {} ({}-{})", name, state, district);
        Ok(true)
    }
}
