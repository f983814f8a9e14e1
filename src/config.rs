//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.coalitions.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::regression::FitOptions;
use crate::analysis::{CoalitionParams, OutlierParams};
use crate::models::Chamber;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".coalitions.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Database location.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Analysis parameters and snapshot cache.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Remote data sources.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// JSON API server.
    #[serde(default)]
    pub server: ServerConfig,

    /// Backup retention.
    #[serde(default)]
    pub backup: BackupConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Show progress bars while loading.
    #[serde(default = "default_true")]
    pub show_progress: bool,

    /// Congress used when a command does not name one.
    #[serde(default = "default_congress")]
    pub congress: i64,

    /// Exclusion list file.
    #[serde(default = "default_exclusions_file")]
    pub exclusions_file: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            show_progress: true,
            congress: default_congress(),
            exclusions_file: default_exclusions_file(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_congress() -> i64 {
    119
}

fn default_exclusions_file() -> PathBuf {
    PathBuf::from("fec_exclusions.json")
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the libSQL/SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "coalitions.db".to_string()
}

/// Outlier, coalition and snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Share of a party voting one way that defines its position.
    #[serde(default = "default_party_line_threshold")]
    pub party_line_threshold: f64,

    /// Parties with fewer votes on a roll call are ignored.
    #[serde(default = "default_min_party_votes")]
    pub min_party_votes: usize,

    /// Prediction error above which a vote is a model outlier.
    #[serde(default = "default_error_threshold")]
    pub model_error_threshold: f64,

    /// Inverse L2 regularisation strength.
    #[serde(default = "default_regularization")]
    pub regularization_c: f64,

    /// Gradient descent iteration cap.
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,

    /// Vote agreement weight in the coalition network.
    #[serde(default = "default_alpha")]
    pub vote_weight: f64,

    /// Cosponsorship weight in the coalition network.
    #[serde(default = "default_beta")]
    pub cosponsor_weight: f64,

    /// Amendment weight in the coalition network.
    #[serde(default = "default_gamma")]
    pub amendment_weight: f64,

    /// Subjects listed per coalition.
    #[serde(default = "default_top_subjects")]
    pub top_subjects: usize,

    /// Directory holding JSON analysis snapshots.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Snapshots older than this are recomputed.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_hours: u64,

    /// `congress:chamber` pairs recomputed by `refresh`.
    #[serde(default = "default_refresh_targets")]
    pub refresh_targets: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            party_line_threshold: default_party_line_threshold(),
            min_party_votes: default_min_party_votes(),
            model_error_threshold: default_error_threshold(),
            regularization_c: default_regularization(),
            max_iter: default_max_iter(),
            vote_weight: default_alpha(),
            cosponsor_weight: default_beta(),
            amendment_weight: default_gamma(),
            top_subjects: default_top_subjects(),
            cache_dir: default_cache_dir(),
            cache_ttl_hours: default_cache_ttl(),
            refresh_targets: default_refresh_targets(),
        }
    }
}

fn default_party_line_threshold() -> f64 {
    0.8
}

fn default_min_party_votes() -> usize {
    5
}

fn default_error_threshold() -> f64 {
    0.5
}

fn default_regularization() -> f64 {
    1.0
}

fn default_max_iter() -> usize {
    1000
}

fn default_alpha() -> f64 {
    0.6
}

fn default_beta() -> f64 {
    0.3
}

fn default_gamma() -> f64 {
    0.1
}

fn default_top_subjects() -> usize {
    5
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_cache_ttl() -> u64 {
    24
}

fn default_refresh_targets() -> Vec<String> {
    vec!["119:house".to_string(), "119:senate".to_string()]
}

impl AnalysisConfig {
    pub fn outlier_params(&self) -> OutlierParams {
        OutlierParams {
            threshold: self.party_line_threshold,
            min_party_votes: self.min_party_votes,
            error_threshold: self.model_error_threshold,
            fit: FitOptions {
                c: self.regularization_c,
                max_iter: self.max_iter,
                ..FitOptions::default()
            },
        }
    }

    pub fn coalition_params(&self) -> CoalitionParams {
        CoalitionParams {
            alpha: self.vote_weight,
            beta: self.cosponsor_weight,
            gamma: self.amendment_weight,
            top_subjects: self.top_subjects,
            ..CoalitionParams::default()
        }
    }

    /// Parse `refresh_targets` into (congress, chamber) pairs.
    pub fn parsed_refresh_targets(&self) -> Result<Vec<(i64, Chamber)>> {
        self.refresh_targets
            .iter()
            .map(|target| {
                let (congress, chamber) = target
                    .split_once(':')
                    .with_context(|| format!("Refresh target must be 'congress:chamber': {}", target))?;
                let congress: i64 = congress
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid congress in refresh target: {}", target))?;
                let chamber: Chamber = chamber.parse().map_err(anyhow::Error::msg)?;
                Ok((congress, chamber))
            })
            .collect()
    }
}

/// Remote data source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Pause between requests in milliseconds.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,

    /// Consecutive missing roll calls before a scan stops.
    #[serde(default = "default_miss_limit")]
    pub miss_limit: usize,

    /// Highest roll-call number probed.
    #[serde(default = "default_max_rollcalls")]
    pub max_rollcalls: i64,

    #[serde(default = "default_house_base")]
    pub house_base_url: String,

    #[serde(default = "default_senate_base")]
    pub senate_base_url: String,

    #[serde(default = "default_congress_api")]
    pub congress_api_url: String,

    #[serde(default = "default_house_roster")]
    pub house_roster_url: String,

    #[serde(default = "default_senate_roster")]
    pub senate_roster_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_seconds: default_timeout(),
            request_delay_ms: default_request_delay(),
            miss_limit: default_miss_limit(),
            max_rollcalls: default_max_rollcalls(),
            house_base_url: default_house_base(),
            senate_base_url: default_senate_base(),
            congress_api_url: default_congress_api(),
            house_roster_url: default_house_roster(),
            senate_roster_url: default_senate_roster(),
        }
    }
}

fn default_user_agent() -> String {
    format!("congress-coalitions/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout() -> u64 {
    30
}

fn default_request_delay() -> u64 {
    500
}

fn default_miss_limit() -> usize {
    50
}

fn default_max_rollcalls() -> i64 {
    1500
}

fn default_house_base() -> String {
    "https://clerk.house.gov/evs".to_string()
}

fn default_senate_base() -> String {
    "https://www.senate.gov/legislative/LIS/roll_call_votes".to_string()
}

fn default_congress_api() -> String {
    "https://api.congress.gov/v3".to_string()
}

fn default_house_roster() -> String {
    "https://clerk.house.gov/xml/lists/MemberData.xml".to_string()
}

fn default_senate_roster() -> String {
    "https://www.senate.gov/general/contact_information/senators_cfm.xml".to_string()
}

/// JSON API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8050
}

/// Backup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory holding database backups.
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,

    /// Backups kept after each new backup; 0 keeps everything.
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            max_backups: default_max_backups(),
        }
    }
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_max_backups() -> usize {
    10
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref database) = args.database {
            self.database.path = database.clone();
        }

        if args.verbose {
            self.general.verbose = true;
        }
        if args.no_progress || args.quiet {
            self.general.show_progress = false;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, "coalitions.db");
        assert_eq!(config.analysis.party_line_threshold, 0.8);
        assert_eq!(config.analysis.min_party_votes, 5);
        assert_eq!(config.sources.miss_limit, 50);
        assert_eq!(config.server.port, 8050);
        assert_eq!(config.backup.max_backups, 10);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
verbose = true
congress = 118

[database]
path = "/var/lib/coalitions.db"

[analysis]
party_line_threshold = 0.9
refresh_targets = ["118:senate"]

[sources]
request_delay_ms = 0
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.general.verbose);
        assert_eq!(config.general.congress, 118);
        assert_eq!(config.database.path, "/var/lib/coalitions.db");
        assert_eq!(config.analysis.party_line_threshold, 0.9);
        assert_eq!(config.analysis.min_party_votes, 5);
        assert_eq!(config.sources.request_delay_ms, 0);
        assert_eq!(config.sources.timeout_seconds, 30);
        assert_eq!(
            config.analysis.parsed_refresh_targets().unwrap(),
            vec![(118, Chamber::Senate)]
        );
    }

    #[test]
    fn test_bad_refresh_target() {
        let mut analysis = AnalysisConfig::default();
        analysis.refresh_targets = vec!["house".to_string()];
        assert!(analysis.parsed_refresh_targets().is_err());
        analysis.refresh_targets = vec!["119:moon".to_string()];
        assert!(analysis.parsed_refresh_targets().is_err());
    }

    #[test]
    fn test_params_from_config() {
        let mut analysis = AnalysisConfig::default();
        analysis.regularization_c = 0.5;
        analysis.vote_weight = 1.0;
        let outliers = analysis.outlier_params();
        assert_eq!(outliers.fit.c, 0.5);
        assert_eq!(outliers.threshold, 0.8);
        let coalitions = analysis.coalition_params();
        assert_eq!(coalitions.alpha, 1.0);
        assert_eq!(coalitions.min_size, 2);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[analysis]"));
        assert!(toml_str.contains("[backup]"));
    }
}
