//! Command-line interface definitions using clap.

use crate::models::{BillId, Chamber, OutlierMethod};
use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Roll-call, cosponsorship and coalition analysis for the U.S. Congress.
///
/// Loads votes, bills and members from government sources into a local
/// database, then finds outlier votes, voting coalitions and likely
/// defectors on pending bills.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the database file
    #[arg(long, global = true, env = "DATABASE_URL", value_name = "PATH")]
    pub database: Option<String>,

    /// Path to configuration file (TOML)
    ///
    /// Defaults to .coalitions.toml in the current directory when present.
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch records from government sources into the database
    Load {
        #[command(subcommand)]
        source: LoadSource,
    },

    /// Run an analysis over the loaded data
    Analyze {
        #[command(subcommand)]
        target: AnalyzeTarget,
    },

    /// Serve the JSON API
    Serve {
        /// Address to bind (overrides [server] host)
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Port to listen on (overrides [server] port)
        #[arg(short, long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Write a timestamped copy of the database
    Backup,

    /// Replace the database with a backup file
    Restore {
        /// Backup file to restore from
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Inspect or clean up existing backups
    Backups {
        #[command(subcommand)]
        action: BackupsAction,
    },

    /// Apply database migrations and print table sizes
    Migrate,

    /// Recompute the cached analysis snapshots
    Refresh {
        /// Target as CONGRESS:CHAMBER, e.g. 119:house (repeatable)
        ///
        /// Defaults to [analysis] refresh_targets.
        #[arg(short, long = "target", value_name = "TARGET")]
        targets: Vec<String>,

        /// Delete every cached snapshot before recomputing
        #[arg(long)]
        clear: bool,
    },

    /// Manage the candidate exclusion list
    Exclusions {
        #[command(subcommand)]
        action: ExclusionsAction,
    },

    /// Generate a default .coalitions.toml configuration file
    InitConfig,
}

#[derive(Subcommand, Debug, Clone)]
pub enum LoadSource {
    /// House roll calls from the Clerk's XML feed
    House(RollcallLoadArgs),
    /// Senate roll calls from senate.gov
    Senate(RollcallLoadArgs),
    /// Bill metadata, cosponsors and subjects from Congress.gov
    Bills(BillLoadArgs),
    /// Current member rosters
    Members {
        /// Only this chamber (default: both)
        #[arg(long, value_enum)]
        chamber: Option<Chamber>,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RollcallLoadArgs {
    /// Congress number (default: [general] congress)
    #[arg(long, value_name = "N")]
    pub congress: Option<i64>,

    /// Re-fetch roll calls already in the database
    #[arg(long)]
    pub force: bool,

    /// Highest roll number to try (default: [sources] max_rollcalls)
    #[arg(long, value_name = "N")]
    pub max_rollcall: Option<i64>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct BillLoadArgs {
    /// Congress number (default: [general] congress)
    #[arg(long, value_name = "N")]
    pub congress: Option<i64>,

    /// Bill IDs such as hr-23-119 (default: every bill of the congress in the database)
    #[arg(short, long = "bill", value_name = "BILL_ID", value_delimiter = ',')]
    pub bills: Vec<BillId>,

    /// Also fetch amendments
    #[arg(long)]
    pub amendments: bool,

    /// Congress.gov API key
    #[arg(long, env = "CONGRESS_API_KEY", hide_env_values = true, value_name = "KEY")]
    pub api_key: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AnalyzeTarget {
    /// Find votes that break with the member's party or the model
    Outliers {
        #[command(flatten)]
        window: WindowArgs,

        /// Only report flags raised by one rule
        #[arg(long, value_enum)]
        method: Option<MethodFilter>,

        /// Only report one member's flagged votes
        #[arg(long, value_name = "BIOGUIDE_ID")]
        member: Option<String>,

        /// Exit with code 2 when more than N outliers are reported
        #[arg(long, value_name = "N")]
        fail_on: Option<usize>,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Detect voting coalitions
    Coalitions {
        #[command(flatten)]
        window: WindowArgs,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Score how each member is likely to vote on a bill
    Predict {
        /// Bill ID, e.g. hr-23-119
        #[arg(value_name = "BILL_ID")]
        bill: BillId,

        /// Chamber to score (default: the bill's chamber)
        #[arg(long, value_enum)]
        chamber: Option<Chamber>,

        /// Order members by likelihood of defecting
        #[arg(long)]
        rank: bool,

        /// Show only the first N members
        #[arg(long, value_name = "N")]
        top: Option<usize>,

        #[command(flatten)]
        report: ReportArgs,
    },
}

/// Which roll calls an analysis covers.
#[derive(ClapArgs, Debug, Clone)]
pub struct WindowArgs {
    /// Congress number (default: [general] congress)
    #[arg(long, value_name = "N")]
    pub congress: Option<i64>,

    /// Chamber to analyze
    #[arg(long, value_enum, default_value_t = Chamber::House)]
    pub chamber: Chamber,

    /// First vote date to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub start: Option<NaiveDate>,

    /// Last vote date to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub end: Option<NaiveDate>,
}

/// Where and how a report is written.
#[derive(ClapArgs, Debug, Clone)]
pub struct ReportArgs {
    /// Output format for the report
    #[arg(short, long, value_enum, default_value = "markdown")]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BackupsAction {
    /// List backups, newest first
    List,
    /// Delete backups older than a number of days
    Cleanup {
        /// Age in days
        #[arg(long, default_value_t = 30)]
        days: i64,

        /// Show what would be removed without deleting
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ExclusionsAction {
    /// Print every excluded candidate
    List,
    /// Exclude a candidate
    Add {
        #[command(flatten)]
        candidate: CandidateArgs,

        /// Why the candidate is excluded
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Remove an exclusion
    Remove {
        #[command(flatten)]
        candidate: CandidateArgs,
    },
    /// Check whether a candidate is excluded
    Check {
        #[command(flatten)]
        candidate: CandidateArgs,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CandidateArgs {
    /// Two-letter state code
    pub state: String,
    /// District number as filed
    pub district: String,
    /// Candidate name as filed, e.g. "DOE, JANE"
    pub name: String,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Outlier rule selector for --method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MethodFilter {
    PartyLine,
    Model,
}

impl From<MethodFilter> for OutlierMethod {
    fn from(filter: MethodFilter) -> Self {
        match filter {
            MethodFilter::PartyLine => OutlierMethod::PartyLineDeviation,
            MethodFilter::Model => OutlierMethod::ModelBased,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match &self.command {
            Command::Load { source } => match source {
                LoadSource::House(opts) | LoadSource::Senate(opts) => {
                    validate_congress(opts.congress)?;
                    if opts.max_rollcall.is_some_and(|n| n < 1) {
                        return Err("Max roll call must be at least 1".to_string());
                    }
                }
                LoadSource::Bills(opts) => validate_congress(opts.congress)?,
                LoadSource::Members { .. } => {}
            },
            Command::Analyze { target } => match target {
                AnalyzeTarget::Outliers { window, .. } | AnalyzeTarget::Coalitions { window, .. } => {
                    validate_congress(window.congress)?;
                    if let (Some(start), Some(end)) = (window.start, window.end) {
                        if start > end {
                            return Err(format!(
                                "Start date {} is after end date {}",
                                start, end
                            ));
                        }
                    }
                }
                AnalyzeTarget::Predict { top, .. } => {
                    if *top == Some(0) {
                        return Err("--top must be at least 1".to_string());
                    }
                }
            },
            Command::Serve { port, .. } => {
                if *port == Some(0) {
                    return Err("Port must be between 1 and 65535".to_string());
                }
            }
            Command::Backups {
                action: BackupsAction::Cleanup { days, .. },
            } => {
                if !(1..=MAX_CLEANUP_DAYS).contains(days) {
                    return Err(format!(
                        "Cleanup age must be between 1 and {} days",
                        MAX_CLEANUP_DAYS
                    ));
                }
            }
            Command::Exclusions { action } => {
                let candidate = match action {
                    ExclusionsAction::List => None,
                    ExclusionsAction::Add { candidate, .. }
                    | ExclusionsAction::Remove { candidate }
                    | ExclusionsAction::Check { candidate } => Some(candidate),
                };
                if let Some(c) = candidate {
                    if c.state.len() != 2 || !c.state.chars().all(|ch| ch.is_ascii_alphabetic()) {
                        return Err(format!("State must be a two-letter code: {}", c.state));
                    }
                    if c.name.trim().is_empty() {
                        return Err("Candidate name cannot be empty".to_string());
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

const MAX_CONGRESS: i64 = 1000;
const MAX_CLEANUP_DAYS: i64 = 36_500;

fn validate_congress(congress: Option<i64>) -> Result<(), String> {
    match congress {
        Some(n) if !(1..=MAX_CONGRESS).contains(&n) => {
            Err(format!("Invalid congress number: {}", n))
        }
        _ => Ok(()),
    }
}
