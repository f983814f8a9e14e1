//! congress-coalitions - roll-call and coalition analysis for the U.S. Congress
//!
//! A CLI tool that loads votes, bills, cosponsorships and members from
//! government sources into a local database, finds outlier votes and
//! voting coalitions, and serves the results as a JSON API.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (network, database, config, bad input, etc.)
//!   2 - More outliers than the --fail-on limit

mod analysis;
mod cli;
mod config;
mod etl;
mod exclusions;
mod models;
mod ops;
mod report;
mod server;
mod store;

use anyhow::{Context, Result};
use cli::{
    AnalyzeTarget, Args, BackupsAction, Command, ExclusionsAction, LoadSource, OutputFormat,
    ReportArgs, WindowArgs,
};
use config::{Config, CONFIG_FILE};
use etl::SourceClient;
use exclusions::ExclusionList;
use models::Chamber;
use report::SnapshotCache;
use std::path::Path;
use std::time::Instant;
use store::{AnalysisWindow, Store};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    init_logging(&args);

    info!("congress-coalitions v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .coalitions.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set the congress, database path, thresholds and sources.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

async fn open_store(config: &Config) -> Result<Store> {
    Store::open(&config.database.path)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path))
}

/// Dispatch a subcommand. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    match args.command {
        Command::InitConfig => handle_init_config().map(|_| 0),
        Command::Load { source } => run_load(&config, source).await,
        Command::Analyze { target } => run_analyze(&config, target).await,
        Command::Serve { host, port } => {
            let store = open_store(&config).await?;
            let state = server::ApiState {
                store,
                cache: SnapshotCache::new(
                    &config.analysis.cache_dir,
                    config.analysis.cache_ttl_hours,
                ),
                outlier_params: config.analysis.outlier_params(),
                coalition_params: config.analysis.coalition_params(),
            };
            let addr = format!(
                "{}:{}",
                host.unwrap_or_else(|| config.server.host.clone()),
                port.unwrap_or(config.server.port)
            );
            println!("🌐 Serving API on http://{}", addr);
            server::serve(state, &addr).await?;
            Ok(0)
        }
        Command::Backup => {
            let store = open_store(&config).await?;
            println!("💾 Backing up {}...", config.database.path);
            let path = ops::backup(&store, &config.backup.dir, config.backup.max_backups).await?;
            println!("✅ Backup saved to: {}", path.display());
            Ok(0)
        }
        Command::Restore { file } => {
            println!("♻️  Restoring {} from {}", config.database.path, file.display());
            ops::restore(&file, Path::new(&config.database.path))?;
            println!("✅ Restore complete.");
            Ok(0)
        }
        Command::Backups { action } => run_backups(&config, action),
        Command::Migrate => {
            let store = open_store(&config).await?;
            let counts = ops::migrate(&store).await?;
            println!("✅ Migrations applied to {}", config.database.path);
            println!("\n📊 Tables:");
            for (table, rows) in &counts.tables {
                println!("   {:<14} {}", table, rows);
            }
            if !counts.parties.is_empty() {
                println!("\n   Members by party:");
                for (party, n) in &counts.parties {
                    println!("   {:<14} {}", party, n);
                }
            }
            Ok(0)
        }
        Command::Refresh { targets, clear } => {
            let mut analysis = config.analysis.clone();
            if !targets.is_empty() {
                analysis.refresh_targets = targets;
            }
            let targets = analysis.parsed_refresh_targets()?;

            let store = open_store(&config).await?;
            let cache = SnapshotCache::new(&analysis.cache_dir, analysis.cache_ttl_hours);
            if clear {
                let removed = cache.clear()?;
                println!("🧹 Cleared {} cached snapshot(s)", removed);
            }

            println!("🔬 Refreshing {} analysis snapshot(s)...", targets.len());
            let written = ops::refresh(
                &store,
                &cache,
                &targets,
                &analysis.outlier_params(),
                &analysis.coalition_params(),
            )
            .await?;
            for path in &written {
                println!("   📄 {}", path.display());
            }
            println!("✅ Refresh complete.");
            Ok(0)
        }
        Command::Exclusions { action } => run_exclusions(&config, action),
    }
}

async fn run_load(config: &Config, source: LoadSource) -> Result<i32> {
    let start_time = Instant::now();
    let store = open_store(config).await?;
    let sources = &config.sources;
    let show_progress = config.general.show_progress;

    let (label, summary) = match source {
        LoadSource::House(opts) => {
            let congress = opts.congress.unwrap_or(config.general.congress);
            println!("📥 Loading House roll calls for the {}th Congress...", congress);
            let client = SourceClient::new(sources, None)?;
            let load = etl::house::HouseLoad {
                congress,
                years: etl::congress_years(congress).to_vec(),
                max_rollcall: opts.max_rollcall.unwrap_or(sources.max_rollcalls),
                miss_limit: sources.miss_limit,
                force: opts.force,
                show_progress,
            };
            let summary =
                etl::house::load_house(&store, &client, &sources.house_base_url, &load).await?;
            ("House roll calls", summary)
        }
        LoadSource::Senate(opts) => {
            let congress = opts.congress.unwrap_or(config.general.congress);
            println!("📥 Loading Senate roll calls for the {}th Congress...", congress);
            let client = SourceClient::new(sources, None)?;
            let load = etl::senate::SenateLoad {
                congress,
                sessions: vec![1, 2],
                max_rollcall: opts.max_rollcall.unwrap_or(sources.max_rollcalls),
                miss_limit: sources.miss_limit,
                force: opts.force,
                show_progress,
            };
            let summary =
                etl::senate::load_senate(&store, &client, &sources.senate_base_url, &load).await?;
            ("Senate roll calls", summary)
        }
        LoadSource::Bills(opts) => {
            let congress = opts.congress.unwrap_or(config.general.congress);
            println!("📥 Loading bills from Congress.gov...");
            let client = SourceClient::new(sources, opts.api_key)?;
            let load = etl::congress_gov::BillsLoad {
                bill_ids: opts.bills,
                congress,
                with_amendments: opts.amendments,
                show_progress,
            };
            let summary =
                etl::congress_gov::load_bills(&store, &client, &sources.congress_api_url, &load)
                    .await?;
            ("Bills", summary)
        }
        LoadSource::Members { chamber } => {
            println!("📥 Loading member rosters...");
            let chambers = match chamber {
                Some(c) => vec![c],
                None => vec![Chamber::House, Chamber::Senate],
            };
            let client = SourceClient::new(sources, None)?;
            let summary = etl::members::load_members(
                &store,
                &client,
                &sources.house_roster_url,
                &sources.senate_roster_url,
                &chambers,
            )
            .await?;
            ("Members", summary)
        }
    };

    println!("\n📊 Load Summary:");
    println!("   {}: {}", label, summary);
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
    if summary.failed > 0 {
        println!("   ⚠️  {} item(s) failed; rerun with --verbose for details", summary.failed);
    }
    println!("\n✅ Load complete.");
    Ok(0)
}

fn analysis_window(config: &Config, window: &WindowArgs) -> AnalysisWindow {
    AnalysisWindow::new(
        window.congress.unwrap_or(config.general.congress),
        window.chamber,
    )
    .with_dates(window.start, window.end)
}

/// Print a report to stdout or write it to `--output`.
fn emit_report(content: &str, out: &ReportArgs) -> Result<()> {
    match out.output {
        Some(ref path) => {
            report::write_report(content, path)?;
            eprintln!("📝 Report saved to: {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

async fn run_analyze(config: &Config, target: AnalyzeTarget) -> Result<i32> {
    let store = open_store(config).await?;

    match target {
        AnalyzeTarget::Outliers {
            window,
            method,
            member,
            fail_on,
            report: out,
        } => {
            let window = analysis_window(config, &window);
            eprintln!(
                "🔬 Finding outlier votes: {} {}th Congress",
                window.chamber, window.congress
            );
            let data = store.load_analysis_data(window).await?;
            let mut result = analysis::analyze_outliers(&data, &config.analysis.outlier_params());

            if let Some(method) = method {
                result.outliers =
                    analysis::aggregator::filter_by_method(&result.outliers, method.into());
            }
            if let Some(ref member_id) = member {
                result.outliers = analysis::aggregator::group_by_member(&result.outliers)
                    .remove(member_id)
                    .unwrap_or_default();
            }
            result.total_outliers = result.outliers.len();

            let content = match out.format {
                OutputFormat::Json => report::generate_json_report(&result)?,
                OutputFormat::Markdown => report::generate_outlier_markdown(&result),
            };
            emit_report(&content, &out)?;

            eprintln!(
                "📊 {} outlier vote(s) across {} roll call(s)",
                result.total_outliers,
                data.rollcalls.len()
            );

            if let Some(limit) = fail_on {
                if result.total_outliers > limit {
                    eprintln!(
                        "\n⛔ {} outliers exceed the --fail-on limit of {}. Failing (exit code 2).",
                        result.total_outliers, limit
                    );
                    return Ok(2);
                }
            }
            Ok(0)
        }
        AnalyzeTarget::Coalitions { window, report: out } => {
            let window = analysis_window(config, &window);
            eprintln!(
                "🔬 Detecting coalitions: {} {}th Congress",
                window.chamber, window.congress
            );
            let data = store.load_analysis_data(window).await?;
            let result = analysis::analyze_coalitions(&data, &config.analysis.coalition_params());

            let content = match out.format {
                OutputFormat::Json => report::generate_json_report(&result)?,
                OutputFormat::Markdown => report::generate_coalition_markdown(&result),
            };
            emit_report(&content, &out)?;

            eprintln!(
                "📊 {} coalition(s) among {} members (modularity {:.3})",
                result.coalitions.len(),
                result.total_members,
                result.network_stats.modularity
            );
            Ok(0)
        }
        AnalyzeTarget::Predict {
            bill,
            chamber,
            rank,
            top,
            report: out,
        } => {
            eprintln!("🤖 Scoring members on {}", bill);
            let mut prediction =
                analysis::predict_bill(&store, &bill.to_string(), chamber, rank).await?;
            if let Some(n) = top {
                prediction.members.truncate(n);
            }

            let content = match out.format {
                OutputFormat::Json => report::generate_json_report(&prediction)?,
                OutputFormat::Markdown => report::generate_prediction_markdown(&prediction),
            };
            emit_report(&content, &out)?;

            eprintln!(
                "📊 Expected Yea share: {:.1}%",
                prediction.expected_yea_share() * 100.0
            );
            Ok(0)
        }
    }
}

fn run_backups(config: &Config, action: BackupsAction) -> Result<i32> {
    let dir = &config.backup.dir;

    match action {
        BackupsAction::List => {
            let backups = ops::list_backups(dir)?;
            if backups.is_empty() {
                println!("No backups in {}", dir.display());
                return Ok(0);
            }
            println!("💾 {} backup(s) in {}:\n", backups.len(), dir.display());
            for backup in &backups {
                println!(
                    "   {}  {:>10} bytes  {} day(s) old",
                    backup.name(),
                    backup.size,
                    backup.age().num_days()
                );
            }
        }
        BackupsAction::Cleanup { days, dry_run } => {
            let old = ops::cleanup_backups(dir, days, dry_run)?;
            let verb = if dry_run { "Would remove" } else { "Removed" };
            for backup in &old {
                println!("   🗑️  {} {}", verb, backup.name());
            }
            println!(
                "\n✅ {} {} backup(s) older than {} day(s).",
                verb,
                old.len(),
                days
            );
        }
    }
    Ok(0)
}

fn run_exclusions(config: &Config, action: ExclusionsAction) -> Result<i32> {
    let list = ExclusionList::new(&config.general.exclusions_file);

    match action {
        ExclusionsAction::List => {
            let file = list.load()?;
            if file.excluded_candidates.is_empty() {
                println!("No exclusions in {}", list.path().display());
                return Ok(0);
            }
            println!(
                "⛔ {} excluded candidate(s):\n",
                file.excluded_candidates.len()
            );
            for e in &file.excluded_candidates {
                println!(
                    "   {}-{}  {}  ({}, {})",
                    e.state, e.district, e.fec_name, e.reason, e.excluded_date
                );
            }
        }
        ExclusionsAction::Add { candidate, reason } => {
            if list.add(&candidate.state, &candidate.district, &candidate.name, &reason)? {
                println!("✅ Excluded {}", candidate.name);
            } else {
                println!("{} is already excluded", candidate.name);
            }
        }
        ExclusionsAction::Remove { candidate } => {
            if list.remove(&candidate.state, &candidate.district, &candidate.name)? {
                println!("✅ Removed exclusion for {}", candidate.name);
            } else {
                println!("No exclusion found for {}", candidate.name);
            }
        }
        ExclusionsAction::Check { candidate } => {
            let excluded =
                list.is_excluded(&candidate.state, &candidate.district, &candidate.name)?;
            println!(
                "{} ({}-{}) is {}excluded",
                candidate.name,
                candidate.state,
                candidate.district,
                if excluded { "" } else { "not " }
            );
        }
    }
    Ok(0)
}
