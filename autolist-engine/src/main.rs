//! autolist - rule-based playlist engine
//!
//! Command-line surface over the engine operations. Every command prints
//! pretty JSON on stdout; logs go to stderr.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use autolist_common::config::{default_config_path, load_toml_config, write_toml_config, TomlConfig};
use autolist_engine::config::{resolve_fixtures_dir, EngineConfig};
use autolist_engine::models::{EnrichmentEntry, RuleGroup, RuleSet, TrackSource};
use autolist_engine::rules::EnrichmentView;
use autolist_engine::services::FixtureFetcher;
use autolist_engine::Engine;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for autolist
#[derive(Parser, Debug)]
#[command(name = "autolist")]
#[command(about = "Rule-based playlist engine")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// TOML config file (defaults to $AUTOLIST_CONFIG or the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory of track fixture files
    #[arg(long, global = true)]
    fixtures: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a config file with the resolved root folder
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Manage rule sets
    #[command(subcommand)]
    Rules(RulesCommand),
    /// Inspect jobs
    #[command(subcommand)]
    Jobs(JobsCommand),
    /// Fetch tracks from sources into new jobs and wait for them
    Fetch {
        /// Fetch the liked-tracks collection
        #[arg(long)]
        liked: bool,
        /// Playlist to fetch, as `id` or `id:label` (repeatable)
        #[arg(long = "playlist", value_name = "ID[:LABEL]")]
        playlists: Vec<String>,
    },
    /// Deduplicated tracks and per-source status
    Aggregate,
    /// Manage enrichment entries
    #[command(subcommand)]
    Enrich(EnrichCommand),
    /// Apply stored rule sets to aggregated tracks
    Preview,
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    List,
    Show { id: String },
    /// Create or replace a rule set from a JSON file (`-` for stdin)
    Upsert { file: PathBuf },
    /// Validate a rule group (or a rule set's root group) from a JSON file
    Validate { file: PathBuf },
    /// Evaluate a rule group against an enrichment view
    Evaluate {
        /// Rule group JSON file
        #[arg(long)]
        rule: PathBuf,
        /// Enrichment view JSON file (field → value object)
        #[arg(long)]
        view: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum JobsCommand {
    List,
    Show { id: String },
    /// Fail jobs left RUNNING by a dead process and resume pending fetch jobs
    ///
    /// Only run this while no other autolist process is fetching.
    Recover,
}

#[derive(Subcommand, Debug)]
enum EnrichCommand {
    /// Append an entry to a track's enrichment list
    Append {
        track_id: String,
        /// Provider name
        #[arg(long, default_value = "manual")]
        source: String,
        #[arg(long)]
        version: Option<String>,
        /// Categories as a JSON object, e.g. '{"mood":"happy"}'
        categories: String,
    },
    /// Show a track's entries and merged view
    Show { track_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let (toml_config, config_error) = match config_path.as_deref() {
        Some(path) if path.exists() => match load_toml_config(path) {
            Ok(config) => (config, None),
            Err(e) => (TomlConfig::default(), Some(e)),
        },
        _ => (TomlConfig::default(), None),
    };

    // Initialize tracing (RUST_LOG wins over the configured level)
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting autolist"
    );
    if let Some(e) = config_error {
        warn!(error = %e, "Ignoring unreadable config file, using defaults");
    }

    let config = EngineConfig::resolve(args.root_folder.clone(), &toml_config)
        .context("Failed to initialize root folder")?;

    if let Command::Init { force } = &args.command {
        let target = config_path.ok_or_else(|| anyhow!("Could not determine config file location"))?;
        return init_config(&target, &config, &toml_config, *force);
    }

    let fixtures_dir = match &args.command {
        Command::Fetch { .. } => resolve_fixtures_dir(args.fixtures.clone(), &toml_config)?,
        _ => resolve_fixtures_dir(args.fixtures.clone(), &toml_config)
            .unwrap_or_else(|_| config.root_folder.join("fixtures")),
    };
    let fetcher = Arc::new(FixtureFetcher::new(fixtures_dir));

    let engine = Engine::open_sqlite(&config, fetcher)
        .await
        .context("Failed to open engine")?;

    let result = run(&engine, args.command).await;
    engine.shutdown().await;
    result
}

async fn run(engine: &Engine, command: Command) -> Result<()> {
    match command {
        Command::Init { .. } => Ok(()),

        Command::Rules(RulesCommand::List) => print_json(&engine.list_rule_sets().await?),
        Command::Rules(RulesCommand::Show { id }) => print_json(&engine.get_rule_set(&id).await?),
        Command::Rules(RulesCommand::Upsert { file }) => {
            let rule_set = RuleSet::from_json(read_json_input(&file)?)?;
            print_json(&engine.upsert_rule_set(rule_set).await?)
        }
        Command::Rules(RulesCommand::Validate { file }) => {
            let mut value = read_json_input(&file)?;
            // Accept a whole rule set and validate its root group
            if let Some(rules) = value.get_mut("rules") {
                value = rules.take();
            }
            let group = RuleGroup::from_json(value)?;
            print_json(&engine.validate_rule_group(&group))
        }
        Command::Rules(RulesCommand::Evaluate { rule, view }) => {
            let group = RuleGroup::from_json(read_json_input(&rule)?)?;
            let view = match read_json_input(&view)? {
                Value::Object(map) => EnrichmentView::from(map),
                _ => bail!("Enrichment view must be a JSON object"),
            };
            print_json(&json!({ "matched": engine.evaluate_rule(&group, &view) }))
        }

        Command::Jobs(JobsCommand::List) => print_json(&engine.list_jobs().await?),
        Command::Jobs(JobsCommand::Show { id }) => print_json(&engine.get_job(&id).await?),
        Command::Jobs(JobsCommand::Recover) => {
            let failed_stale = engine.recover_stale().await?;
            let resumed = engine.resume_pending().await?;
            wait_or_interrupt(engine).await;
            let resumed_ids: Vec<&str> = resumed.iter().map(|job| job.id.as_str()).collect();
            print_json(&json!({
                "failed_stale": failed_stale,
                "resumed": resumed_ids,
            }))
        }

        Command::Fetch { liked, playlists } => {
            let mut sources = Vec::new();
            if liked {
                sources.push(TrackSource::liked());
            }
            for arg in &playlists {
                sources.push(parse_playlist(arg));
            }
            if sources.is_empty() {
                bail!("Nothing to fetch: pass --liked and/or --playlist <id>");
            }

            let submitted = engine.submit_source_fetch(sources).await?;
            info!(count = submitted.len(), "Waiting for fetch jobs");
            wait_or_interrupt(engine).await;

            let mut finished = Vec::with_capacity(submitted.len());
            for job in &submitted {
                finished.push(engine.get_job(&job.id).await?);
            }
            print_json(&finished)
        }

        Command::Aggregate => print_json(&engine.aggregate_tracks().await?),

        Command::Enrich(EnrichCommand::Append {
            track_id,
            source,
            version,
            categories,
        }) => {
            let categories: Value =
                serde_json::from_str(&categories).context("Categories must be valid JSON")?;
            let mut entry = EnrichmentEntry::new(source, categories);
            if let Some(version) = version {
                entry = entry.with_version(version);
            }
            print_json(&engine.append_enrichment(&track_id, entry).await?)
        }
        Command::Enrich(EnrichCommand::Show { track_id }) => {
            let entries = engine.enrichment_entries(&track_id).await?;
            let views = engine.enrichment_views(std::slice::from_ref(&track_id)).await?;
            print_json(&json!({
                "track_id": track_id,
                "entries": entries,
                "enrichment_view": views.first().map(|v| &v.enrichment_view),
            }))
        }

        Command::Preview => print_json(&engine.preview_aggregated().await?),
    }
}

fn init_config(target: &Path, config: &EngineConfig, current: &TomlConfig, force: bool) -> Result<()> {
    if target.exists() && !force {
        bail!("Config file {} already exists (use --force to overwrite)", target.display());
    }
    let toml_config = TomlConfig {
        root_folder: Some(config.root_folder.clone()),
        ..current.clone()
    };
    write_toml_config(&toml_config, target)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    info!(path = %target.display(), "Wrote config file");
    print_json(&json!({
        "config_file": target,
        "root_folder": config.root_folder,
        "database": config.database_path,
    }))
}

/// Wait for outstanding fetches; Ctrl+C cancels them instead
///
/// Either way every fetch job is terminal when this returns.
async fn wait_or_interrupt(engine: &Engine) {
    tokio::select! {
        _ = engine.wait_for_fetches() => return,
        _ = ctrl_c() => {
            info!("Received Ctrl+C, cancelling outstanding fetches");
        }
    }
    engine.cancel_fetches().await;
}

async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

fn parse_playlist(arg: &str) -> TrackSource {
    match arg.split_once(':') {
        Some((id, label)) if !label.trim().is_empty() => {
            TrackSource::playlist(id.trim(), Some(label.trim().to_string()))
        }
        Some((id, _)) => TrackSource::playlist(id.trim(), None),
        None => TrackSource::playlist(arg.trim(), None),
    }
}

fn read_json_input(path: &Path) -> Result<Value> {
    let raw = if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        buffer
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
    };
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
