//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use mathprereq_core::{
    Collaborators, FileConceptGraph, FtsIndex, OpenRouterClient, Provenance, QueryResult,
    QueryService, ResourceDiscovery, resources_for_concepts,
};
use mathprereq_scraper::DiscoveryEngine;
use mathprereq_shared::{
    AppConfig, ConceptRole, DiscoveryConfig, PipelineConfig, init_config, load_config,
    resolve_db_path, resolve_graph_path, validate_api_key,
};
use mathprereq_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// MathPrereq: find what to learn before a math concept, and where to learn it.
#[derive(Parser)]
#[command(
    name = "mathprereq",
    version,
    about = "Prerequisite paths, explanations, and learning resources for math questions.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Answer a free-text math question.
    Ask {
        /// The question, e.g. "How do I find the derivative of x^2?".
        question: String,

        /// Attribute the query to this user.
        #[arg(short, long)]
        user: Option<String>,

        /// Do not search for learning resources in the background.
        #[arg(long)]
        no_discovery: bool,
    },

    /// Explain a single concept, reusing a recent answer when one exists.
    Concept {
        /// Concept name, e.g. "derivatives".
        name: String,

        #[arg(short, long)]
        user: Option<String>,

        #[arg(long)]
        no_discovery: bool,
    },

    /// Search external sources for learning resources now.
    Discover {
        /// Concept names.
        #[arg(required = true)]
        concepts: Vec<String>,
    },

    /// List stored learning resources for concepts.
    Resources {
        /// Concept names.
        #[arg(required = true)]
        concepts: Vec<String>,

        /// Maximum resources to show.
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Query and resource statistics.
    Stats {
        /// Days of daily query volume to show.
        #[arg(long, default_value = "7")]
        days: u32,
    },

    /// Most recent queries.
    History {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Delete stored queries older than a number of days.
    Purge {
        #[arg(long)]
        older_than_days: u32,
    },

    /// Manage the course-material index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Index subcommands.
#[derive(Subcommand)]
pub(crate) enum IndexAction {
    /// Import a JSON array of `{concept, content, source}` chunks.
    Import {
        file: PathBuf,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Create a default config file.
    Init,
    /// Print the active configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "mathprereq=info",
        1 => "mathprereq=debug",
        _ => "mathprereq=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ask {
            question,
            user,
            no_discovery,
        } => cmd_ask(&question, user.as_deref(), no_discovery).await,
        Command::Concept {
            name,
            user,
            no_discovery,
        } => cmd_concept(&name, user.as_deref(), no_discovery).await,
        Command::Discover { concepts } => cmd_discover(&concepts).await,
        Command::Resources { concepts, limit } => cmd_resources(&concepts, limit).await,
        Command::Stats { days } => cmd_stats(days).await,
        Command::History { limit } => cmd_history(limit).await,
        Command::Purge { older_than_days } => cmd_purge(older_than_days).await,
        Command::Index { action } => match action {
            IndexAction::Import { file } => cmd_index_import(&file).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Service assembly
// ---------------------------------------------------------------------------

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let db_path = resolve_db_path(config)?;
    Ok(Arc::new(Storage::open(&db_path).await?))
}

/// Read-only handle for reporting commands. Fails if nothing has been stored yet.
async fn open_storage_readonly(config: &AppConfig) -> Result<Storage> {
    let db_path = resolve_db_path(config)?;
    if !db_path.exists() {
        return Err(eyre!(
            "no database at {}; run `mathprereq ask` first",
            db_path.display()
        ));
    }
    Ok(Storage::open_readonly(&db_path).await?)
}

fn load_graph(config: &AppConfig) -> Result<FileConceptGraph> {
    let path = resolve_graph_path(config)?;
    if path.exists() {
        Ok(FileConceptGraph::load(&path)?)
    } else {
        warn!(path = %path.display(), "concept graph not found, prerequisite paths will be empty");
        Ok(FileConceptGraph::empty())
    }
}

fn discovery_engine(config: &AppConfig, storage: Arc<Storage>) -> Result<DiscoveryEngine> {
    Ok(DiscoveryEngine::with_default_adapters(
        storage,
        DiscoveryConfig::from(config),
    )?)
}

async fn build_service(config: &AppConfig, with_discovery: bool) -> Result<QueryService> {
    let api_key = validate_api_key(config)?;
    let storage = open_storage(config).await?;

    let discovery: Option<Arc<dyn ResourceDiscovery>> = if with_discovery {
        Some(Arc::new(discovery_engine(config, storage.clone())?))
    } else {
        None
    };

    let services = Collaborators {
        graph: Arc::new(load_graph(config)?),
        index: Arc::new(FtsIndex::new(storage.clone())),
        llm: Arc::new(OpenRouterClient::from_config(&config.openrouter, api_key)?),
        discovery,
    };

    info!(model = %config.openrouter.default_model, with_discovery, "query service ready");
    Ok(QueryService::new(services, storage, PipelineConfig::from(config)))
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_ask(question: &str, user: Option<&str>, no_discovery: bool) -> Result<()> {
    let config = load_config()?;
    let service = build_service(&config, !no_discovery).await?;

    let spinner = spinner("Answering...")?;
    let outcome = service.process_query(question, user).await;
    spinner.finish_and_clear();

    finish_jobs(&service).await?;
    print_result(&outcome?);
    Ok(())
}

async fn cmd_concept(name: &str, user: Option<&str>, no_discovery: bool) -> Result<()> {
    let config = load_config()?;
    let service = build_service(&config, !no_discovery).await?;

    let spinner = spinner(&format!("Looking up {name}..."))?;
    let outcome = service.smart_concept_query(name, user).await;
    spinner.finish_and_clear();

    finish_jobs(&service).await?;
    print_result(&outcome?);
    Ok(())
}

async fn cmd_discover(concepts: &[String]) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let engine = discovery_engine(&config, storage)?;

    let spinner = spinner(&format!("Searching sources for {} concept(s)...", concepts.len()))?;
    let report = engine.discover(concepts).await;
    spinner.finish_and_clear();

    println!();
    println!("  Discovery finished");
    println!("  Searched:       {}", report.concepts_searched);
    println!("  Skipped:        {} (recently refreshed)", report.concepts_skipped);
    println!("  Found:          {}", report.resources_found);
    println!("  Saved:          {}", report.resources_saved);
    println!("  Failed sources: {}", report.failed_sources);
    println!("  Duration:       {:.1}s", report.duration.as_secs_f64());
    for (concept, error) in &report.errors {
        println!("  ! {concept}: {error}");
    }
    println!();
    Ok(())
}

async fn cmd_resources(concepts: &[String], limit: usize) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage_readonly(&config).await?;
    let resources = resources_for_concepts(&storage, concepts, limit).await?;

    if resources.is_empty() {
        println!("No stored resources. Try `mathprereq discover {}`.", concepts.join(" "));
        return Ok(());
    }

    println!();
    for r in &resources {
        println!("  [{:.2}] {} ({}, {})", r.quality_score, r.title, r.kind.as_str(), r.source_domain);
        println!("         {}", r.url);
        println!("         concept: {}  difficulty: {}", r.concept_name, r.difficulty.as_str());
    }
    println!();
    Ok(())
}

async fn cmd_stats(days: u32) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage_readonly(&config).await?;

    let queries = storage.query_stats().await?;
    let popular = storage.popular_concepts(10).await?;
    let since = chrono::Utc::now() - chrono::Duration::days(i64::from(days));
    let trends = storage.query_trends(since).await?;
    let resources = storage.resource_stats().await?;

    println!();
    println!("  Queries");
    println!("  Total:        {}", queries.total);
    println!("  Successful:   {}", queries.successful);
    println!("  Success rate: {:.1}%", queries.success_rate);
    println!("  Avg time:     {:.0}ms", queries.avg_processing_ms);

    if !popular.is_empty() {
        println!();
        println!("  Popular concepts");
        for c in &popular {
            println!("  {:>5}  {}", c.count, c.concept);
        }
    }

    if !trends.is_empty() {
        println!();
        println!("  Last {days} days");
        for d in &trends {
            println!("  {}  {:>4} total  {:>4} ok", d.day, d.total, d.successful);
        }
    }

    println!();
    println!("  Resources");
    println!("  Concepts covered: {}", resources.concepts);
    println!("  Total:            {}", resources.total);
    println!("  Avg quality:      {:.2}", resources.avg_quality);
    println!();
    Ok(())
}

async fn cmd_history(limit: u32) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage_readonly(&config).await?;
    let queries = storage.recent_queries(limit).await?;

    if queries.is_empty() {
        println!("No queries yet.");
        return Ok(());
    }

    for q in &queries {
        let status = if q.success { "ok " } else { "err" };
        println!(
            "{}  {status}  {:>6}ms  {}",
            q.timestamp.format("%Y-%m-%d %H:%M"),
            q.processing_time_ms,
            q.text.lines().next().unwrap_or_default(),
        );
        if let Some(error) = &q.error_message {
            println!("                          {error}");
        }
    }
    Ok(())
}

async fn cmd_purge(older_than_days: u32) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(older_than_days));
    let removed = storage.purge_queries_older_than(cutoff).await?;
    println!("Removed {removed} queries older than {older_than_days} days.");
    Ok(())
}

async fn cmd_index_import(file: &Path) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let stored = FtsIndex::new(storage).import_file(file).await?;
    println!("Imported {stored} chunks from {}.", file.display());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message.to_string());
    Ok(spinner)
}

/// Wait for the query save and any discovery jobs before the runtime exits.
async fn finish_jobs(service: &QueryService) -> Result<()> {
    if service.jobs().pending() == 0 {
        return Ok(());
    }
    let spinner = spinner("Saving and searching for resources...")?;
    service.shutdown().await;
    spinner.finish_and_clear();
    Ok(())
}

fn print_result(result: &QueryResult) {
    println!();
    match &result.provenance {
        Provenance::Fresh => println!(
            "  Answered in {:.1}s",
            result.processing_time.as_secs_f64()
        ),
        Provenance::Cached { query_id, age } => println!(
            "  Cached answer from {} ago (query {query_id})",
            format_age(*age)
        ),
    }

    if !result.identified_concepts.is_empty() {
        println!("  Concepts: {}", result.identified_concepts.join(", "));
    }

    if !result.prerequisite_path.is_empty() {
        println!();
        println!("  Learning path");
        for (i, concept) in result.prerequisite_path.iter().enumerate() {
            let marker = match concept.role {
                ConceptRole::Prerequisite => " ",
                ConceptRole::Target => "*",
            };
            println!("  {marker}{:>2}. {}", i + 1, concept.name);
        }
    }

    println!();
    for line in result.explanation.lines() {
        println!("  {line}");
    }
    println!();
}

fn format_age(age: chrono::Duration) -> String {
    let days = age.num_days();
    if days > 0 {
        return format!("{days}d");
    }
    let hours = age.num_hours();
    if hours > 0 {
        return format!("{hours}h");
    }
    format!("{}m", age.num_minutes().max(1))
}
