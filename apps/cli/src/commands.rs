//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use draftline_core::pipeline::{BatchContext, RunSummary};
use draftline_core::GenerationClient;
use draftline_media::ImageClient;
use draftline_monitor::ForumClient;
use draftline_publisher::CmsClient;
use draftline_rules::RuleRegistry;
use draftline_shared::{
    AppConfig, Document, Severity, init_config, load_config, load_config_from,
    validate_cms_credentials,
};
use draftline_storage::Storage;
use draftline_taxonomy::Taxonomy;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Draftline — validate, enrich, and publish long-form drafts unattended.
#[derive(Parser)]
#[command(
    name = "draftline",
    version,
    about = "Unattended editorial pipeline: validation, link resolution, idempotent publishing, forum monitoring.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file path (defaults to ~/.draftline/draftline.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

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
    /// Run the content batch for the current period (skips if already run).
    Batch,

    /// Run one forum monitor tick (skips if already run this interval).
    Monitor,

    /// Validate a draft file and print its report without publishing.
    Validate {
        /// Path to a markdown draft with frontmatter.
        file: PathBuf,
    },

    /// Show pipeline status: last runs, redirects, recent candidates.
    Status,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "draftline=info",
        1 => "draftline=debug",
        _ => "draftline=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Batch => cmd_batch(config).await,
        Command::Monitor => cmd_monitor(config).await,
        Command::Validate { file } => cmd_validate(&file).await,
        Command::Status => cmd_status(config).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config).await,
        },
    }
}

// ---------------------------------------------------------------------------
// batch
// ---------------------------------------------------------------------------

async fn cmd_batch(config: AppConfig) -> Result<()> {
    let app_password = validate_cms_credentials(&config)?;

    let spinner = spinner("Loading taxonomy and state");
    let taxonomy = Taxonomy::load_from(Path::new(&config.site.taxonomy_path))?;
    let storage = Arc::new(Storage::open(Path::new(&config.site.db_path)).await?);

    let ctx = Arc::new(BatchContext {
        cms: CmsClient::from_config(&config.cms, &app_password)?,
        generator: GenerationClient::from_config(&config.generation)?,
        images: ImageClient::from_config(&config.images)?,
        registry: RuleRegistry::standard(),
        taxonomy,
        storage,
        config,
    });

    spinner.set_message("Running batch");
    let outcome = draftline_core::run_batch(ctx, Utc::now()).await?;
    spinner.finish_and_clear();

    match outcome {
        Some(summary) => print_summary(&summary),
        None => println!("Batch already ran this period; nothing to do."),
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("  Batch {} complete", summary.period_key);
    println!("  Published:          {}", summary.published);
    println!("  Idempotent no-ops:  {}", summary.noop);
    println!("  Failed validation:  {}", summary.failed_validation);
    println!("  Failed transient:   {}", summary.failed_transient);
    println!("  Failed config:      {}", summary.failed_config);
    println!("  Failed publish:     {}", summary.failed_publish);
    println!();

    for item in &summary.items {
        println!("  {:20} {:?}", item.slug, item.status);
        for detail in &item.detail {
            println!("      - {detail}");
        }
        for warning in &item.warnings {
            println!("      ~ {}: {}", warning.rule, warning.message);
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// monitor
// ---------------------------------------------------------------------------

async fn cmd_monitor(config: AppConfig) -> Result<()> {
    if config.monitor.forums.is_empty() {
        return Err(eyre!("no forums configured under [monitor]"));
    }

    let taxonomy = Taxonomy::load_from(Path::new(&config.site.taxonomy_path))?;
    let storage = Arc::new(Storage::open(Path::new(&config.site.db_path)).await?);

    // Interval bucket as the period key: a manual re-trigger inside the
    // same tick window is skipped.
    let now = Utc::now();
    let bucket = now.timestamp() / (config.monitor.tick_minutes as i64 * 60);
    let period_key = format!("tick-{bucket}");

    let Some(run_id) = storage.try_begin_run("monitor", &period_key).await? else {
        println!("Monitor already ran this interval; nothing to do.");
        return Ok(());
    };

    let client = ForumClient::new(30)?;
    let keywords = taxonomy.keyword_set();
    let outcome =
        draftline_monitor::run_tick(&client, &config.monitor, &keywords, &storage, now).await?;

    storage
        .finish_run(&run_id, &serde_json::to_string(&outcome)?)
        .await?;

    println!();
    println!("  Monitor tick complete");
    println!("  Threads scanned: {}", outcome.threads_scanned);
    println!("  Deduplicated:    {}", outcome.deduplicated);
    println!("  Forum errors:    {}", outcome.forum_errors);
    println!("  Candidates:      {}", outcome.candidates.len());
    for candidate in &outcome.candidates {
        println!(
            "    [{:3}] {} ({}) {}",
            candidate.score, candidate.title, candidate.forum, candidate.url
        );
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

async fn cmd_validate(file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read {}: {e}", file.display()))?;
    let doc = Document::parse(&raw)?;

    let registry = RuleRegistry::standard();
    let report = registry.validate(&doc);

    info!(
        slug = %doc.frontmatter.slug,
        violations = report.violations.len(),
        "draft validated"
    );

    if report.violations.is_empty() {
        println!("OK: no violations ({} rules)", registry.len());
        return Ok(());
    }

    for violation in &report.violations {
        let marker = match violation.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN ",
        };
        println!("{marker} {:32} {}", violation.rule, violation.message);
    }

    if report.has_blocking() {
        return Err(eyre!("draft has blocking violations"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

async fn cmd_status(config: AppConfig) -> Result<()> {
    let storage = Storage::open(Path::new(&config.site.db_path)).await?;

    println!();
    for kind in ["batch", "monitor"] {
        match storage.last_run_summary(kind).await? {
            Some(summary) => println!("  last {kind} run: {summary}"),
            None => println!("  last {kind} run: never"),
        }
    }

    let redirects = storage.list_redirects().await?;
    let active = redirects.iter().filter(|r| r.active).count();
    println!("  redirects: {active} active / {} total", redirects.len());

    let candidates = storage.list_candidates(5).await?;
    if !candidates.is_empty() {
        println!("  recent candidates:");
        for c in candidates {
            println!("    [{:3}] {} ({})", c.score, c.title, c.forum);
        }
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Spinner for long-running phases.
fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    bar.enable_steady_tick(std::time::Duration::from_millis(80));
    bar.set_message(message.to_string());
    bar
}
