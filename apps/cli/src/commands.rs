//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use seocompass_adapters::Capabilities;
use seocompass_core::{
    AnalysisService, Dispatcher, HistoryQuery, JobOutcome, Pipeline, ProgressReporter,
    RetryPolicy, SilentProgress,
};
use seocompass_shared::{
    AppConfig, Job, JobId, JobStatus, PipelineConfig, Stage, database_path, init_config,
    load_config,
};
use seocompass_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SEO Compass: competitor, keyword and content analysis for a website.
#[derive(Parser)]
#[command(
    name = "seocompass",
    version,
    about = "Analyze a website's competitors and keywords and draft page copy.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database file (overrides `[defaults] database_path`).
    #[arg(long, env = "SEOCOMPASS_DB", global = true)]
    pub db: Option<PathBuf>,

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
    /// Submit a URL for analysis.
    Submit {
        /// Website URL (http or https).
        url: String,

        /// Only queue the job; a `worker` runs it later.
        #[arg(long)]
        no_wait: bool,
    },

    /// Run queued jobs.
    Worker {
        /// Drain the current queue and exit.
        #[arg(long)]
        once: bool,

        /// Seconds between scans for newly queued jobs.
        #[arg(long, default_value = "5")]
        poll_secs: u64,
    },

    /// Show a job's status.
    Status {
        /// Job ID.
        job_id: String,
    },

    /// Print a job's report as JSON.
    Report {
        /// Job ID.
        job_id: String,

        /// Sections to include: all, competitors, keywords, drafts (comma-separated).
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Download the report archive of a completed job.
    Download {
        /// Job ID.
        job_id: String,

        /// Output file (defaults to seo_compass_report_<id>.zip).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List submitted jobs, newest first.
    History {
        /// Only jobs for this URL.
        #[arg(long)]
        url: Option<String>,

        /// Only jobs in this status (QUEUED, IN_PROGRESS, COMPLETED, FAILED).
        #[arg(long)]
        status: Option<String>,

        #[arg(long, default_value = "1")]
        page: i64,

        /// Jobs per page (max 100).
        #[arg(long, default_value = "10")]
        limit: i64,
    },

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
        0 => "seocompass=info",
        1 => "seocompass=debug",
        _ => "seocompass=trace",
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
    let db = cli.db;
    match cli.command {
        Command::Submit { url, no_wait } => cmd_submit(db, &url, no_wait).await,
        Command::Worker { once, poll_secs } => cmd_worker(db, once, poll_secs).await,
        Command::Status { job_id } => cmd_status(db, &job_id).await,
        Command::Report { job_id, section } => cmd_report(db, &job_id, section.as_deref()).await,
        Command::Download { job_id, out } => cmd_download(db, &job_id, out).await,
        Command::History {
            url,
            status,
            page,
            limit,
        } => cmd_history(db, url, status.as_deref(), page, limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

fn resolve_db(db: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf> {
    match db {
        Some(path) => Ok(path),
        None => Ok(database_path(config)?),
    }
}

async fn open_store(db: Option<PathBuf>, config: &AppConfig) -> Result<Arc<Storage>> {
    let path = resolve_db(db, config)?;
    Ok(Arc::new(Storage::open(&path).await?))
}

/// Read-only store for query commands; never creates the database.
async fn open_reader(db: Option<PathBuf>) -> Result<AnalysisService> {
    let config = load_config()?;
    let path = resolve_db(db, &config)?;
    if !path.exists() {
        return Err(eyre!(
            "no database at '{}'; submit a job first",
            path.display()
        ));
    }
    let store = Arc::new(Storage::open_readonly(&path).await?);
    Ok(AnalysisService::new(store, config.archive.compression))
}

fn build_pipeline(config: &AppConfig, store: Arc<Storage>) -> Result<(Arc<Pipeline>, PipelineConfig)> {
    let caps = Capabilities::from_config(config)?;
    let pipeline_config = PipelineConfig::from(config);
    let pipeline = Pipeline::new(store, caps, RetryPolicy::from(&pipeline_config));
    Ok((Arc::new(pipeline), pipeline_config))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_submit(db: Option<PathBuf>, url: &str, no_wait: bool) -> Result<()> {
    let config = load_config()?;
    let store = open_store(db, &config).await?;
    let service = AnalysisService::new(store.clone(), config.archive.compression);

    if no_wait {
        let accepted = service.submit(url).await?;
        println!("{} {}", accepted.job_id, accepted.status);
        return Ok(());
    }

    let (pipeline, _) = build_pipeline(&config, store)?;
    let dispatcher = Dispatcher::spawn(pipeline, 1, 1, Arc::new(CliProgress::new()));
    let service = service.with_dispatch(dispatcher.handle());

    info!(url, "submitting analysis");
    let accepted = service.submit(url).await?;
    dispatcher.shutdown().await;

    let job = service.job_status(&accepted.job_id.to_string()).await?;
    print_job(&job);

    match job.status {
        JobStatus::Completed => {
            println!();
            println!("  Download: seocompass download {}", job.id);
            Ok(())
        }
        JobStatus::Failed => Err(eyre!("job {} failed", job.id)),
        // the dispatcher drained before the job ran; a worker picks it up
        _ => Ok(()),
    }
}

async fn cmd_worker(db: Option<PathBuf>, once: bool, poll_secs: u64) -> Result<()> {
    let config = load_config()?;
    let store = open_store(db, &config).await?;
    let (pipeline, pipeline_config) = build_pipeline(&config, store.clone())?;

    let dispatcher = Dispatcher::spawn(
        pipeline,
        pipeline_config.workers,
        pipeline_config.queue_capacity,
        Arc::new(SilentProgress),
    );

    if once {
        let count = dispatcher.enqueue_pending(&store).await?;
        dispatcher.shutdown().await;
        println!("Processed {count} queued job(s).");
        return Ok(());
    }

    info!(poll_secs, "worker running, press Ctrl-C to stop");
    let poll = Duration::from_secs(poll_secs.max(1));
    loop {
        dispatcher.enqueue_pending(&store).await?;
        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("stopping worker, finishing queued jobs");
    dispatcher.shutdown().await;
    Ok(())
}

async fn cmd_status(db: Option<PathBuf>, job_id: &str) -> Result<()> {
    let service = open_reader(db).await?;
    let job = service.job_status(job_id).await?;
    print_job(&job);
    Ok(())
}

async fn cmd_report(db: Option<PathBuf>, job_id: &str, section: Option<&str>) -> Result<()> {
    let service = open_reader(db).await?;
    let report = service.report(job_id, section).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_download(db: Option<PathBuf>, job_id: &str, out: Option<PathBuf>) -> Result<()> {
    let service = open_reader(db).await?;
    let download = service.download(job_id).await?;

    let path = out.unwrap_or_else(|| PathBuf::from(&download.filename));
    write_archive(&path, &download.bytes)?;
    println!(
        "Saved {} ({} bytes)",
        path.display(),
        download.bytes.len()
    );
    Ok(())
}

fn write_archive(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes).map_err(|e| eyre!("cannot write '{}': {e}", path.display()))
}

async fn cmd_history(
    db: Option<PathBuf>,
    url: Option<String>,
    status: Option<&str>,
    page: i64,
    limit: i64,
) -> Result<()> {
    let service = open_reader(db).await?;
    let query = HistoryQuery {
        url,
        status: status.map(str::parse::<JobStatus>).transpose()?,
        page,
        limit,
    };
    let history = service.history(&query).await?;

    if history.items.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    println!("{:<36}  {:<11}  {:<20}  URL", "ID", "STATUS", "CREATED");
    for job in &history.items {
        println!(
            "{:<36}  {:<11}  {:<20}  {}",
            job.id,
            job.status.as_str(),
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            job.url
        );
    }
    println!();
    println!(
        "Page {} of {} ({} per page), {} job(s) total",
        history.page, history.pages, history.limit, history.total
    );
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_job(job: &Job) {
    println!();
    println!("  ID:        {}", job.id);
    println!("  URL:       {}", job.url);
    println!("  Status:    {}", job.status);
    println!("  Created:   {}", job.created_at.to_rfc3339());
    if let Some(completed_at) = job.completed_at {
        println!("  Completed: {}", completed_at.to_rfc3339());
    }
    if let Some(error) = &job.error {
        println!("  Error:     {error}");
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner showing the current stage of a waited-on job.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner.set_message("Queued");
        Self { spinner }
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Competitors => "Discovering competitors",
        Stage::Keywords => "Extracting keywords",
        Stage::Drafts => "Drafting page copy",
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, _job_id: &JobId, stage: Stage) {
        self.spinner.set_message(stage_label(stage));
    }

    fn retrying(&self, _job_id: &JobId, stage: Stage, attempt: u32, delay: Duration, error: &str) {
        self.spinner.set_message(format!(
            "{} (attempt {attempt} failed: {error}; retrying in {:.1}s)",
            stage_label(stage),
            delay.as_secs_f64()
        ));
    }

    fn stage_completed(&self, _job_id: &JobId, stage: Stage, items: usize) {
        self.spinner
            .println(format!("  ✓ {stage}: {items} item(s)"));
    }

    fn finished(&self, outcome: &JobOutcome) {
        self.spinner.finish_and_clear();
        println!(
            "  {} in {:.1}s",
            outcome.status,
            outcome.elapsed.as_secs_f64()
        );
    }
}
