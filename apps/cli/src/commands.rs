//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use doctrail_core::{Engine, ProgressReporter, ResultContext, StageId};
use doctrail_shared::{
    AppConfig, EngineLayout, ProcessParams, Remote, expand_home, init_config, load_config,
};
use doctrail_snapshot::store;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// doctrail — follow documentation changes across repository revisions.
#[derive(Parser)]
#[command(
    name = "doctrail",
    version,
    about = "Mirror a repository, snapshot its docs, and turn changes into posts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
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
    /// Run the pipeline once for a remote.
    Run {
        /// Remote as `<user>/<repository>`.
        remote: String,

        /// Document type (file extension) to capture.
        #[arg(long)]
        doc_type: Option<String>,

        /// Base directory for mirrors, snapshots, and posts.
        #[arg(long)]
        base_dir: Option<String>,

        /// Print the full result context as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run the pipeline for every remote listed in the config.
    Track {
        /// Base directory for mirrors, snapshots, and posts.
        #[arg(long)]
        base_dir: Option<String>,
    },

    /// List persisted snapshots, oldest first.
    Snapshots {
        /// Base directory for mirrors, snapshots, and posts.
        #[arg(long)]
        base_dir: Option<String>,
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
        0 => "doctrail=info",
        1 => "doctrail=debug",
        _ => "doctrail=trace",
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
        Command::Run {
            remote,
            doc_type,
            base_dir,
            json,
        } => cmd_run(&remote, doc_type, base_dir, json).await,
        Command::Track { base_dir } => cmd_track(base_dir).await,
        Command::Snapshots { base_dir } => cmd_snapshots(base_dir).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Load the config file and apply a `--base-dir` override.
fn resolve_config(base_dir: Option<String>) -> Result<AppConfig> {
    let mut config = load_config()?;
    if let Some(dir) = base_dir {
        config.defaults.base_dir = dir;
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_run(
    remote: &str,
    doc_type: Option<String>,
    base_dir: Option<String>,
    json: bool,
) -> Result<()> {
    let config = resolve_config(base_dir)?;
    let remote: Remote = remote.parse()?;
    let doc_type = doc_type.unwrap_or_else(|| config.defaults.doc_type.clone());
    let params = ProcessParams::new(remote, doc_type)?;

    let engine = Engine::from_config(&config)?;
    info!(
        remote = %params.remote,
        base_dir = %engine.layout().base_dir().display(),
        "running pipeline"
    );

    let reporter = CliProgress::new();
    let ctx = engine.process(&params, &reporter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ctx)?);
    } else {
        print_summary(&ctx);
    }

    Ok(())
}

async fn cmd_track(base_dir: Option<String>) -> Result<()> {
    let config = resolve_config(base_dir)?;
    let tracked = config.tracked()?;
    if tracked.is_empty() {
        println!("No remotes configured. Add [[remotes]] entries to the config file.");
        return Ok(());
    }

    let engine = Engine::from_config(&config)?;
    let mut failed = 0usize;

    for params in &tracked {
        let reporter = CliProgress::new();
        match engine.process(params, &reporter).await {
            Ok(ctx) => print_summary(&ctx),
            Err(e) => {
                failed += 1;
                error!(remote = %params.remote, error = %e, "pipeline failed");
                println!("  {}: failed: {e}", params.remote);
            }
        }
    }

    if failed > 0 {
        return Err(eyre!("{failed} of {} remotes failed", tracked.len()));
    }
    Ok(())
}

async fn cmd_snapshots(base_dir: Option<String>) -> Result<()> {
    let config = resolve_config(base_dir)?;
    let layout = EngineLayout::new(config.base_dir()?, config.git.provider.clone());
    let entries = store::list_snapshots(&layout.snapshot_root())?;

    if entries.is_empty() {
        println!("No snapshots under {}", layout.snapshot_root().display());
        return Ok(());
    }

    for entry in entries {
        let snapshot = match store::load_snapshot(&entry.path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                println!("  {}  unreadable: {e}", format_millis(entry.captured_at));
                continue;
            }
        };
        println!(
            "  {}  {:<30} {:>5} docs  {}",
            format_millis(entry.captured_at),
            snapshot.name,
            snapshot.documents.len(),
            entry.path.display()
        );
    }

    Ok(())
}

fn print_summary(ctx: &ResultContext) {
    println!();
    println!("  {} ({})", ctx.remote, ctx.doc_type);
    println!("  Run:       {}", ctx.run_id);

    if let Some(clone) = ctx.clone_result() {
        println!("  Cloned:    {}", clone.url);
    }
    if let Some(pull) = ctx.pull_result() {
        let state = if pull.updated { "updated" } else { "up to date" };
        println!("  Pulled:    {state}");
    }

    if let Some(diff) = ctx.diff() {
        match &diff.before {
            Some(before) => println!("  Compared:  {}", format_millis(before.captured_at)),
            None => println!("  Compared:  first snapshot"),
        }
        println!("  Snapshot:  {}", format_millis(diff.after.captured_at));
        println!("  Added:     {}", diff.added.len());
        println!("  Modified:  {}", diff.modified.len());
        println!("  Removed:   {}", diff.removed.len());
        println!("  Unchanged: {}", diff.unchanged.len());
    }

    if let Some(posts) = ctx.write_result() {
        println!(
            "  Posts:     {} written, {} unchanged, {} removed",
            posts.written.len(),
            posts.unchanged.len(),
            posts.removed.len()
        );
        println!("  Output:    {}", posts.posts_dir.display());
    }
    println!();
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| millis.to_string())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, stage: StageId, index: usize, total: usize) {
        self.spinner.set_message(format!("[{index}/{total}] {stage}"));
    }

    fn stage_finished(&self, _stage: StageId, _elapsed: Duration) {}

    fn done(&self, _ctx: &ResultContext) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    println!("# base_dir resolves to {}", expand_home(&config.defaults.base_dir)?.display());
    Ok(())
}
