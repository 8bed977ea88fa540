//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use lectern_chunker::MIN_CHUNK_CHARS;
use lectern_core::pipeline::{CompileConfig, CompileResult, ProgressReporter, compile};
use lectern_shared::{
    AppConfig, OutputFormat, config_file_path, db_file_path, init_config, load_config,
    sanitize_module_name, validate_api_key,
};
use lectern_storage::Storage;
use lectern_transform::OpenAiTransformer;
use tracing::{info, warn};
use url::Url;

/// Bundled default instruction set sent with every chunk.
const DEFAULT_RULES: &str = include_str!("../rules/default_rules.md");

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Lectern — compile lecture transcripts into one structured document.
#[derive(Parser)]
#[command(
    name = "lectern",
    version,
    about = "Compile a directory of lecture transcripts into one structured document.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log output as text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log line format for the tracing subscriber.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Compile a directory of transcript fragments into one document.
    Compile(CompileArgs),

    /// Check the environment: config, API key, endpoint, checkpoint store.
    Doctor,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments for `lectern compile`.
#[derive(Args)]
pub(crate) struct CompileArgs {
    /// Directory holding the input fragments.
    pub dir: PathBuf,

    /// Module name (defaults to the directory name, sanitized).
    #[arg(short, long)]
    pub module: Option<String>,

    /// Output directory (defaults to the configured output_dir).
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Output format: md, docx, or tex (defaults to the configured format).
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// Model identifier (defaults to the configured model).
    #[arg(long)]
    pub model: Option<String>,

    /// File replacing the bundled instruction set.
    #[arg(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Chunk budget in characters (defaults to the configured budget).
    #[arg(long)]
    pub chunk_chars: Option<usize>,

    /// Maximum concurrent transformation requests.
    #[arg(long)]
    pub concurrency: Option<u32>,

    /// Ignore checkpointed chunk outputs and retransform everything.
    #[arg(long)]
    pub no_resume: bool,
}

/// Actions under `lectern config`.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default config file.
    Init,
    /// Print the resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Install the tracing subscriber from the global CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
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
    match cli.command {
        Command::Compile(args) => cmd_compile(args).await,
        Command::Doctor => cmd_doctor().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// compile
// ---------------------------------------------------------------------------

async fn cmd_compile(args: CompileArgs) -> Result<()> {
    // Validate API key before doing anything
    let config = load_config()?;
    validate_api_key(&config)?;

    if !args.dir.is_dir() {
        return Err(eyre!(
            "input directory '{}' does not exist",
            args.dir.display()
        ));
    }

    let module = args
        .module
        .unwrap_or_else(|| default_module_name(&args.dir));
    let module = sanitize_module_name(&module);

    let mut chunk_chars = args.chunk_chars.unwrap_or(config.defaults.chunk_chars);
    if chunk_chars < MIN_CHUNK_CHARS {
        warn!(
            requested = chunk_chars,
            floor = MIN_CHUNK_CHARS,
            "chunk budget below the minimum, clamping"
        );
        chunk_chars = MIN_CHUNK_CHARS;
    }

    let instructions = match &args.rules {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| eyre!("cannot read rules file '{}': {e}", path.display()))?,
        None => DEFAULT_RULES.to_string(),
    };

    let transformer = OpenAiTransformer::from_config(&config.openai, args.model.as_deref())?;
    let model = transformer.model().to_string();

    let compile_config = CompileConfig {
        input_dir: args.dir.clone(),
        module: module.clone(),
        output_dir: args
            .out
            .unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir)),
        format: args.format.unwrap_or(config.defaults.format),
        model,
        instructions,
        chunk_chars,
        concurrency: args.concurrency.unwrap_or(config.defaults.concurrency),
        resume: !args.no_resume,
        db_path: db_file_path()?,
        retry: config.retry.clone(),
    };

    info!(
        module = %module,
        input = %args.dir.display(),
        format = %compile_config.format,
        "compiling module"
    );

    let reporter = CliProgress::new();
    let result = compile(&compile_config, Arc::new(transformer), &reporter).await?;

    // Print summary
    println!();
    println!("  Module compiled successfully!");
    println!("  Module:      {module}");
    println!("  Fragments:   {}", result.fragments);
    println!("  Chunks:      {}", result.chunks);
    println!("  Cache hits:  {}", result.cache_hits);
    println!("  Retries:     {}", result.retries);
    println!("  Headings:    {}", result.headings);
    println!("  TOC entries: {}", result.toc_entries);
    println!("  Output:      {}", result.output_path.display());
    println!("  Time:        {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

/// Module name derived from the input directory's final component.
fn default_module_name(dir: &Path) -> String {
    let resolved = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    finished: AtomicUsize,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            finished: AtomicUsize::new(0),
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn chunk_started(&self, chunk_id: usize, total: usize) {
        self.spinner
            .set_message(format!("Transforming chunk {} of {total}", chunk_id + 1));
    }

    fn chunk_finished(&self, _chunk_id: usize, total: usize, from_cache: bool) {
        let done = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        if from_cache {
            self.spinner
                .set_message(format!("Finished {done}/{total} chunks (checkpoint)"));
        } else {
            self.spinner
                .set_message(format!("Finished {done}/{total} chunks"));
        }
    }

    fn done(&self, _result: &CompileResult) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// doctor
// ---------------------------------------------------------------------------

async fn cmd_doctor() -> Result<()> {
    let mut failures = 0usize;

    // Config file: absent is fine, unparsable is not
    let config = match load_config() {
        Ok(config) => {
            let path = config_file_path()?;
            if path.exists() {
                println!("  Config file:    ok ({})", path.display());
            } else {
                println!("  Config file:    ok (absent, using defaults)");
            }
            Some(config)
        }
        Err(e) => {
            println!("  Config file:    FAILED ({e})");
            failures += 1;
            None
        }
    };

    if let Some(config) = &config {
        // API key: report the variable name only, never the value
        match validate_api_key(config) {
            Ok(()) => println!("  API key:        ok ({} is set)", config.openai.api_key_env),
            Err(_) => {
                println!(
                    "  API key:        FAILED ({} is not set)",
                    config.openai.api_key_env
                );
                failures += 1;
            }
        }

        match Url::parse(&config.openai.base_url) {
            Ok(_) => println!("  Base URL:       ok ({})", config.openai.base_url),
            Err(e) => {
                println!("  Base URL:       FAILED ({}: {e})", config.openai.base_url);
                failures += 1;
            }
        }
    }

    // Checkpoint database: absent means no run has happened yet
    let db_path = db_file_path()?;
    if db_path.exists() {
        match probe_database(&db_path).await {
            Ok(line) => println!("  Checkpoint db:  ok ({line})"),
            Err(e) => {
                println!("  Checkpoint db:  FAILED ({e})");
                failures += 1;
            }
        }
    } else {
        println!("  Checkpoint db:  ok (not yet created)");
    }

    if failures > 0 {
        Err(eyre!("{failures} doctor check(s) failed"))
    } else {
        println!();
        println!("  All checks passed.");
        Ok(())
    }
}

/// Open the checkpoint database read-only and summarize its contents.
async fn probe_database(path: &Path) -> Result<String> {
    let storage = Storage::open_readonly(path).await?;
    let cached = storage.count_cached_chunks().await?;
    let line = match storage.last_run().await? {
        Some(run) => {
            let state = if run.finished_at.is_some() {
                "finished"
            } else {
                "interrupted"
            };
            format!(
                "{cached} cached chunks; last run: {} ({}, {} chunks, {state})",
                run.module, run.format, run.chunk_count
            )
        }
        None => format!("{cached} cached chunks; no runs recorded"),
    };
    Ok(line)
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
