//! cvdecode - batch transcription command-line interface
mod fmt;

use clap::{Parser, Subcommand};
use cvdecode_core::{
    probe_health, run_batch, BatchConfig, BatchProgress, BatchReport, CorpusValidator,
    DecodeError, HealthStatus, InferenceClient, RunOptions,
};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize as _;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt as _};
use tracing_subscriber::EnvFilter;

use crate::fmt::TagFormatter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;
    debug!("Command line arguments: {:?}", cli);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(2);
        }
    };

    match cli.command {
        Some(Commands::Validate) => handle_validate(&cli, &config),
        Some(Commands::Ping) => handle_ping(&config).await,
        None => handle_run(&cli, &config).await,
    }
}

const ABOUT: &str = "Batch-transcribe an audio corpus through a remote inference service";
#[derive(Parser, Debug)]
#[command(name = env!("CARGO_PKG_NAME"), author = env!("CARGO_PKG_AUTHORS"))]
#[command(about = ABOUT)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding the audio files
    #[arg(short = 'd', long, global = true, default_value = "cv-valid-dev")]
    audio_dir: PathBuf,

    /// Reference manifest (CSV); merged results are written back into it
    #[arg(short, long, global = true, default_value = "cv-valid-dev.csv")]
    manifest: PathBuf,

    /// Write the merged dataset here instead of over the manifest
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Inference endpoint URL
    #[arg(long, global = true)]
    inference_url: Option<String>,

    /// Liveness endpoint URL
    #[arg(long, global = true)]
    health_url: Option<String>,

    /// Maximum number of requests in flight
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Maximum number of open connections to the inference service
    #[arg(long)]
    connections: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(short, long, global = true)]
    timeout: Option<u64>,

    /// Also write logs to <LOG_DIR>/<date>/<time>.log
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that every file named in the manifest is present, without transcribing
    Validate,
    /// Check that the inference service answers its liveness endpoint
    Ping,
}

fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    let log_file = cli.log_dir.as_deref().map(open_log_file).transpose()?;
    let ansi = log_file.is_none();
    let writer = match log_file {
        Some(file) => BoxMakeWriter::new(std::io::stderr.and(Mutex::new(file))),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(ansi)
            .with_writer(writer)
            .init();
    } else {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info,hyper=warn,reqwest=warn"))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(ansi)
            .event_format(TagFormatter)
            .with_writer(writer)
            .init();
    }
    Ok(())
}

/// Open `<dir>/<YYYY-MM-DD>/<HH-MM-SS>.log`, creating the day directory if needed
fn open_log_file(dir: &Path) -> anyhow::Result<File> {
    let now = chrono::Local::now();
    let day_dir = dir.join(now.format("%Y-%m-%d").to_string());
    std::fs::create_dir_all(&day_dir)?;
    let path = day_dir.join(format!("{}.log", now.format("%H-%M-%S")));
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Defaults, then the config file, then explicit flags
fn build_config(cli: &Cli) -> anyhow::Result<BatchConfig> {
    let mut config = match &cli.config {
        Some(path) => BatchConfig::from_toml_file(path)?,
        None => BatchConfig::new(),
    };

    if let Some(url) = &cli.inference_url {
        config = config.with_inference_url(url.clone());
    }
    if let Some(url) = &cli.health_url {
        config = config.with_health_url(url.clone());
    }
    if let Some(limit) = cli.concurrency {
        config = config.with_concurrency_limit(limit);
    }
    if let Some(limit) = cli.connections {
        config = config.with_connection_limit(limit);
    }
    if let Some(secs) = cli.timeout {
        config = config.with_timeout_secs(secs);
    }

    config.validate()?;
    Ok(config)
}

fn report_failure(err: DecodeError) -> ! {
    match err {
        DecodeError::MissingFiles(missing) => {
            error!(
                "{} file(s) listed in the manifest are missing from the audio directory:",
                missing.len()
            );
            for name in &missing {
                error!("  {}", name);
            }
        }
        other => error!("{}", other),
    }
    process::exit(1);
}

/// Handle the `validate` subcommand
fn handle_validate(cli: &Cli, config: &BatchConfig) -> anyhow::Result<()> {
    let corpus = match CorpusValidator::new(&cli.audio_dir, &cli.manifest)
        .with_media_extension(config.media_extension.clone())
        .validate()
    {
        Ok(corpus) => corpus,
        Err(e) => report_failure(e),
    };

    println!(
        "{} {} audio files present, {} manifest rows, none missing.",
        "Success:".green().bold(),
        corpus.items.len().cyan(),
        corpus.manifest.rows.len().cyan()
    );
    Ok(())
}

/// Handle the `ping` subcommand
async fn handle_ping(config: &BatchConfig) -> anyhow::Result<()> {
    let client = InferenceClient::new(config)?;
    match probe_health(&client).await {
        HealthStatus::Healthy => {
            println!(
                "{} {} is up.",
                "Success:".green().bold(),
                client.health_url()
            );
            Ok(())
        }
        HealthStatus::Unhealthy { code } => {
            println!(
                "{} {} answered with status {}.",
                "Warning:".yellow().bold(),
                client.health_url(),
                code
            );
            process::exit(1);
        }
        HealthStatus::Unreachable { reason } => {
            println!(
                "{} {} is unreachable: {}",
                "Warning:".yellow().bold(),
                client.health_url(),
                reason
            );
            process::exit(1);
        }
    }
}

/// Run the full batch
async fn handle_run(cli: &Cli, config: &BatchConfig) -> anyhow::Result<()> {
    let mut options = RunOptions::new(&cli.audio_dir, &cli.manifest);
    if let Some(output) = &cli.output {
        options = options.with_output(output);
    }

    info!(
        "Transcribing with up to {} requests over {} connections",
        config.concurrency_limit, config.connection_limit
    );

    let (sender, progress_task) = if cli.no_progress || cli.json {
        (None, None)
    } else {
        let (sender, receiver) = mpsc::unbounded_channel();
        let bar = progress_bar()?;
        (Some(sender), Some(tokio::spawn(drive_progress(bar, receiver))))
    };

    let result = run_batch(config, &options, sender).await;
    if let Some(task) = progress_task {
        let _ = task.await;
    }

    let report = match result {
        Ok(report) => report,
        Err(e) => report_failure(e),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report, cli.verbose);
    }
    Ok(())
}

fn progress_bar() -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} files ({eta}) {msg}")?
            .progress_chars("#>-"),
    );
    Ok(bar)
}

async fn drive_progress(bar: ProgressBar, mut receiver: mpsc::UnboundedReceiver<BatchProgress>) {
    while let Some(event) = receiver.recv().await {
        if bar.length() != Some(event.total as u64) {
            bar.set_length(event.total as u64);
        }
        bar.set_position(event.completed as u64);
        if !event.succeeded {
            bar.set_message(format!("last failure: {}", event.filename));
        }
    }
    bar.finish_and_clear();
}

fn print_summary(report: &BatchReport, verbose: bool) {
    println!(
        "{} Transcribed {}/{} files in {:#}.",
        "Success:".green().bold(),
        report.succeeded.cyan(),
        report.total,
        HumanDuration(report.elapsed).cyan()
    );
    if report.failed > 0 {
        println!(
            "{} {} files failed; their rows carry error markers.",
            "Warning:".yellow().bold(),
            report.failed
        );
    }
    println!(
        "Results written to: {}",
        report.merge.destination.display().to_string().dimmed()
    );

    if verbose {
        println!();
        println!("{}", "Merge Summary:".green().bold());
        println!("Rows: {}", report.merge.rows);
        println!("Transcribed: {}", report.merge.transcribed);
        println!("Errored: {}", report.merge.errored);
        println!("Without outcome: {}", report.merge.unmatched);
        println!("Health check: {:?}", report.health);
    }
}
