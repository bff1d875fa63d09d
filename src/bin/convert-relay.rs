//! CLI binary for convert-relay.
//!
//! A thin shim over the library crate: maps flags and environment variables
//! to `RelayConfig`, then either serves the HTTP API or runs one conversion
//! from the terminal.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use convert_relay::server::{self, AppState};
use convert_relay::{
    list_formats, ConversionProgressCallback, ConversionRequest, Converter, JobStatus,
    ProgressCallback, RelayConfig, SupportedFormat,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner that follows one conversion through its stages.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Submitting");
        bar.set_message("uploading file to the conversion service…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_submitted(&self, job_id: &str, target_format: &str) {
        self.bar.println(format!(
            "  {} Submitted job {} {}",
            green("✓"),
            bold(job_id),
            dim(&format!("→ {target_format}"))
        ));
        self.bar.set_prefix("Waiting");
    }

    fn on_status(&self, _job_id: &str, status: JobStatus) {
        self.bar.set_message(format!("remote status: {status}"));
    }

    fn on_result_ready(&self, _job_id: &str) {
        self.bar.set_prefix("Downloading");
        self.bar.set_message("fetching converted file…");
    }

    fn on_downloaded(&self, _job_id: &str, bytes: usize) {
        self.bar.println(format!(
            "  {} Downloaded {}",
            green("✓"),
            dim(&format!("{bytes} bytes"))
        ));
        self.bar.set_prefix("Storing");
        self.bar.set_message("uploading to storage…");
    }

    fn on_stored(&self, _job_id: &str, public_url: &str) {
        self.bar.finish_and_clear();
        eprintln!("  {} Stored at {}", green("✓"), public_url);
    }

    fn on_failed(&self, job_id: Option<&str>, error: String) {
        self.bar.finish_and_clear();
        match job_id {
            Some(id) => eprintln!("  {} Job {}: {}", red("✗"), id, error),
            None => eprintln!("  {} {}", red("✗"), error),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the HTTP API on port 8080
  convert-relay serve --bind 0.0.0.0:8080

  # Convert a local file and print the public URL
  convert-relay convert report.docx --to pdf

  # Structured output
  convert-relay convert slides.pdf --to png --json > result.json

  # List accepted target formats
  convert-relay formats

ENVIRONMENT VARIABLES:
  CONVERTIO_API_KEY       Conversion service API key (required)
  CONVERTIO_API_URL       Conversion service root (default https://api.convertio.co)
  SUPABASE_URL            Storage project URL (required)
  SUPABASE_SERVICE_KEY    Storage service key (required)
  SUPABASE_BUCKET         Bucket for converted files (default converted-files)
  CONVERT_RELAY_BIND      Listen address for `serve`
  RUST_LOG                Log filter, overrides --verbose / --quiet
"#;

/// Relay file conversions through a remote service into durable storage.
#[derive(Parser, Debug)]
#[command(
    name = "convert-relay",
    version,
    about = "Relay file conversions through a remote service into durable storage",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CONVERT_RELAY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "CONVERT_RELAY_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve POST /convert and the /jobs API.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "CONVERT_RELAY_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        #[command(flatten)]
        relay: RelayArgs,
    },

    /// Convert one local file and print its public URL.
    Convert {
        /// File to convert.
        file: PathBuf,

        /// Target format (see `formats`).
        #[arg(short, long)]
        to: String,

        /// Output structured JSON (ConversionOutput) instead of the URL.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        relay: RelayArgs,
    },

    /// List accepted target formats.
    Formats {
        /// Output JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

/// Service credentials and pipeline tuning shared by `serve` and `convert`.
#[derive(Args, Debug)]
struct RelayArgs {
    /// Conversion service API key.
    #[arg(long, env = "CONVERTIO_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Conversion service root URL.
    #[arg(long, env = "CONVERTIO_API_URL", default_value = convert_relay::config::DEFAULT_API_BASE_URL)]
    api_url: String,

    /// Storage project URL.
    #[arg(long, env = "SUPABASE_URL")]
    store_url: String,

    /// Storage service key.
    #[arg(long, env = "SUPABASE_SERVICE_KEY", hide_env_values = true)]
    store_key: String,

    /// Bucket for converted files.
    #[arg(long, env = "SUPABASE_BUCKET", default_value = convert_relay::config::DEFAULT_BUCKET)]
    bucket: String,

    /// Delay between status polls in milliseconds.
    #[arg(long, env = "CONVERT_RELAY_POLL_INTERVAL_MS", default_value_t = 2_000)]
    poll_interval_ms: u64,

    /// Give up on a remote job after this many seconds.
    #[arg(long, env = "CONVERT_RELAY_MAX_WAIT", default_value_t = 300)]
    max_wait: u64,

    /// Per-call timeout for the conversion service, in seconds.
    #[arg(long, env = "CONVERT_RELAY_REQUEST_TIMEOUT", default_value_t = 30)]
    request_timeout: u64,

    /// Timeout for downloading the converted file, in seconds.
    #[arg(long, env = "CONVERT_RELAY_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Timeout for the storage upload, in seconds.
    #[arg(long, env = "CONVERT_RELAY_UPLOAD_TIMEOUT", default_value_t = 120)]
    upload_timeout: u64,

    /// Retries for transient status / result-link failures.
    #[arg(long, env = "CONVERT_RELAY_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Largest accepted input file, in bytes.
    #[arg(long, env = "CONVERT_RELAY_MAX_FILE_BYTES", default_value_t = convert_relay::config::DEFAULT_MAX_FILE_BYTES)]
    max_file_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters for an interactive
    // `convert`; library INFO logs would tear through it.
    let show_progress = matches!(cli.command, Command::Convert { json: false, .. }) && !cli.quiet;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve { bind, relay } => run_serve(bind, &relay).await,
        Command::Convert {
            file,
            to,
            json,
            relay,
        } => run_convert(file, &to, json, &relay, show_progress && !cli.verbose).await,
        Command::Formats { json } => print_formats(json),
    }
}

async fn run_serve(bind: SocketAddr, relay: &RelayArgs) -> Result<()> {
    let config = build_config(relay, None)?;
    let converter = Converter::new(config).context("Failed to initialise HTTP clients")?;
    let state = AppState::new(converter);

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
        shutdown.cancel();
    });

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    server::serve(listener, state).await.context("Server error")
}

async fn run_convert(
    file: PathBuf,
    to: &str,
    json: bool,
    relay: &RelayArgs,
    show_progress: bool,
) -> Result<()> {
    let progress = if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        Some(cb)
    } else {
        None
    };
    let config = build_config(relay, progress)?;
    let converter = Converter::new(config).context("Failed to initialise HTTP clients")?;

    let request = ConversionRequest::from_path(&file, to)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning conversion");
            on_ctrl_c.cancel();
        }
    });

    let output = converter
        .convert_with_cancel(&request, &cancel)
        .await
        .with_context(|| format!("Conversion of {} to {} failed", file.display(), to))?;

    if json {
        let rendered = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{rendered}");
    } else {
        println!("{}", output.public_url());
        if show_progress {
            eprintln!(
                "   {} in  /  {} out  ({} polls, {}ms total)",
                dim(&format!("{} bytes", output.stats.input_bytes)),
                dim(&format!("{} bytes", output.stats.output_bytes)),
                output.stats.polls,
                output.stats.total_duration_ms,
            );
        }
    }
    Ok(())
}

fn print_formats(json: bool) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(list_formats()).context("Failed to serialise formats")?;
        println!("{rendered}");
        return Ok(());
    }
    for format in list_formats() {
        println!("{}", format_row(format));
    }
    Ok(())
}

/// One `formats` table row. Cells are padded before styling so escape
/// codes do not eat into the column width.
fn format_row(format: &SupportedFormat) -> String {
    format!(
        "{} {:<24} {}",
        bold(&format!("{:<6}", format.value)),
        format.label,
        dim(&format.mime_types.join(", "))
    )
}

/// Map CLI args to `RelayConfig`.
fn build_config(relay: &RelayArgs, progress: Option<ProgressCallback>) -> Result<RelayConfig> {
    let mut builder = RelayConfig::builder()
        .api_key(relay.api_key.as_str())
        .api_base_url(relay.api_url.as_str())
        .store_url(relay.store_url.as_str())
        .store_key(relay.store_key.as_str())
        .bucket(relay.bucket.as_str())
        .poll_interval_ms(relay.poll_interval_ms)
        .max_wait_secs(relay.max_wait)
        .request_timeout_secs(relay.request_timeout)
        .download_timeout_secs(relay.download_timeout)
        .upload_timeout_secs(relay.upload_timeout)
        .max_retries(relay.max_retries)
        .max_file_bytes(relay.max_file_bytes);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
