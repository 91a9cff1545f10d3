//! CLI binary for submission-harvest.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `HarvestConfig` and prints the results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use submission_harvest::{
    run, BatchTally, FailureLog, HarvestConfig, HarvestProgressCallback, ProgressCallback,
    RunMode, UnknownPayloadPolicy,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Progress bar over roster rows, with one line per slot printed above it.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} rows  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Harvesting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl HarvestProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_rows: usize) {
        self.bar.set_length(total_rows as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_rows} roster rows…"))
        ));
    }

    fn on_entrant_start(&self, entrant: &str, name: &str) {
        self.bar.println(format!("{} {}", bold(&format!("Team {entrant}")), dim(name)));
        self.bar.set_message(format!("team {entrant}"));
    }

    fn on_slot_start(&self, entrant: &str, slot: &str) {
        self.bar.set_message(format!("team {entrant} · {slot}"));
    }

    fn on_slot_complete(&self, _entrant: &str, slot: &str, asset: &Path) {
        self.bar.println(format!(
            "  {} {:<8} {}",
            green("✓"),
            slot,
            dim(&asset.display().to_string())
        ));
    }

    fn on_slot_failed(&self, _entrant: &str, slot: &str, reason: &str) {
        // Keep long reasons on one line.
        let msg = if reason.chars().count() > 80 {
            let cut: String = reason.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            reason.to_string()
        };
        self.bar
            .println(format!("  {} {:<8} {}", red("✗"), slot, red(&msg)));
    }

    fn on_slot_skipped(&self, _entrant: &str, slot: &str, reason: &str) {
        self.bar
            .println(format!("  {} {:<8} {}", yellow("⚠"), slot, dim(reason)));
    }

    fn on_row_done(&self) {
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _tally: &BatchTally) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Harvest data.csv into public/image (wipes public/image first)
  harvest

  # Different roster and output root
  harvest teams.csv -o site/images

  # Keep files exactly as uploaded
  harvest --uncompressed

  # Be gentler with a rate-limited drive
  harvest --attempts 5 --retry-pause 5 --row-pause 2

  # Machine-readable report
  harvest --json > report.json

ROSTER COLUMNS:
  Team Number                 "Team 7" or "7"; rows without one are skipped
  Team Name                   shown in progress output
  Submission Image            single-photo schema → <root>/<team>/Photo.avif
  Submission Image 1..4       used when "Submission Image" is absent
                              → <root>/<team>/Photo1.avif … Photo4.avif

ENVIRONMENT VARIABLES:
  HARVEST_*            Every flag can also be set via its HARVEST_ variable
  PDFIUM_LIB_PATH      Path to an existing libpdfium (skips lookup and download)
  PDFIUM_CACHE_DIR     Override the pdfium cache directory
  RUST_LOG             Override the log filter (e.g. submission_harvest=debug)

NOTES:
  Failures are appended to the failure log (default failed.txt); the file is
  never cleared unless --truncate-log is given.
  PDFium (~30 MB) is downloaded on first use when a PDF submission appears,
  and cached under ~/.cache/submission-harvest/.
"#;

/// Download contest submissions from drive links and normalise them to AVIF.
#[derive(Parser, Debug)]
#[command(
    name = "harvest",
    version,
    about = "Download contest submissions from drive links and normalise them to AVIF",
    long_about = "Reads a roster CSV, downloads each entrant's submission from its shared-drive \
link, converts PDFs, HEIC and ordinary images to AVIF, and writes them to \
<output>/<team>/Photo.avif. One failed submission never stops the batch.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Roster CSV exported from the submission form.
    #[arg(env = "HARVEST_ROSTER", default_value = "data.csv")]
    roster: PathBuf,

    /// Output root. Wiped and recreated before the run.
    #[arg(short, long, env = "HARVEST_OUTPUT", default_value = "public/image")]
    output: PathBuf,

    /// Keep downloaded files as delivered; skip classification and conversion.
    #[arg(long, env = "HARVEST_UNCOMPRESSED")]
    uncompressed: bool,

    /// Download attempts per submission.
    #[arg(long, env = "HARVEST_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    attempts: u32,

    /// Seconds to wait after a failed attempt.
    #[arg(long, env = "HARVEST_RETRY_PAUSE", default_value_t = 2.0)]
    retry_pause: f64,

    /// Seconds to wait after every roster row.
    #[arg(long, env = "HARVEST_ROW_PAUSE", default_value_t = 1.0)]
    row_pause: f64,

    /// AVIF quality (1–100).
    #[arg(long, env = "HARVEST_QUALITY", default_value_t = 80,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// AVIF encoder speed (1 slowest – 10 fastest).
    #[arg(long, env = "HARVEST_SPEED", default_value_t = 6,
          value_parser = clap::value_parser!(u8).range(1..=10))]
    speed: u8,

    /// A converted file must be larger than this many bytes.
    #[arg(long, env = "HARVEST_MIN_BYTES", default_value_t = 1024)]
    min_bytes: u64,

    /// Scale applied to PDF page size when rendering (1.0 = native).
    #[arg(long, env = "HARVEST_RENDER_SCALE", default_value_t = 1.0)]
    render_scale: f32,

    /// Fail opaque payloads instead of assuming they are HEIC photos.
    #[arg(long, env = "HARVEST_REJECT_UNKNOWN")]
    reject_unknown: bool,

    /// Never download PDFium; PDF submissions fail if no local copy exists.
    #[arg(long, env = "HARVEST_NO_ENGINE_DOWNLOAD")]
    no_engine_download: bool,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "HARVEST_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Download endpoint (for mirrors and testing).
    #[arg(long, env = "HARVEST_ENDPOINT", default_value = "https://drive.google.com/uc")]
    endpoint: String,

    /// Host that submission links must point at.
    #[arg(long, env = "HARVEST_LINK_HOST", default_value = "drive.google.com")]
    link_host: String,

    /// File that failure lines are appended to.
    #[arg(long, env = "HARVEST_FAILURE_LOG", default_value = "failed.txt")]
    failure_log: PathBuf,

    /// Clear the failure log before running.
    #[arg(long, env = "HARVEST_TRUNCATE_LOG")]
    truncate_log: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "HARVEST_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "HARVEST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "HARVEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "HARVEST_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs would interleave with the bar; the bar's own lines replace them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn HarvestProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    if cli.truncate_log {
        FailureLog::new(&cli.failure_log)
            .truncate()
            .context("Failed to truncate failure log")?;
    }

    if !cli.quiet && !cli.json {
        eprintln!(
            "{} {} {}",
            cyan("🚀"),
            bold("Starting harvest"),
            dim(match config.mode {
                RunMode::Compressed => "(converting to AVIF)",
                RunMode::Uncompressed => "(uncompressed mode: keeping original files)",
            })
        );
    }

    let report = run(&cli.roster, &cli.output, &config)
        .await
        .context("Harvest failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
        return Ok(());
    }

    if !cli.quiet {
        let tally = report.tally;
        let mark = if tally.failed == 0 {
            green("✔")
        } else if tally.succeeded == 0 {
            red("✘")
        } else {
            yellow("⚠")
        };
        eprintln!(
            "{} Completed: {} succeeded, {} failed",
            mark,
            bold(&tally.succeeded.to_string()),
            if tally.failed == 0 {
                tally.failed.to_string()
            } else {
                red(&tally.failed.to_string())
            },
        );
        if tally.skipped_rows > 0 || tally.empty_slots > 0 {
            eprintln!(
                "   {}",
                dim(&format!(
                    "{} rows without a team number, {} empty slots",
                    tally.skipped_rows, tally.empty_slots
                ))
            );
        }
        let out = std::fs::canonicalize(&report.output_root).unwrap_or(report.output_root);
        eprintln!("📁 Files in {}", bold(&out.display().to_string()));
        for kept in &report.preserved_payloads {
            eprintln!("   {} {}", yellow("kept"), dim(&kept.display().to_string()));
        }
        match &report.failure_log_error {
            Some(e) => eprintln!("{} {}", yellow("⚠"), yellow(e)),
            None if tally.failed > 0 => eprintln!(
                "   {}",
                dim(&format!("details appended to {}", cli.failure_log.display()))
            ),
            None => {}
        }
    }

    Ok(())
}

/// Map CLI args to `HarvestConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<HarvestConfig> {
    let mut builder = HarvestConfig::builder()
        .mode(if cli.uncompressed {
            RunMode::Uncompressed
        } else {
            RunMode::Compressed
        })
        .max_attempts(cli.attempts)
        .retry_pause(seconds(cli.retry_pause, "--retry-pause")?)
        .submission_pause(seconds(cli.row_pause, "--row-pause")?)
        .avif_quality(cli.quality)
        .avif_speed(cli.speed)
        .min_output_bytes(cli.min_bytes)
        .render_scale(cli.render_scale)
        .unknown_payload_policy(if cli.reject_unknown {
            UnknownPayloadPolicy::Reject
        } else {
            UnknownPayloadPolicy::AssumeCameraNative
        })
        .allow_engine_download(!cli.no_engine_download)
        .request_timeout_secs(cli.timeout)
        .download_endpoint(cli.endpoint.clone())
        .link_host(cli.link_host.clone())
        .failure_log_path(cli.failure_log.clone());

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn seconds(value: f64, flag: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{flag} must be a non-negative number of seconds, got {value}"))
}
