//! dirsnap - Snapshot a directory tree into a self-contained viewer file.
//!
//! Usage:
//!   dirsnap [PATH] -o snapshot.html            Snapshot with the built-in template
//!   dirsnap [PATH] -o out.html --template t    Use a custom template
//!   dirsnap [PATH] -o out.html --hash          Include BLAKE3 content hashes
//!   dirsnap --help                             Show help

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use dirsnap_core::{IntegrityLevel, ScanError, ScanOptions};
use dirsnap_export::{ExportError, SnapshotGenerator, SnapshotOutcome, SnapshotSummary, Template};
use dirsnap_scan::{BroadcastSink, ScanPhase};

#[derive(Parser)]
#[command(
    name = "dirsnap",
    version,
    about = "Snapshot a directory tree into a browsable file",
    long_about = "dirsnap walks a directory tree and writes every folder, file, size and \
                  timestamp into a compact array embedded in a template.\n\n\
                  Press Ctrl-C to stop a running snapshot."
)]
struct Cli {
    /// Directory to snapshot (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Output file
    #[arg(short, long)]
    output: PathBuf,

    /// Title shown in the generated page
    #[arg(short, long, default_value = "Directory snapshot")]
    title: String,

    /// Template file containing the [DIR DATA] marker
    #[arg(long)]
    template: Option<PathBuf>,

    /// Include hidden files and folders
    #[arg(long)]
    include_hidden: bool,

    /// Include files and folders marked as system (Windows)
    #[arg(long)]
    include_system: bool,

    /// Compute a content hash for every file
    #[arg(long)]
    hash: bool,

    /// Image integrity validation
    #[arg(long, default_value = "none")]
    validate: ValidateMode,

    /// Number of directory workers (0 = auto)
    #[arg(short = 'j', long, default_value = "0")]
    jobs: usize,

    /// Summary format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Do not print progress
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum ValidateMode {
    #[default]
    None,
    Signature,
    Full,
}

impl From<ValidateMode> for IntegrityLevel {
    fn from(mode: ValidateMode) -> Self {
        match mode {
            ValidateMode::None => IntegrityLevel::None,
            ValidateMode::Signature => IntegrityLevel::SignatureOnly,
            ValidateMode::Full => IntegrityLevel::FullDecode,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let options = ScanOptions::builder()
        .root(cli.path.clone())
        .skip_hidden(!cli.include_hidden)
        .skip_system(!cli.include_system)
        .enable_hashing(cli.hash)
        .integrity_level(IntegrityLevel::from(cli.validate))
        .max_concurrency(cli.jobs)
        .build()
        .context("Invalid options")?;
    debug!(?options, "starting snapshot");

    let template = match &cli.template {
        Some(path) => Template::load(path)?,
        None => Template::builtin()?,
    };
    let generator = SnapshotGenerator::new(options, template).with_title(cli.title.clone());

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            ctrl_c_cancel.cancel();
        }
    });

    let progress = Arc::new(BroadcastSink::new(64));
    let progress_task = (!cli.quiet && std::io::stderr().is_terminal())
        .then(|| tokio::spawn(print_progress(progress.clone())));

    let output = cli.output.clone();
    let run_cancel = cancel.clone();
    let run_progress = progress.clone();
    // Scanning is synchronous and drives its own rayon pools.
    let outcome = tokio::task::spawn_blocking(move || {
        generator.generate_to_file(&output, run_progress.as_ref(), &run_cancel)
    })
    .await
    .unwrap_or_else(|e| {
        Err(ExportError::Scan(ScanError::Other {
            message: e.to_string(),
        }))
    });

    if let Some(task) = progress_task {
        task.abort();
        eprint!("\r\x1b[2K");
    }

    match outcome.context("Snapshot failed")? {
        SnapshotOutcome::Completed(summary) => print_summary(&cli, &summary)?,
        SnapshotOutcome::Cancelled { records_written } => {
            eprintln!("Snapshot cancelled ({} folder(s) written)", records_written);
            std::process::exit(130);
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default: warnings only).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Redraw a single status line for every progress event.
async fn print_progress(sink: Arc<BroadcastSink>) {
    let mut rx = sink.subscribe();
    loop {
        match rx.recv().await {
            Ok(progress) => {
                let label = match progress.phase {
                    ScanPhase::Collecting => "Collecting",
                    ScanPhase::Scanning => "Scanning",
                    ScanPhase::Writing => "Writing",
                };
                eprint!(
                    "\r\x1b[2K{} {} ({:.0}/s) {}",
                    label,
                    progress.items_processed,
                    progress.items_per_second(),
                    truncate(&progress.current_item.display().to_string(), 60)
                );
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_summary(cli: &Cli, summary: &SnapshotSummary) -> Result<()> {
    match cli.format {
        OutputFormat::Text => {
            println!("{}", "─".repeat(60));
            println!(" {} -> {}", cli.path.display(), cli.output.display());
            println!(
                " {} folders, {} files, {}",
                summary.folders,
                summary.files,
                format_size(summary.total_size)
            );
            println!(
                " Wrote {} in {:.2}s",
                format_size(summary.bytes),
                summary.duration.as_secs_f64()
            );
            if summary.warnings > 0 {
                println!(" {} warning(s) during scan", summary.warnings);
            }
            println!("{}", "─".repeat(60));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
    }
    Ok(())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Keep the tail of a long path, which is the part that changes.
fn truncate(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        s.to_string()
    } else {
        let tail: String = s.chars().skip(count - (max_len - 1)).collect();
        format!("…{}", tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_mode_maps_to_level() {
        assert_eq!(IntegrityLevel::from(ValidateMode::None), IntegrityLevel::None);
        assert_eq!(
            IntegrityLevel::from(ValidateMode::Signature),
            IntegrityLevel::SignatureOnly
        );
        assert_eq!(IntegrityLevel::from(ValidateMode::Full), IntegrityLevel::FullDecode);
    }

    #[test]
    fn test_truncate_keeps_tail() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "…ghij");
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "dirsnap", "/data", "-o", "out.html", "--hash", "--validate", "full", "-j", "2",
        ])
        .unwrap();
        assert_eq!(cli.path, PathBuf::from("/data"));
        assert!(cli.hash);
        assert!(matches!(cli.validate, ValidateMode::Full));
        assert_eq!(cli.jobs, 2);
    }
}
