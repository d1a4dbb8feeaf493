//! CLI for guardrail config stores and stats reports.
//!
//! Provides commands for inspecting persisted configs, producing a stats report
//! from a config directory, and decoding a binary report.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use guardrail::{
    ConfigRegistry, DirStorage, GuardrailStats, Limits, StatsListener, SystemClock,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// guardrail: bounded config registry and guardrail statistics CLI.
#[derive(Parser)]
#[command(name = "guardrail", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List persisted config blobs.
    Info {
        /// Path to the config directory.
        config_dir: PathBuf,
    },

    /// Load a config directory and write the resulting stats report.
    Report {
        /// Path to the config directory.
        config_dir: PathBuf,

        /// Write the report here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,

        /// JSON file overriding the default limits.
        #[arg(long)]
        limits: Option<PathBuf>,

        /// Render as text instead of the binary report.
        #[arg(long)]
        text: bool,
    },

    /// Decode a binary stats report and print it as text.
    Decode {
        /// Path to the report file.
        report_path: PathBuf,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Info { config_dir } => cmd_info(&config_dir),
        Commands::Report {
            config_dir,
            out,
            limits,
            text,
        } => cmd_report(&config_dir, out.as_deref(), limits.as_deref(), text),
        Commands::Decode { report_path } => cmd_decode(&report_path),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `guardrail info <config_dir>`.
fn cmd_info(config_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !config_dir.is_dir() {
        return Err(format!("No config directory at '{}'", config_dir.display()).into());
    }

    let storage = DirStorage::open(config_dir)?;
    let blobs = storage.list()?;

    println!("Config directory: {}", config_dir.display());
    println!("Blobs: {}", blobs.len());
    println!();

    let mut total_size = 0;
    for (name, path) in &blobs {
        let size = std::fs::metadata(path)?.len();
        total_size += size;
        println!(
            "  {} written={} size={}",
            name.key,
            name.timestamp_sec,
            format_bytes(size)
        );
    }

    println!();
    println!("Total disk usage: {} ({total_size} bytes)", format_bytes(total_size));
    Ok(())
}

/// Implements `guardrail report <config_dir>`.
fn cmd_report(
    config_dir: &Path,
    out: Option<&Path>,
    limits_path: Option<&Path>,
    text: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let limits = match limits_path {
        Some(path) => Limits::load(path)?,
        None => Limits::default(),
    };

    let clock = Arc::new(SystemClock);
    let stats = Arc::new(GuardrailStats::new(clock.clone(), limits.clone()));
    let registry = ConfigRegistry::new(Arc::new(DirStorage::open(config_dir)?), clock, limits);
    registry.add_listener(Arc::new(StatsListener::new(stats.clone())));
    let restored = registry.startup();
    info!(restored, dir = %config_dir.display(), "loaded config directory");

    let mut buf = Vec::new();
    if text {
        stats.dump_human_readable(&mut buf)?;
    } else {
        stats.dump_report(&mut buf, false);
    }

    match out {
        Some(path) => {
            std::fs::write(path, &buf)?;
            info!(bytes = buf.len(), path = %path.display(), "wrote report");
        }
        None => std::io::stdout().lock().write_all(&buf)?,
    }
    Ok(())
}

/// Implements `guardrail decode <report_path>`.
fn cmd_decode(report_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(report_path)?;
    let report = guardrail::report::decode_report(&bytes)?;
    guardrail::report::render_text(&report, &mut std::io::stdout().lock())?;
    Ok(())
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
