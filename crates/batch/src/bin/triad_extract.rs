//! Extract 60-minute 1X2 triads from recorded Match Odds stream files.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use triad_batch::BatchDriver;
use triad_core::Config;

const DEFAULT_INPUT: &str = "football_data_output";

#[derive(Parser, Debug)]
#[command(name = "triad-extract")]
#[command(about = "Extract synchronized 1X2 price triads around the hour mark")]
struct Args {
    /// Settings file (`key = value`) or JSON config (`.json`)
    #[arg(long, default_value = "settings.ini")]
    config: PathBuf,

    /// Input root, overrides the config file
    #[arg(long, env = "TRIAD_INPUT")]
    input: Option<PathBuf>,

    /// Parallel workers (0 = all cores, 1 = sequential)
    #[arg(long)]
    workers: Option<usize>,

    /// Write records as JSON lines to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Keep scheduled kick-off times as they are
    #[arg(long)]
    no_correction: bool,

    /// Skip the relaxed search phase
    #[arg(long)]
    no_relaxed: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = load_config(&args.config)?;
    if let Some(input) = args.input {
        config.batch.input = Some(input);
    }
    if let Some(workers) = args.workers {
        config.batch.workers = workers;
    }
    if args.no_correction {
        config.kickoff.enable_correction = false;
    }
    if args.no_relaxed {
        config.search.enable_relaxed_phase = false;
    }

    let input = config
        .batch
        .input
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT));
    info!(
        "Input: {} | exact {}-{}min/{}s | relaxed {}-{}min/{}s",
        input.display(),
        config.search.time_from,
        config.search.time_to,
        config.search.window_secs,
        config.search.relaxed_time_from,
        config.search.relaxed_time_to,
        config.search.relaxed_window_secs,
    );

    let result = BatchDriver::new(&config)
        .run(&input)
        .with_context(|| format!("Failed to process {}", input.display()))?;

    if let Some(output) = &args.output {
        let file = File::create(output)
            .with_context(|| format!("Failed to create {}", output.display()))?;
        let mut writer = BufWriter::new(file);
        let mut written = 0usize;
        for record in result.records() {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
            written += 1;
        }
        writer.flush()?;
        info!("Wrote {written} records to {}", output.display());
    }

    for (path, correction) in result.corrections() {
        info!(
            "Corrected {}: {} -> {} ({:+.2}h, {:?})",
            path.display(),
            correction.scheduled.format("%Y-%m-%d %H:%M"),
            correction.corrected.format("%Y-%m-%d %H:%M"),
            correction.correction_hours,
            correction.reference,
        );
    }

    result.summary.log_summary();
    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(Config::default());
    }

    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let config = if is_json {
        Config::from_json_str(&text)
    } else {
        Config::from_settings_str(&text)
    };
    config.with_context(|| format!("Invalid config {}", path.display()))
}
