//! 5G NR SSB Receiver Application
//!
//! Searches a recorded cf32 baseband file for the first SSB and prints a JSON
//! report, or writes a synthetic SSB waveform for testing.

mod config;
mod report;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use common::types::{Nid2, SubcarrierSpacing};
use common::utils::{iq_from_bytes, iq_to_bytes, mean_power, power_to_db};
use nr_phy::synth::SsbSynthesizer;
use nr_phy::{SearchOutcome, SsbReceiver};

use crate::config::RxConfig;
use crate::report::DetectionReport;

/// Albor Space 5G NR SSB receiver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, or YAML with .yml/.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search a cf32 file (interleaved little-endian f32 I/Q at 7.68 Msps)
    Detect {
        /// Input file
        input: PathBuf,

        /// Subcarrier spacing in kHz (15, 30)
        #[arg(long)]
        scs_khz: Option<u32>,

        /// Detection threshold in dB relative to window energy
        #[arg(long, allow_hyphen_values = true)]
        threshold_db: Option<f32>,

        /// Peak picker window length (odd)
        #[arg(long)]
        window_length: Option<usize>,

        /// Run the three correlator lanes on separate threads
        #[arg(long)]
        parallel: bool,

        /// Include the 240 x 4 resource grid in the report
        #[arg(long)]
        grid: bool,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a synthetic SSB waveform to a cf32 file
    Synth {
        /// Output file
        output: PathBuf,

        /// PSS identity (0-2)
        #[arg(long, default_value = "0")]
        nid2: u8,

        /// Subcarrier spacing in kHz (15, 30)
        #[arg(long, default_value = "30")]
        scs_khz: u32,

        /// Silence before the SSB in samples
        #[arg(long, default_value = "1000")]
        leading: usize,

        /// Silence after the SSB in samples
        #[arg(long, default_value = "1000")]
        trailing: usize,

        /// Noise power per sample (linear, 0 for none)
        #[arg(long, default_value = "0")]
        noise_power: f32,

        /// Payload and noise seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Start the SSB on a half-subframe boundary (long CP on symbol 0)
        #[arg(long)]
        slot_boundary: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut file_config = match &args.config {
        Some(path) => RxConfig::from_file(path)?,
        None => RxConfig::default(),
    };
    if let Some(level) = &args.log_level {
        file_config.log.level = level.clone();
    }

    // Initialize logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&file_config.log.level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Albor Space 5G NR SSB receiver");
    if let Some(path) = &args.config {
        info!("Configuration file: {}", path.display());
    }

    match args.command {
        Command::Detect { input, scs_khz, threshold_db, window_length, parallel, grid, output } => {
            let mut detector = file_config.detector;
            if let Some(scs_khz) = scs_khz {
                detector.scs_khz = scs_khz;
            }
            if let Some(threshold_db) = threshold_db {
                detector.threshold_db = threshold_db;
            }
            if let Some(window_length) = window_length {
                detector.window_length = window_length;
            }
            let config = detector.to_detector_config()?;

            let data = tokio::fs::read(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let samples = iq_from_bytes(&data);
            if samples.is_empty() {
                warn!("{} holds no complete samples", input.display());
            }

            info!("Detect configuration:");
            info!("  Input: {} ({} samples)", input.display(), samples.len());
            info!("  Subcarrier spacing: {} kHz", config.scs.khz());
            info!("  Mean power: {:.1} dB", power_to_db(mean_power(&samples)));
            info!("  Mode: {}", if parallel { "parallel lanes" } else { "streaming" });

            let scs_khz = config.scs.khz();
            let index_map = config.clone();
            let input_samples = samples.len();

            let started = Instant::now();
            let outcome = tokio::task::spawn_blocking(move || -> Result<SearchOutcome> {
                let outcome = if parallel {
                    SsbReceiver::search_parallel(config, &samples)?
                } else {
                    SsbReceiver::search(config, &samples)?
                };
                Ok(outcome)
            })
            .await
            .context("Detection task failed")??;
            debug!("Search took {:?}", started.elapsed());

            match &outcome {
                SearchOutcome::Found(ssb) => info!("SSB found: nid2={} at sample {}",
                                                   ssb.nid2(), ssb.symbol_start()),
                SearchOutcome::NotFound => warn!("No SSB found"),
            }

            let report = DetectionReport::new(
                &outcome,
                scs_khz,
                input_samples,
                |index| index_map.input_index(index),
                grid,
            );
            let json = serde_json::to_string_pretty(&report)?;

            match output {
                Some(path) => {
                    tokio::fs::write(&path, json)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Report written to {}", path.display());
                }
                None => println!("{}", json),
            }
        }

        Command::Synth { output, nid2, scs_khz, leading, trailing, noise_power, seed, slot_boundary } => {
            let nid2 = Nid2::new(nid2).ok_or_else(|| anyhow!("Invalid NID2: {}", nid2))?;
            let scs = SubcarrierSpacing::from_khz(scs_khz)
                .ok_or_else(|| anyhow!("Invalid subcarrier spacing: {} kHz", scs_khz))?;

            // The file is always 7.68 Msps: a 15 kHz SSB needs a 512-point grid
            let fft_size = match scs {
                SubcarrierSpacing::Scs15 => 512,
                SubcarrierSpacing::Scs30 => 256,
            };

            let mut synthesizer = SsbSynthesizer::new(nid2)
                .fft_size(fft_size)
                .leading(leading)
                .trailing(trailing)
                .noise_power(noise_power)
                .seed(seed);
            if slot_boundary {
                synthesizer = synthesizer.slot_boundary(scs);
            }
            let waveform = synthesizer.build()?;

            tokio::fs::write(&output, iq_to_bytes(&waveform.samples))
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;

            info!("Synthetic SSB written:");
            info!("  File: {} ({} samples)", output.display(), waveform.samples.len());
            info!("  NID2: {}, {} kHz, Nfft {}", nid2, scs_khz, fft_size);
            info!("  SSB start: {}", waveform.ssb_start);
        }
    }

    Ok(())
}
