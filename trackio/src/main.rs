use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use trackio::commands::{check_manifest, run_align, run_reconstruct, AlignOutputs, ReconstructOutputs};

#[derive(Parser, Debug)]
#[command(
    name = "trackio",
    about = "Reconstruct charged-particle tracks through a two-stage spectrometer",
    version
)]
struct Args {
    /// Number of worker threads (0 uses every available CPU)
    #[arg(short = 'p', long = "threads", default_value_t = 0, global = true)]
    threads: usize,

    /// Set logging level to WARN
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconstruct every event of a JSON-lines event file
    Reconstruct {
        /// Run manifest naming geometry, calibrations and configuration
        #[arg(short = 'm', long, value_name = "JSON")]
        manifest: PathBuf,

        /// Input events, one JSON document per line
        #[arg(short = 'e', long, value_name = "JSONL")]
        events: PathBuf,

        /// Per-event results
        #[arg(short = 'o', long = "out", value_name = "JSONL")]
        out: PathBuf,

        /// Also write every track as zstd-compressed bincode
        #[arg(long, value_name = "BIN")]
        binary: Option<PathBuf>,

        /// Also record alignment samples
        #[arg(long, value_name = "JSONL")]
        samples: Option<PathBuf>,
    },
    /// Search for alignment offsets on a calibration run
    Align {
        #[arg(short = 'm', long, value_name = "JSON")]
        manifest: PathBuf,

        #[arg(short = 'e', long, value_name = "JSONL")]
        events: PathBuf,

        /// Report of every restart and the best solution
        #[arg(short = 'r', long, value_name = "JSON")]
        report: PathBuf,

        /// Offsets file with the best solution applied, usable as `offsets` in a manifest
        #[arg(long = "offsets-out", value_name = "JSON")]
        offsets_out: Option<PathBuf>,

        /// Also write the samples the search ran on
        #[arg(long = "samples-out", value_name = "JSONL")]
        samples_out: Option<PathBuf>,
    },
    /// Load every input of a manifest and print the effective configuration
    Check {
        #[arg(short = 'm', long, value_name = "JSON")]
        manifest: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .context("cannot configure the thread pool")?;
    }

    match args.command {
        Command::Reconstruct { manifest, events, out, binary, samples } => {
            let outputs = ReconstructOutputs { results: out, binary_tracks: binary, samples };
            let counts = run_reconstruct(&manifest, &events, &outputs)?;
            info!("done: {} of {} events kept, {} tracks", counts.events - counts.rejected, counts.events, counts.tracks);
        }
        Command::Align { manifest, events, report, offsets_out, samples_out } => {
            let outputs = AlignOutputs { report, offsets: offsets_out, samples: samples_out };
            let report = run_align(&manifest, &events, &outputs)?;
            match &report.best {
                Some(best) => info!("done: best rms {:.6} GeV/c", best.rms),
                None => info!("done: every restart was degenerate"),
            }
        }
        Command::Check { manifest } => {
            println!("{}", check_manifest(&manifest)?);
        }
    }
    Ok(())
}
