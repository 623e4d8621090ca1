mod calibrate;
mod decode;

use std::io::stderr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Log at debug level unless LMR_LOG says otherwise.
    #[arg(short, long, global = true, action)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode frames and write one JSON message per line to stdout.
    ///
    /// Input has one frame per line, optionally preceded by a receive time in
    /// milliseconds and a colon, e.g. `1200: cdf59...`. Blank lines and lines starting
    /// with # are skipped. Frames without a time are numbered by line.
    Decode {
        /// Air interface of the frames. Overrides the configuration file.
        #[arg(short, long)]
        protocol: Option<decode::ProtocolArg>,

        /// How frame bits are written.
        #[arg(short, long, default_value = "hex")]
        format: decode::Format,

        /// Channel name attached to every message. Overrides the configuration file.
        #[arg(short, long)]
        channel: Option<String>,

        /// JSON pipeline configuration.
        #[arg(long, value_name = "path")]
        config: Option<PathBuf>,

        /// Only write messages that passed or were corrected.
        #[arg(long, action)]
        valid_only: bool,

        /// Input frame file, or - for stdin.
        input: PathBuf,
    },
    /// Select the fastest kernel implementations for this machine and print the
    /// measurements as JSON.
    Calibrate {
        /// Warmup per candidate.
        #[arg(long, default_value = "50")]
        warmup_ms: u64,

        /// Measurement per candidate.
        #[arg(long, default_value = "200")]
        measure_ms: u64,

        /// Consider only the scalar implementations.
        #[arg(long, action)]
        scalar_only: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("LMR_LOG").unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Decode {
            protocol,
            format,
            channel,
            config,
            valid_only,
            input,
        } => {
            let config = decode::load_config(config.as_ref(), *protocol, channel.clone())?;
            decode::decode(input, format, config, *valid_only)
        }
        Commands::Calibrate {
            warmup_ms,
            measure_ms,
            scalar_only,
        } => calibrate::calibrate(*warmup_ms, *measure_ms, !scalar_only),
    }
}
