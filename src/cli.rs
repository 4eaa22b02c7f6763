//! Command-line interface components.

use crate::config::{CompressionAlgorithm, IngestConfig};
use crate::constants::{
    DEFAULT_BEAM_WIDTH_DEG, DEFAULT_MAX_RADIAL_GATES, DEFAULT_RECORD_BUFFER_SIZE,
    DEFAULT_REMAP_GATE_LIMIT,
};
use crate::error::Result;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug, Clone)]
#[command(name = "rapic_ingest")]
#[command(about = "Decode RAPIC weather radar streams into per-volume Parquet files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// RAPIC files, directories or glob patterns
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<String>,

    /// Output directory for Parquet files (default: ./rapic_parquet)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Only accept volumes from this radar (matched against NAME:)
    #[arg(long, value_name = "NAME")]
    pub radar_name: Option<String>,

    /// Only accept volumes with this VOLUMEID:
    #[arg(long, value_name = "ID")]
    pub volume_id: Option<i32>,

    /// Beam width in degrees; half of it bounds the elevation check
    #[arg(long, default_value_t = DEFAULT_BEAM_WIDTH_DEG)]
    pub beam_width: f64,

    /// Flip the sign of header latitudes
    #[arg(long)]
    pub invert_latitude: bool,

    /// Gate ceiling for a single decoded radial
    #[arg(long, default_value_t = DEFAULT_MAX_RADIAL_GATES)]
    pub max_gates: usize,

    /// Gate ceiling for the reflectivity resolution remap
    #[arg(long, default_value_t = DEFAULT_REMAP_GATE_LIMIT)]
    pub remap_gate_limit: usize,

    /// Record buffer capacity in bytes
    #[arg(long, default_value_t = DEFAULT_RECORD_BUFFER_SIZE)]
    pub record_buffer: usize,

    /// Number of files processed concurrently (default: CPU count)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Write rows for gates with a raw value of 0
    #[arg(long)]
    pub keep_null_gates: bool,

    /// Parquet compression algorithm (snappy, zstd, lz4, none)
    #[arg(long, default_value = "snappy")]
    pub compression: String,

    /// Decode and summarise volumes without writing Parquet
    #[arg(long)]
    pub dry_run: bool,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Builds the ingest configuration from the parsed flags
    pub fn to_config(&self) -> Result<IngestConfig> {
        let compression: CompressionAlgorithm = self.compression.parse()?;
        let mut config = IngestConfig::default()
            .with_beam_width(self.beam_width)
            .with_max_radial_gates(self.max_gates)
            .with_remap_gate_limit(self.remap_gate_limit)
            .with_record_buffer_size(self.record_buffer)
            .with_compression(compression);

        if let Some(name) = &self.radar_name {
            config = config.with_expected_radar_name(name.clone());
        }
        if let Some(volume_id) = self.volume_id {
            config = config.with_expected_volume_id(volume_id);
        }
        if let Some(jobs) = self.jobs {
            config = config.with_max_concurrent_files(jobs);
        }
        if self.invert_latitude {
            config = config.with_inverted_latitude();
        }
        if self.keep_null_gates {
            config = config.with_null_gates();
        }
        if self.dry_run {
            config = config.with_dry_run();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Set up structured logging on stderr
pub fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rapic_ingest={}", log_level)));

    if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    debug!("Logging initialized at level: {}", log_level);
}
