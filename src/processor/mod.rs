//! Main processing engine.
//!
//! Drives the per-stream [`assembler::ScanAssembler`] over every discovered
//! input file, writing volumes through a [`sink::BeamSink`] and reporting a
//! run summary.

pub mod assembler;
pub mod discovery;
pub mod merge;
pub mod sink;
pub mod writer;

#[cfg(test)]
pub mod tests;

use self::{
    assembler::ScanAssembler,
    discovery::FileDiscovery,
    sink::{BeamSink, SummarySink},
    writer::ParquetSink,
};

use crate::config::IngestConfig;
use crate::error::{RapicError, Result};
use crate::models::{IngestStats, ProcessingStats};

use colored::*;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task;
use tracing::{debug, error, warn};

/// Runs one stream through the assembler into `sink`
pub fn ingest_file<S: BeamSink + ?Sized>(
    path: &Path,
    config: &IngestConfig,
    sink: &mut S,
) -> Result<IngestStats> {
    let file = File::open(path)?;
    let mut assembler = ScanAssembler::new(BufReader::new(file), config.clone());
    assembler.run(sink)
}

/// Output of one file processed on a blocking task
#[derive(Debug, Default)]
struct FileOutcome {
    stats: IngestStats,
    written: Vec<PathBuf>,
}

fn process_file(path: &Path, output_dir: &Path, config: &IngestConfig) -> Result<FileOutcome> {
    let wrap = |e: RapicError| RapicError::ProcessingFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    if config.dry_run {
        let mut sink = SummarySink::new();
        let stats = ingest_file(path, config, &mut sink).map_err(wrap)?;
        return Ok(FileOutcome {
            stats,
            written: Vec::new(),
        });
    }

    let mut sink = ParquetSink::new(output_dir, config);
    let stats = ingest_file(path, config, &mut sink).map_err(wrap)?;
    Ok(FileOutcome {
        stats,
        written: sink.written().to_vec(),
    })
}

/// Main processor for RAPIC stream conversion
#[derive(Debug)]
pub struct IngestProcessor {
    output_dir: PathBuf,
    config: IngestConfig,
    file_discovery: FileDiscovery,
}

impl IngestProcessor {
    /// Create a new processor; output defaults to `./rapic_parquet`
    pub fn new(inputs: Vec<String>, output_dir: Option<PathBuf>) -> Result<Self> {
        if inputs.is_empty() {
            return Err(RapicError::Configuration {
                message: "no input files given".to_string(),
            });
        }
        Ok(Self {
            output_dir: output_dir.unwrap_or_else(|| PathBuf::from("rapic_parquet")),
            config: IngestConfig::default(),
            file_discovery: FileDiscovery::new(inputs),
        })
    }

    /// Configure the processor
    pub fn with_config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Main processing entry point
    pub async fn process(&mut self) -> Result<ProcessingStats> {
        let start_time = Instant::now();
        self.config.validate()?;

        println!("{}", "Starting RAPIC ingest".bright_green().bold());
        println!(
            "  {} {}",
            "Inputs:".bright_cyan(),
            self.file_discovery.inputs().join(", ")
        );
        if self.config.dry_run {
            println!("  {} {}", "Output:".bright_cyan(), "dry run".bright_yellow());
        } else {
            println!(
                "  {} {}",
                "Output:".bright_cyan(),
                self.output_dir.display()
            );
        }

        // Step 1: Discover input files
        println!("\n{}", "Discovering RAPIC files...".bright_yellow());
        let discovery = self.file_discovery.clone();
        let files = task::spawn_blocking(move || discovery.discover())
            .await
            .map_err(|e| RapicError::Internal {
                message: format!("discovery task failed: {}", e),
            })??;
        println!(
            "  {} {} files",
            "Found".bright_green(),
            files.len().to_string().bright_white().bold()
        );

        let mut stats = ProcessingStats {
            output_path: self.output_dir.clone(),
            ..ProcessingStats::default()
        };
        if files.is_empty() {
            stats.processing_time_ms = start_time.elapsed().as_millis();
            return Ok(stats);
        }

        // Step 2: Create output directory
        if !self.config.dry_run {
            fs::create_dir_all(&self.output_dir).await?;
        }

        // Step 3: Process files concurrently on blocking tasks
        println!("\n{}", "Processing files...".bright_yellow());
        let progress_bar = ProgressBar::new(files.len() as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
                )
                .unwrap()
                .progress_chars("#>-"),
        );

        let limit = self.config.max_concurrent_files;
        let semaphore = Arc::new(Semaphore::new(limit));
        let config = Arc::new(self.config.clone());
        let output_dir = Arc::new(self.output_dir.clone());

        let results = stream::iter(files.iter().cloned())
            .map(|path| {
                let sem = semaphore.clone();
                let config = config.clone();
                let output_dir = output_dir.clone();
                let progress_bar = progress_bar.clone();
                async move {
                    let _permit = sem.acquire().await.map_err(|e| RapicError::Internal {
                        message: format!("semaphore closed: {}", e),
                    })?;
                    let task_path = path.clone();
                    let outcome = task::spawn_blocking(move || {
                        process_file(&task_path, &output_dir, &config)
                    })
                    .await
                    .map_err(|e| RapicError::ProcessingFailed {
                        path: path.clone(),
                        reason: format!("worker task failed: {}", e),
                    })?;

                    progress_bar.inc(1);
                    if let Some(name) = path.file_name() {
                        progress_bar.set_message(name.to_string_lossy().to_string());
                    }
                    outcome
                }
            })
            .buffer_unordered(limit)
            .collect::<Vec<_>>()
            .await;

        progress_bar.finish_and_clear();

        let mut written = 0usize;
        for result in results {
            match result {
                Ok(outcome) => {
                    stats.files_processed += 1;
                    written += outcome.written.len();
                    stats.ingest.absorb(outcome.stats);
                }
                Err(e) => {
                    error!("{}", e);
                    stats.files_failed += 1;
                }
            }
        }
        for reason in &stats.ingest.skip_reasons {
            debug!("Skipped image {}", reason);
        }
        if stats.ingest.images_seen == 0 {
            warn!("No /IMAGE: markers found in any input");
        }

        stats.processing_time_ms = start_time.elapsed().as_millis();
        print_summary(&stats, written, self.config.dry_run);
        Ok(stats)
    }
}

fn print_summary(stats: &ProcessingStats, files_written: usize, dry_run: bool) {
    let ingest = &stats.ingest;
    println!("\n{}", "Processing Summary".bright_green().bold());
    println!(
        "  {} {}ms",
        "Time elapsed:".bright_cyan(),
        stats.processing_time_ms.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Files processed:".bright_cyan(),
        stats.files_processed.to_string().bright_white()
    );
    if stats.files_failed > 0 {
        println!(
            "  {} {}",
            "Files failed:".bright_red(),
            stats.files_failed.to_string().bright_red().bold()
        );
    }
    println!(
        "  {} {} of {}",
        "Volumes emitted:".bright_cyan(),
        ingest.volumes_emitted.to_string().bright_white().bold(),
        ingest.images_seen.to_string().bright_white()
    );
    if ingest.images_skipped > 0 {
        println!(
            "  {} {}",
            "Images skipped:".bright_yellow(),
            ingest.images_skipped.to_string().bright_yellow()
        );
    }
    println!(
        "  {} {}",
        "Beams:".bright_cyan(),
        ingest.beams_emitted.to_string().bright_white()
    );
    if ingest.radials_dropped > 0 || ingest.overflow_records > 0 {
        println!(
            "  {} {} dropped radials, {} overflowed records",
            "Anomalies:".bright_yellow(),
            ingest.radials_dropped,
            ingest.overflow_records
        );
    }
    if !dry_run {
        println!(
            "  {} {}",
            "Parquet files:".bright_cyan(),
            files_written.to_string().bright_white().bold()
        );
    }
}
