use anyhow::Context;
use clap::Parser;
use rapic_ingest::cli::{Args, setup_logging};
use rapic_ingest::processor::IngestProcessor;
use std::process;

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.to_config().context("invalid options")?;
    let mut processor = IngestProcessor::new(args.inputs.clone(), args.output.clone())?
        .with_config(config);
    let stats = processor.process().await?;

    if stats.files_failed > 0 {
        anyhow::bail!(
            "{} of {} files failed",
            stats.files_failed,
            stats.files_failed + stats.files_processed
        );
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    setup_logging(&args);

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        tokio::select! {
            result = run(args) => result,
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for CTRL+C")?;
                eprintln!("\nReceived CTRL+C, shutting down...");
                Err(anyhow::anyhow!("Processing interrupted by user"))
            }
        }
    });

    if let Err(error) = result {
        eprintln!("Error: {:#}", error);
        process::exit(1);
    }
}
