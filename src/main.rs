//! graupel: a scheduled batch pipeline over Yelp-style datasets.
//!
//! Samples the business and review datasets, joins them on business id,
//! replaces the warehouse table with the joined rows, renders the top-city
//! chart, and reclaims the run's scratch directory.

use clap::{Parser, Subcommand};
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use graupel::cleanup::Reclaimer;
use graupel::error::{AddressParseSnafu, CleanupSnafu, ConfigSnafu, MetricsSnafu, PipelineError};
use graupel::pipeline::RunContext;
use graupel::{Config, metrics, run_pipeline};

/// Sampled join-load-analyze batch pipeline.
#[derive(Parser, Debug)]
#[command(name = "graupel")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "graupel.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a full pipeline run (the default).
    Run {
        /// Run identifier; derived from the clock when omitted.
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Reclaim the scratch directory of a previous run.
    Clean {
        /// Run identifier to reclaim.
        #[arg(long)]
        run_id: String,
    },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("graupel starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    // Initialize metrics if enabled
    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    match args.command {
        Some(Command::Clean { run_id }) => clean(&config, run_id).await,
        Some(Command::Run { run_id }) => run(config, run_id).await,
        None => run(config, None).await,
    }
}

/// Run the pipeline and log the final statistics.
async fn run(config: Config, run_id: Option<String>) -> Result<(), PipelineError> {
    let stats = run_pipeline(config, run_id).await?;

    info!("Pipeline completed successfully");
    info!("  Business records sampled: {}", stats.business_sampled);
    info!("  Review records sampled: {}", stats.review_sampled);
    info!("  Malformed lines skipped: {}", stats.malformed_lines);
    info!("  Rows merged: {}", stats.rows_merged);
    info!("  Rows loaded: {}", stats.rows_loaded);
    info!("  Aggregate groups: {}", stats.aggregate_groups);
    info!("  Scratch entries reclaimed: {}", stats.scratch_reclaimed);
    info!("  Stage retries: {}", stats.retries);

    Ok(())
}

/// Reclaim the scratch directory of a previous run without running anything.
async fn clean(config: &Config, run_id: String) -> Result<(), PipelineError> {
    let ctx = RunContext::new(&config.scratch.root, Some(run_id));
    let outcome = Reclaimer::new(ctx.run_dir())
        .run()
        .await
        .context(CleanupSnafu)?;
    info!(
        "Reclaimed {} scratch entries from run {}",
        outcome.reclaimed,
        ctx.run_id()
    );
    Ok(())
}
