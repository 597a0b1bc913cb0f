//! Main processing pipeline.
//!
//! Wires the five stages into a linear task graph with two fan-in sources:
//! both samplers run concurrently, their snapshots feed the merge, and the
//! merged snapshot flows through load, analyze, and cleanup in order. Every
//! edge is an explicit artifact path handed from producer to consumer, and
//! every stage runs under the bounded retry policy.

mod context;
mod retry;
mod signal;

use futures::future::try_join;
use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::analyze::{AnalyzeOutcome, Analyzer};
use crate::cleanup::Reclaimer;
use crate::config::Config;
use crate::error::{
    AnalyzeSnafu, CancelledSnafu, CleanupSnafu, ConfigSnafu, LoadSnafu, MergeSnafu, PipelineError,
    SampleSnafu,
};
use crate::load::{LoadReport, Loader};
use crate::merge::{MergeOutcome, Merger};
use crate::sample::{SampleOutcome, Sampler};

pub use context::RunContext;
pub use retry::{RetryPolicy, Retryable};

use retry::run_stage;

impl Retryable for PipelineError {
    fn is_retryable(&self) -> bool {
        PipelineError::is_retryable(self)
    }
}

/// Statistics about the pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub business_sampled: usize,
    pub review_sampled: usize,
    pub malformed_lines: usize,
    pub rows_merged: usize,
    pub rows_loaded: usize,
    pub aggregate_groups: usize,
    pub scratch_reclaimed: usize,
    pub retries: usize,
}

/// Main processing pipeline.
pub struct Pipeline {
    config: Config,
    ctx: RunContext,
    retry: RetryPolicy,
    stats: PipelineStats,
    shutdown: CancellationToken,
}

impl Pipeline {
    /// Create a new pipeline from configuration.
    pub fn new(config: Config, ctx: RunContext, shutdown: CancellationToken) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        Self {
            config,
            ctx,
            retry,
            stats: PipelineStats::default(),
            shutdown,
        }
    }

    /// Run the pipeline to completion.
    ///
    /// A shutdown signal lets the in-flight stage finish, then stops the
    /// run before the next stage starts.
    pub async fn run(mut self) -> Result<PipelineStats, PipelineError> {
        info!("Starting pipeline run {}", self.ctx.run_id());

        let (business, review) = self.sample().await?;
        self.stats.business_sampled = business.sampled;
        self.stats.review_sampled = review.sampled;
        self.stats.malformed_lines = business.malformed + review.malformed;

        self.check_shutdown()?;
        let merged = self.merge(&business, &review).await?;
        self.stats.rows_merged = merged.rows;

        self.check_shutdown()?;
        let report = self.load(&merged).await?;
        self.stats.rows_loaded = report.rows;

        self.check_shutdown()?;
        let analyzed = self.analyze().await?;
        self.stats.aggregate_groups = analyzed.groups.len();

        self.check_shutdown()?;
        let reclaimed = self.cleanup().await?;
        self.stats.scratch_reclaimed = reclaimed;

        info!("Pipeline completed: {:?}", self.stats);
        Ok(self.stats)
    }

    /// Sample both source datasets concurrently.
    async fn sample(&mut self) -> Result<(SampleOutcome, SampleOutcome), PipelineError> {
        let sample_size = self.config.sample_size;

        let business_config = self.config.sources.business.clone();
        let business_path = self.ctx.snapshot_path("business_sample.csv");
        let business_stage = run_stage("sample_business", &self.retry, &self.shutdown, move || {
            let sampler = Sampler::new("business", &business_config, sample_size);
            let output = business_path.clone();
            async move {
                sampler
                    .run(&output)
                    .await
                    .context(SampleSnafu { dataset: "business" })
            }
        });

        let review_config = self.config.sources.review.clone();
        let review_path = self.ctx.snapshot_path("review_sample.csv");
        let review_stage = run_stage("sample_review", &self.retry, &self.shutdown, move || {
            let sampler = Sampler::new("review", &review_config, sample_size);
            let output = review_path.clone();
            async move {
                sampler
                    .run(&output)
                    .await
                    .context(SampleSnafu { dataset: "review" })
            }
        });

        let ((business, business_retries), (review, review_retries)) =
            try_join(business_stage, review_stage).await?;
        self.stats.retries += business_retries + review_retries;
        Ok((business, review))
    }

    /// Join the two sampled snapshots into the merged snapshot.
    async fn merge(
        &mut self,
        business: &SampleOutcome,
        review: &SampleOutcome,
    ) -> Result<MergeOutcome, PipelineError> {
        let sources = self.config.sources.clone();
        let row_cap = self.config.sample_size;
        let left = business.snapshot.clone();
        let right = review.snapshot.clone();
        let output = self.ctx.snapshot_path("merged_yelp.csv");

        let (merged, retries) = run_stage("merge", &self.retry, &self.shutdown, move || {
            let merger = Merger::new(&sources, row_cap);
            let (left, right, output) = (left.clone(), right.clone(), output.clone());
            async move { merger.run(&left, &right, &output).await.context(MergeSnafu) }
        })
        .await?;
        self.stats.retries += retries;
        Ok(merged)
    }

    /// Replace the warehouse table with the merged snapshot.
    async fn load(&mut self, merged: &MergeOutcome) -> Result<LoadReport, PipelineError> {
        let warehouse = self.config.warehouse.clone();
        let table = self.config.warehouse.table_ident().context(ConfigSnafu)?;
        let input = merged.snapshot.clone();

        let (report, retries) = run_stage("load", &self.retry, &self.shutdown, move || {
            let loader = Loader::new(&warehouse, table.clone());
            let input = input.clone();
            async move { loader.run(&input).await.context(LoadSnafu) }
        })
        .await?;
        self.stats.retries += retries;
        Ok(report)
    }

    /// Aggregate the loaded table and publish the chart.
    async fn analyze(&mut self) -> Result<AnalyzeOutcome, PipelineError> {
        let url = self.config.warehouse.url.clone();
        let table = self.config.warehouse.table_ident().context(ConfigSnafu)?;
        let analytics = self.config.analytics.clone();

        let (outcome, retries) = run_stage("analyze", &self.retry, &self.shutdown, move || {
            let analyzer = Analyzer::new(&url, table.clone(), &analytics);
            async move { analyzer.run().await.context(AnalyzeSnafu) }
        })
        .await?;
        self.stats.retries += retries;
        Ok(outcome)
    }

    /// Reclaim this run's scratch directory.
    async fn cleanup(&mut self) -> Result<usize, PipelineError> {
        let run_dir = self.ctx.run_dir().to_path_buf();

        let (outcome, retries) = run_stage("cleanup", &self.retry, &self.shutdown, move || {
            let reclaimer = Reclaimer::new(run_dir.clone());
            async move { reclaimer.run().await.context(CleanupSnafu) }
        })
        .await?;
        self.stats.retries += retries;
        Ok(outcome.reclaimed)
    }

    fn check_shutdown(&self) -> Result<(), PipelineError> {
        ensure!(!self.shutdown.is_cancelled(), CancelledSnafu);
        Ok(())
    }
}

/// Run the pipeline with the given configuration.
pub async fn run_pipeline(
    config: Config,
    run_id: Option<String>,
) -> Result<PipelineStats, PipelineError> {
    let shutdown = CancellationToken::new();

    // Set up signal handler for graceful shutdown
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            signal::shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let ctx = RunContext::new(&config.scratch.root, run_id);
    let pipeline = Pipeline::new(config, ctx, shutdown);
    pipeline.run().await
}
