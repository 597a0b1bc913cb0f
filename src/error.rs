//! Error types for graupel using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;
use std::path::PathBuf;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{}", errors.join("\n")))]
    EnvInterpolation { errors: Vec<String> },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Sample size is zero.
    #[snafu(display("sample_size must be greater than zero"))]
    ZeroSampleSize,

    /// Source path is empty.
    #[snafu(display("Source path for the {dataset} dataset cannot be empty"))]
    EmptySourcePath { dataset: String },

    /// Join key is empty.
    #[snafu(display("Join key for the {dataset} dataset cannot be empty"))]
    EmptyJoinKey { dataset: String },

    /// Dataset has no projected fields.
    #[snafu(display("The {dataset} dataset must project at least one field"))]
    NoProjectedFields { dataset: String },

    /// Two projected fields emit the same snapshot column.
    #[snafu(display("Column '{column}' is projected more than once by the {dataset} dataset"))]
    DuplicateProjectedColumn { dataset: String, column: String },

    /// Join key does not appear among the projected output columns.
    #[snafu(display("Join key '{key}' is not a projected column of the {dataset} dataset"))]
    JoinKeyNotProjected { dataset: String, key: String },

    /// Scratch root is empty.
    #[snafu(display("Scratch root cannot be empty"))]
    EmptyScratchRoot,

    /// Warehouse connection string is empty.
    #[snafu(display("Warehouse URL cannot be empty"))]
    EmptyWarehouseUrl,

    /// Destination table identifier is not of the form schema.table.
    #[snafu(display("Invalid destination table identifier '{table}' (expected schema.table)"))]
    InvalidTableIdent { table: String },

    /// Analytics column is not part of the merged snapshot schema.
    #[snafu(display("Analytics column '{column}' is not produced by the merge (columns: {})", available.join(", ")))]
    UnknownAnalyticsColumn {
        column: String,
        available: Vec<String>,
    },

    /// Top-N bound is zero.
    #[snafu(display("analytics.top_n must be greater than zero"))]
    ZeroTopN,

    /// Chart output path is empty.
    #[snafu(display("Chart path cannot be empty"))]
    EmptyChartPath,
}

// ============ Snapshot Errors ============

/// Errors that can occur while reading or writing tabular snapshots.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SnapshotError {
    /// CSV encoding failed.
    #[snafu(display("Failed to encode snapshot {}", path.display()))]
    Encode { path: PathBuf, source: csv::Error },

    /// Failed to create the snapshot file or its parent directory.
    #[snafu(display("Failed to create snapshot {}", path.display()))]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to publish the finished snapshot into place.
    #[snafu(display("Failed to publish snapshot {}", path.display()))]
    Publish {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to open the snapshot file.
    #[snafu(display("Failed to open snapshot {}", path.display()))]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// CSV decoding failed.
    #[snafu(display("Failed to read snapshot {}", path.display()))]
    Read { path: PathBuf, source: csv::Error },
}

// ============ Sample Errors ============

/// Errors that can occur while sampling a source dataset.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SampleError {
    /// Source file is missing or unreadable.
    #[snafu(display("Source file {} is unavailable", path.display()))]
    SourceUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Sample snapshot could not be written.
    #[snafu(display("Failed to write sample snapshot {}", path.display()))]
    WriteFailure {
        path: PathBuf,
        source: SnapshotError,
    },
}

// ============ Merge Errors ============

/// Errors that can occur while joining two sampled snapshots.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MergeError {
    /// An input snapshot is absent (its producer did not run or failed).
    #[snafu(display("Merge input {} is missing", path.display()))]
    MissingInput { path: PathBuf },

    /// The join-key column is absent from an input's header.
    #[snafu(display("Join key column '{column}' not found in {}", path.display()))]
    SchemaMismatch { column: String, path: PathBuf },

    /// Both sides carry the same non-key column name.
    #[snafu(display("Column '{column}' appears on both sides of the merge"))]
    DuplicateColumn { column: String },

    /// An input snapshot could not be read.
    #[snafu(display("Failed to read merge input"))]
    MergeRead { source: SnapshotError },

    /// The merged snapshot could not be written.
    #[snafu(display("Failed to write merged snapshot {}", path.display()))]
    MergeWrite {
        path: PathBuf,
        source: SnapshotError,
    },
}

// ============ Load Errors ============

/// Errors that can occur while replacing the warehouse table contents.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoadError {
    /// The merged snapshot is absent.
    #[snafu(display("Merged snapshot {} is missing", path.display()))]
    MissingSnapshot { path: PathBuf },

    /// The merged snapshot could not be read.
    #[snafu(display("Failed to read merged snapshot"))]
    ReadSnapshot { source: SnapshotError },

    /// The warehouse could not be reached or the connection dropped.
    #[snafu(display("Warehouse connection failed"))]
    ConnectionError { source: tokio_postgres::Error },

    /// A load statement failed; the transaction was rolled back.
    #[snafu(display("Load failed and was rolled back"))]
    LoadFailure { source: tokio_postgres::Error },
}

// ============ Analyze Errors ============

/// Errors that can occur while aggregating and charting the loaded table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AnalyzeError {
    /// The warehouse could not be reached or the connection dropped.
    #[snafu(display("Warehouse connection failed"))]
    AnalyzeConnection { source: tokio_postgres::Error },

    /// The destination table does not exist.
    #[snafu(display("Destination table {table} does not exist"))]
    TableMissing { table: String },

    /// The aggregation query failed.
    #[snafu(display("Aggregation query failed"))]
    QueryError { source: tokio_postgres::Error },

    /// Chart rendering failed.
    #[snafu(display("Failed to render chart: {message}"))]
    ChartRender { message: String },

    /// The chart artifact could not be written.
    #[snafu(display("Failed to write chart {}", path.display()))]
    ChartWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============ Cleanup Errors ============

/// Errors that can occur while reclaiming scratch storage.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CleanupError {
    /// An existing scratch entry could not be removed.
    #[snafu(display("Failed to delete {}", path.display()))]
    DeletionError {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Pipeline Error (top-level) ============

/// Top-level pipeline errors that aggregate all stage error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// A sampler stage failed.
    #[snafu(display("Sample stage ({dataset}) failed"))]
    Sample {
        dataset: &'static str,
        source: SampleError,
    },

    /// The merge stage failed.
    #[snafu(display("Merge stage failed"))]
    Merge { source: MergeError },

    /// The load stage failed.
    #[snafu(display("Load stage failed"))]
    Load { source: LoadError },

    /// The analyze stage failed.
    #[snafu(display("Analyze stage failed"))]
    Analyze { source: AnalyzeError },

    /// The cleanup stage failed.
    #[snafu(display("Cleanup stage failed"))]
    Cleanup { source: CleanupError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },

    /// The run was cancelled by a shutdown signal.
    #[snafu(display("Run cancelled by shutdown signal"))]
    Cancelled,
}

impl PipelineError {
    /// Check if retrying the failed stage could plausibly succeed.
    ///
    /// Only warehouse connectivity failures qualify: schema problems, bad
    /// input, and missing files reproduce identically on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Load {
                source: LoadError::ConnectionError { .. }
            } | PipelineError::Analyze {
                source: AnalyzeError::AnalyzeConnection { .. }
            }
        )
    }
}
