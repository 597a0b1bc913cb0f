//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the pipeline.
//! Events implement the `InternalEvent` trait which emits the corresponding
//! Prometheus counter metric.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when records are sampled from a source dataset.
pub struct RecordsSampled {
    pub dataset: &'static str,
    pub count: u64,
}

impl InternalEvent for RecordsSampled {
    fn emit(self) {
        trace!(dataset = self.dataset, count = self.count, "Records sampled");
        counter!("graupel_records_sampled_total", "dataset" => self.dataset).increment(self.count);
    }
}

/// Event emitted when malformed source lines are skipped.
pub struct MalformedLines {
    pub dataset: &'static str,
    pub count: u64,
}

impl InternalEvent for MalformedLines {
    fn emit(self) {
        trace!(
            dataset = self.dataset,
            count = self.count,
            "Malformed lines skipped"
        );
        counter!("graupel_malformed_lines_total", "dataset" => self.dataset).increment(self.count);
    }
}

/// Event emitted when joined rows are produced by the merge stage.
pub struct RowsMerged {
    pub count: u64,
}

impl InternalEvent for RowsMerged {
    fn emit(self) {
        trace!(count = self.count, "Rows merged");
        counter!("graupel_rows_merged_total").increment(self.count);
    }
}

/// Event emitted when rows are loaded into the warehouse.
pub struct RowsLoaded {
    pub count: u64,
}

impl InternalEvent for RowsLoaded {
    fn emit(self) {
        trace!(count = self.count, "Rows loaded");
        counter!("graupel_rows_loaded_total").increment(self.count);
    }
}

/// Event emitted when the aggregation query returns its groups.
pub struct AggregateGroups {
    pub count: usize,
}

impl InternalEvent for AggregateGroups {
    fn emit(self) {
        trace!(count = self.count, "Aggregate groups");
        gauge!("graupel_aggregate_groups").set(self.count as f64);
    }
}

/// Event emitted when a chart image is published.
pub struct ChartWritten;

impl InternalEvent for ChartWritten {
    fn emit(self) {
        trace!("Chart written");
        counter!("graupel_charts_written_total").increment(1);
    }
}

/// Event emitted when scratch entries are reclaimed.
pub struct ScratchReclaimed {
    pub entries: u64,
}

impl InternalEvent for ScratchReclaimed {
    fn emit(self) {
        trace!(entries = self.entries, "Scratch reclaimed");
        counter!("graupel_scratch_entries_reclaimed_total").increment(self.entries);
    }
}

// ============================================================================
// Stage lifecycle events
// ============================================================================

/// Final status of a pipeline stage.
#[derive(Debug, Clone, Copy)]
pub enum StageStatus {
    Success,
    Failed,
}

impl StageStatus {
    fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Success => "success",
            StageStatus::Failed => "failed",
        }
    }
}

/// Event emitted when a pipeline stage finishes.
pub struct StageCompleted {
    pub stage: &'static str,
    pub status: StageStatus,
}

impl InternalEvent for StageCompleted {
    fn emit(self) {
        trace!(
            stage = self.stage,
            status = self.status.as_str(),
            "Stage completed"
        );
        counter!(
            "graupel_stages_completed_total",
            "stage" => self.stage,
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a stage attempt fails and is scheduled again.
pub struct StageRetried {
    pub stage: &'static str,
}

impl InternalEvent for StageRetried {
    fn emit(self) {
        trace!(stage = self.stage, "Stage retried");
        counter!("graupel_stage_retries_total", "stage" => self.stage).increment(1);
    }
}

/// Event emitted with the wall-clock duration of a stage attempt.
pub struct StageDuration {
    pub stage: &'static str,
    pub duration: Duration,
}

impl InternalEvent for StageDuration {
    fn emit(self) {
        trace!(
            stage = self.stage,
            duration_ms = self.duration.as_millis(),
            "Stage duration"
        );
        histogram!("graupel_stage_duration_seconds", "stage" => self.stage)
            .record(self.duration.as_secs_f64());
    }
}
