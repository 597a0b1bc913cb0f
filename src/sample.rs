//! Prefix sampling of NDJSON source datasets.
//!
//! Reads a newline-delimited JSON file record by record, projects the
//! configured fields out of each one, and publishes the first N well-formed
//! records as a tabular snapshot. Reading stops as soon as the sample is
//! full, so source files may be arbitrarily large.

use snafu::prelude::*;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::config::{DatasetConfig, FieldConfig};
use crate::emit;
use crate::error::{SampleError, SourceUnavailableSnafu, WriteFailureSnafu};
use crate::metrics::events::{MalformedLines, RecordsSampled};
use crate::snapshot;

/// Result of sampling one source dataset.
#[derive(Debug)]
pub struct SampleOutcome {
    /// Path of the published snapshot.
    pub snapshot: PathBuf,
    /// Well-formed records written to the snapshot.
    pub sampled: usize,
    /// Malformed lines skipped; these do not count toward the sample.
    pub malformed: usize,
}

/// Samples a prefix of one NDJSON source dataset into a snapshot.
pub struct Sampler {
    dataset: &'static str,
    source: PathBuf,
    fields: Vec<FieldConfig>,
    sample_size: usize,
}

impl Sampler {
    /// Create a sampler for one configured dataset.
    pub fn new(dataset: &'static str, config: &DatasetConfig, sample_size: usize) -> Self {
        Self {
            dataset,
            source: PathBuf::from(&config.path),
            fields: config.fields.clone(),
            sample_size,
        }
    }

    /// Sample up to `sample_size` records from the source into `output`.
    ///
    /// Lines that fail to parse as JSON objects are skipped with a warning
    /// and replaced by later well-formed records, so a full sample is
    /// produced whenever the source holds enough of them.
    pub async fn run(&self, output: &Path) -> Result<SampleOutcome, SampleError> {
        let file = File::open(&self.source)
            .await
            .context(SourceUnavailableSnafu { path: &self.source })?;
        let mut lines = BufReader::new(file).lines();

        let columns: Vec<String> = self.fields.iter().map(|f| f.column().to_string()).collect();
        let mut rows = Vec::with_capacity(self.sample_size);
        let mut malformed = 0usize;

        while rows.len() < self.sample_size {
            let line = lines
                .next_line()
                .await
                .context(SourceUnavailableSnafu { path: &self.source })?;
            let Some(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(&line) {
                Ok(serde_json::Value::Object(record)) => rows.push(self.project(&record)),
                Ok(_) | Err(_) => malformed += 1,
            }
        }

        snapshot::write_rows(output, &columns, &rows)
            .await
            .context(WriteFailureSnafu { path: output })?;

        if malformed > 0 {
            warn!(
                "Skipped {malformed} malformed lines in {}",
                self.source.display()
            );
            emit!(MalformedLines {
                dataset: self.dataset,
                count: malformed as u64,
            });
        }
        debug!(
            "Sampled {} records (of up to {}) from {}",
            rows.len(),
            self.sample_size,
            self.source.display()
        );
        emit!(RecordsSampled {
            dataset: self.dataset,
            count: rows.len() as u64,
        });

        Ok(SampleOutcome {
            snapshot: output.to_path_buf(),
            sampled: rows.len(),
            malformed,
        })
    }

    fn project(&self, record: &serde_json::Map<String, serde_json::Value>) -> Vec<String> {
        self.fields
            .iter()
            .map(|field| {
                let value = record.get(&field.name).map(render_value).unwrap_or_default();
                match field.max_chars {
                    Some(max) => truncate_chars(value, max),
                    None => value,
                }
            })
            .collect()
    }
}

/// Render a JSON value as snapshot text. Strings are taken verbatim,
/// null becomes empty, and everything else keeps its JSON form.
fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_chars(mut s: String, max: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
    s
}
