//! Inner join of the two sampled snapshots.
//!
//! Builds a hash map over the business side, then probes it with each review
//! row in file order. The merged header is the business columns followed by
//! the review columns minus its join key, and the output is written through
//! the same atomic snapshot path as the samplers use.

use snafu::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::SourcesConfig;
use crate::emit;
use crate::error::{
    DuplicateColumnSnafu, MergeError, MergeWriteSnafu, MissingInputSnafu, SchemaMismatchSnafu,
    SnapshotError,
};
use crate::metrics::events::RowsMerged;
use crate::snapshot;

/// Result of merging the two sampled snapshots.
#[derive(Debug)]
pub struct MergeOutcome {
    /// Path of the published merged snapshot.
    pub snapshot: PathBuf,
    /// Joined rows written.
    pub rows: usize,
}

/// Joins two sampled snapshots on their configured key columns.
pub struct Merger {
    left_key: String,
    right_key: String,
    row_cap: usize,
}

impl Merger {
    /// Create a merger for the configured sources, bounding the output to
    /// `row_cap` joined rows.
    pub fn new(sources: &SourcesConfig, row_cap: usize) -> Self {
        Self {
            left_key: sources.business.join_key.clone(),
            right_key: sources.review.join_key.clone(),
            row_cap,
        }
    }

    /// Join `left` and `right` into `output`.
    ///
    /// Every review row joins against every business row sharing its key, so
    /// duplicate keys multiply output rows. Rows with an empty key never
    /// match. Output order follows the review side, which keeps reruns over
    /// identical inputs byte-stable.
    pub async fn run(
        &self,
        left: &Path,
        right: &Path,
        output: &Path,
    ) -> Result<MergeOutcome, MergeError> {
        let (left_columns, left_rows) = read_input(left).await?;
        let (right_columns, right_rows) = read_input(right).await?;

        let left_key_idx = left_columns
            .iter()
            .position(|c| *c == self.left_key)
            .context(SchemaMismatchSnafu {
                column: &self.left_key,
                path: left,
            })?;
        let right_key_idx = right_columns
            .iter()
            .position(|c| *c == self.right_key)
            .context(SchemaMismatchSnafu {
                column: &self.right_key,
                path: right,
            })?;

        let mut columns = left_columns.clone();
        for (idx, column) in right_columns.iter().enumerate() {
            if idx == right_key_idx {
                continue;
            }
            ensure!(!columns.contains(column), DuplicateColumnSnafu { column });
            columns.push(column.clone());
        }

        let mut by_key: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, row) in left_rows.iter().enumerate() {
            let key = row[left_key_idx].as_str();
            if key.is_empty() {
                continue;
            }
            by_key.entry(key).or_default().push(idx);
        }
        debug!(
            "Probing {} review rows against {} distinct business keys",
            right_rows.len(),
            by_key.len()
        );

        let mut rows = Vec::new();
        'probe: for right_row in &right_rows {
            let key = right_row[right_key_idx].as_str();
            if key.is_empty() {
                continue;
            }
            let Some(matches) = by_key.get(key) else {
                continue;
            };
            for &left_idx in matches {
                if rows.len() >= self.row_cap {
                    break 'probe;
                }
                let mut merged = left_rows[left_idx].clone();
                merged.extend(
                    right_row
                        .iter()
                        .enumerate()
                        .filter(|(idx, _)| *idx != right_key_idx)
                        .map(|(_, value)| value.clone()),
                );
                rows.push(merged);
            }
        }

        snapshot::write_rows(output, &columns, &rows)
            .await
            .context(MergeWriteSnafu { path: output })?;

        info!("Merged {} rows into {}", rows.len(), output.display());
        emit!(RowsMerged {
            count: rows.len() as u64,
        });

        Ok(MergeOutcome {
            snapshot: output.to_path_buf(),
            rows: rows.len(),
        })
    }
}

/// Read one merge input, reporting an absent file as `MissingInput` so an
/// upstream sampler failure propagates instead of producing an empty join.
async fn read_input(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), MergeError> {
    match snapshot::read_rows(path).await {
        Ok(table) => Ok(table),
        Err(SnapshotError::Open { ref source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            MissingInputSnafu { path }.fail()
        }
        Err(source) => Err(MergeError::MergeRead { source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatasetConfig, FieldConfig};
    use tempfile::TempDir;

    fn sources() -> SourcesConfig {
        let field = |name: &str| FieldConfig {
            name: name.to_string(),
            rename: None,
            max_chars: None,
        };
        SourcesConfig {
            business: DatasetConfig {
                path: "business.json".to_string(),
                join_key: "business_id".to_string(),
                fields: vec![field("business_id"), field("city")],
            },
            review: DatasetConfig {
                path: "review.json".to_string(),
                join_key: "business_id".to_string(),
                fields: vec![field("business_id"), field("review_stars")],
            },
        }
    }

    fn rows(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect()
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    async fn write_snapshot(path: &Path, cols: &[&str], data: &[&[&str]]) {
        snapshot::write_rows(path, &columns(cols), &rows(data))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_inner_join_multiplicity() {
        let temp_dir = TempDir::new().unwrap();
        let left = temp_dir.path().join("business.csv");
        let right = temp_dir.path().join("review.csv");
        let output = temp_dir.path().join("merged.csv");

        write_snapshot(
            &left,
            &["business_id", "city"],
            &[&["b1", "Dover"], &["b2", "Calais"]],
        )
        .await;
        write_snapshot(
            &right,
            &["business_id", "review_stars"],
            &[&["b1", "4"], &["b1", "5"], &["b2", "3"], &["b3", "1"]],
        )
        .await;

        let outcome = Merger::new(&sources(), 5000)
            .run(&left, &right, &output)
            .await
            .unwrap();
        assert_eq!(outcome.rows, 3);

        let (cols, merged) = snapshot::read_rows(&output).await.unwrap();
        assert_eq!(cols, vec!["business_id", "city", "review_stars"]);
        assert_eq!(
            merged,
            rows(&[
                &["b1", "Dover", "4"],
                &["b1", "Dover", "5"],
                &["b2", "Calais", "3"],
            ])
        );
    }

    #[tokio::test]
    async fn test_rerun_is_byte_stable() {
        let temp_dir = TempDir::new().unwrap();
        let left = temp_dir.path().join("business.csv");
        let right = temp_dir.path().join("review.csv");

        write_snapshot(
            &left,
            &["business_id", "city"],
            &[&["b2", "Calais"], &["b1", "Dover"]],
        )
        .await;
        write_snapshot(
            &right,
            &["business_id", "review_stars"],
            &[&["b1", "4"], &["b2", "2"], &["b1", "5"]],
        )
        .await;

        let merger = Merger::new(&sources(), 5000);
        let first = temp_dir.path().join("merged_a.csv");
        let second = temp_dir.path().join("merged_b.csv");
        merger.run(&left, &right, &first).await.unwrap();
        merger.run(&left, &right, &second).await.unwrap();

        let a = tokio::fs::read(&first).await.unwrap();
        let b = tokio::fs::read(&second).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_row_cap_bounds_output() {
        let temp_dir = TempDir::new().unwrap();
        let left = temp_dir.path().join("business.csv");
        let right = temp_dir.path().join("review.csv");
        let output = temp_dir.path().join("merged.csv");

        write_snapshot(&left, &["business_id", "city"], &[&["b1", "Dover"]]).await;
        write_snapshot(
            &right,
            &["business_id", "review_stars"],
            &[&["b1", "1"], &["b1", "2"], &["b1", "3"]],
        )
        .await;

        let outcome = Merger::new(&sources(), 2)
            .run(&left, &right, &output)
            .await
            .unwrap();
        assert_eq!(outcome.rows, 2);
    }

    #[tokio::test]
    async fn test_empty_keys_never_match() {
        let temp_dir = TempDir::new().unwrap();
        let left = temp_dir.path().join("business.csv");
        let right = temp_dir.path().join("review.csv");
        let output = temp_dir.path().join("merged.csv");

        write_snapshot(&left, &["business_id", "city"], &[&["", "Nowhere"]]).await;
        write_snapshot(&right, &["business_id", "review_stars"], &[&["", "5"]]).await;

        let outcome = Merger::new(&sources(), 5000)
            .run(&left, &right, &output)
            .await
            .unwrap();
        assert_eq!(outcome.rows, 0);

        let (cols, merged) = snapshot::read_rows(&output).await.unwrap();
        assert_eq!(cols, vec!["business_id", "city", "review_stars"]);
        assert!(merged.is_empty());
    }

    #[tokio::test]
    async fn test_missing_input_propagates() {
        let temp_dir = TempDir::new().unwrap();
        let left = temp_dir.path().join("business.csv");
        let right = temp_dir.path().join("absent.csv");
        let output = temp_dir.path().join("merged.csv");

        write_snapshot(&left, &["business_id", "city"], &[&["b1", "Dover"]]).await;

        let err = Merger::new(&sources(), 5000)
            .run(&left, &right, &output)
            .await
            .unwrap_err();
        assert!(matches!(err, MergeError::MissingInput { .. }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_absent_join_key_is_schema_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let left = temp_dir.path().join("business.csv");
        let right = temp_dir.path().join("review.csv");
        let output = temp_dir.path().join("merged.csv");

        write_snapshot(&left, &["not_the_key", "city"], &[&["b1", "Dover"]]).await;
        write_snapshot(&right, &["business_id", "review_stars"], &[&["b1", "4"]]).await;

        let err = Merger::new(&sources(), 5000)
            .run(&left, &right, &output)
            .await
            .unwrap_err();
        assert!(matches!(err, MergeError::SchemaMismatch { column, .. } if column == "business_id"));
    }

    #[tokio::test]
    async fn test_shared_non_key_column_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let left = temp_dir.path().join("business.csv");
        let right = temp_dir.path().join("review.csv");
        let output = temp_dir.path().join("merged.csv");

        write_snapshot(&left, &["business_id", "stars"], &[&["b1", "old"]]).await;
        write_snapshot(&right, &["business_id", "stars"], &[&["b1", "4"]]).await;

        let err = Merger::new(&sources(), 5000)
            .run(&left, &right, &output)
            .await
            .unwrap_err();
        assert!(matches!(err, MergeError::DuplicateColumn { column } if column == "stars"));
    }
}
