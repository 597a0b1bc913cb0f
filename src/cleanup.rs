//! Reclaiming run-scoped scratch storage.
//!
//! Removes every entry under the run's scratch directory and then the
//! directory itself. Safe to invoke standalone: a directory that is already
//! gone counts as nothing to reclaim.

use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::emit;
use crate::error::{CleanupError, DeletionSnafu};
use crate::metrics::events::ScratchReclaimed;

/// Result of reclaiming one run's scratch directory.
#[derive(Debug)]
pub struct CleanupOutcome {
    /// Top-level scratch entries removed.
    pub reclaimed: usize,
}

/// Removes the transient artifacts of one run.
pub struct Reclaimer {
    run_dir: PathBuf,
}

impl Reclaimer {
    /// Create a reclaimer for one run's scratch directory.
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    /// Delete the run directory and everything under it.
    ///
    /// Any entry that cannot be removed fails the stage; partial removal is
    /// fine to retry since deletion is idempotent.
    pub async fn run(&self) -> Result<CleanupOutcome, CleanupError> {
        let mut dir = match tokio::fs::read_dir(&self.run_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Scratch directory {} is already gone", self.run_dir.display());
                return Ok(CleanupOutcome { reclaimed: 0 });
            }
            Err(source) => {
                return Err(CleanupError::DeletionError {
                    path: self.run_dir.clone(),
                    source,
                });
            }
        };

        let mut reclaimed = 0usize;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context(DeletionSnafu { path: &self.run_dir })?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .context(DeletionSnafu { path: &path })?;
            if file_type.is_dir() {
                tokio::fs::remove_dir_all(&path)
                    .await
                    .context(DeletionSnafu { path: &path })?;
            } else {
                tokio::fs::remove_file(&path)
                    .await
                    .context(DeletionSnafu { path: &path })?;
            }
            debug!("Removed {}", path.display());
            reclaimed += 1;
        }
        drop(dir);
        tokio::fs::remove_dir(&self.run_dir)
            .await
            .context(DeletionSnafu { path: &self.run_dir })?;

        info!(
            "Reclaimed {} scratch entries from {}",
            reclaimed,
            self.run_dir.display()
        );
        emit!(ScratchReclaimed {
            entries: reclaimed as u64,
        });

        Ok(CleanupOutcome { reclaimed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reclaims_files_and_subdirectories() {
        let temp_dir = TempDir::new().unwrap();
        let run_dir = temp_dir.path().join("run-1");
        tokio::fs::create_dir_all(run_dir.join("sampled"))
            .await
            .unwrap();
        tokio::fs::write(run_dir.join("merged.csv"), "a,b\n")
            .await
            .unwrap();
        tokio::fs::write(run_dir.join("sampled").join("business.csv"), "a\n")
            .await
            .unwrap();

        let outcome = Reclaimer::new(&run_dir).run().await.unwrap();

        assert_eq!(outcome.reclaimed, 2);
        assert!(!run_dir.exists());
        assert!(temp_dir.path().exists());
    }

    #[tokio::test]
    async fn test_missing_directory_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let reclaimer = Reclaimer::new(temp_dir.path().join("run-absent"));

        let outcome = reclaimer.run().await.unwrap();
        assert_eq!(outcome.reclaimed, 0);
    }

    #[tokio::test]
    async fn test_rerun_after_success_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let run_dir = temp_dir.path().join("run-2");
        tokio::fs::create_dir_all(&run_dir).await.unwrap();

        let reclaimer = Reclaimer::new(&run_dir);
        reclaimer.run().await.unwrap();
        let outcome = reclaimer.run().await.unwrap();

        assert_eq!(outcome.reclaimed, 0);
    }

    #[tokio::test]
    async fn test_scratch_path_that_is_a_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run-3");
        tokio::fs::write(&path, "not a directory").await.unwrap();

        let err = Reclaimer::new(&path).run().await.unwrap_err();

        assert!(matches!(err, CleanupError::DeletionError { .. }));
        assert!(path.exists());
    }
}
