//! Run-scoped paths for transient artifacts.

use chrono::Utc;
use std::path::{Path, PathBuf};

/// Identifies one pipeline run and namespaces its scratch storage.
///
/// Every transient artifact lives under `<scratch_root>/<run_id>/`, so
/// concurrent runs never clobber each other and cleanup can reclaim one
/// run without touching another.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: String,
    run_dir: PathBuf,
}

impl RunContext {
    /// Create a context under `scratch_root`, deriving a timestamped run id
    /// when none is supplied.
    pub fn new(scratch_root: &str, run_id: Option<String>) -> Self {
        let run_id =
            run_id.unwrap_or_else(|| Utc::now().format("run-%Y%m%d-%H%M%S").to_string());
        let run_dir = Path::new(scratch_root).join(&run_id);
        Self { run_id, run_dir }
    }

    /// The identifier of this run.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The scratch directory owned by this run.
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Path of a named transient artifact inside the run directory.
    pub fn snapshot_path(&self, name: &str) -> PathBuf {
        self.run_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_run_id() {
        let ctx = RunContext::new("/tmp/scratch", Some("run-test".to_string()));
        assert_eq!(ctx.run_id(), "run-test");
        assert_eq!(ctx.run_dir(), Path::new("/tmp/scratch/run-test"));
        assert_eq!(
            ctx.snapshot_path("merged.csv"),
            Path::new("/tmp/scratch/run-test/merged.csv")
        );
    }

    #[test]
    fn test_derived_run_id_is_timestamped() {
        let ctx = RunContext::new("/tmp/scratch", None);
        assert!(ctx.run_id().starts_with("run-"));
        assert!(ctx.run_dir().starts_with("/tmp/scratch"));
    }
}
