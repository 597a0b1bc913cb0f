//! graupel: a scheduled batch pipeline over Yelp-style datasets.
//!
//! This library samples two large NDJSON datasets, joins the samples on a
//! shared key, replaces a warehouse table with the joined rows, renders an
//! aggregate chart over the loaded data, and reclaims its transient files.
//!
//! # Example
//!
//! ```ignore
//! use graupel::{Config, run_pipeline, error::PipelineError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = Config::from_file("graupel.yaml")?;
//!     let stats = run_pipeline(config, None).await?;
//!     println!("Loaded {} rows", stats.rows_loaded);
//!     Ok(())
//! }
//! ```

pub mod analyze;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod load;
pub mod merge;
pub mod metrics;
pub mod pipeline;
pub mod sample;
pub mod snapshot;
pub mod warehouse;

// Re-export main types
pub use config::Config;
pub use pipeline::{Pipeline, PipelineStats, RunContext, run_pipeline};
