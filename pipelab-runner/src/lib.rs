//! Pipelab Runner: pipeline assembly, cached fixtures, non-regression snapshots.
//!
//! This crate builds on `pipelab-core` to provide:
//! - The lazy pipeline graph and its eager counterpart
//! - Argument comparison between the two through call interception
//! - TOML configuration of tickers, dates and provider
//! - Cached pipeline fixtures shared by test runs
//! - Non-regression snapshots with per-node partial evaluation
//! - CSV and Markdown export

pub mod cache;
pub mod config;
pub mod export;
pub mod pipeline;
pub mod snapshot;

pub use cache::{CacheError, CachePolicy, PipelineCache};
pub use config::{ConfigError, PipelineConfig, PipelineParams, ProviderKind};
pub use pipeline::{
    compare_signal_arguments, eager_signals, full_pipeline, EvaluatedPipeline, Pipeline,
    PipelineError,
};
pub use snapshot::{check_node, non_regression_nodes, regenerate, NonRegressionError, Regeneration, Snapshot};
