//! Pipelab Core: values, market data, symbol registry, call interception, lazy task graph.
//!
//! This crate contains the building blocks of the pipeline:
//! - Dynamic values and date-indexed frames
//! - Market data providers (Yahoo Finance, synthetic, closed-form fixture)
//! - Metric extraction and signal generation
//! - Symbol registry with declared signatures and argument binding
//! - Call interceptor capturing the arguments of a single call
//! - Lazy task graph with partial evaluation
//! - Deep diff of value trees

pub mod data;
pub mod diff;
pub mod frame;
pub mod graph;
pub mod intercept;
pub mod library;
pub mod metrics;
pub mod signals;
pub mod symbols;
pub mod value;

pub use frame::{Frame, FrameError};
pub use intercept::{intercept, InterceptError};
pub use value::Value;
