//! Stress driver for the SplitRef queue.
//!
//! Spawns producers pushing disjoint integer ranges and consumers popping
//! with backoff, then checks that nothing was lost, duplicated or reordered
//! per producer, and that every node was reclaimed exactly once.

pub mod config;
pub mod error;
pub mod report;
pub mod runner;

pub use config::StressConfig;
pub use error::{Result, StressError};
pub use report::OutputFormat;
pub use runner::{run, run_round, RoundReport, StressReport};
