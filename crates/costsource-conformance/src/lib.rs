//! Cost Source Plugin Conformance Suite
//!
//! Certifies a [`CostSourcePlugin`](costsource_types::CostSourcePlugin)
//! implementation at one of three cumulative levels by driving it through
//! an in-process harness that keeps the serialization boundary, per-call
//! deadlines and classified status codes of a real RPC transport.
//!
//! # Levels
//!
//! | Level | Categories | Concurrency | Latency rule |
//! |-------|------------|-------------|--------------|
//! | Basic | Spec, RPC | n/a | n/a |
//! | Standard | Spec, RPC, Performance, Concurrency | 10 tasks | p95 vs Standard baseline |
//! | Advanced | Spec, RPC, Performance, Concurrency | 50 tasks | max vs Advanced baseline |
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use costsource_conformance::{mock::MockPlugin, run_basic_conformance, ConformanceLevel};
//!
//! # #[tokio::main(flavor = "multi_thread", worker_threads = 2)]
//! # async fn main() {
//! let result = run_basic_conformance(Arc::new(MockPlugin::new())).await.unwrap();
//! assert_eq!(result.achieved_level, Some(ConformanceLevel::Basic));
//! println!("{}", result);
//! # }
//! ```
//!
//! The harness needs a multi-thread Tokio runtime; anything else is
//! rejected before a run starts.

#![deny(unsafe_code)]

pub mod baseline;
pub mod config;
pub mod error;
pub mod harness;
pub mod mock;
pub mod report;
pub mod stats;
pub mod suite;
pub mod types;
pub mod validators;

// Re-export key types at crate root.
pub use baseline::{BaselineEntry, PerformanceBaseline};
pub use config::{ConcurrencyConfig, PerformanceConfig, RequestFixture, SuiteConfig};
pub use error::{HarnessError, HarnessResult, SuiteError, SuiteResult};
pub use harness::{CallRecord, CrashLedger, Harness, CRASHED_EARLIER};
pub use report::{StructuredReport, SCHEMA_VERSION};
pub use suite::{
    run_advanced_conformance, run_basic_conformance, run_standard_conformance, ConformanceSuite,
    SuiteState,
};
pub use types::{
    achieved_level, CategoryResult, CategoryStatus, ConformanceLevel, ConformanceResult,
    OutcomeStatus, RunSummary, TestCategory, TestOutcome,
};
pub use validators::CategoryValidator;
