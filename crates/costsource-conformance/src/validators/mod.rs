//! The four category validators.
//!
//! Each validator is independent: it receives the shared harness and the
//! run configuration, issues its own calls and returns a finished
//! [`CategoryResult`]. Plugin misbehaviour is always reported as outcomes,
//! never as an error.

use async_trait::async_trait;

use crate::config::SuiteConfig;
use crate::harness::Harness;
use crate::types::{CategoryResult, TestCategory};

pub mod concurrency;
pub mod performance;
pub mod rpc;
pub mod spec;

pub use concurrency::ConcurrencyValidator;
pub use performance::PerformanceValidator;
pub use rpc::RpcCorrectnessValidator;
pub use spec::SpecValidator;

/// A runnable group of checks.
#[async_trait]
pub trait CategoryValidator: Send + Sync {
    fn category(&self) -> TestCategory;

    async fn validate(&self, harness: &Harness, config: &SuiteConfig) -> CategoryResult;
}

/// The validator that owns `category`.
pub fn validator_for(category: TestCategory) -> Box<dyn CategoryValidator> {
    match category {
        TestCategory::SpecValidation => Box::new(SpecValidator),
        TestCategory::RpcCorrectness => Box::new(RpcCorrectnessValidator),
        TestCategory::Performance => Box::new(PerformanceValidator),
        TestCategory::Concurrency => Box::new(ConcurrencyValidator),
    }
}

/// Milliseconds elapsed since `start`, saturating.
pub(crate) fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
