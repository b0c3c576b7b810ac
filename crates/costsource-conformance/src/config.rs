//! Suite configuration.
//!
//! Defaults are tuned per level via [`SuiteConfig::for_level`]. Every knob
//! can be overridden, and a configuration can be loaded from JSON.

use chrono::{DateTime, Utc};
use costsource_types::{
    EstimateCostRequest, GetActualCostRequest, GetPricingSpecRequest, GetProjectedCostRequest,
    GetRecommendationsRequest, NameRequest, Operation, ResourceDescriptor, RpcRequest,
    SupportsRequest,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::baseline::PerformanceBaseline;
use crate::error::{SuiteError, SuiteResult};
use crate::types::ConformanceLevel;

/// 2024-01-01T00:00:00Z
const FIXTURE_WINDOW_START: i64 = 1_704_067_200;
const FIXTURE_WINDOW_DAYS: i64 = 7;

/// Configuration for a conformance run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Level the run tries to certify.
    pub target_level: ConformanceLevel,
    /// Deadline applied to every single call.
    pub invoke_timeout_ms: u64,
    /// Wall-clock budget for the whole run.
    pub suite_timeout_ms: u64,
    /// Sampling knobs for the performance category.
    pub performance: PerformanceConfig,
    /// Load knobs for the concurrency category.
    pub concurrency: ConcurrencyConfig,
    /// Representative inputs used to build valid requests.
    pub fixture: RequestFixture,
    /// Latency and payload ceilings the performance category judges against.
    pub baseline: PerformanceBaseline,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self::for_level(ConformanceLevel::Basic)
    }
}

impl SuiteConfig {
    /// Defaults for a target level.
    pub fn for_level(level: ConformanceLevel) -> Self {
        let suite_timeout_ms = match level {
            ConformanceLevel::Basic => 30_000,
            ConformanceLevel::Standard => 60_000,
            ConformanceLevel::Advanced => 120_000,
        };
        Self {
            target_level: level,
            invoke_timeout_ms: 5_000,
            suite_timeout_ms,
            performance: PerformanceConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            fixture: RequestFixture::default(),
            baseline: PerformanceBaseline::default(),
        }
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> SuiteResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SuiteError::InvalidConfiguration(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_millis(self.invoke_timeout_ms)
    }

    pub fn suite_timeout(&self) -> Duration {
        Duration::from_millis(self.suite_timeout_ms)
    }

    /// Check every knob before a run starts.
    pub fn validate(&self) -> SuiteResult<()> {
        if self.invoke_timeout_ms == 0 {
            return Err(invalid("invoke_timeout_ms must be > 0"));
        }
        if self.suite_timeout_ms == 0 {
            return Err(invalid("suite_timeout_ms must be > 0"));
        }
        if self.performance.sample_iterations == 0 {
            return Err(invalid("performance.sample_iterations must be > 0"));
        }
        if self.performance.operations.is_empty() {
            return Err(invalid("performance.operations must not be empty"));
        }
        if self.concurrency.standard_parallelism == 0 || self.concurrency.advanced_parallelism == 0
        {
            return Err(invalid("concurrency parallelism must be > 0"));
        }
        if self.concurrency.requests_per_task == 0 {
            return Err(invalid("concurrency.requests_per_task must be > 0"));
        }
        if self.concurrency.operations.is_empty() {
            return Err(invalid("concurrency.operations must not be empty"));
        }
        if self.fixture.window_end <= self.fixture.window_start {
            return Err(invalid("fixture window_end must be after window_start"));
        }
        for op in &self.performance.operations {
            for level in self.target_level.up_to() {
                if self.baseline.get(*op, level).is_none() {
                    return Err(invalid(&format!(
                        "baseline has no entry for {} at {}",
                        op, level
                    )));
                }
            }
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> SuiteError {
    SuiteError::InvalidConfiguration(msg.to_string())
}

/// Sampling knobs for the performance category.
///
/// Warm-up calls are discarded. The defaults keep the coefficient of
/// variation of an idle in-memory plugin comfortably under 10%; raise
/// `sample_iterations` for noisier plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Calls made and discarded before measuring.
    pub warmup_iterations: usize,
    /// Measured sequential calls per operation.
    pub sample_iterations: usize,
    /// Operations to measure.
    pub operations: Vec<Operation>,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            warmup_iterations: 3,
            sample_iterations: 20,
            operations: Operation::ALL.to_vec(),
        }
    }
}

/// Parallel load knobs for the concurrency category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Parallel tasks in the Standard round.
    pub standard_parallelism: usize,
    /// Parallel tasks in the Advanced round.
    pub advanced_parallelism: usize,
    /// How many times each task walks the operation list.
    pub requests_per_task: usize,
    /// Operations every task calls.
    pub operations: Vec<Operation>,
}

impl ConcurrencyConfig {
    /// Number of parallel tasks for a level; `None` where the level has no
    /// concurrency requirement of its own.
    pub fn parallelism_for(&self, level: ConformanceLevel) -> Option<usize> {
        match level {
            ConformanceLevel::Basic => None,
            ConformanceLevel::Standard => Some(self.standard_parallelism),
            ConformanceLevel::Advanced => Some(self.advanced_parallelism),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            standard_parallelism: 10,
            advanced_parallelism: 50,
            requests_per_task: 3,
            operations: Operation::ALL.to_vec(),
        }
    }
}

/// Representative inputs used to build one valid request per operation.
///
/// The default prices an AWS `t3.micro`; plugins for other providers
/// override the resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestFixture {
    /// Resource used for capability, projected-cost and pricing requests.
    pub resource: ResourceDescriptor,
    /// Resource id used for historical-cost requests.
    pub resource_id: String,
    /// Start of the historical-cost window.
    pub window_start: DateTime<Utc>,
    /// End of the historical-cost window. Must follow the start.
    pub window_end: DateTime<Utc>,
    /// Resource type passed to `EstimateCost`.
    pub estimate_resource_type: String,
    /// Attributes passed to `EstimateCost`.
    pub estimate_attributes: BTreeMap<String, String>,
}

impl Default for RequestFixture {
    fn default() -> Self {
        let window_start = DateTime::from_timestamp(FIXTURE_WINDOW_START, 0).unwrap_or_default();
        let window_end = window_start + chrono::Duration::days(FIXTURE_WINDOW_DAYS);
        Self {
            resource: ResourceDescriptor::new("aws", "ec2", "t3.micro", "us-east-1"),
            resource_id: "i-0abc123def4567890".into(),
            window_start,
            window_end,
            estimate_resource_type: "aws:ec2/instance:Instance".into(),
            estimate_attributes: BTreeMap::from([(
                "instanceType".to_string(),
                "t3.micro".to_string(),
            )]),
        }
    }
}

impl RequestFixture {
    /// A well-formed request for `op`.
    pub fn valid_request(&self, op: Operation) -> RpcRequest {
        match op {
            Operation::Name => RpcRequest::Name(NameRequest {}),
            Operation::Supports => RpcRequest::Supports(SupportsRequest {
                resource: Some(self.resource.clone()),
            }),
            Operation::GetActualCost => RpcRequest::GetActualCost(self.actual_cost_request()),
            Operation::GetProjectedCost => RpcRequest::GetProjectedCost(GetProjectedCostRequest {
                resource: Some(self.resource.clone()),
            }),
            Operation::GetPricingSpec => RpcRequest::GetPricingSpec(GetPricingSpecRequest {
                resource: Some(self.resource.clone()),
            }),
            Operation::EstimateCost => RpcRequest::EstimateCost(EstimateCostRequest {
                resource_type: self.estimate_resource_type.clone(),
                attributes: self.estimate_attributes.clone(),
            }),
            Operation::GetRecommendations => {
                RpcRequest::GetRecommendations(GetRecommendationsRequest {
                    filter: None,
                    page_size: 10,
                    page_token: String::new(),
                })
            }
        }
    }

    pub fn actual_cost_request(&self) -> GetActualCostRequest {
        GetActualCostRequest {
            resource_id: self.resource_id.clone(),
            start: Some(self.window_start),
            end: Some(self.window_end),
            tags: BTreeMap::new(),
        }
    }
}
