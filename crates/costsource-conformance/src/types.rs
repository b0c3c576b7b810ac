//! Core types for cost source conformance runs.

use chrono::{DateTime, Utc};
use costsource_types::Operation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ── Levels and categories ──────────────────────────────────────────────

/// Certification tier. Ordered and cumulative: each level requires
/// everything the level below it requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConformanceLevel {
    Basic,
    Standard,
    Advanced,
}

impl ConformanceLevel {
    /// All levels, lowest first.
    pub const ALL: [ConformanceLevel; 3] = [Self::Basic, Self::Standard, Self::Advanced];

    /// Categories that must pass for this level (including lower levels).
    pub fn required_categories(&self) -> &'static [TestCategory] {
        match self {
            Self::Basic => &[TestCategory::SpecValidation, TestCategory::RpcCorrectness],
            Self::Standard | Self::Advanced => &[
                TestCategory::SpecValidation,
                TestCategory::RpcCorrectness,
                TestCategory::Performance,
                TestCategory::Concurrency,
            ],
        }
    }

    /// Levels from `Basic` up to and including `self`.
    pub fn up_to(&self) -> impl Iterator<Item = ConformanceLevel> {
        let top = *self;
        Self::ALL.into_iter().filter(move |l| *l <= top)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Basic => "Basic",
            Self::Standard => "Standard",
            Self::Advanced => "Advanced",
        }
    }

    /// Lower-case tag used in check identifiers.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Advanced => "advanced",
        }
    }
}

impl fmt::Display for ConformanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Independently runnable group of checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    SpecValidation,
    RpcCorrectness,
    Performance,
    Concurrency,
}

impl TestCategory {
    /// All categories in execution order.
    pub const ALL: [TestCategory; 4] = [
        Self::SpecValidation,
        Self::RpcCorrectness,
        Self::Performance,
        Self::Concurrency,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::SpecValidation => "Specification Validation",
            Self::RpcCorrectness => "RPC Correctness",
            Self::Performance => "Performance",
            Self::Concurrency => "Concurrency",
        }
    }

    /// Prefix of every check identifier in this category.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::SpecValidation => "spec",
            Self::RpcCorrectness => "rpc",
            Self::Performance => "performance",
            Self::Concurrency => "concurrency",
        }
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Outcomes ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Pass,
    Fail,
    Skip,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("PASS"),
            Self::Fail => f.write_str("FAIL"),
            Self::Skip => f.write_str("SKIP"),
        }
    }
}

/// Timing and boundary-size figures attached to a measured check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Latency the verdict was based on (p95 or max), in microseconds.
    pub latency_us: u64,
    /// Threshold it was compared against, in microseconds.
    pub threshold_us: u64,
    /// Mean bytes copied across the serialization boundary per call.
    pub payload_bytes: u64,
}

/// Result of one atomic check. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Stable identifier, e.g. `spec.get_actual_cost.non_negative_cost`.
    pub id: String,
    /// Category that produced the outcome.
    pub category: TestCategory,
    /// Operation the check is attributed to, if any.
    pub operation: Option<Operation>,
    /// Lowest level at which this check is required.
    pub level: ConformanceLevel,
    /// Pass, fail or skip.
    pub status: OutcomeStatus,
    /// Failure or skip reason, expected-vs-actual where applicable.
    pub detail: Option<String>,
    /// Figures behind a performance verdict.
    pub measurement: Option<Measurement>,
}

impl TestOutcome {
    fn with_status(
        id: impl Into<String>,
        category: TestCategory,
        level: ConformanceLevel,
        status: OutcomeStatus,
        detail: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            operation: None,
            level,
            status,
            detail,
            measurement: None,
        }
    }

    pub fn pass(id: impl Into<String>, category: TestCategory, level: ConformanceLevel) -> Self {
        Self::with_status(id, category, level, OutcomeStatus::Pass, None)
    }

    pub fn fail(
        id: impl Into<String>,
        category: TestCategory,
        level: ConformanceLevel,
        detail: impl Into<String>,
    ) -> Self {
        Self::with_status(id, category, level, OutcomeStatus::Fail, Some(detail.into()))
    }

    pub fn skip(
        id: impl Into<String>,
        category: TestCategory,
        level: ConformanceLevel,
        reason: impl Into<String>,
    ) -> Self {
        Self::with_status(id, category, level, OutcomeStatus::Skip, Some(reason.into()))
    }

    /// Pass when `failure` is `None`, fail with its text otherwise.
    pub fn from_check(
        id: impl Into<String>,
        category: TestCategory,
        level: ConformanceLevel,
        failure: Option<String>,
    ) -> Self {
        match failure {
            None => Self::pass(id, category, level),
            Some(detail) => Self::fail(id, category, level, detail),
        }
    }

    pub fn for_operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn with_measurement(mut self, measurement: Measurement) -> Self {
        self.measurement = Some(measurement);
        self
    }

    pub fn is_failure(&self) -> bool {
        self.status == OutcomeStatus::Fail
    }

    /// Demote to a skip, keeping identity and attribution.
    pub fn into_skip(mut self, reason: impl Into<String>) -> Self {
        self.status = OutcomeStatus::Skip;
        self.detail = Some(reason.into());
        self
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status, self.id)?;
        if let Some(ref detail) = self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

// ── Category metrics ───────────────────────────────────────────────────

/// Latency distribution for one operation, in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Measured calls, warm-up excluded.
    pub samples: usize,
    /// Fastest sample.
    pub min_us: u64,
    /// Arithmetic mean.
    pub avg_us: u64,
    /// Slowest sample.
    pub max_us: u64,
    /// Median (nearest rank).
    pub p50_us: u64,
    /// 95th percentile (nearest rank).
    pub p95_us: u64,
    /// 99th percentile (nearest rank).
    pub p99_us: u64,
    /// Coefficient of variation (stddev / mean) of the samples.
    pub coefficient_of_variation: f64,
    /// Mean request plus response bytes per call.
    pub avg_payload_bytes: u64,
}

/// Figures from one parallel round of the concurrency category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyRound {
    /// Level the round's outcomes are tagged with.
    pub level: ConformanceLevel,
    /// Tasks run in parallel.
    pub parallelism: usize,
    /// Calls issued across all tasks.
    pub total_calls: usize,
    /// Calls that returned a response.
    pub succeeded: usize,
    /// Calls rejected with a client-side code.
    pub classified_errors: usize,
    /// Calls that failed with `INTERNAL`, `UNKNOWN` or `DATA_LOSS`.
    pub server_faults: usize,
    /// Operations whose identical calls disagreed.
    pub inconsistent_operations: usize,
    /// Wall-clock time of the round.
    pub elapsed_ms: u64,
}

/// Category-specific figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryMetrics {
    /// Keyed by operation method name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub latency: BTreeMap<String, LatencyStats>,
    /// One entry per parallel round, in run order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concurrency: Vec<ConcurrencyRound>,
}

// ── Category results ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    Passed,
    Failed,
    /// Not run (or not finished) because the suite budget ran out.
    TimedOut,
}

impl fmt::Display for CategoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("PASSED"),
            Self::Failed => f.write_str("FAILED"),
            Self::TimedOut => f.write_str("SKIPPED (suite timeout)"),
        }
    }
}

/// Aggregation of all outcomes for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryResult {
    /// Category these outcomes belong to.
    pub category: TestCategory,
    /// Failed if any outcome failed.
    pub status: CategoryStatus,
    /// Number of outcomes.
    pub total: usize,
    /// Outcomes that passed.
    pub passed: usize,
    /// Outcomes that failed.
    pub failed: usize,
    /// Outcomes that were skipped.
    pub skipped: usize,
    /// Every outcome, in the order the checks ran.
    pub outcomes: Vec<TestOutcome>,
    /// Latency and concurrency figures gathered along the way.
    pub metrics: CategoryMetrics,
    /// Wall-clock time spent in the category.
    pub duration_ms: u64,
}

impl CategoryResult {
    /// Build from the outcomes a validator produced.
    pub fn from_outcomes(
        category: TestCategory,
        outcomes: Vec<TestOutcome>,
        metrics: CategoryMetrics,
        duration_ms: u64,
    ) -> Self {
        let passed = count(&outcomes, OutcomeStatus::Pass);
        let failed = count(&outcomes, OutcomeStatus::Fail);
        let skipped = count(&outcomes, OutcomeStatus::Skip);
        let status = if failed == 0 {
            CategoryStatus::Passed
        } else {
            CategoryStatus::Failed
        };
        Self {
            category,
            status,
            total: outcomes.len(),
            passed,
            failed,
            skipped,
            outcomes,
            metrics,
            duration_ms,
        }
    }

    /// A category cut off by the suite budget: one skipped outcome, no verdict.
    pub fn timed_out(category: TestCategory, duration_ms: u64) -> Self {
        let outcome = TestOutcome::skip(
            format!("{}.suite_timeout", category.id_prefix()),
            category,
            ConformanceLevel::Basic,
            "suite timeout",
        );
        Self {
            category,
            status: CategoryStatus::TimedOut,
            total: 1,
            passed: 0,
            failed: 0,
            skipped: 1,
            outcomes: vec![outcome],
            metrics: CategoryMetrics::default(),
            duration_ms,
        }
    }

    /// Whether every check required at `level` passed.
    pub fn passes_at(&self, level: ConformanceLevel) -> bool {
        self.status != CategoryStatus::TimedOut
            && !self
                .outcomes
                .iter()
                .any(|o| o.level <= level && o.is_failure())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }
}

fn count(outcomes: &[TestOutcome], status: OutcomeStatus) -> usize {
    outcomes.iter().filter(|o| o.status == status).count()
}

// ── Run results ────────────────────────────────────────────────────────

/// Outcome counts across a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Outcomes across all categories.
    pub total: usize,
    /// Outcomes that passed.
    pub passed: usize,
    /// Outcomes that failed.
    pub failed: usize,
    /// Outcomes that were skipped, including suite-timeout placeholders.
    pub skipped: usize,
}

impl RunSummary {
    pub fn from_categories(categories: &[CategoryResult]) -> Self {
        categories.iter().fold(Self::default(), |acc, c| Self {
            total: acc.total + c.total,
            passed: acc.passed + c.passed,
            failed: acc.failed + c.failed,
            skipped: acc.skipped + c.skipped,
        })
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.passed as f64 / self.total as f64) * 100.0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} passed ({:.1}%), {} failed, {} skipped",
            self.passed,
            self.total,
            self.pass_rate(),
            self.failed,
            self.skipped,
        )
    }
}

/// Highest level whose required categories all pass, cumulatively.
///
/// A level counts only if every level below it also counts, so adding a
/// failing outcome can never raise the result.
pub fn achieved_level(
    target: ConformanceLevel,
    categories: &[CategoryResult],
) -> Option<ConformanceLevel> {
    let mut achieved = None;
    for level in target.up_to() {
        let satisfied = level.required_categories().iter().all(|required| {
            categories
                .iter()
                .find(|c| c.category == *required)
                .is_some_and(|c| c.passes_at(level))
        });
        if !satisfied {
            break;
        }
        achieved = Some(level);
    }
    achieved
}

/// Top-level result of one conformance run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConformanceResult {
    /// Unique per run.
    pub run_id: Uuid,
    /// Name reported by the plugin's `Name` operation.
    pub plugin_name: String,
    /// Level the run was asked to certify.
    pub target_level: ConformanceLevel,
    /// Highest level every required category passed, if any.
    pub achieved_level: Option<ConformanceLevel>,
    /// Per-category results, in run order.
    pub categories: Vec<CategoryResult>,
    /// Outcome counts across all categories.
    pub summary: RunSummary,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When aggregation finished.
    pub completed_at: DateTime<Utc>,
    /// Total wall-clock time of the run.
    pub duration_ms: u64,
}

impl ConformanceResult {
    pub fn new(
        plugin_name: String,
        target_level: ConformanceLevel,
        categories: Vec<CategoryResult>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        let summary = RunSummary::from_categories(&categories);
        let achieved_level = achieved_level(target_level, &categories);
        Self {
            run_id: Uuid::new_v4(),
            plugin_name,
            target_level,
            achieved_level,
            categories,
            summary,
            started_at,
            completed_at: Utc::now(),
            duration_ms,
        }
    }

    pub fn category(&self, category: TestCategory) -> Option<&CategoryResult> {
        self.categories.iter().find(|c| c.category == category)
    }

    /// All outcomes across categories, in execution order.
    pub fn outcomes(&self) -> impl Iterator<Item = &TestOutcome> {
        self.categories.iter().flat_map(|c| c.outcomes.iter())
    }

    pub fn failures(&self) -> Vec<&TestOutcome> {
        self.outcomes().filter(|o| o.is_failure()).collect()
    }

    pub fn find_outcome(&self, id: &str) -> Option<&TestOutcome> {
        self.outcomes().find(|o| o.id == id)
    }

    /// Whether the requested level was reached.
    pub fn target_achieved(&self) -> bool {
        self.achieved_level == Some(self.target_level)
    }
}
