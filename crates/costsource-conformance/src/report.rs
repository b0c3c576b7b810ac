//! Report generation.
//!
//! Produces the machine-readable JSON document consumed by CI pipelines
//! and a box-drawing text rendering for interactive runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::SuiteResult;
use crate::types::{
    CategoryResult, CategoryStatus, ConformanceLevel, ConformanceResult, OutcomeStatus, RunSummary,
};

/// Version of the JSON report layout. Bumped on incompatible changes.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Stable, serializable form of a [`ConformanceResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReport {
    pub schema_version: String,
    pub run_id: Uuid,
    /// When the run completed.
    pub timestamp: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub plugin_name: String,
    pub target_level: ConformanceLevel,
    /// `null` when not even Basic was achieved.
    pub achieved_level: Option<ConformanceLevel>,
    pub summary: RunSummary,
    pub categories: Vec<CategoryResult>,
    pub duration_ms: u64,
}

impl StructuredReport {
    /// Parse a report, rejecting documents from an incompatible schema major.
    pub fn from_json(bytes: &[u8]) -> SuiteResult<Self> {
        let report: Self = serde_json::from_slice(bytes)?;
        if major(&report.schema_version) != major(SCHEMA_VERSION) {
            return Err(<serde_json::Error as serde::de::Error>::custom(format!(
                "unsupported report schema {} (expected {}.x)",
                report.schema_version,
                major(SCHEMA_VERSION)
            ))
            .into());
        }
        Ok(report)
    }

    pub fn to_json(&self) -> SuiteResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

impl From<&ConformanceResult> for StructuredReport {
    fn from(result: &ConformanceResult) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: result.run_id,
            timestamp: result.completed_at,
            started_at: result.started_at,
            plugin_name: result.plugin_name.clone(),
            target_level: result.target_level,
            achieved_level: result.achieved_level,
            summary: result.summary,
            categories: result.categories.clone(),
            duration_ms: result.duration_ms,
        }
    }
}

impl ConformanceResult {
    pub fn to_structured_report(&self) -> StructuredReport {
        StructuredReport::from(self)
    }

    /// Serialize the run as a JSON report.
    pub fn to_json(&self) -> SuiteResult<Vec<u8>> {
        self.to_structured_report().to_json()
    }
}

impl fmt::Display for CategoryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = match self.status {
            CategoryStatus::Passed => "+",
            CategoryStatus::Failed => "!",
            CategoryStatus::TimedOut => "-",
        };
        writeln!(
            f,
            "  [{}] {} ({}/{}) {}",
            icon,
            self.category.label(),
            self.passed,
            self.total,
            self.status,
        )?;
        for outcome in self.outcomes.iter().filter(|o| o.status != OutcomeStatus::Pass) {
            writeln!(f, "      {}", outcome)?;
        }
        for (method, stats) in &self.metrics.latency {
            writeln!(
                f,
                "      {:<20} p50 {:>8}us  p95 {:>8}us  max {:>8}us  cv {:.2}",
                method, stats.p50_us, stats.p95_us, stats.max_us, stats.coefficient_of_variation,
            )?;
        }
        for round in &self.metrics.concurrency {
            writeln!(
                f,
                "      {} x{}: {}/{} ok, {} classified errors, {} server faults",
                round.level,
                round.parallelism,
                round.succeeded,
                round.total_calls,
                round.classified_errors,
                round.server_faults,
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for ConformanceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let achieved = self
            .achieved_level
            .map(|l| l.label())
            .unwrap_or("none");
        writeln!(f, "+-------------------------------------------------+")?;
        writeln!(f, "|   Cost Source Conformance Report                |")?;
        writeln!(f, "+-------------------------------------------------+")?;
        writeln!(f, "| Plugin:   {:<38}|", self.plugin_name)?;
        writeln!(
            f,
            "| Target:   {:<10} Achieved: {:<17}|",
            self.target_level.label(),
            achieved
        )?;
        writeln!(
            f,
            "| Total: {:3}  Passed: {:3}  Failed: {:3}  Skip: {:3} |",
            self.summary.total, self.summary.passed, self.summary.failed, self.summary.skipped,
        )?;
        writeln!(f, "+-------------------------------------------------+")?;
        writeln!(f)?;

        for category in &self.categories {
            write!(f, "{}", category)?;
        }

        writeln!(f)?;
        if self.target_achieved() {
            writeln!(
                f,
                "  CERTIFIED AT {} ({} ms)",
                self.target_level.label().to_uppercase(),
                self.duration_ms
            )?;
        } else {
            writeln!(
                f,
                "  {} NOT ACHIEVED: {} failing, {} skipped ({} ms)",
                self.target_level.label().to_uppercase(),
                self.summary.failed,
                self.summary.skipped,
                self.duration_ms
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SuiteError;
    use crate::types::{CategoryMetrics, TestCategory, TestOutcome};

    fn sample_result() -> ConformanceResult {
        let spec = CategoryResult::from_outcomes(
            TestCategory::SpecValidation,
            vec![
                TestOutcome::pass(
                    "spec.name.non_empty_name",
                    TestCategory::SpecValidation,
                    ConformanceLevel::Basic,
                ),
                TestOutcome::fail(
                    "spec.get_actual_cost.non_negative_cost",
                    TestCategory::SpecValidation,
                    ConformanceLevel::Basic,
                    "results[].cost: [0] must be a finite amount >= 0, got -1",
                ),
            ],
            CategoryMetrics::default(),
            3,
        );
        let rpc = CategoryResult::timed_out(TestCategory::RpcCorrectness, 0);
        ConformanceResult::new(
            "mock-costsource".into(),
            ConformanceLevel::Basic,
            vec![spec, rpc],
            Utc::now(),
            12,
        )
    }

    #[test]
    fn test_json_round_trip_preserves_summary() {
        let result = sample_result();
        let bytes = result.to_json().unwrap();
        let parsed = StructuredReport::from_json(&bytes).unwrap();
        assert_eq!(parsed.summary, result.summary);
        assert_eq!(parsed.achieved_level, result.achieved_level);
        assert_eq!(parsed.run_id, result.run_id);
        assert_eq!(parsed.categories.len(), 2);
        assert_eq!(parsed, result.to_structured_report());
    }

    #[test]
    fn test_json_field_names_are_stable() {
        let bytes = sample_result().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["schema_version"], "1.0.0");
        assert_eq!(value["plugin_name"], "mock-costsource");
        assert_eq!(value["target_level"], "basic");
        assert!(value["achieved_level"].is_null());
        assert_eq!(value["summary"]["failed"], 1);
        assert_eq!(value["summary"]["skipped"], 1);
        assert_eq!(value["categories"][1]["status"], "timed_out");
    }

    #[test]
    fn test_incompatible_schema_rejected() {
        let mut report = sample_result().to_structured_report();
        report.schema_version = "2.0.0".into();
        let bytes = serde_json::to_vec(&report).unwrap();
        let err = StructuredReport::from_json(&bytes).unwrap_err();
        assert!(matches!(err, SuiteError::Report(_)));
        assert!(err.to_string().contains("unsupported report schema"));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(StructuredReport::from_json(b"{not json").is_err());
    }

    #[test]
    fn test_display_lists_failures_and_skips() {
        let text = sample_result().to_string();
        assert!(text.contains("Cost Source Conformance Report"));
        assert!(text.contains("[FAIL] spec.get_actual_cost.non_negative_cost"));
        assert!(text.contains("suite timeout"));
        assert!(text.contains("BASIC NOT ACHIEVED"));
    }
}
