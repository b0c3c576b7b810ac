//! Conformance orchestrator.
//!
//! Drives the categories a level requires through one shared harness, in
//! order, under an overall wall-clock budget, and aggregates the outcomes
//! into a [`ConformanceResult`]. Only setup problems are returned as
//! errors; anything the plugin does wrong ends up inside the result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use costsource_types::{CostSourcePlugin, NameRequest, Operation, RpcRequest, RpcResponse};
use tracing::{info, instrument, warn};

use crate::config::SuiteConfig;
use crate::error::{SuiteError, SuiteResult};
use crate::harness::Harness;
use crate::types::{CategoryResult, ConformanceLevel, ConformanceResult, TestCategory};
use crate::validators::{elapsed_ms, validator_for};

/// Name recorded when the plugin cannot identify itself.
pub const UNKNOWN_PLUGIN: &str = "<unknown>";

/// Orchestrator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteState {
    NotStarted,
    Running(TestCategory),
    Aggregating,
    Done,
}

impl SuiteState {
    pub fn can_transition_to(&self, next: SuiteState) -> bool {
        matches!(
            (self, next),
            (SuiteState::NotStarted, SuiteState::Running(_))
                | (SuiteState::NotStarted, SuiteState::Aggregating)
                | (SuiteState::Running(_), SuiteState::Running(_))
                | (SuiteState::Running(_), SuiteState::Aggregating)
                | (SuiteState::Aggregating, SuiteState::Done)
        )
    }

    fn advance(&mut self, next: SuiteState) -> SuiteResult<()> {
        if !self.can_transition_to(next) {
            return Err(SuiteError::Internal(format!(
                "invalid suite transition {:?} -> {:?}",
                self, next
            )));
        }
        *self = next;
        Ok(())
    }
}

/// A configured conformance suite. Reusable across runs and plugins.
#[derive(Debug, Clone)]
pub struct ConformanceSuite {
    config: SuiteConfig,
}

impl ConformanceSuite {
    /// Validate `config` and build a suite around it.
    pub fn new(config: SuiteConfig) -> SuiteResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Run every category the target level requires.
    pub async fn run(&self, plugin: Arc<dyn CostSourcePlugin>) -> SuiteResult<ConformanceResult> {
        let required = self.config.target_level.required_categories();
        self.execute(plugin, required).await
    }

    /// Run a single category. The achieved level of a partial run only
    /// reflects the categories that ran.
    pub async fn run_category(
        &self,
        plugin: Arc<dyn CostSourcePlugin>,
        category: TestCategory,
    ) -> SuiteResult<ConformanceResult> {
        self.execute(plugin, &[category]).await
    }

    #[instrument(name = "conformance_run", skip(self, plugin), fields(target = %self.config.target_level))]
    async fn execute(
        &self,
        plugin: Arc<dyn CostSourcePlugin>,
        categories: &[TestCategory],
    ) -> SuiteResult<ConformanceResult> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let harness = Harness::new(plugin)?;
        let budget = self.config.suite_timeout();
        let mut state = SuiteState::NotStarted;
        let mut results: Vec<CategoryResult> = Vec::with_capacity(categories.len());

        for category in categories {
            let remaining = budget.saturating_sub(clock.elapsed());
            if remaining.is_zero() {
                warn!(%category, "suite budget exhausted, skipping category");
                results.push(CategoryResult::timed_out(*category, 0));
                continue;
            }

            state.advance(SuiteState::Running(*category))?;
            info!(%category, "running category");
            let category_clock = Instant::now();
            let validator = validator_for(*category);

            match tokio::time::timeout(remaining, validator.validate(&harness, &self.config)).await
            {
                Ok(result) => {
                    let result = harness.crashes().settle(result);
                    info!(
                        %category,
                        passed = result.passed,
                        failed = result.failed,
                        skipped = result.skipped,
                        duration_ms = result.duration_ms,
                        "category finished"
                    );
                    results.push(result);
                }
                Err(_) => {
                    warn!(%category, "suite budget exhausted mid-category");
                    results.push(CategoryResult::timed_out(
                        *category,
                        elapsed_ms(category_clock),
                    ));
                }
            }
        }

        state.advance(SuiteState::Aggregating)?;
        let remaining = budget.saturating_sub(clock.elapsed());
        let plugin_name = identify(&harness, self.config.invoke_timeout().min(remaining)).await;
        let result = ConformanceResult::new(
            plugin_name,
            self.config.target_level,
            results,
            started_at,
            elapsed_ms(clock),
        );
        state.advance(SuiteState::Done)?;

        info!(
            plugin = %result.plugin_name,
            achieved = ?result.achieved_level,
            summary = %result.summary,
            "conformance run complete"
        );
        Ok(result)
    }
}

/// Ask the plugin for its name within what is left of the budget, falling
/// back to [`UNKNOWN_PLUGIN`].
async fn identify(harness: &Harness, timeout: Duration) -> String {
    if timeout.is_zero() || harness.crashes().crashed(Operation::Name).is_some() {
        return UNKNOWN_PLUGIN.to_string();
    }
    match harness
        .invoke(RpcRequest::Name(NameRequest {}), timeout)
        .await
    {
        Ok(RpcResponse::Name(r)) if !r.name.is_empty() => r.name,
        Ok(_) => UNKNOWN_PLUGIN.to_string(),
        Err(status) => {
            warn!(%status, "plugin did not identify itself");
            UNKNOWN_PLUGIN.to_string()
        }
    }
}

async fn run_at(
    level: ConformanceLevel,
    plugin: Arc<dyn CostSourcePlugin>,
) -> SuiteResult<ConformanceResult> {
    ConformanceSuite::new(SuiteConfig::for_level(level))?
        .run(plugin)
        .await
}

/// Certify `plugin` at Basic with default settings.
pub async fn run_basic_conformance(
    plugin: Arc<dyn CostSourcePlugin>,
) -> SuiteResult<ConformanceResult> {
    run_at(ConformanceLevel::Basic, plugin).await
}

/// Certify `plugin` at Standard with default settings.
pub async fn run_standard_conformance(
    plugin: Arc<dyn CostSourcePlugin>,
) -> SuiteResult<ConformanceResult> {
    run_at(ConformanceLevel::Standard, plugin).await
}

/// Certify `plugin` at Advanced with default settings.
pub async fn run_advanced_conformance(
    plugin: Arc<dyn CostSourcePlugin>,
) -> SuiteResult<ConformanceResult> {
    run_at(ConformanceLevel::Advanced, plugin).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::CRASHED_EARLIER;
    use crate::mock::{Fault, MockPlugin};
    use crate::types::{CategoryStatus, OutcomeStatus};

    #[test]
    fn test_state_transitions() {
        use SuiteState::*;
        let spec = TestCategory::SpecValidation;
        assert!(NotStarted.can_transition_to(Running(spec)));
        assert!(NotStarted.can_transition_to(Aggregating));
        assert!(Running(spec).can_transition_to(Running(TestCategory::Performance)));
        assert!(Running(spec).can_transition_to(Aggregating));
        assert!(Aggregating.can_transition_to(Done));

        assert!(!NotStarted.can_transition_to(Done));
        assert!(!Running(spec).can_transition_to(Done));
        assert!(!Done.can_transition_to(Running(spec)));
        assert!(!Aggregating.can_transition_to(Running(spec)));
    }

    #[test]
    fn test_advance_rejects_invalid_transition() {
        let mut state = SuiteState::Done;
        let err = state.advance(SuiteState::Aggregating).unwrap_err();
        assert!(matches!(err, SuiteError::Internal(_)));
        assert_eq!(state, SuiteState::Done);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = SuiteConfig::default();
        config.invoke_timeout_ms = 0;
        assert!(matches!(
            ConformanceSuite::new(config),
            Err(SuiteError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_basic_run_executes_only_basic_categories() {
        let result = run_basic_conformance(Arc::new(MockPlugin::new()))
            .await
            .unwrap();
        let ran: Vec<_> = result.categories.iter().map(|c| c.category).collect();
        assert_eq!(
            ran,
            vec![TestCategory::SpecValidation, TestCategory::RpcCorrectness]
        );
        assert_eq!(result.achieved_level, Some(ConformanceLevel::Basic));
        assert_eq!(result.plugin_name, "mock-costsource");
        assert!(result
            .categories
            .iter()
            .all(|c| c.status == CategoryStatus::Passed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_category_is_partial() {
        let suite = ConformanceSuite::new(SuiteConfig::default()).unwrap();
        let result = suite
            .run_category(Arc::new(MockPlugin::new()), TestCategory::SpecValidation)
            .await
            .unwrap();
        assert_eq!(result.categories.len(), 1);
        assert_eq!(result.summary.failed, 0);
        // RPC correctness did not run, so not even Basic is certified.
        assert_eq!(result.achieved_level, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unidentified_plugin_gets_placeholder_name() {
        let plugin = MockPlugin::new().with_name("");
        let suite = ConformanceSuite::new(SuiteConfig::default()).unwrap();
        let result = suite
            .run_category(Arc::new(plugin), TestCategory::SpecValidation)
            .await
            .unwrap();
        assert_eq!(result.plugin_name, UNKNOWN_PLUGIN);
        assert!(result
            .find_outcome("spec.name.non_empty_name")
            .unwrap()
            .is_failure());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_identification_stays_within_budget() {
        let plugin =
            MockPlugin::new().with_fault(Operation::Name, Fault::delay(Duration::from_secs(2)));
        let mut config = SuiteConfig::default();
        config.suite_timeout_ms = 300;
        let suite = ConformanceSuite::new(config).unwrap();

        let result = suite.run(Arc::new(plugin)).await.unwrap();

        assert!(result
            .categories
            .iter()
            .all(|c| c.status == CategoryStatus::TimedOut));
        assert_eq!(result.plugin_name, UNKNOWN_PLUGIN);
        assert!(result.duration_ms < 1_500, "{}", result.duration_ms);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_persistent_crash_fails_once() {
        let plugin = MockPlugin::new().with_fault(Operation::GetPricingSpec, Fault::panic("boom"));
        let result = run_basic_conformance(Arc::new(plugin)).await.unwrap();

        let failures: Vec<_> = result.failures().iter().map(|o| o.id.clone()).collect();
        assert_eq!(failures, vec!["spec.get_pricing_spec.responds"]);

        let rpc = result.category(TestCategory::RpcCorrectness).unwrap();
        let skipped: Vec<_> = rpc
            .outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Skip)
            .collect();
        assert!(!skipped.is_empty());
        assert!(skipped.iter().all(|o| {
            o.operation == Some(Operation::GetPricingSpec)
                && o.detail.as_deref() == Some(CRASHED_EARLIER)
        }));
    }
}
