//! End-to-end scenarios: the full suite run against the mock plugin with
//! and without injected faults.

use std::sync::Arc;
use std::time::Duration;

use costsource_conformance::mock::{Corruption, Fault, MockPlugin};
use costsource_conformance::*;
use costsource_types::{CostSourcePlugin, Operation, RpcRequest, RpcResponse, SupportsRequest};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn failing_ids(result: &ConformanceResult) -> Vec<String> {
    result.failures().iter().map(|o| o.id.clone()).collect()
}

fn classification(result: &ConformanceResult) -> Vec<(String, OutcomeStatus)> {
    result
        .outcomes()
        .map(|o| (o.id.clone(), o.status))
        .collect()
}

// ---------------------------------------------------------------------------
// Certification
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn correct_plugin_achieves_advanced_without_failures() {
    init_tracing();
    let result = run_advanced_conformance(Arc::new(MockPlugin::new()))
        .await
        .unwrap();

    assert_eq!(failing_ids(&result), Vec::<String>::new());
    assert_eq!(result.achieved_level, Some(ConformanceLevel::Advanced));
    assert_eq!(result.summary.skipped, 0);
    assert_eq!(
        result.summary.total,
        result.summary.passed + result.summary.failed + result.summary.skipped
    );
    for category in TestCategory::ALL {
        let c = result.category(category).unwrap();
        assert_eq!(c.status, CategoryStatus::Passed, "{}", category);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn negative_actual_cost_fails_only_the_non_negative_cost_check() {
    init_tracing();
    let plugin = MockPlugin::new().with_fault(
        Operation::GetActualCost,
        Fault::malformed(Corruption::NegativeCost),
    );
    let result = run_advanced_conformance(Arc::new(plugin)).await.unwrap();

    assert_eq!(
        failing_ids(&result),
        vec!["spec.get_actual_cost.non_negative_cost".to_string()]
    );
    // A Basic check failed, so no level is certified.
    assert_eq!(result.achieved_level, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_panic_yields_exactly_one_attributed_failure() {
    init_tracing();
    let plugin = MockPlugin::new().with_fault(
        Operation::GetPricingSpec,
        Fault::panic("pricing table poisoned").once(),
    );
    let result = run_standard_conformance(Arc::new(plugin)).await.unwrap();

    let failures = result.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].id, "spec.get_pricing_spec.responds");
    assert_eq!(failures[0].operation, Some(Operation::GetPricingSpec));
    assert!(failures[0]
        .detail
        .as_deref()
        .unwrap()
        .contains("pricing table poisoned"));

    // Every category still ran to completion.
    assert_eq!(result.categories.len(), 4);
    assert!(result
        .categories
        .iter()
        .all(|c| c.status != CategoryStatus::TimedOut));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn persistent_panic_fails_exactly_once_at_every_level() {
    init_tracing();
    for level in [ConformanceLevel::Basic, ConformanceLevel::Standard] {
        let plugin =
            MockPlugin::new().with_fault(Operation::GetPricingSpec, Fault::panic("always broken"));
        let suite = ConformanceSuite::new(SuiteConfig::for_level(level)).unwrap();
        let result = suite.run(Arc::new(plugin)).await.unwrap();

        assert_eq!(
            failing_ids(&result),
            vec!["spec.get_pricing_spec.responds".to_string()],
            "{}",
            level
        );
        assert!(result
            .outcomes()
            .filter(|o| o.operation == Some(Operation::GetPricingSpec))
            .skip(1)
            .all(|o| o.status == OutcomeStatus::Skip));
        assert!(result
            .find_outcome("spec.get_projected_cost.responds")
            .is_some_and(|o| !o.is_failure()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delayed_projected_cost_fails_standard_latency() {
    init_tracing();
    let plugin = MockPlugin::new().with_fault(
        Operation::GetProjectedCost,
        Fault::delay(Duration::from_millis(2_000)),
    );
    let mut config = SuiteConfig::for_level(ConformanceLevel::Standard);
    config.performance.warmup_iterations = 1;
    config.performance.sample_iterations = 10;
    let suite = ConformanceSuite::new(config).unwrap();

    let result = suite
        .run_category(Arc::new(plugin), TestCategory::Performance)
        .await
        .unwrap();

    let slow = result
        .find_outcome("performance.get_projected_cost.standard")
        .unwrap();
    assert_eq!(slow.status, OutcomeStatus::Fail);
    let measured = slow.measurement.unwrap();
    assert_eq!(measured.threshold_us, 200_000);
    assert!(measured.latency_us >= 1_900_000, "{}", measured.latency_us);
    assert!(measured.latency_us < 3_000_000, "{}", measured.latency_us);

    assert_eq!(
        failing_ids(&result),
        vec!["performance.get_projected_cost.standard".to_string()]
    );
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fifty_parallel_capability_queries_agree() {
    init_tracing();
    let plugin = Arc::new(MockPlugin::new());
    let harness = Harness::new(plugin.clone()).unwrap();
    let request = RpcRequest::Supports(SupportsRequest {
        resource: Some(RequestFixture::default().resource),
    });

    let mut set = JoinSet::new();
    for _ in 0..50 {
        let harness = harness.clone();
        let request = request.clone();
        set.spawn(async move { harness.invoke(request, Duration::from_secs(5)).await });
    }

    let mut responses: Vec<RpcResponse> = Vec::new();
    while let Some(joined) = set.join_next().await {
        responses.push(joined.unwrap().expect("no call may fail"));
    }

    assert_eq!(responses.len(), 50);
    assert!(responses.iter().all(|r| *r == responses[0]));
    assert_eq!(plugin.call_count(Operation::Supports), 50);
}

// ---------------------------------------------------------------------------
// Determinism and reporting
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn standard_runs_are_idempotent() {
    init_tracing();
    let make = || -> Arc<dyn CostSourcePlugin> {
        Arc::new(MockPlugin::new().with_fault(
            Operation::EstimateCost,
            Fault::malformed(Corruption::InvalidCurrency),
        ))
    };
    let first = run_standard_conformance(make()).await.unwrap();
    let second = run_standard_conformance(make()).await.unwrap();

    assert_eq!(classification(&first), classification(&second));
    assert_eq!(first.achieved_level, second.achieved_level);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn json_report_round_trips_summary_and_level() {
    init_tracing();
    let result = run_basic_conformance(Arc::new(MockPlugin::new()))
        .await
        .unwrap();
    let bytes = result.to_json().unwrap();
    let parsed = StructuredReport::from_json(&bytes).unwrap();

    assert_eq!(parsed.schema_version, SCHEMA_VERSION);
    assert_eq!(parsed.plugin_name, "mock-costsource");
    assert_eq!(parsed.summary, result.summary);
    assert_eq!(parsed.achieved_level, result.achieved_level);
    assert_eq!(parsed.categories.len(), result.categories.len());
}

// ---------------------------------------------------------------------------
// Budgets and setup errors
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn suite_timeout_marks_categories_skipped_not_failed() {
    init_tracing();
    let plugin = MockPlugin::new().with_fault(
        Operation::GetActualCost,
        Fault::delay(Duration::from_secs(2)),
    );
    let mut config = SuiteConfig::for_level(ConformanceLevel::Basic);
    config.suite_timeout_ms = 300;
    let suite = ConformanceSuite::new(config).unwrap();

    let result = suite.run(Arc::new(plugin)).await.unwrap();

    assert_eq!(result.categories.len(), 2);
    for category in &result.categories {
        assert_eq!(category.status, CategoryStatus::TimedOut);
        assert_eq!(category.outcomes[0].detail.as_deref(), Some("suite timeout"));
    }
    assert_eq!(result.summary.failed, 0);
    assert_eq!(result.summary.skipped, 2);
    assert_eq!(result.achieved_level, None);
    assert!(result.duration_ms < 2_000);
}

#[tokio::test]
async fn current_thread_runtime_is_a_setup_error() {
    let err = run_basic_conformance(Arc::new(MockPlugin::new()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SuiteError::Harness(HarnessError::SingleThreadedRuntime(_))
    ));
}

#[test]
fn invalid_configuration_is_a_setup_error() {
    let mut config = SuiteConfig::for_level(ConformanceLevel::Advanced);
    config.concurrency.advanced_parallelism = 0;
    assert!(matches!(
        ConformanceSuite::new(config),
        Err(SuiteError::InvalidConfiguration(_))
    ));

    let err = SuiteConfig::from_json(r#"{"target_level": "platinum"}"#).unwrap_err();
    assert!(matches!(err, SuiteError::InvalidConfiguration(_)));
}
