//! Parallel load through one shared harness.
//!
//! A round spawns `parallelism` tasks on the multi-thread runtime. Every
//! task walks the configured operations `requests_per_task` times, sending
//! the same pre-encoded valid request each time. After all tasks join,
//! each operation must show either identical response bytes on every call
//! or the same classified, non-server-fault error on every call.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use costsource_types::{Operation, RpcResult, RpcStatus};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{elapsed_ms, CategoryValidator};
use crate::config::SuiteConfig;
use crate::harness::{Harness, CRASHED_EARLIER};
use crate::types::{
    CategoryMetrics, CategoryResult, ConcurrencyRound, ConformanceLevel, TestCategory,
    TestOutcome,
};

const CATEGORY: TestCategory = TestCategory::Concurrency;

type CallLog = Vec<(Operation, RpcResult<Vec<u8>>)>;

pub struct ConcurrencyValidator;

/// `(level, parallelism)` for each round a run at `target` executes.
fn rounds(config: &SuiteConfig) -> Vec<(ConformanceLevel, usize)> {
    let target = config.target_level;
    let rounds: Vec<_> = target
        .up_to()
        .filter_map(|l| config.concurrency.parallelism_for(l).map(|p| (l, p)))
        .collect();
    if rounds.is_empty() {
        vec![(target, config.concurrency.standard_parallelism)]
    } else {
        rounds
    }
}

#[async_trait]
impl CategoryValidator for ConcurrencyValidator {
    fn category(&self) -> TestCategory {
        CATEGORY
    }

    async fn validate(&self, harness: &Harness, config: &SuiteConfig) -> CategoryResult {
        let start = Instant::now();
        let mut outcomes = Vec::new();
        let mut metrics = CategoryMetrics::default();

        let mut plan = Vec::new();
        for op in &config.concurrency.operations {
            match config.fixture.valid_request(*op).encode_body() {
                Ok(body) => plan.push((*op, body)),
                Err(e) => outcomes.push(
                    TestOutcome::fail(
                        format!("{}.{}.encode", CATEGORY.id_prefix(), op.snake_name()),
                        CATEGORY,
                        config.target_level,
                        format!("fixture request does not encode: {}", e),
                    )
                    .for_operation(*op),
                ),
            }
        }

        for (level, parallelism) in rounds(config) {
            // Operations that already crashed are left out of the load.
            let (crashed, live): (Vec<_>, Vec<_>) = plan
                .iter()
                .cloned()
                .partition(|(op, _)| harness.crashes().crashed(*op).is_some());
            for (op, _) in &crashed {
                outcomes.push(
                    TestOutcome::skip(
                        format!("{}.{}.{}", CATEGORY.id_prefix(), op.snake_name(), level.tag()),
                        CATEGORY,
                        level,
                        CRASHED_EARLIER,
                    )
                    .for_operation(*op),
                );
            }
            let round = run_round(harness, config, Arc::new(live), level, parallelism).await;
            outcomes.extend(round.outcomes);
            metrics.concurrency.push(round.figures);
        }

        CategoryResult::from_outcomes(CATEGORY, outcomes, metrics, elapsed_ms(start))
    }
}

struct Round {
    outcomes: Vec<TestOutcome>,
    figures: ConcurrencyRound,
}

async fn run_round(
    harness: &Harness,
    config: &SuiteConfig,
    plan: Arc<Vec<(Operation, Vec<u8>)>>,
    level: ConformanceLevel,
    parallelism: usize,
) -> Round {
    let started = Instant::now();
    let timeout = config.invoke_timeout();
    let repeats = config.concurrency.requests_per_task;
    debug!(%level, parallelism, "starting concurrency round");

    let mut set = JoinSet::new();
    for task in 0..parallelism {
        let harness = harness.clone();
        let plan = Arc::clone(&plan);
        set.spawn(async move {
            let mut log: CallLog = Vec::with_capacity(plan.len() * repeats);
            for _ in 0..repeats {
                for (op, body) in plan.iter() {
                    let result = harness.invoke_raw(&op.full_path(), body.clone(), timeout).await;
                    log.push((*op, result));
                }
            }
            (task, log)
        });
    }

    // Results are slotted by task index so attribution does not depend on
    // completion order.
    let mut logs: Vec<Option<CallLog>> = (0..parallelism).map(|_| None).collect();
    let mut lost_tasks = 0usize;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((task, log)) => logs[task] = Some(log),
            Err(e) => {
                lost_tasks += 1;
                warn!(error = %e, "concurrency task did not complete");
            }
        }
    }

    let mut outcomes = Vec::new();
    outcomes.push(TestOutcome::from_check(
        format!("{}.round.{}", CATEGORY.id_prefix(), level.tag()),
        CATEGORY,
        level,
        (lost_tasks > 0)
            .then(|| format!("{} of {} tasks did not complete", lost_tasks, parallelism)),
    ));

    let mut figures = ConcurrencyRound {
        level,
        parallelism,
        total_calls: 0,
        succeeded: 0,
        classified_errors: 0,
        server_faults: 0,
        inconsistent_operations: 0,
        elapsed_ms: 0,
    };

    for (op, _) in plan.iter() {
        let results: Vec<&RpcResult<Vec<u8>>> = logs
            .iter()
            .flatten()
            .flat_map(|log| log.iter())
            .filter(|(logged, _)| logged == op)
            .map(|(_, result)| result)
            .collect();

        let mut successes: Vec<&[u8]> = Vec::new();
        let mut errors: Vec<&RpcStatus> = Vec::new();
        for result in &results {
            match result {
                Ok(body) => successes.push(body.as_slice()),
                Err(status) => errors.push(status),
            }
        }
        let faults = errors.iter().filter(|s| s.code.is_server_fault()).count();

        figures.total_calls += results.len();
        figures.succeeded += successes.len();
        figures.server_faults += faults;
        figures.classified_errors += errors.len() - faults;

        let failure = consistency_failure(&successes, &errors, faults);
        if failure.is_some() {
            figures.inconsistent_operations += 1;
        }
        outcomes.push(
            TestOutcome::from_check(
                format!("{}.{}.{}", CATEGORY.id_prefix(), op.snake_name(), level.tag()),
                CATEGORY,
                level,
                failure,
            )
            .for_operation(*op),
        );
    }

    figures.elapsed_ms = elapsed_ms(started);
    Round { outcomes, figures }
}

/// Why the calls for one operation disagree, if they do.
fn consistency_failure(successes: &[&[u8]], errors: &[&RpcStatus], faults: usize) -> Option<String> {
    let total = successes.len() + errors.len();
    if faults > 0 {
        let first = errors.iter().find(|s| s.code.is_server_fault())?;
        return Some(format!(
            "{} of {} calls failed with a server fault (first: {})",
            faults, total, first
        ));
    }
    if !successes.is_empty() && !errors.is_empty() {
        return Some(format!(
            "{} calls succeeded and {} failed for identical requests (first error: {})",
            successes.len(),
            errors.len(),
            errors[0]
        ));
    }
    let distinct: BTreeSet<&[u8]> = successes.iter().copied().collect();
    if distinct.len() > 1 {
        return Some(format!(
            "{} distinct responses to {} identical requests",
            distinct.len(),
            total
        ));
    }
    let codes: BTreeSet<_> = errors.iter().map(|s| s.code).collect();
    if codes.len() > 1 {
        let listed: Vec<&str> = codes.iter().map(|c| c.as_str()).collect();
        return Some(format!(
            "identical requests failed with differing codes: {}",
            listed.join(", ")
        ));
    }
    None
}
