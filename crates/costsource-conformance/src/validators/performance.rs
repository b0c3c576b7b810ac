//! Latency and payload against the injected baseline.
//!
//! Each operation is measured once: warm-up calls are discarded, then
//! `sample_iterations` sequential calls are timed end to end through the
//! harness. The one sample set is judged at every level from Standard up
//! to the target, p95 below Advanced and max at Advanced, giving one
//! outcome per `(operation, level)`.

use std::time::Instant;

use async_trait::async_trait;
use costsource_types::{Operation, RpcStatus};
use tracing::debug;

use super::{elapsed_ms, CategoryValidator};
use crate::baseline::BaselineEntry;
use crate::config::SuiteConfig;
use crate::harness::{Harness, CRASHED_EARLIER};
use crate::stats::{exceedances_to_fail, summarize};
use crate::types::{
    CategoryMetrics, CategoryResult, ConformanceLevel, LatencyStats, Measurement, TestCategory,
    TestOutcome,
};

const CATEGORY: TestCategory = TestCategory::Performance;

pub struct PerformanceValidator;

/// Percentile a level is judged on. 100 means max.
fn percentile_for(level: ConformanceLevel) -> f64 {
    match level {
        ConformanceLevel::Advanced => 100.0,
        ConformanceLevel::Basic | ConformanceLevel::Standard => 95.0,
    }
}

/// Levels a run at `target` judges. Basic carries no latency requirement
/// of its own, so a Basic-only run judges against the Basic baseline.
fn judged_levels(target: ConformanceLevel) -> Vec<ConformanceLevel> {
    let levels: Vec<_> = target
        .up_to()
        .filter(|l| *l >= ConformanceLevel::Standard)
        .collect();
    if levels.is_empty() {
        vec![target]
    } else {
        levels
    }
}

fn micros(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Everything gathered for one operation.
struct Sampling {
    stats: Option<LatencyStats>,
    error: Option<RpcStatus>,
}

#[async_trait]
impl CategoryValidator for PerformanceValidator {
    fn category(&self) -> TestCategory {
        CATEGORY
    }

    async fn validate(&self, harness: &Harness, config: &SuiteConfig) -> CategoryResult {
        let start = Instant::now();
        let mut outcomes = Vec::new();
        let mut metrics = CategoryMetrics::default();
        let levels = judged_levels(config.target_level);

        for op in &config.performance.operations {
            let op = *op;
            if harness.crashes().crashed(op).is_some() {
                for level in &levels {
                    outcomes.push(
                        TestOutcome::skip(outcome_id(op, *level), CATEGORY, *level, CRASHED_EARLIER)
                            .for_operation(op),
                    );
                }
                continue;
            }
            let mut judgements: Vec<(ConformanceLevel, BaselineEntry)> = Vec::new();
            for level in &levels {
                match config.baseline.get(op, *level) {
                    Some(entry) => judgements.push((*level, *entry)),
                    None => outcomes.push(
                        TestOutcome::fail(
                            outcome_id(op, *level),
                            CATEGORY,
                            *level,
                            format!("no baseline for {} at {}", op, level),
                        )
                        .for_operation(op),
                    ),
                }
            }
            if judgements.is_empty() {
                continue;
            }

            let sampling = sample(harness, config, op, &judgements).await;
            for (level, entry) in &judgements {
                outcomes.push(judge(op, *level, entry, &sampling));
            }
            if let Some(stats) = sampling.stats {
                metrics.latency.insert(op.method().to_string(), stats);
            }
        }

        CategoryResult::from_outcomes(CATEGORY, outcomes, metrics, elapsed_ms(start))
    }
}

fn outcome_id(op: Operation, level: ConformanceLevel) -> String {
    format!("{}.{}.{}", CATEGORY.id_prefix(), op.snake_name(), level.tag())
}

async fn sample(
    harness: &Harness,
    config: &SuiteConfig,
    op: Operation,
    judgements: &[(ConformanceLevel, BaselineEntry)],
) -> Sampling {
    let request = config.fixture.valid_request(op);
    let timeout = config.invoke_timeout();
    let planned = config.performance.sample_iterations;

    // A call that cannot succeed while warming up cannot be measured either.
    for _ in 0..config.performance.warmup_iterations {
        if let Err(status) = harness.invoke(request.clone(), timeout).await {
            return Sampling {
                stats: None,
                error: Some(status),
            };
        }
    }

    let needed: Vec<usize> = judgements
        .iter()
        .map(|(level, _)| exceedances_to_fail(planned, percentile_for(*level)))
        .collect();
    let mut over = vec![0usize; judgements.len()];
    let mut latencies = Vec::with_capacity(planned);
    let mut payloads = Vec::with_capacity(planned);
    let mut error = None;

    for _ in 0..planned {
        let record = harness.invoke_measured(request.clone(), timeout).await;
        latencies.push(record.elapsed);
        payloads.push(record.payload_bytes());
        if let Err(status) = record.result {
            error = Some(status);
            break;
        }
        let elapsed_us = micros(record.elapsed);
        for (count, (_, entry)) in over.iter_mut().zip(judgements) {
            if elapsed_us > entry.max_latency_us() {
                *count += 1;
            }
        }
        // Stop once no remaining sample could rescue any level.
        if over.iter().zip(&needed).all(|(o, n)| o >= n) {
            debug!(operation = %op, samples = latencies.len(), "latency verdict decided early");
            break;
        }
    }

    Sampling {
        stats: summarize(&latencies, &payloads),
        error,
    }
}

fn judge(
    op: Operation,
    level: ConformanceLevel,
    entry: &BaselineEntry,
    sampling: &Sampling,
) -> TestOutcome {
    let id = outcome_id(op, level);
    if let Some(ref status) = sampling.error {
        return TestOutcome::fail(
            id,
            CATEGORY,
            level,
            format!("call failed during sampling: {}", status),
        )
        .for_operation(op);
    }
    let Some(ref stats) = sampling.stats else {
        return TestOutcome::skip(id, CATEGORY, level, "no samples taken").for_operation(op);
    };

    let (label, latency_us) = if percentile_for(level) >= 100.0 {
        ("max", stats.max_us)
    } else {
        ("p95", stats.p95_us)
    };
    let threshold_us = entry.max_latency_us();
    let failure = if latency_us > threshold_us {
        Some(format!(
            "{} latency {:.1}ms exceeds {}ms baseline",
            label,
            latency_us as f64 / 1_000.0,
            entry.max_latency_ms
        ))
    } else if stats.avg_payload_bytes > entry.max_payload_bytes {
        Some(format!(
            "mean payload {} bytes exceeds {} byte baseline",
            stats.avg_payload_bytes, entry.max_payload_bytes
        ))
    } else {
        None
    };

    TestOutcome::from_check(id, CATEGORY, level, failure)
        .for_operation(op)
        .with_measurement(Measurement {
            latency_us,
            threshold_us,
            payload_bytes: stats.avg_payload_bytes,
        })
}
