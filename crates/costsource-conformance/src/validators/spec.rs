//! Structural and semantic checks on well-formed responses.
//!
//! One representative valid request per operation, then a fixed checklist
//! of field predicates over the response. Every predicate yields exactly
//! one outcome named `spec.<operation>.<check>`.

use std::time::Instant;

use async_trait::async_trait;
use costsource_types::validate::{
    is_non_negative_amount, is_probability, is_valid_currency, is_valid_plugin_name,
};
use costsource_types::*;
use tracing::debug;

use super::{elapsed_ms, CategoryValidator};
use crate::config::{RequestFixture, SuiteConfig};
use crate::harness::Harness;
use crate::types::{CategoryMetrics, CategoryResult, ConformanceLevel, TestCategory, TestOutcome};

const CATEGORY: TestCategory = TestCategory::SpecValidation;
const LEVEL: ConformanceLevel = ConformanceLevel::Basic;

/// A single field predicate. `eval` returns the violation, if any.
struct Check<T> {
    name: &'static str,
    field: &'static str,
    eval: fn(&T, &RequestFixture) -> Option<String>,
}

pub struct SpecValidator;

#[async_trait]
impl CategoryValidator for SpecValidator {
    fn category(&self) -> TestCategory {
        CATEGORY
    }

    async fn validate(&self, harness: &Harness, config: &SuiteConfig) -> CategoryResult {
        let start = Instant::now();
        let mut outcomes = Vec::new();

        for op in Operation::ALL {
            let prefix = format!("{}.{}", CATEGORY.id_prefix(), op.snake_name());
            let request = config.fixture.valid_request(op);

            match harness.invoke(request, config.invoke_timeout()).await {
                Ok(response) => {
                    outcomes.push(
                        TestOutcome::pass(format!("{}.responds", prefix), CATEGORY, LEVEL)
                            .for_operation(op),
                    );
                    for (name, failure) in evaluate(&response, &config.fixture) {
                        if let Some(ref detail) = failure {
                            debug!(operation = %op, check = name, %detail, "spec check failed");
                        }
                        outcomes.push(
                            TestOutcome::from_check(
                                format!("{}.{}", prefix, name),
                                CATEGORY,
                                LEVEL,
                                failure,
                            )
                            .for_operation(op),
                        );
                    }
                }
                Err(status) => {
                    outcomes.push(
                        TestOutcome::fail(
                            format!("{}.responds", prefix),
                            CATEGORY,
                            LEVEL,
                            format!("valid request was rejected: {}", status),
                        )
                        .for_operation(op),
                    );
                    for name in check_names(op) {
                        outcomes.push(
                            TestOutcome::skip(
                                format!("{}.{}", prefix, name),
                                CATEGORY,
                                LEVEL,
                                "no response to inspect",
                            )
                            .for_operation(op),
                        );
                    }
                }
            }
        }

        CategoryResult::from_outcomes(
            CATEGORY,
            outcomes,
            CategoryMetrics::default(),
            elapsed_ms(start),
        )
    }
}

fn run<T>(
    checks: &[Check<T>],
    response: &T,
    fixture: &RequestFixture,
) -> Vec<(&'static str, Option<String>)> {
    checks
        .iter()
        .map(|c| {
            let failure = (c.eval)(response, fixture).map(|m| format!("{}: {}", c.field, m));
            (c.name, failure)
        })
        .collect()
}

fn names<T>(checks: &[Check<T>]) -> Vec<&'static str> {
    checks.iter().map(|c| c.name).collect()
}

fn evaluate(
    response: &RpcResponse,
    fixture: &RequestFixture,
) -> Vec<(&'static str, Option<String>)> {
    match response {
        RpcResponse::Name(r) => run(NAME_CHECKS, r, fixture),
        RpcResponse::Supports(r) => run(SUPPORTS_CHECKS, r, fixture),
        RpcResponse::GetActualCost(r) => run(ACTUAL_COST_CHECKS, r, fixture),
        RpcResponse::GetProjectedCost(r) => run(PROJECTED_COST_CHECKS, r, fixture),
        RpcResponse::GetPricingSpec(r) => run(PRICING_SPEC_CHECKS, r, fixture),
        RpcResponse::EstimateCost(r) => run(ESTIMATE_CHECKS, r, fixture),
        RpcResponse::GetRecommendations(r) => run(RECOMMENDATION_CHECKS, r, fixture),
    }
}

fn check_names(op: Operation) -> Vec<&'static str> {
    match op {
        Operation::Name => names(NAME_CHECKS),
        Operation::Supports => names(SUPPORTS_CHECKS),
        Operation::GetActualCost => names(ACTUAL_COST_CHECKS),
        Operation::GetProjectedCost => names(PROJECTED_COST_CHECKS),
        Operation::GetPricingSpec => names(PRICING_SPEC_CHECKS),
        Operation::EstimateCost => names(ESTIMATE_CHECKS),
        Operation::GetRecommendations => names(RECOMMENDATION_CHECKS),
    }
}

// ── Shared predicates ──────────────────────────────────────────────────

fn amount(value: f64) -> Option<String> {
    if is_non_negative_amount(value) {
        None
    } else {
        Some(format!("must be a finite amount >= 0, got {}", value))
    }
}

fn currency(code: &str) -> Option<String> {
    if is_valid_currency(code) {
        None
    } else {
        Some(format!("must be an ISO-4217 code, got {:?}", code))
    }
}

fn present(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        Some("must be non-empty".to_string())
    } else {
        None
    }
}

/// First offending element, prefixed with its index.
fn each<T>(items: &[T], bad: impl Fn(&T) -> Option<String>) -> Option<String> {
    items
        .iter()
        .enumerate()
        .find_map(|(i, item)| bad(item).map(|m| format!("[{}] {}", i, m)))
}

// ── Name ───────────────────────────────────────────────────────────────

const NAME_CHECKS: &[Check<NameResponse>] = &[
    Check {
        name: "non_empty_name",
        field: "name",
        eval: name_present,
    },
    Check {
        name: "name_format",
        field: "name",
        eval: name_format,
    },
];

fn name_present(r: &NameResponse, _: &RequestFixture) -> Option<String> {
    present(&r.name)
}

fn name_format(r: &NameResponse, _: &RequestFixture) -> Option<String> {
    if r.name.is_empty() || is_valid_plugin_name(&r.name) {
        None
    } else {
        Some(format!(
            "must be lower-case alphanumeric with '-' or '_', got {:?}",
            r.name
        ))
    }
}

// ── Supports ───────────────────────────────────────────────────────────

const SUPPORTS_CHECKS: &[Check<SupportsResponse>] = &[
    Check {
        name: "reason_when_unsupported",
        field: "reason",
        eval: reason_when_unsupported,
    },
    Check {
        name: "metrics_specified",
        field: "supported_metrics",
        eval: metrics_specified,
    },
    Check {
        name: "metrics_when_supported",
        field: "supported_metrics",
        eval: metrics_when_supported,
    },
];

fn reason_when_unsupported(r: &SupportsResponse, _: &RequestFixture) -> Option<String> {
    if !r.supported && r.reason.trim().is_empty() {
        Some("must explain why the resource is unsupported".to_string())
    } else {
        None
    }
}

fn metrics_specified(r: &SupportsResponse, _: &RequestFixture) -> Option<String> {
    each(&r.supported_metrics, |m| {
        (*m == MetricKind::Unspecified).then(|| "metric kind is UNSPECIFIED".to_string())
    })
}

fn metrics_when_supported(r: &SupportsResponse, _: &RequestFixture) -> Option<String> {
    if r.supported && r.supported_metrics.is_empty() {
        Some("must list at least one metric when supported".to_string())
    } else {
        None
    }
}

// ── GetActualCost ──────────────────────────────────────────────────────

const ACTUAL_COST_CHECKS: &[Check<GetActualCostResponse>] = &[
    Check {
        name: "non_empty_results",
        field: "results",
        eval: results_present,
    },
    Check {
        name: "non_negative_cost",
        field: "results[].cost",
        eval: |r, _| each(&r.results, |p| amount(p.cost)),
    },
    Check {
        name: "non_negative_usage",
        field: "results[].usage_amount",
        eval: |r, _| each(&r.results, |p| amount(p.usage_amount)),
    },
    Check {
        name: "timestamp_in_window",
        field: "results[].timestamp",
        eval: timestamp_in_window,
    },
    Check {
        name: "valid_currency",
        field: "results[].currency",
        eval: |r, _| each(&r.results, |p| currency(&p.currency)),
    },
    Check {
        name: "usage_unit_present",
        field: "results[].usage_unit",
        eval: |r, _| each(&r.results, |p| present(&p.usage_unit)),
    },
];

fn results_present(r: &GetActualCostResponse, _: &RequestFixture) -> Option<String> {
    if r.results.is_empty() {
        Some("must contain at least one data point for a non-empty window".to_string())
    } else {
        None
    }
}

fn timestamp_in_window(r: &GetActualCostResponse, fixture: &RequestFixture) -> Option<String> {
    each(&r.results, |p| {
        if p.timestamp < fixture.window_start || p.timestamp > fixture.window_end {
            Some(format!(
                "{} is outside the requested window {}..{}",
                p.timestamp.to_rfc3339(),
                fixture.window_start.to_rfc3339(),
                fixture.window_end.to_rfc3339()
            ))
        } else {
            None
        }
    })
}

// ── GetProjectedCost ───────────────────────────────────────────────────

const PROJECTED_COST_CHECKS: &[Check<GetProjectedCostResponse>] = &[
    Check {
        name: "valid_currency",
        field: "currency",
        eval: |r, _| currency(&r.currency),
    },
    Check {
        name: "non_negative_unit_price",
        field: "unit_price",
        eval: |r, _| amount(r.unit_price),
    },
    Check {
        name: "non_negative_cost_per_month",
        field: "cost_per_month",
        eval: |r, _| amount(r.cost_per_month),
    },
    Check {
        name: "billing_detail_present",
        field: "billing_detail",
        eval: |r, _| present(&r.billing_detail),
    },
];

// ── GetPricingSpec ─────────────────────────────────────────────────────

const PRICING_SPEC_CHECKS: &[Check<GetPricingSpecResponse>] = &[
    Check {
        name: "spec_present",
        field: "spec",
        eval: |r, _| r.spec.is_none().then(|| "must be set".to_string()),
    },
    Check {
        name: "billing_mode_specified",
        field: "spec.billing_mode",
        eval: |r, _| {
            r.spec
                .as_ref()
                .filter(|s| s.billing_mode == BillingMode::Unspecified)
                .map(|_| "billing mode is UNSPECIFIED".to_string())
        },
    },
    Check {
        name: "non_negative_rate",
        field: "spec.rate_per_unit",
        eval: |r, _| r.spec.as_ref().and_then(|s| amount(s.rate_per_unit)),
    },
    Check {
        name: "valid_currency",
        field: "spec.currency",
        eval: |r, _| r.spec.as_ref().and_then(|s| currency(&s.currency)),
    },
    Check {
        name: "provider_matches",
        field: "spec.provider",
        eval: provider_matches,
    },
];

fn provider_matches(r: &GetPricingSpecResponse, fixture: &RequestFixture) -> Option<String> {
    let spec = r.spec.as_ref()?;
    if spec.provider == fixture.resource.provider {
        None
    } else {
        Some(format!(
            "expected {:?}, got {:?}",
            fixture.resource.provider, spec.provider
        ))
    }
}

// ── EstimateCost ───────────────────────────────────────────────────────

const ESTIMATE_CHECKS: &[Check<EstimateCostResponse>] = &[
    Check {
        name: "valid_currency",
        field: "currency",
        eval: |r, _| currency(&r.currency),
    },
    Check {
        name: "non_negative_cost",
        field: "cost_monthly",
        eval: |r, _| amount(r.cost_monthly),
    },
];

// ── GetRecommendations ─────────────────────────────────────────────────

const RECOMMENDATION_CHECKS: &[Check<GetRecommendationsResponse>] = &[
    Check {
        name: "ids_present",
        field: "recommendations[].id",
        eval: |r, _| each(&r.recommendations, |rec| present(&rec.id)),
    },
    Check {
        name: "category_specified",
        field: "recommendations[].category",
        eval: |r, _| {
            each(&r.recommendations, |rec| {
                (rec.category == RecommendationCategory::Unspecified)
                    .then(|| "category is UNSPECIFIED".to_string())
            })
        },
    },
    Check {
        name: "action_specified",
        field: "recommendations[].action_type",
        eval: |r, _| {
            each(&r.recommendations, |rec| {
                (rec.action_type == RecommendationAction::Unspecified)
                    .then(|| "action type is UNSPECIFIED".to_string())
            })
        },
    },
    Check {
        name: "priority_specified",
        field: "recommendations[].priority",
        eval: |r, _| {
            each(&r.recommendations, |rec| {
                (rec.priority == RecommendationPriority::Unspecified)
                    .then(|| "priority is UNSPECIFIED".to_string())
            })
        },
    },
    Check {
        name: "non_negative_savings",
        field: "recommendations[].estimated_savings",
        eval: |r, _| each(&r.recommendations, |rec| amount(rec.estimated_savings)),
    },
    Check {
        name: "confidence_in_range",
        field: "recommendations[].confidence",
        eval: |r, _| {
            each(&r.recommendations, |rec| {
                (!is_probability(rec.confidence))
                    .then(|| format!("must be within 0.0..=1.0, got {}", rec.confidence))
            })
        },
    },
    Check {
        name: "valid_currency",
        field: "recommendations[].currency",
        eval: |r, _| each(&r.recommendations, |rec| currency(&rec.currency)),
    },
];
