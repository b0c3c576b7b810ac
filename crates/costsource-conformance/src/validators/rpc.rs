//! Behaviour on valid and invalid input.
//!
//! A table of `(request, expected outcome class)` cases per operation. Each
//! case is its own outcome, `rpc.<operation>.<case>`, and a failing case
//! never prevents the remaining ones from running.

use std::time::Instant;

use async_trait::async_trait;
use costsource_types::*;
use tracing::debug;

use super::{elapsed_ms, CategoryValidator};
use crate::config::{RequestFixture, SuiteConfig};
use crate::harness::{Harness, CRASHED_EARLIER};
use crate::types::{CategoryMetrics, CategoryResult, ConformanceLevel, TestCategory, TestOutcome};

const CATEGORY: TestCategory = TestCategory::RpcCorrectness;

/// Outcome class a case expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Success,
    Code(Code),
    /// The code plus a message that says what was wrong.
    CodeWithMessage(Code),
}

impl Expect {
    /// Compare a call result against the expectation.
    pub fn judge<T>(&self, result: &RpcResult<T>) -> Option<String> {
        match (self, result) {
            (Expect::Success, Ok(_)) => None,
            (Expect::Success, Err(status)) => Some(format!("expected success, got {}", status)),
            (Expect::Code(code) | Expect::CodeWithMessage(code), Ok(_)) => {
                Some(format!("expected {}, got success", code))
            }
            (Expect::Code(code) | Expect::CodeWithMessage(code), Err(status))
                if status.code != *code =>
            {
                Some(format!("expected {}, got {}", code, status))
            }
            (Expect::CodeWithMessage(code), Err(status)) if status.message.trim().is_empty() => {
                Some(format!("{} returned without a descriptive message", code))
            }
            (Expect::Code(_) | Expect::CodeWithMessage(_), Err(_)) => None,
        }
    }
}

/// One table entry.
#[derive(Debug, Clone)]
pub struct Case {
    pub name: &'static str,
    pub level: ConformanceLevel,
    pub request: RpcRequest,
    pub expect: Expect,
}

impl Case {
    fn new(name: &'static str, request: RpcRequest, expect: Expect) -> Self {
        Self {
            name,
            level: ConformanceLevel::Basic,
            request,
            expect,
        }
    }

    fn at(mut self, level: ConformanceLevel) -> Self {
        self.level = level;
        self
    }

    pub fn id(&self) -> String {
        format!(
            "{}.{}.{}",
            CATEGORY.id_prefix(),
            self.request.operation().snake_name(),
            self.name
        )
    }
}

/// The full case table, built around the configured fixture.
pub fn cases(fixture: &RequestFixture) -> Vec<Case> {
    let unknown_provider =
        ResourceDescriptor::new("unknown-cloud", "vm", "standard-1", "nowhere-1");
    let mut missing_start = fixture.actual_cost_request();
    missing_start.start = None;
    let mut missing_end = fixture.actual_cost_request();
    missing_end.end = None;
    let mut inverted = fixture.actual_cost_request();
    inverted.start = Some(fixture.window_end);
    inverted.end = Some(fixture.window_start);
    let mut no_resource_id = fixture.actual_cost_request();
    no_resource_id.resource_id.clear();

    vec![
        // Name
        Case::new("valid", fixture.valid_request(Operation::Name), Expect::Success),
        // Supports
        Case::new("valid", fixture.valid_request(Operation::Supports), Expect::Success),
        Case::new(
            "missing_resource",
            RpcRequest::Supports(SupportsRequest { resource: None }),
            Expect::Code(Code::InvalidArgument),
        ),
        Case::new(
            "unknown_provider",
            RpcRequest::Supports(SupportsRequest {
                resource: Some(unknown_provider.clone()),
            }),
            Expect::Success,
        )
        .at(ConformanceLevel::Standard),
        // GetActualCost
        Case::new(
            "valid",
            fixture.valid_request(Operation::GetActualCost),
            Expect::Success,
        ),
        Case::new(
            "missing_start",
            RpcRequest::GetActualCost(missing_start),
            Expect::Code(Code::InvalidArgument),
        ),
        Case::new(
            "missing_end",
            RpcRequest::GetActualCost(missing_end),
            Expect::Code(Code::InvalidArgument),
        ),
        Case::new(
            "end_before_start",
            RpcRequest::GetActualCost(inverted),
            Expect::CodeWithMessage(Code::InvalidArgument),
        ),
        Case::new(
            "empty_resource_id",
            RpcRequest::GetActualCost(no_resource_id),
            Expect::Code(Code::InvalidArgument),
        ),
        // GetProjectedCost
        Case::new(
            "valid",
            fixture.valid_request(Operation::GetProjectedCost),
            Expect::Success,
        ),
        Case::new(
            "missing_resource",
            RpcRequest::GetProjectedCost(GetProjectedCostRequest { resource: None }),
            Expect::Code(Code::InvalidArgument),
        ),
        Case::new(
            "unknown_provider",
            RpcRequest::GetProjectedCost(GetProjectedCostRequest {
                resource: Some(unknown_provider),
            }),
            Expect::Code(Code::NotFound),
        )
        .at(ConformanceLevel::Standard),
        // GetPricingSpec
        Case::new(
            "valid",
            fixture.valid_request(Operation::GetPricingSpec),
            Expect::Success,
        ),
        Case::new(
            "missing_resource",
            RpcRequest::GetPricingSpec(GetPricingSpecRequest { resource: None }),
            Expect::Code(Code::InvalidArgument),
        ),
        // EstimateCost
        Case::new(
            "valid",
            fixture.valid_request(Operation::EstimateCost),
            Expect::Success,
        ),
        Case::new(
            "empty_resource_type",
            RpcRequest::EstimateCost(EstimateCostRequest {
                resource_type: String::new(),
                attributes: fixture.estimate_attributes.clone(),
            }),
            Expect::Code(Code::InvalidArgument),
        ),
        // GetRecommendations
        Case::new(
            "valid",
            fixture.valid_request(Operation::GetRecommendations),
            Expect::Success,
        ),
        Case::new(
            "negative_page_size",
            RpcRequest::GetRecommendations(GetRecommendationsRequest {
                filter: None,
                page_size: -1,
                page_token: String::new(),
            }),
            Expect::Code(Code::InvalidArgument),
        ),
        Case::new(
            "invalid_page_token",
            RpcRequest::GetRecommendations(GetRecommendationsRequest {
                filter: None,
                page_size: 10,
                page_token: "not-a-token".into(),
            }),
            Expect::Code(Code::InvalidArgument),
        )
        .at(ConformanceLevel::Advanced),
    ]
}

pub struct RpcCorrectnessValidator;

#[async_trait]
impl CategoryValidator for RpcCorrectnessValidator {
    fn category(&self) -> TestCategory {
        CATEGORY
    }

    async fn validate(&self, harness: &Harness, config: &SuiteConfig) -> CategoryResult {
        let start = Instant::now();
        let mut outcomes = Vec::new();

        for case in cases(&config.fixture)
            .into_iter()
            .filter(|c| c.level <= config.target_level)
        {
            let id = case.id();
            let operation = case.request.operation();
            if harness.crashes().crashed(operation).is_some() {
                outcomes.push(
                    TestOutcome::skip(id, CATEGORY, case.level, CRASHED_EARLIER)
                        .for_operation(operation),
                );
                continue;
            }
            let result = harness.invoke(case.request, config.invoke_timeout()).await;
            let failure = case.expect.judge(&result);
            if let Some(ref detail) = failure {
                debug!(%id, %detail, "rpc case failed");
            }
            outcomes.push(
                TestOutcome::from_check(id, CATEGORY, case.level, failure).for_operation(operation),
            );
        }

        CategoryResult::from_outcomes(
            CATEGORY,
            outcomes,
            CategoryMetrics::default(),
            elapsed_ms(start),
        )
    }
}
