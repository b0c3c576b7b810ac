//! Reference plugin with injectable faults.
//!
//! `MockPlugin::new()` answers every operation correctly and
//! deterministically. Faults are attached per operation with
//! [`MockPlugin::with_fault`] to make the plugin misbehave in a known way,
//! which is how the suite's own checks are exercised against both good and
//! bad plugins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use costsource_types::*;
use tracing::debug;

const MOCK_NAME: &str = "mock-costsource";
const MOCK_SOURCE: &str = "mock";
const HOURS_PER_MONTH: f64 = 730.0;
const MAX_DAILY_POINTS: usize = 366;
const DEFAULT_PAGE_SIZE: usize = 10;
const SUPPORTED_PROVIDERS: [&str; 3] = ["aws", "azure", "gcp"];

/// How a malformed response is corrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    /// Flip the sign of the primary monetary amount.
    NegativeCost,
    /// Blank out the operation's main required field.
    EmptyRequiredField,
    /// Report a currency that is not an ISO-4217 code.
    InvalidCurrency,
    /// Push an enumeration or bounded number outside its valid set.
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FaultKind {
    /// Sleep before answering.
    Delay(Duration),
    /// Panic inside the handler.
    Panic(String),
    /// Answer successfully with a corrupted response.
    Malformed(Corruption),
    /// Fail with the given code.
    Error(Code),
    /// Answer with content that changes from call to call.
    Nondeterministic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultTrigger {
    Always,
    /// Only the first call to the operation is affected.
    Once,
}

/// A fault attached to one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub kind: FaultKind,
    pub trigger: FaultTrigger,
}

impl Fault {
    pub fn new(kind: FaultKind) -> Self {
        Self {
            kind,
            trigger: FaultTrigger::Always,
        }
    }

    pub fn delay(duration: Duration) -> Self {
        Self::new(FaultKind::Delay(duration))
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Panic(message.into()))
    }

    pub fn malformed(corruption: Corruption) -> Self {
        Self::new(FaultKind::Malformed(corruption))
    }

    pub fn error(code: Code) -> Self {
        Self::new(FaultKind::Error(code))
    }

    pub fn nondeterministic() -> Self {
        Self::new(FaultKind::Nondeterministic)
    }

    /// Restrict the fault to the first call.
    pub fn once(mut self) -> Self {
        self.trigger = FaultTrigger::Once;
        self
    }
}

struct FaultSlot {
    fault: Fault,
    fired: AtomicBool,
}

impl FaultSlot {
    fn should_fire(&self) -> bool {
        match self.fault.trigger {
            FaultTrigger::Always => true,
            FaultTrigger::Once => !self.fired.swap(true, Ordering::SeqCst),
        }
    }
}

/// What to do to a response after it has been built.
enum Effect {
    None,
    Corrupt(Corruption),
    Vary(u64),
}

/// In-memory cost source plugin.
///
/// Safe to call from many tasks at once: the only mutable state is atomic.
pub struct MockPlugin {
    name: String,
    faults: HashMap<Operation, FaultSlot>,
    calls: [AtomicU64; 7],
}

impl Default for MockPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlugin {
    pub fn new() -> Self {
        Self {
            name: MOCK_NAME.to_string(),
            faults: HashMap::new(),
            calls: Default::default(),
        }
    }

    /// Override the reported plugin name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a fault to `operation`, replacing any previous one.
    pub fn with_fault(mut self, operation: Operation, fault: Fault) -> Self {
        self.faults.insert(
            operation,
            FaultSlot {
                fault,
                fired: AtomicBool::new(false),
            },
        );
        self
    }

    /// Number of calls `operation` has received.
    pub fn call_count(&self, operation: Operation) -> u64 {
        self.calls[operation as usize].load(Ordering::SeqCst)
    }

    /// Count the call and apply the operation's fault, if any.
    async fn enter(&self, operation: Operation) -> RpcResult<Effect> {
        let n = self.calls[operation as usize].fetch_add(1, Ordering::SeqCst) + 1;
        let Some(slot) = self.faults.get(&operation) else {
            return Ok(Effect::None);
        };
        if !slot.should_fire() {
            return Ok(Effect::None);
        }
        debug!(%operation, fault = ?slot.fault.kind, "injecting fault");
        match &slot.fault.kind {
            FaultKind::Delay(d) => {
                tokio::time::sleep(*d).await;
                Ok(Effect::None)
            }
            FaultKind::Panic(message) => panic!("{}", message),
            FaultKind::Error(code) => Err(RpcStatus::new(
                *code,
                format!("injected {} failure", operation),
            )),
            FaultKind::Malformed(c) => Ok(Effect::Corrupt(*c)),
            FaultKind::Nondeterministic => Ok(Effect::Vary(n)),
        }
    }
}

fn finish<T: Tamper>(effect: Effect, mut response: T) -> T {
    match effect {
        Effect::None => {}
        Effect::Corrupt(c) => response.corrupt(c),
        Effect::Vary(n) => response.vary(n),
    }
    response
}

fn require_resource(resource: Option<ResourceDescriptor>) -> RpcResult<ResourceDescriptor> {
    let resource =
        resource.ok_or_else(|| RpcStatus::invalid_argument("resource descriptor is required"))?;
    if resource.provider.is_empty() {
        return Err(RpcStatus::invalid_argument("resource.provider is required"));
    }
    Ok(resource)
}

fn require_known_provider(resource: &ResourceDescriptor) -> RpcResult<()> {
    if SUPPORTED_PROVIDERS.contains(&resource.provider.as_str()) {
        Ok(())
    } else {
        Err(RpcStatus::not_found(format!(
            "no pricing for provider {}",
            resource.provider
        )))
    }
}

/// Hourly on-demand rate for a SKU.
fn hourly_rate(sku: &str) -> f64 {
    match sku {
        "t3.nano" => 0.0052,
        "t3.micro" => 0.0104,
        "t3.small" => 0.0208,
        "m5.large" => 0.096,
        _ => 0.05,
    }
}

fn catalog() -> Vec<Recommendation> {
    vec![
        Recommendation {
            id: "rec-0001".into(),
            category: RecommendationCategory::Cost,
            action_type: RecommendationAction::Rightsize,
            priority: RecommendationPriority::High,
            resource_id: "i-0abc123def4567890".into(),
            description: "Downsize t3.micro to t3.nano".into(),
            estimated_savings: 3.8,
            currency: "USD".into(),
            confidence: 0.85,
        },
        Recommendation {
            id: "rec-0002".into(),
            category: RecommendationCategory::Cost,
            action_type: RecommendationAction::PurchaseCommitment,
            priority: RecommendationPriority::Medium,
            resource_id: "ec2-fleet-us-east-1".into(),
            description: "Cover steady-state usage with a 1-year savings plan".into(),
            estimated_savings: 120.0,
            currency: "USD".into(),
            confidence: 0.7,
        },
        Recommendation {
            id: "rec-0003".into(),
            category: RecommendationCategory::Reliability,
            action_type: RecommendationAction::DeleteUnused,
            priority: RecommendationPriority::Low,
            resource_id: "vol-0f1e2d3c4b5a69788".into(),
            description: "Delete unattached EBS volume".into(),
            estimated_savings: 8.0,
            currency: "USD".into(),
            confidence: 0.95,
        },
    ]
}

#[async_trait]
impl CostSourcePlugin for MockPlugin {
    async fn name(&self, _ctx: &CallContext, _req: NameRequest) -> RpcResult<NameResponse> {
        let effect = self.enter(Operation::Name).await?;
        Ok(finish(
            effect,
            NameResponse {
                name: self.name.clone(),
            },
        ))
    }

    async fn supports(
        &self,
        _ctx: &CallContext,
        req: SupportsRequest,
    ) -> RpcResult<SupportsResponse> {
        let effect = self.enter(Operation::Supports).await?;
        let resource = require_resource(req.resource)?;
        let response = if SUPPORTED_PROVIDERS.contains(&resource.provider.as_str()) {
            SupportsResponse {
                supported: true,
                reason: String::new(),
                supported_metrics: vec![
                    MetricKind::ActualCost,
                    MetricKind::ProjectedCost,
                    MetricKind::Pricing,
                    MetricKind::Recommendations,
                ],
            }
        } else {
            SupportsResponse {
                supported: false,
                reason: format!("provider {} is not supported", resource.provider),
                supported_metrics: Vec::new(),
            }
        };
        Ok(finish(effect, response))
    }

    async fn get_actual_cost(
        &self,
        _ctx: &CallContext,
        req: GetActualCostRequest,
    ) -> RpcResult<GetActualCostResponse> {
        let effect = self.enter(Operation::GetActualCost).await?;
        if req.resource_id.is_empty() {
            return Err(RpcStatus::invalid_argument("resource_id is required"));
        }
        let start = req
            .start
            .ok_or_else(|| RpcStatus::invalid_argument("start time is required"))?;
        let end = req
            .end
            .ok_or_else(|| RpcStatus::invalid_argument("end time is required"))?;
        if end < start {
            return Err(RpcStatus::invalid_argument(format!(
                "end time {} is before start time {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }

        let daily_cost = hourly_rate("t3.micro") * 24.0;
        let mut results = Vec::new();
        let mut timestamp = start;
        while timestamp < end && results.len() < MAX_DAILY_POINTS {
            results.push(ActualCostResult {
                timestamp,
                cost: daily_cost,
                usage_amount: 24.0,
                usage_unit: "Hrs".into(),
                currency: "USD".into(),
                source: MOCK_SOURCE.into(),
            });
            timestamp += ChronoDuration::days(1);
        }
        Ok(finish(effect, GetActualCostResponse { results }))
    }

    async fn get_projected_cost(
        &self,
        _ctx: &CallContext,
        req: GetProjectedCostRequest,
    ) -> RpcResult<GetProjectedCostResponse> {
        let effect = self.enter(Operation::GetProjectedCost).await?;
        let resource = require_resource(req.resource)?;
        require_known_provider(&resource)?;
        let unit_price = hourly_rate(&resource.sku);
        Ok(finish(
            effect,
            GetProjectedCostResponse {
                unit_price,
                currency: "USD".into(),
                cost_per_month: unit_price * HOURS_PER_MONTH,
                billing_detail: format!(
                    "on-demand {} in {}, 730 hours/month",
                    resource.sku, resource.region
                ),
            },
        ))
    }

    async fn get_pricing_spec(
        &self,
        _ctx: &CallContext,
        req: GetPricingSpecRequest,
    ) -> RpcResult<GetPricingSpecResponse> {
        let effect = self.enter(Operation::GetPricingSpec).await?;
        let resource = require_resource(req.resource)?;
        require_known_provider(&resource)?;
        let spec = PricingSpec {
            billing_mode: BillingMode::PerHour,
            rate_per_unit: hourly_rate(&resource.sku),
            currency: "USD".into(),
            description: format!("{} on-demand hourly rate", resource.sku),
            source: MOCK_SOURCE.into(),
            provider: resource.provider,
            resource_type: resource.resource_type,
            sku: resource.sku,
            region: resource.region,
        };
        Ok(finish(effect, GetPricingSpecResponse { spec: Some(spec) }))
    }

    async fn estimate_cost(
        &self,
        _ctx: &CallContext,
        req: EstimateCostRequest,
    ) -> RpcResult<EstimateCostResponse> {
        let effect = self.enter(Operation::EstimateCost).await?;
        if req.resource_type.is_empty() {
            return Err(RpcStatus::invalid_argument("resource_type is required"));
        }
        let sku = req
            .attributes
            .get("instanceType")
            .map(String::as_str)
            .unwrap_or_default();
        Ok(finish(
            effect,
            EstimateCostResponse {
                currency: "USD".into(),
                cost_monthly: hourly_rate(sku) * HOURS_PER_MONTH,
            },
        ))
    }

    async fn get_recommendations(
        &self,
        _ctx: &CallContext,
        req: GetRecommendationsRequest,
    ) -> RpcResult<GetRecommendationsResponse> {
        let effect = self.enter(Operation::GetRecommendations).await?;
        if req.page_size < 0 {
            return Err(RpcStatus::invalid_argument(format!(
                "page_size must be >= 0, got {}",
                req.page_size
            )));
        }
        let offset = if req.page_token.is_empty() {
            0
        } else {
            req.page_token.parse::<usize>().map_err(|_| {
                RpcStatus::invalid_argument(format!("invalid page_token {:?}", req.page_token))
            })?
        };
        let page_size = match req.page_size {
            0 => DEFAULT_PAGE_SIZE,
            n => n as usize,
        };

        let matching: Vec<Recommendation> = catalog()
            .into_iter()
            .filter(|r| match &req.filter {
                Some(RecommendationFilter {
                    category: Some(category),
                    ..
                }) if *category != RecommendationCategory::Unspecified => r.category == *category,
                _ => true,
            })
            .collect();
        let total = matching.len();
        let recommendations: Vec<_> = matching.into_iter().skip(offset).take(page_size).collect();
        let consumed = offset.saturating_add(recommendations.len());
        let next_page_token = if consumed < total {
            consumed.to_string()
        } else {
            String::new()
        };

        Ok(finish(
            effect,
            GetRecommendationsResponse {
                recommendations,
                next_page_token,
            },
        ))
    }
}

// ── Response tampering ─────────────────────────────────────────────────

/// Ways a fault can distort a well-formed response.
trait Tamper {
    fn corrupt(&mut self, corruption: Corruption);
    /// Change content in a way that still looks valid.
    fn vary(&mut self, call: u64);
}

impl Tamper for NameResponse {
    fn corrupt(&mut self, corruption: Corruption) {
        match corruption {
            Corruption::EmptyRequiredField => self.name.clear(),
            Corruption::OutOfRange => self.name = "Mock Cost Source!".into(),
            Corruption::NegativeCost | Corruption::InvalidCurrency => {}
        }
    }

    fn vary(&mut self, call: u64) {
        self.name = format!("{}-{}", self.name, call);
    }
}

impl Tamper for SupportsResponse {
    fn corrupt(&mut self, corruption: Corruption) {
        match corruption {
            Corruption::EmptyRequiredField => {
                self.supported = false;
                self.reason.clear();
            }
            Corruption::OutOfRange => self.supported_metrics.push(MetricKind::Unspecified),
            Corruption::NegativeCost | Corruption::InvalidCurrency => {}
        }
    }

    fn vary(&mut self, call: u64) {
        if call % 2 == 0 {
            self.supported_metrics.reverse();
        }
    }
}

impl Tamper for GetActualCostResponse {
    fn corrupt(&mut self, corruption: Corruption) {
        for result in &mut self.results {
            match corruption {
                Corruption::NegativeCost => result.cost = -result.cost,
                Corruption::EmptyRequiredField => result.usage_unit.clear(),
                Corruption::InvalidCurrency => result.currency = "usd".into(),
                Corruption::OutOfRange => result.timestamp -= ChronoDuration::days(365),
            }
        }
    }

    fn vary(&mut self, call: u64) {
        for result in &mut self.results {
            result.cost += call as f64 * 0.0001;
        }
    }
}

impl Tamper for GetProjectedCostResponse {
    fn corrupt(&mut self, corruption: Corruption) {
        match corruption {
            Corruption::NegativeCost => self.cost_per_month = -self.cost_per_month,
            Corruption::EmptyRequiredField => self.billing_detail.clear(),
            Corruption::InvalidCurrency => self.currency = "usd".into(),
            Corruption::OutOfRange => {}
        }
    }

    fn vary(&mut self, call: u64) {
        self.cost_per_month += call as f64 * 0.01;
    }
}

impl Tamper for GetPricingSpecResponse {
    fn corrupt(&mut self, corruption: Corruption) {
        if corruption == Corruption::EmptyRequiredField {
            self.spec = None;
            return;
        }
        if let Some(spec) = self.spec.as_mut() {
            match corruption {
                Corruption::NegativeCost => spec.rate_per_unit = -spec.rate_per_unit,
                Corruption::InvalidCurrency => spec.currency = "usd".into(),
                Corruption::OutOfRange => spec.billing_mode = BillingMode::Unspecified,
                Corruption::EmptyRequiredField => {}
            }
        }
    }

    fn vary(&mut self, call: u64) {
        if let Some(spec) = self.spec.as_mut() {
            spec.description = format!("{} (quote {})", spec.description, call);
        }
    }
}

impl Tamper for EstimateCostResponse {
    fn corrupt(&mut self, corruption: Corruption) {
        match corruption {
            Corruption::NegativeCost => self.cost_monthly = -self.cost_monthly,
            Corruption::EmptyRequiredField => self.currency.clear(),
            Corruption::InvalidCurrency => self.currency = "usd".into(),
            Corruption::OutOfRange => {}
        }
    }

    fn vary(&mut self, call: u64) {
        self.cost_monthly += call as f64;
    }
}

impl Tamper for GetRecommendationsResponse {
    fn corrupt(&mut self, corruption: Corruption) {
        for rec in &mut self.recommendations {
            match corruption {
                Corruption::NegativeCost => rec.estimated_savings = -rec.estimated_savings,
                Corruption::EmptyRequiredField => rec.id.clear(),
                Corruption::InvalidCurrency => rec.currency = "usd".into(),
                Corruption::OutOfRange => rec.confidence = 1.5,
            }
        }
    }

    fn vary(&mut self, call: u64) {
        for rec in &mut self.recommendations {
            rec.estimated_savings += call as f64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ctx(op: Operation) -> CallContext {
        CallContext::new(op, Duration::from_secs(5))
    }

    fn aws() -> ResourceDescriptor {
        ResourceDescriptor::new("aws", "ec2", "t3.micro", "us-east-1")
    }

    fn window(days: i64) -> GetActualCostRequest {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        GetActualCostRequest {
            resource_id: "i-1".into(),
            start: Some(start),
            end: Some(start + ChronoDuration::days(days)),
            tags: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_supports_known_and_unknown_provider() {
        let plugin = MockPlugin::new();
        let ok = plugin
            .supports(&ctx(Operation::Supports), SupportsRequest { resource: Some(aws()) })
            .await
            .unwrap();
        assert!(ok.supported);
        assert_eq!(ok.supported_metrics.len(), 4);

        let other = ResourceDescriptor::new("oracle", "vm", "x", "y");
        let no = plugin
            .supports(&ctx(Operation::Supports), SupportsRequest { resource: Some(other) })
            .await
            .unwrap();
        assert!(!no.supported);
        assert!(no.reason.contains("oracle"));
    }

    #[tokio::test]
    async fn test_actual_cost_one_point_per_day() {
        let plugin = MockPlugin::new();
        let resp = plugin
            .get_actual_cost(&ctx(Operation::GetActualCost), window(7))
            .await
            .unwrap();
        assert_eq!(resp.results.len(), 7);
        assert!(resp.results.iter().all(|r| r.cost > 0.0));
    }

    #[tokio::test]
    async fn test_actual_cost_rejects_inverted_window() {
        let plugin = MockPlugin::new();
        let err = plugin
            .get_actual_cost(&ctx(Operation::GetActualCost), window(-1))
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
        assert!(err.message.contains("before start"));
    }

    #[tokio::test]
    async fn test_projected_cost_unknown_provider_not_found() {
        let plugin = MockPlugin::new();
        let err = plugin
            .get_projected_cost(
                &ctx(Operation::GetProjectedCost),
                GetProjectedCostRequest {
                    resource: Some(ResourceDescriptor::new("oracle", "vm", "x", "y")),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::NotFound);
    }

    #[tokio::test]
    async fn test_recommendation_paging() {
        let plugin = MockPlugin::new();
        let first = plugin
            .get_recommendations(
                &ctx(Operation::GetRecommendations),
                GetRecommendationsRequest {
                    filter: None,
                    page_size: 2,
                    page_token: String::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(first.recommendations.len(), 2);
        assert_eq!(first.next_page_token, "2");

        let second = plugin
            .get_recommendations(
                &ctx(Operation::GetRecommendations),
                GetRecommendationsRequest {
                    filter: None,
                    page_size: 2,
                    page_token: first.next_page_token,
                },
            )
            .await
            .unwrap();
        assert_eq!(second.recommendations.len(), 1);
        assert!(second.next_page_token.is_empty());
    }

    #[tokio::test]
    async fn test_recommendation_category_filter() {
        let plugin = MockPlugin::new();
        let resp = plugin
            .get_recommendations(
                &ctx(Operation::GetRecommendations),
                GetRecommendationsRequest {
                    filter: Some(RecommendationFilter {
                        category: Some(RecommendationCategory::Reliability),
                        ..Default::default()
                    }),
                    page_size: 0,
                    page_token: String::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(resp.recommendations.len(), 1);
        assert_eq!(resp.recommendations[0].id, "rec-0003");
    }

    #[tokio::test]
    async fn test_negative_cost_corruption_only_touches_cost() {
        let plugin = MockPlugin::new().with_fault(
            Operation::GetActualCost,
            Fault::malformed(Corruption::NegativeCost),
        );
        let resp = plugin
            .get_actual_cost(&ctx(Operation::GetActualCost), window(2))
            .await
            .unwrap();
        for r in &resp.results {
            assert!(r.cost < 0.0);
            assert!(r.usage_amount > 0.0);
            assert_eq!(r.currency, "USD");
        }
    }

    #[tokio::test]
    async fn test_once_trigger_fires_once() {
        let plugin =
            MockPlugin::new().with_fault(Operation::EstimateCost, Fault::error(Code::Unavailable).once());
        let req = EstimateCostRequest {
            resource_type: "aws:ec2/instance:Instance".into(),
            attributes: Default::default(),
        };
        let first = plugin
            .estimate_cost(&ctx(Operation::EstimateCost), req.clone())
            .await;
        assert_eq!(first.unwrap_err().code, Code::Unavailable);
        assert!(plugin
            .estimate_cost(&ctx(Operation::EstimateCost), req)
            .await
            .is_ok());
        assert_eq!(plugin.call_count(Operation::EstimateCost), 2);
    }

    #[tokio::test]
    async fn test_nondeterministic_changes_between_calls() {
        let plugin = MockPlugin::new().with_fault(Operation::Name, Fault::nondeterministic());
        let a = plugin.name(&ctx(Operation::Name), NameRequest {}).await.unwrap();
        let b = plugin.name(&ctx(Operation::Name), NameRequest {}).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_call_counts_are_per_operation() {
        let plugin = MockPlugin::new();
        plugin.name(&ctx(Operation::Name), NameRequest {}).await.unwrap();
        plugin.name(&ctx(Operation::Name), NameRequest {}).await.unwrap();
        assert_eq!(plugin.call_count(Operation::Name), 2);
        assert_eq!(plugin.call_count(Operation::Supports), 0);
    }
}
