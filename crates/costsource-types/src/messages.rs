//! Request and response messages for the cost source contract.
//!
//! Maps use `BTreeMap` so that encoding a message is deterministic; the
//! concurrency checks compare encoded responses byte for byte.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Shared ──────────────────────────────────────────────────────────────

/// Identifies a cloud resource by provider, type, SKU and region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub provider: String,
    pub resource_type: String,
    pub sku: String,
    pub region: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ResourceDescriptor {
    pub fn new(provider: &str, resource_type: &str, sku: &str, region: &str) -> Self {
        Self {
            provider: provider.into(),
            resource_type: resource_type.into(),
            sku: sku.into(),
            region: region.into(),
            tags: BTreeMap::new(),
        }
    }
}

/// Kind of cost metric a plugin can report for a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[default]
    Unspecified,
    ActualCost,
    ProjectedCost,
    Pricing,
    Recommendations,
}

/// How a resource is billed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    #[default]
    Unspecified,
    PerHour,
    PerGbMonth,
    PerRequest,
    FlatMonthly,
    Reserved,
    Spot,
}

// ── Name ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameRequest {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameResponse {
    pub name: String,
}

// ── Supports ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportsRequest {
    pub resource: Option<ResourceDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportsResponse {
    pub supported: bool,
    /// Must explain the refusal when `supported` is false.
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub supported_metrics: Vec<MetricKind>,
}

// ── GetActualCost ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetActualCostRequest {
    pub resource_id: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// One historical cost data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualCostResult {
    pub timestamp: DateTime<Utc>,
    pub cost: f64,
    pub usage_amount: f64,
    pub usage_unit: String,
    pub currency: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetActualCostResponse {
    pub results: Vec<ActualCostResult>,
}

// ── GetProjectedCost ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetProjectedCostRequest {
    pub resource: Option<ResourceDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetProjectedCostResponse {
    pub unit_price: f64,
    pub currency: String,
    pub cost_per_month: f64,
    pub billing_detail: String,
}

// ── GetPricingSpec ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetPricingSpecRequest {
    pub resource: Option<ResourceDescriptor>,
}

/// Pricing specification for a single SKU.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingSpec {
    pub provider: String,
    pub resource_type: String,
    pub sku: String,
    pub region: String,
    pub billing_mode: BillingMode,
    pub rate_per_unit: f64,
    pub currency: String,
    pub description: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetPricingSpecResponse {
    pub spec: Option<PricingSpec>,
}

// ── EstimateCost ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimateCostRequest {
    pub resource_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimateCostResponse {
    pub currency: String,
    pub cost_monthly: f64,
}

// ── GetRecommendations ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    #[default]
    Unspecified,
    Cost,
    Performance,
    Security,
    Reliability,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationAction {
    #[default]
    Unspecified,
    Rightsize,
    Terminate,
    PurchaseCommitment,
    AdjustRequests,
    Modify,
    DeleteUnused,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    #[default]
    Unspecified,
    Low,
    Medium,
    High,
    Critical,
}

/// Optional narrowing of a recommendation listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationFilter {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub region: String,
    pub category: Option<RecommendationCategory>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub category: RecommendationCategory,
    pub action_type: RecommendationAction,
    pub priority: RecommendationPriority,
    pub resource_id: String,
    pub description: String,
    pub estimated_savings: f64,
    pub currency: String,
    /// Model confidence in `0.0..=1.0`.
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetRecommendationsRequest {
    pub filter: Option<RecommendationFilter>,
    /// Zero selects the plugin's default page size; negative is invalid.
    pub page_size: i32,
    #[serde(default)]
    pub page_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetRecommendationsResponse {
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub next_page_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_defaults_are_unspecified() {
        assert_eq!(MetricKind::default(), MetricKind::Unspecified);
        assert_eq!(BillingMode::default(), BillingMode::Unspecified);
        assert_eq!(
            RecommendationCategory::default(),
            RecommendationCategory::Unspecified
        );
    }

    #[test]
    fn test_tags_encode_in_key_order() {
        let mut resource = ResourceDescriptor::new("aws", "ec2", "t3.micro", "us-east-1");
        resource.tags.insert("team".into(), "finops".into());
        resource.tags.insert("env".into(), "prod".into());
        let json = serde_json::to_string(&resource).unwrap();
        let env_at = json.find("env").unwrap();
        let team_at = json.find("team").unwrap();
        assert!(env_at < team_at);
    }

    #[test]
    fn test_missing_optional_fields_decode() {
        let req: SupportsResponse = serde_json::from_str(r#"{"supported":true}"#).unwrap();
        assert!(req.supported);
        assert!(req.reason.is_empty());
        assert!(req.supported_metrics.is_empty());
    }
}
