//! The plugin trait and its fixed operation set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::messages::*;
use crate::status::{RpcResult, RpcStatus};

/// Service path prefix used for fully-qualified method names.
pub const SERVICE_PATH: &str = "/costsource.v1.CostSourceService/";

/// The fixed set of operations every cost source plugin exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operation {
    Name,
    Supports,
    GetActualCost,
    GetProjectedCost,
    GetPricingSpec,
    EstimateCost,
    GetRecommendations,
}

impl Operation {
    /// All operations in canonical order.
    pub const ALL: [Operation; 7] = [
        Self::Name,
        Self::Supports,
        Self::GetActualCost,
        Self::GetProjectedCost,
        Self::GetPricingSpec,
        Self::EstimateCost,
        Self::GetRecommendations,
    ];

    /// Bare method name, e.g. `GetActualCost`.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Supports => "Supports",
            Self::GetActualCost => "GetActualCost",
            Self::GetProjectedCost => "GetProjectedCost",
            Self::GetPricingSpec => "GetPricingSpec",
            Self::EstimateCost => "EstimateCost",
            Self::GetRecommendations => "GetRecommendations",
        }
    }

    /// Lower-snake name used in check identifiers, e.g. `get_actual_cost`.
    pub fn snake_name(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Supports => "supports",
            Self::GetActualCost => "get_actual_cost",
            Self::GetProjectedCost => "get_projected_cost",
            Self::GetPricingSpec => "get_pricing_spec",
            Self::EstimateCost => "estimate_cost",
            Self::GetRecommendations => "get_recommendations",
        }
    }

    /// Fully-qualified path, e.g. `/costsource.v1.CostSourceService/Name`.
    pub fn full_path(&self) -> String {
        format!("{}{}", SERVICE_PATH, self.method())
    }

    /// Resolve a bare or fully-qualified method name.
    pub fn from_method(method: &str) -> Option<Operation> {
        let bare = method.strip_prefix(SERVICE_PATH).unwrap_or(method);
        Self::ALL.iter().copied().find(|op| op.method() == bare)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// Per-call context handed to the plugin, carrying the caller's deadline.
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    pub operation: Operation,
    pub deadline: Instant,
}

impl CallContext {
    pub fn new(operation: Operation, timeout: Duration) -> Self {
        Self {
            operation,
            deadline: Instant::now() + timeout,
        }
    }

    /// Time left before the caller gives up. Zero once expired.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// The cost source capability contract.
///
/// Only `name` is mandatory; every other operation defaults to
/// `Unimplemented` so partial plugins still load and get classified.
#[async_trait]
pub trait CostSourcePlugin: Send + Sync {
    async fn name(&self, ctx: &CallContext, req: NameRequest) -> RpcResult<NameResponse>;

    async fn supports(
        &self,
        _ctx: &CallContext,
        _req: SupportsRequest,
    ) -> RpcResult<SupportsResponse> {
        Err(unimplemented(Operation::Supports))
    }

    async fn get_actual_cost(
        &self,
        _ctx: &CallContext,
        _req: GetActualCostRequest,
    ) -> RpcResult<GetActualCostResponse> {
        Err(unimplemented(Operation::GetActualCost))
    }

    async fn get_projected_cost(
        &self,
        _ctx: &CallContext,
        _req: GetProjectedCostRequest,
    ) -> RpcResult<GetProjectedCostResponse> {
        Err(unimplemented(Operation::GetProjectedCost))
    }

    async fn get_pricing_spec(
        &self,
        _ctx: &CallContext,
        _req: GetPricingSpecRequest,
    ) -> RpcResult<GetPricingSpecResponse> {
        Err(unimplemented(Operation::GetPricingSpec))
    }

    async fn estimate_cost(
        &self,
        _ctx: &CallContext,
        _req: EstimateCostRequest,
    ) -> RpcResult<EstimateCostResponse> {
        Err(unimplemented(Operation::EstimateCost))
    }

    async fn get_recommendations(
        &self,
        _ctx: &CallContext,
        _req: GetRecommendationsRequest,
    ) -> RpcResult<GetRecommendationsResponse> {
        Err(unimplemented(Operation::GetRecommendations))
    }
}

fn unimplemented(op: Operation) -> RpcStatus {
    RpcStatus::unimplemented(format!("method {} not implemented", op.method()))
}
