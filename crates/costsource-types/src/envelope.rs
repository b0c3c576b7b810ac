//! Operation-tagged request and response envelopes.
//!
//! The envelope is what crosses a transport boundary: the operation
//! selects the method, the body is the serialized message.

use serde::{Deserialize, Serialize};

use crate::messages::*;
use crate::plugin::{CallContext, CostSourcePlugin, Operation};
use crate::status::RpcResult;

/// A request for any contract operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcRequest {
    Name(NameRequest),
    Supports(SupportsRequest),
    GetActualCost(GetActualCostRequest),
    GetProjectedCost(GetProjectedCostRequest),
    GetPricingSpec(GetPricingSpecRequest),
    EstimateCost(EstimateCostRequest),
    GetRecommendations(GetRecommendationsRequest),
}

/// A response from any contract operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcResponse {
    Name(NameResponse),
    Supports(SupportsResponse),
    GetActualCost(GetActualCostResponse),
    GetProjectedCost(GetProjectedCostResponse),
    GetPricingSpec(GetPricingSpecResponse),
    EstimateCost(EstimateCostResponse),
    GetRecommendations(GetRecommendationsResponse),
}

impl RpcRequest {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Name(_) => Operation::Name,
            Self::Supports(_) => Operation::Supports,
            Self::GetActualCost(_) => Operation::GetActualCost,
            Self::GetProjectedCost(_) => Operation::GetProjectedCost,
            Self::GetPricingSpec(_) => Operation::GetPricingSpec,
            Self::EstimateCost(_) => Operation::EstimateCost,
            Self::GetRecommendations(_) => Operation::GetRecommendations,
        }
    }

    /// Serialize the inner message only (no operation tag).
    pub fn encode_body(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Self::Name(m) => serde_json::to_vec(m),
            Self::Supports(m) => serde_json::to_vec(m),
            Self::GetActualCost(m) => serde_json::to_vec(m),
            Self::GetProjectedCost(m) => serde_json::to_vec(m),
            Self::GetPricingSpec(m) => serde_json::to_vec(m),
            Self::EstimateCost(m) => serde_json::to_vec(m),
            Self::GetRecommendations(m) => serde_json::to_vec(m),
        }
    }

    /// Decode a message body for the given operation.
    pub fn decode_body(op: Operation, body: &[u8]) -> serde_json::Result<Self> {
        Ok(match op {
            Operation::Name => Self::Name(serde_json::from_slice(body)?),
            Operation::Supports => Self::Supports(serde_json::from_slice(body)?),
            Operation::GetActualCost => Self::GetActualCost(serde_json::from_slice(body)?),
            Operation::GetProjectedCost => Self::GetProjectedCost(serde_json::from_slice(body)?),
            Operation::GetPricingSpec => Self::GetPricingSpec(serde_json::from_slice(body)?),
            Operation::EstimateCost => Self::EstimateCost(serde_json::from_slice(body)?),
            Operation::GetRecommendations => {
                Self::GetRecommendations(serde_json::from_slice(body)?)
            }
        })
    }

    /// Route the request to the matching plugin method.
    pub async fn dispatch(
        self,
        plugin: &dyn CostSourcePlugin,
        ctx: &CallContext,
    ) -> RpcResult<RpcResponse> {
        Ok(match self {
            Self::Name(r) => RpcResponse::Name(plugin.name(ctx, r).await?),
            Self::Supports(r) => RpcResponse::Supports(plugin.supports(ctx, r).await?),
            Self::GetActualCost(r) => {
                RpcResponse::GetActualCost(plugin.get_actual_cost(ctx, r).await?)
            }
            Self::GetProjectedCost(r) => {
                RpcResponse::GetProjectedCost(plugin.get_projected_cost(ctx, r).await?)
            }
            Self::GetPricingSpec(r) => {
                RpcResponse::GetPricingSpec(plugin.get_pricing_spec(ctx, r).await?)
            }
            Self::EstimateCost(r) => RpcResponse::EstimateCost(plugin.estimate_cost(ctx, r).await?),
            Self::GetRecommendations(r) => {
                RpcResponse::GetRecommendations(plugin.get_recommendations(ctx, r).await?)
            }
        })
    }
}

impl RpcResponse {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Name(_) => Operation::Name,
            Self::Supports(_) => Operation::Supports,
            Self::GetActualCost(_) => Operation::GetActualCost,
            Self::GetProjectedCost(_) => Operation::GetProjectedCost,
            Self::GetPricingSpec(_) => Operation::GetPricingSpec,
            Self::EstimateCost(_) => Operation::EstimateCost,
            Self::GetRecommendations(_) => Operation::GetRecommendations,
        }
    }

    pub fn encode_body(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Self::Name(m) => serde_json::to_vec(m),
            Self::Supports(m) => serde_json::to_vec(m),
            Self::GetActualCost(m) => serde_json::to_vec(m),
            Self::GetProjectedCost(m) => serde_json::to_vec(m),
            Self::GetPricingSpec(m) => serde_json::to_vec(m),
            Self::EstimateCost(m) => serde_json::to_vec(m),
            Self::GetRecommendations(m) => serde_json::to_vec(m),
        }
    }

    pub fn decode_body(op: Operation, body: &[u8]) -> serde_json::Result<Self> {
        Ok(match op {
            Operation::Name => Self::Name(serde_json::from_slice(body)?),
            Operation::Supports => Self::Supports(serde_json::from_slice(body)?),
            Operation::GetActualCost => Self::GetActualCost(serde_json::from_slice(body)?),
            Operation::GetProjectedCost => Self::GetProjectedCost(serde_json::from_slice(body)?),
            Operation::GetPricingSpec => Self::GetPricingSpec(serde_json::from_slice(body)?),
            Operation::EstimateCost => Self::EstimateCost(serde_json::from_slice(body)?),
            Operation::GetRecommendations => {
                Self::GetRecommendations(serde_json::from_slice(body)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_operation_tag() {
        let req = RpcRequest::EstimateCost(EstimateCostRequest::default());
        assert_eq!(req.operation(), Operation::EstimateCost);
    }

    #[test]
    fn test_body_decodes_for_its_own_operation() {
        let req = RpcRequest::GetProjectedCost(GetProjectedCostRequest {
            resource: Some(ResourceDescriptor::new("aws", "ec2", "t3.micro", "us-east-1")),
        });
        let body = req.encode_body().unwrap();
        let decoded = RpcRequest::decode_body(Operation::GetProjectedCost, &body).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_body_rejected_for_mismatched_operation() {
        let body = br#"{"resource_type": 17}"#;
        assert!(RpcRequest::decode_body(Operation::EstimateCost, body).is_err());
    }

    #[test]
    fn test_response_decode_garbage_fails() {
        assert!(RpcResponse::decode_body(Operation::Name, b"not json").is_err());
    }
}
