//! In-process transport harness.
//!
//! Calls a plugin the way a remote client would, without sockets: the
//! request is encoded, decoded on the plugin side, the response encoded
//! and decoded again. Every call runs as its own supervised Tokio task. The
//! task is aborted when the deadline passes or the caller drops the call,
//! and a panic inside the plugin surfaces as a classified `INTERNAL` status
//! instead of unwinding into the caller.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use costsource_types::{
    CallContext, Code, CostSourcePlugin, Operation, RpcRequest, RpcResponse, RpcResult, RpcStatus,
};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::AbortHandle;
use tracing::{debug, instrument, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::types::{CategoryResult, CategoryStatus};

/// Detail on checks skipped because their operation already crashed.
pub const CRASHED_EARLIER: &str = "operation crashed earlier";

/// Everything observed about one call through the harness.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub operation: Operation,
    pub result: RpcResult<RpcResponse>,
    /// End-to-end latency including encode/decode and task hand-off.
    pub elapsed: Duration,
    pub request_bytes: usize,
    pub response_bytes: usize,
}

impl CallRecord {
    /// Bytes copied across the boundary in both directions.
    pub fn payload_bytes(&self) -> u64 {
        (self.request_bytes + self.response_bytes) as u64
    }
}

#[derive(Default)]
struct CrashSlot {
    first: OnceLock<String>,
    claimed: AtomicBool,
}

/// Operations that have panicked through a harness.
///
/// The first panic per operation is kept. Checks that run afterwards are
/// expected to skip the operation, so one crash is reported once.
#[derive(Default)]
pub struct CrashLedger {
    slots: [CrashSlot; 7],
}

impl CrashLedger {
    fn record(&self, operation: Operation, message: &str) {
        let slot = &self.slots[operation as usize];
        if slot.first.set(message.to_string()).is_ok() {
            warn!(%operation, panic = %message, "first crash recorded for operation");
        }
    }

    /// Panic message of the first crash in `operation`, if any.
    pub fn crashed(&self, operation: Operation) -> Option<&str> {
        self.slots[operation as usize].first.get().map(String::as_str)
    }

    pub fn any(&self) -> bool {
        Operation::ALL.iter().any(|op| self.crashed(*op).is_some())
    }

    /// True for the first caller only, for a crashed operation.
    fn claim(&self, operation: Operation) -> bool {
        self.crashed(operation).is_some()
            && !self.slots[operation as usize]
                .claimed
                .swap(true, Ordering::SeqCst)
    }

    /// Keep the first failing outcome per crashed operation and turn later
    /// ones into skips.
    pub fn settle(&self, result: CategoryResult) -> CategoryResult {
        if result.status == CategoryStatus::TimedOut || !self.any() {
            return result;
        }
        let outcomes = result
            .outcomes
            .into_iter()
            .map(|outcome| match outcome.operation {
                Some(op) if outcome.is_failure() && self.crashed(op).is_some() => {
                    if self.claim(op) {
                        outcome
                    } else {
                        outcome.into_skip(CRASHED_EARLIER)
                    }
                }
                _ => outcome,
            })
            .collect();
        CategoryResult::from_outcomes(
            result.category,
            outcomes,
            result.metrics,
            result.duration_ms,
        )
    }
}

/// Aborts the plugin task once the caller stops waiting for it, including
/// when the calling future is dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Loopback call path to a plugin under test.
///
/// Cloning is cheap and clones share the plugin and the crash ledger.
/// Nothing per call is kept, so one instance can be driven from many tasks
/// at once.
#[derive(Clone)]
pub struct Harness {
    plugin: Arc<dyn CostSourcePlugin>,
    runtime: Handle,
    crashes: Arc<CrashLedger>,
}

impl Harness {
    /// Bind a plugin to the current multi-thread Tokio runtime.
    pub fn new(plugin: Arc<dyn CostSourcePlugin>) -> HarnessResult<Self> {
        let runtime = Handle::try_current().map_err(|e| HarnessError::NoRuntime(e.to_string()))?;
        if runtime.runtime_flavor() != RuntimeFlavor::MultiThread {
            return Err(HarnessError::SingleThreadedRuntime(format!(
                "{:?}",
                runtime.runtime_flavor()
            )));
        }
        Ok(Self {
            plugin,
            runtime,
            crashes: Arc::new(CrashLedger::default()),
        })
    }

    /// Crashes observed through this harness and its clones.
    pub fn crashes(&self) -> &CrashLedger {
        &self.crashes
    }

    /// Typed call.
    pub async fn invoke(&self, request: RpcRequest, timeout: Duration) -> RpcResult<RpcResponse> {
        self.invoke_measured(request, timeout).await.result
    }

    /// Typed call that also reports latency and boundary sizes.
    pub async fn invoke_measured(&self, request: RpcRequest, timeout: Duration) -> CallRecord {
        let operation = request.operation();
        let started = Instant::now();

        let body = match request.encode_body() {
            Ok(body) => body,
            Err(e) => {
                return CallRecord {
                    operation,
                    result: Err(RpcStatus::invalid_argument(format!(
                        "failed to encode {} request: {}",
                        operation, e
                    ))),
                    elapsed: started.elapsed(),
                    request_bytes: 0,
                    response_bytes: 0,
                };
            }
        };
        let request_bytes = body.len();

        let (result, response_bytes) = match self.call(operation, body, timeout).await {
            Ok(bytes) => {
                let decoded = RpcResponse::decode_body(operation, &bytes).map_err(|e| {
                    RpcStatus::internal(format!("malformed {} response: {}", operation, e))
                });
                (decoded, bytes.len())
            }
            Err(status) => (Err(status), 0),
        };

        CallRecord {
            operation,
            result,
            elapsed: started.elapsed(),
            request_bytes,
            response_bytes,
        }
    }

    /// Call by method name with an already-encoded body.
    ///
    /// Unknown methods yield `UNIMPLEMENTED`; bodies that do not decode as
    /// the method's request yield `INVALID_ARGUMENT`.
    pub async fn invoke_raw(
        &self,
        method: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> RpcResult<Vec<u8>> {
        let operation = Operation::from_method(method)
            .ok_or_else(|| RpcStatus::unimplemented(format!("unknown method {}", method)))?;
        self.call(operation, body, timeout).await
    }

    #[instrument(level = "debug", skip(self, body), fields(method = %operation))]
    async fn call(
        &self,
        operation: Operation,
        body: Vec<u8>,
        timeout: Duration,
    ) -> RpcResult<Vec<u8>> {
        let plugin = Arc::clone(&self.plugin);
        let ctx = CallContext::new(operation, timeout);

        let task = self.runtime.spawn(async move {
            let request = RpcRequest::decode_body(operation, &body).map_err(|e| {
                RpcStatus::invalid_argument(format!("malformed {} request: {}", operation, e))
            })?;
            let response = request.dispatch(plugin.as_ref(), &ctx).await?;
            response.encode_body().map_err(|e| {
                RpcStatus::internal(format!("failed to encode {} response: {}", operation, e))
            })
        });
        let _guard = AbortOnDrop(task.abort_handle());

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => {
                if let Err(ref status) = result {
                    debug!(code = %status.code, "plugin returned error");
                }
                result
            }
            Ok(Err(join_err)) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                warn!(panic = %message, "plugin panicked");
                self.crashes.record(operation, &message);
                Err(RpcStatus::internal(format!(
                    "plugin panicked in {}: {}",
                    operation, message
                )))
            }
            Ok(Err(join_err)) => Err(RpcStatus::new(
                Code::Cancelled,
                format!("{} call cancelled: {}", operation, join_err),
            )),
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "call exceeded deadline");
                Err(RpcStatus::deadline_exceeded(format!(
                    "{} did not complete within {}ms",
                    operation,
                    timeout.as_millis()
                )))
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
