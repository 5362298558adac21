//! Audit layer for `tools/call`.
//!
//! Wraps the inner chain, times the call, and emits one [`AuditEvent`] per
//! request through the dispatcher after the result (and everything the inner
//! layers did to it) is final. Emission is fire-and-forget; the response
//! never waits on the sink. Cancellation is an outcome, not a skip: a
//! cancelled call still produces its event.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::audit::{hash_arguments, redact_arguments, AuditDispatcher, AuditEvent};
use crate::context::{PlatformContext, RequestExtra};
use crate::error::Result;
use crate::types::{CallToolRequest, CallToolResult};

use super::ToolCallHandler;

/// Request-side measurements captured before the call runs.
#[derive(Debug, Clone)]
pub(crate) struct RequestMeasurements {
    pub(crate) request_chars: usize,
    pub(crate) argument_hash: String,
    pub(crate) arguments: Value,
}

pub(crate) fn measure_request(arguments: &Value) -> RequestMeasurements {
    let request_chars = if arguments.is_null() {
        0
    } else {
        arguments.to_string().len()
    };
    RequestMeasurements {
        request_chars,
        argument_hash: hash_arguments(arguments),
        arguments: redact_arguments(arguments),
    }
}

/// Build the event for a finished call from the final context snapshot, the
/// request measurements, and the outcome.
pub(crate) fn build_call_event(
    ctx: &PlatformContext,
    measurements: RequestMeasurements,
    outcome: &Result<CallToolResult>,
    duration_ms: u64,
) -> AuditEvent {
    let mut event = AuditEvent::from_context(ctx);
    event.request_chars = measurements.request_chars;
    event.argument_hash = measurements.argument_hash;
    event.arguments = measurements.arguments;
    event.duration_ms = duration_ms;
    match outcome {
        Ok(result) => {
            event.success = !result.is_error;
            event.response_chars = result.response_chars();
            event.content_blocks = result.content.len();
            if result.is_error {
                event.error = result.first_text().map(String::from);
            }
        }
        Err(err) => {
            event.success = false;
            event.error = Some(err.to_string());
        }
    }
    event
}

/// The audit layer.
pub struct AuditLayer {
    dispatcher: Arc<AuditDispatcher>,
    next: Arc<dyn ToolCallHandler>,
}

impl AuditLayer {
    /// Wrap `next` with audit emission through `dispatcher`.
    pub fn new(dispatcher: Arc<AuditDispatcher>, next: Arc<dyn ToolCallHandler>) -> Self {
        Self { dispatcher, next }
    }
}

#[async_trait]
impl ToolCallHandler for AuditLayer {
    async fn call_tool(
        &self,
        request: CallToolRequest,
        extra: RequestExtra,
    ) -> Result<CallToolResult> {
        let start = Instant::now();
        let measurements = measure_request(&request.arguments);

        let outcome = self.next.call_tool(request, extra.clone()).await;

        let shared = extra.platform_or_init();
        let event = {
            let ctx = shared.read();
            build_call_event(
                &ctx,
                measurements,
                &outcome,
                start.elapsed().as_millis() as u64,
            )
        };
        self.dispatcher.emit(event);
        outcome
    }
}

impl std::fmt::Debug for AuditLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLayer")
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
