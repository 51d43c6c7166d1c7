// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event classification and single-shot handler execution.
//!
//! The dispatcher selects exactly one handler per invocation (poll variant
//! when the event carries the `Poll` marker, initial variant otherwise),
//! runs it to completion, and folds every failure mode into an
//! [`OperationResult`] so the controller has a single shape to act on.

use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::error::ControllerError;
use crate::event::{ExecutionContext, InvocationEvent};
use crate::registry::{HandlerOutcome, HandlerRegistry};

/// Terminal status of a handler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation completed.
    Success,
    /// The operation failed and will not be retried by the dispatcher.
    Failed,
    /// The operation needs more invocations to finish.
    InProgress,
}

/// The interpreted outcome of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    /// Terminal status.
    pub status: Status,
    /// Physical identifier returned by the handler, if any.
    pub physical_resource_id: Option<String>,
    /// Response data to echo on success. Dropped on failure.
    pub data: Map<String, Value>,
    /// Failure reason, already truncated for the callback payload.
    pub reason: Option<String>,
}

impl OperationResult {
    /// A completed result.
    pub fn success(physical_resource_id: Option<String>, data: Map<String, Value>) -> Self {
        Self {
            status: Status::Success,
            physical_resource_id,
            data,
            reason: None,
        }
    }

    /// A failed result. Response data is discarded on failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            physical_resource_id: None,
            data: Map::new(),
            reason: Some(reason.into()),
        }
    }

    /// A not-yet-done result.
    pub fn in_progress() -> Self {
        Self {
            status: Status::InProgress,
            physical_resource_id: None,
            data: Map::new(),
            reason: None,
        }
    }
}

/// Truncate a failure reason to the callback payload limit, respecting
/// character boundaries.
pub(crate) fn truncate_reason(reason: &str, limit: usize) -> String {
    if reason.chars().count() <= limit {
        reason.to_string()
    } else {
        reason.chars().take(limit).collect()
    }
}

/// Selects and runs exactly one handler per invocation.
pub struct Dispatcher<'a> {
    registry: &'a HandlerRegistry,
    reason_limit: usize,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher over a registry.
    pub fn new(registry: &'a HandlerRegistry, reason_limit: usize) -> Self {
        Self {
            registry,
            reason_limit,
        }
    }

    /// Classify the event, run the selected handler once, and interpret
    /// its outcome.
    ///
    /// A missing registry slot and a handler error both become FAILED
    /// results; there are no retries at this level.
    pub async fn run(&self, event: &InvocationEvent, ctx: &ExecutionContext) -> OperationResult {
        let phase = event.phase();
        let Some(handler) = self.registry.get(event.request_type, phase) else {
            let err = ControllerError::NoHandlerRegistered {
                kind: event.request_type,
                phase,
            };
            error!(kind = %event.request_type, %phase, "no handler registered for this slot");
            return OperationResult::failed(truncate_reason(&err.to_string(), self.reason_limit));
        };

        debug!(kind = %event.request_type, %phase, "running handler");
        match handler.run(event, ctx).await {
            Ok(HandlerOutcome::Complete { physical_id, data }) => {
                debug!(physical_resource_id = ?physical_id, "handler completed");
                OperationResult::success(physical_id, data)
            }
            Ok(HandlerOutcome::InProgress) => {
                debug!("handler signalled in-progress");
                OperationResult::in_progress()
            }
            Err(e) => {
                error!(error = %e, kind = %event.request_type, %phase, "handler failed");
                OperationResult::failed(truncate_reason(&e.to_string(), self.reason_limit))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::handler_fn;
    use std::time::Duration;

    fn sample_event(poll: bool) -> InvocationEvent {
        let mut event: InvocationEvent = serde_json::from_value(serde_json::json!({
            "RequestType": "Create",
            "StackId": "arn:stack/demo/1",
            "RequestId": "req-1",
            "LogicalResourceId": "Workspace",
            "ResponseURL": "https://callback.example/put"
        }))
        .unwrap();
        if poll {
            event.poll = Some(true);
        }
        event
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("fn", "inv-1", Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_missing_slot_fails_without_running_anything() {
        let registry = HandlerRegistry::builder().build();
        let dispatcher = Dispatcher::new(&registry, 256);

        let result = dispatcher.run(&sample_event(false), &ctx()).await;

        assert_eq!(result.status, Status::Failed);
        assert!(
            result
                .reason
                .unwrap()
                .contains("no initial handler registered for Create")
        );
    }

    #[tokio::test]
    async fn test_poll_marker_selects_poll_slot() {
        let registry = HandlerRegistry::builder()
            .create(handler_fn(|_, _| async {
                Ok(HandlerOutcome::done("from-initial"))
            }))
            .poll_create(handler_fn(|_, _| async {
                Ok(HandlerOutcome::done("from-poll"))
            }))
            .build();
        let dispatcher = Dispatcher::new(&registry, 256);

        let result = dispatcher.run(&sample_event(true), &ctx()).await;

        assert_eq!(result.status, Status::Success);
        assert_eq!(result.physical_resource_id.as_deref(), Some("from-poll"));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_failed_result() {
        let registry = HandlerRegistry::builder()
            .create(handler_fn(|_, _| async {
                Err(anyhow::anyhow!("disk full"))
            }))
            .build();
        let dispatcher = Dispatcher::new(&registry, 256);

        let result = dispatcher.run(&sample_event(false), &ctx()).await;

        assert_eq!(result.status, Status::Failed);
        assert!(result.reason.unwrap().contains("disk full"));
        assert!(result.data.is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_reason_is_truncated() {
        let registry = HandlerRegistry::builder()
            .create(handler_fn(|_, _| async {
                Err(anyhow::anyhow!("x".repeat(400)))
            }))
            .build();
        let dispatcher = Dispatcher::new(&registry, 256);

        let result = dispatcher.run(&sample_event(false), &ctx()).await;

        assert_eq!(result.reason.unwrap().chars().count(), 256);
    }

    #[test]
    fn test_truncate_reason_respects_char_boundaries() {
        let reason = "héllo".repeat(100);
        let truncated = truncate_reason(&reason, 256);

        assert_eq!(truncated.chars().count(), 256);
        assert!(reason.starts_with(&truncated));
    }

    #[test]
    fn test_truncate_reason_leaves_short_strings_alone() {
        assert_eq!(truncate_reason("short", 256), "short");
    }
}
