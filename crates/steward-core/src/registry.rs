// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Handler trait and the six-slot handler registry.
//!
//! Handlers are the collaborator-supplied operations that do the actual
//! provisioning or teardown work. The registry maps {request kind} ×
//! {phase} to at most one handler; the presence of a poll slot for a kind
//! is what enables multi-invocation polling for that kind.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::event::{ExecutionContext, InvocationEvent, Phase, RequestType};

/// What a handler run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// The operation finished. A `None` physical id means the controller
    /// should fall back to the event-carried id or synthesize one.
    Complete {
        /// Physical identifier of the provisioned resource, if the handler
        /// assigned one.
        physical_id: Option<String>,
        /// Free-form response data echoed to the orchestrator on success.
        data: Map<String, Value>,
    },
    /// More work is pending; resume via a trigger-fired re-invocation.
    InProgress,
}

impl HandlerOutcome {
    /// Completed with a physical identifier and no response data.
    pub fn done(physical_id: impl Into<String>) -> Self {
        HandlerOutcome::Complete {
            physical_id: Some(physical_id.into()),
            data: Map::new(),
        }
    }

    /// Completed with a physical identifier and response data.
    pub fn done_with_data(physical_id: impl Into<String>, data: Map<String, Value>) -> Self {
        HandlerOutcome::Complete {
            physical_id: Some(physical_id.into()),
            data,
        }
    }

    /// Completed without assigning a physical identifier.
    pub fn finished() -> Self {
        HandlerOutcome::Complete {
            physical_id: None,
            data: Map::new(),
        }
    }
}

/// A collaborator-supplied lifecycle operation.
///
/// Handlers run exactly once per dispatch, synchronously from the
/// controller's point of view: they may block on slow external calls but
/// always run to completion (or error) within the current invocation.
/// Errors become FAILED terminal reports; retries, if any, are the
/// handler's own business or ride the next scheduled re-invocation.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Run the operation for this event.
    async fn run(
        &self,
        event: &InvocationEvent,
        ctx: &ExecutionContext,
    ) -> anyhow::Result<HandlerOutcome>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(InvocationEvent, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<HandlerOutcome>> + Send,
{
    async fn run(
        &self,
        event: &InvocationEvent,
        ctx: &ExecutionContext,
    ) -> anyhow::Result<HandlerOutcome> {
        (self.0)(event.clone(), ctx.clone()).await
    }
}

/// Adapt a plain async function (or closure) into a [`Handler`].
///
/// # Example
///
/// ```ignore
/// let registry = HandlerRegistry::builder()
///     .create(handler_fn(|event, _ctx| async move {
///         Ok(HandlerOutcome::done("abc-1"))
///     }))
///     .build();
/// ```
pub fn handler_fn<F, Fut>(f: F) -> impl Handler
where
    F: Fn(InvocationEvent, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<HandlerOutcome>> + Send + 'static,
{
    FnHandler(f)
}

/// Capability set mapping {request kind} × {phase} to a handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    create: Option<Arc<dyn Handler>>,
    update: Option<Arc<dyn Handler>>,
    delete: Option<Arc<dyn Handler>>,
    poll_create: Option<Arc<dyn Handler>>,
    poll_update: Option<Arc<dyn Handler>>,
    poll_delete: Option<Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Start building a registry.
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder {
            registry: HandlerRegistry::default(),
        }
    }

    /// Look up the handler for a (kind, phase) slot.
    pub fn get(&self, kind: RequestType, phase: Phase) -> Option<Arc<dyn Handler>> {
        let slot = match (phase, kind) {
            (Phase::Initial, RequestType::Create) => &self.create,
            (Phase::Initial, RequestType::Update) => &self.update,
            (Phase::Initial, RequestType::Delete) => &self.delete,
            (Phase::Poll, RequestType::Create) => &self.poll_create,
            (Phase::Poll, RequestType::Update) => &self.poll_update,
            (Phase::Poll, RequestType::Delete) => &self.poll_delete,
        };
        slot.clone()
    }

    /// Whether polling is enabled for a request kind (poll slot present).
    pub fn poll_enabled(&self, kind: RequestType) -> bool {
        self.get(kind, Phase::Poll).is_some()
    }
}

/// Builder for [`HandlerRegistry`].
pub struct HandlerRegistryBuilder {
    registry: HandlerRegistry,
}

impl HandlerRegistryBuilder {
    /// Register the initial Create handler.
    pub fn create(mut self, handler: impl Handler + 'static) -> Self {
        self.registry.create = Some(Arc::new(handler));
        self
    }

    /// Register the initial Update handler.
    pub fn update(mut self, handler: impl Handler + 'static) -> Self {
        self.registry.update = Some(Arc::new(handler));
        self
    }

    /// Register the initial Delete handler.
    pub fn delete(mut self, handler: impl Handler + 'static) -> Self {
        self.registry.delete = Some(Arc::new(handler));
        self
    }

    /// Register the poll-phase Create handler, enabling polling for Create.
    pub fn poll_create(mut self, handler: impl Handler + 'static) -> Self {
        self.registry.poll_create = Some(Arc::new(handler));
        self
    }

    /// Register the poll-phase Update handler, enabling polling for Update.
    pub fn poll_update(mut self, handler: impl Handler + 'static) -> Self {
        self.registry.poll_update = Some(Arc::new(handler));
        self
    }

    /// Register the poll-phase Delete handler, enabling polling for Delete.
    pub fn poll_delete(mut self, handler: impl Handler + 'static) -> Self {
        self.registry.poll_delete = Some(Arc::new(handler));
        self
    }

    /// Finish building.
    pub fn build(self) -> HandlerRegistry {
        self.registry
    }
}
