// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The per-invocation state machine tying dispatch, triggers, identity
//! and reporting together.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::ControllerConfig;
use crate::dispatch::{Dispatcher, OperationResult, Status, truncate_reason};
use crate::error::{ControllerError, Result};
use crate::event::{ExecutionContext, InvocationEvent, Phase};
use crate::identity;
use crate::registry::HandlerRegistry;
use crate::report::{ReportTransport, Reporter, TerminalReport};
use crate::trigger::{ScheduleApi, TriggerManager};
use crate::watchdog::{ReportGuard, Watchdog};

/// Stateless lifecycle controller.
///
/// One instance serves any number of invocations; every piece of
/// per-operation state lives in the event it is handed.
pub struct Controller {
    registry: HandlerRegistry,
    trigger: Option<TriggerManager>,
    reporter: Reporter,
    config: ControllerConfig,
    init_failure: Option<String>,
}

impl Controller {
    /// Start building a controller.
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::default()
    }

    /// Process one invocation end to end.
    ///
    /// Always attempts to leave the orchestrator with a terminal report
    /// unless the operation is still in progress and the next invocation
    /// is scheduled. Returns the secondary cleanup error, if any, after
    /// the primary report went out.
    #[instrument(skip(self, event, ctx), fields(request_id = %event.request_id, kind = %event.request_type, phase = %event.phase()))]
    pub async fn handle(&self, mut event: InvocationEvent, ctx: &ExecutionContext) -> Result<()> {
        if let Some(reason) = &self.init_failure {
            warn!("failing fast: controller initialization failed before this event");
            let report = TerminalReport::failed(&event, reason);
            self.reporter.deliver(&event.response_url, &report).await?;
            return Err(ControllerError::InitFailure(reason.clone()));
        }

        let guard = ReportGuard::new();
        let watchdog = Watchdog::arm(
            self.reporter.clone(),
            event.clone(),
            ctx,
            guard.clone(),
            self.config.watchdog_margin,
        );

        let dispatcher = Dispatcher::new(&self.registry, self.config.reason_limit);
        let mut result = dispatcher.run(&event, ctx).await;
        let mut cleanup_error: Option<ControllerError> = None;

        if result.status == Status::InProgress {
            match self.continue_polling(&mut event, ctx).await {
                PollDecision::Scheduled => {
                    watchdog.disarm();
                    info!("operation in progress, next invocation scheduled");
                    return Ok(());
                }
                PollDecision::LocalBypass => {
                    watchdog.disarm();
                    info!("operation in progress, local mode skips scheduling");
                    return Ok(());
                }
                PollDecision::Fail {
                    reason,
                    cleanup: secondary,
                } => {
                    cleanup_error = secondary;
                    result = OperationResult::failed(truncate_reason(
                        &reason,
                        self.config.reason_limit,
                    ));
                }
            }
        }

        // Terminal. Tear down any trigger the event still carries before
        // the report makes the orchestrator forget this operation.
        let trigger_state = event.trigger_ref();
        if !trigger_state.is_empty() && !self.config.local_mode {
            match self.trigger_manager() {
                Ok(manager) => {
                    if let Err(e) = manager.remove(&trigger_state, ctx).await {
                        cleanup_error = Some(e);
                    }
                }
                Err(e) => cleanup_error = Some(e),
            }
        }

        let report = if result.status == Status::Success {
            let physical_id = identity::resolve(&event, result.physical_resource_id.take());
            TerminalReport::success(&event, physical_id, result.data)
        } else {
            TerminalReport::failed(
                &event,
                result.reason.as_deref().unwrap_or("operation failed"),
            )
        };

        // Disarm before claiming so a watchdog that has not fired yet can
        // never win the race after the real outcome is known.
        watchdog.disarm();
        if guard.claim() {
            self.reporter.deliver(&event.response_url, &report).await?;
        } else {
            warn!("terminal report already sent by the watchdog, skipping");
        }

        match cleanup_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Decide what to do with an in-progress result.
    async fn continue_polling(
        &self,
        event: &mut InvocationEvent,
        ctx: &ExecutionContext,
    ) -> PollDecision {
        if !self.registry.poll_enabled(event.request_type) {
            let reason = ControllerError::NoHandlerRegistered {
                kind: event.request_type,
                phase: Phase::Poll,
            };
            warn!(kind = %event.request_type, "in-progress outcome without a poll handler");
            return PollDecision::Fail {
                reason: reason.to_string(),
                cleanup: None,
            };
        }

        if self.config.local_mode {
            return PollDecision::LocalBypass;
        }

        match event.phase() {
            // Re-invocations ride the trigger installed on the first pass.
            Phase::Poll => PollDecision::Scheduled,
            Phase::Initial => {
                // No id is assigned yet; identity is resolved once, in the
                // terminal invocation. Payloads in between carry only what
                // the orchestrator supplied.
                let manager = match self.trigger_manager() {
                    Ok(manager) => manager,
                    Err(e) => {
                        return PollDecision::Fail {
                            reason: e.to_string(),
                            cleanup: None,
                        };
                    }
                };
                match manager.install(event, ctx).await {
                    Ok(_) => PollDecision::Scheduled,
                    Err(install_err) => {
                        let partial = event.trigger_ref();
                        let cleanup = if partial.is_empty() {
                            None
                        } else {
                            let outcome = manager.remove_partial(&partial, ctx).await.err();
                            event.rule = None;
                            event.permission = None;
                            event.poll = None;
                            outcome
                        };
                        PollDecision::Fail {
                            reason: install_err.to_string(),
                            cleanup,
                        }
                    }
                }
            }
        }
    }

    fn trigger_manager(&self) -> Result<&TriggerManager> {
        self.trigger.as_ref().ok_or_else(|| {
            ControllerError::Config("no schedule service configured for polling".to_string())
        })
    }
}

enum PollDecision {
    /// The next invocation is (or stays) scheduled; end without a report.
    Scheduled,
    /// Local mode: nothing to schedule, end without a report.
    LocalBypass,
    /// Polling cannot continue; fall through to a FAILED report.
    Fail {
        reason: String,
        cleanup: Option<ControllerError>,
    },
}

/// Builder for [`Controller`].
#[derive(Default)]
pub struct ControllerBuilder {
    registry: HandlerRegistry,
    schedule: Option<Arc<dyn ScheduleApi>>,
    transport: Option<Arc<dyn ReportTransport>>,
    config: Option<ControllerConfig>,
    init_failure: Option<String>,
}

impl ControllerBuilder {
    /// Set the handler registry.
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the schedule-service collaborator used for polling triggers.
    pub fn schedule(mut self, schedule: Arc<dyn ScheduleApi>) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Set the report transport. Defaults to the HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn ReportTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the configuration. Defaults to [`ControllerConfig::default`].
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Record a collaborator-construction failure that happened before the
    /// first event. The controller will fail fast on every invocation,
    /// reporting the failure instead of running handlers.
    pub fn record_init_failure(mut self, reason: impl Into<String>) -> Self {
        self.init_failure = Some(reason.into());
        self
    }

    /// Finish building.
    pub fn build(self) -> Controller {
        let config = self.config.unwrap_or_default();
        let reporter = match self.transport {
            Some(transport) => Reporter::new(transport),
            None => Reporter::http(),
        };
        let trigger = self
            .schedule
            .map(|schedule| TriggerManager::new(schedule, config.poll_interval_minutes));
        Controller {
            registry: self.registry,
            trigger,
            reporter,
            config,
            init_failure: self.init_failure,
        }
    }
}
