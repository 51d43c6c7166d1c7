// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Steward Core - Resource Lifecycle Controller
//!
//! This crate implements a lifecycle controller that lets a stateless,
//! time-boxed serverless function expose synchronous-looking Create/Update/
//! Delete semantics to an infrastructure-as-code orchestrator, even when the
//! underlying provisioning work takes far longer than a single invocation's
//! time budget.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Orchestrator                               │
//! │        (invokes the function, waits on the callback URL)         │
//! └──────────────────────────────────────────────────────────────────┘
//!          │ invoke(event)                       ▲ HTTP PUT
//!          ▼                                     │ terminal report
//! ┌───────────────────────┐             ┌─────────────────┐
//! │      Controller       │────────────►│    Reporter     │
//! │  (one call per        │             └─────────────────┘
//! │   invocation)         │
//! │   ├─ Watchdog         │             ┌─────────────────┐
//! │   ├─ Dispatcher ──────┼────────────►│ Handler Registry│
//! │   ├─ Identity Resolver│             │ (six slots)     │
//! │   └─ Trigger Manager ─┼──┐          └─────────────────┘
//! └───────────────────────┘  │
//!                            ▼
//!                  ┌─────────────────────┐
//!                  │  Schedule service   │
//!                  │ (periodic trigger   │
//!                  │  re-invokes the fn) │
//!                  └─────────────────────┘
//! ```
//!
//! # Invocation lifecycle
//!
//! Each invocation classifies the inbound [`event::InvocationEvent`], runs
//! exactly one registered handler, and then either:
//!
//! - delivers a single terminal report (`SUCCESS`/`FAILED`) to the callback
//!   URL, removing any installed re-invocation trigger first, or
//! - installs (or leaves in place) a periodic trigger that re-invokes the
//!   function with the same event plus a `Poll` marker, and ends without
//!   reporting.
//!
//! All state that must survive between invocations travels inside the event
//! payload carried by the trigger; there is no durable store.
//!
//! # State machine (per logical operation, spanning invocations)
//!
//! ```text
//! START ──► DISPATCH_INITIAL ──► DONE
//!                  │              ▲
//!                  ▼              │
//!             AWAIT_POLL ──► DISPATCH_POLL
//!                  ▲              │
//!                  └──────────────┘
//! ```
//!
//! `DONE` is reached when a handler produces a completed result or a failure.
//! The invocation that reaches it removes the trigger, resolves the physical
//! resource identifier, and delivers exactly one terminal report. A
//! [`watchdog::Watchdog`] races the main flow and delivers a failure report
//! shortly before the host kills a too-slow invocation; an atomic
//! [`watchdog::ReportGuard`] guarantees at most one report wins.
//!
//! # Modules
//!
//! - [`config`]: Controller configuration from environment variables
//! - [`controller`]: Top-level entry point composing all components
//! - [`dispatch`]: Event classification and single-shot handler execution
//! - [`error`]: Error types for controller, schedule, and report failures
//! - [`event`]: Wire-format event payload and per-invocation context
//! - [`identity`]: Physical resource identifier resolution
//! - [`registry`]: Handler trait and the six-slot handler registry
//! - [`report`]: Terminal report format and callback delivery
//! - [`trigger`]: Periodic re-invocation trigger management
//! - [`watchdog`]: Time-budget watchdog and the one-report guard

#![deny(missing_docs)]

/// Controller configuration from environment variables.
pub mod config;

/// Top-level controller composing dispatcher, watchdog, triggers, reporter.
pub mod controller;

/// Event classification and single-shot handler execution.
pub mod dispatch;

/// Error types for controller, schedule, and report failures.
pub mod error;

/// Wire-format event payload and per-invocation execution context.
pub mod event;

/// Physical resource identifier resolution.
pub mod identity;

/// Handler trait and the six-slot handler registry.
pub mod registry;

/// Terminal report format and callback delivery.
pub mod report;

/// Periodic re-invocation trigger management.
pub mod trigger;

/// Time-budget watchdog and the one-report guard.
pub mod watchdog;

pub use config::ControllerConfig;
pub use controller::{Controller, ControllerBuilder};
pub use dispatch::{Dispatcher, OperationResult, Status};
pub use error::{ControllerError, ReportError, Result, ScheduleError};
pub use event::{ExecutionContext, InvocationEvent, Phase, RequestType, TriggerRef};
pub use registry::{Handler, HandlerOutcome, HandlerRegistry, HandlerRegistryBuilder, handler_fn};
pub use report::{
    HttpTransport, REASON_LIMIT, ReportStatus, ReportTransport, Reporter, TerminalReport,
};
pub use trigger::{ScheduleApi, TriggerManager};
pub use watchdog::{ReportGuard, TIMEOUT_REASON, Watchdog};
