// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for controller, schedule, and report failures.

use thiserror::Error;

use crate::event::{Phase, RequestType};

/// Errors surfaced by the controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The registry has no handler for the selected (kind, phase) slot.
    #[error("no {phase} handler registered for {kind} requests")]
    NoHandlerRegistered {
        /// Requested lifecycle operation.
        kind: RequestType,
        /// Selected handler variant.
        phase: Phase,
    },

    /// Collaborator construction failed before any event arrived.
    #[error("controller initialization failed: {0}")]
    InitFailure(String),

    /// The re-invocation trigger could not be installed.
    #[error("trigger installation failed: {0}")]
    TriggerInstall(String),

    /// Trigger teardown could not fully remove the scheduling state.
    /// Surfaced as a secondary error; never replaces the primary report.
    #[error("polling cleanup incomplete: {0}")]
    PollingCleanupIncomplete(String),

    /// The terminal report could not be delivered.
    #[error("report delivery failed: {0}")]
    Report(#[from] ReportError),

    /// The event payload could not be serialized for the trigger input.
    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error (invalid environment variable or builder input).
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors returned by the schedule-service collaborator.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The named rule, grant, or target binding does not exist.
    #[error("schedule entity not found: {0}")]
    NotFound(String),

    /// The schedule service rejected or failed the call.
    #[error("schedule service error: {0}")]
    Service(String),
}

/// Errors raised while delivering a terminal report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The callback endpoint answered with a non-success status.
    #[error("callback endpoint returned status {0}")]
    Status(u16),

    /// The HTTP request itself failed.
    #[error("callback request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The report body could not be serialized.
    #[error("report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Type alias for controller results.
pub type Result<T> = std::result::Result<T, ControllerError>;
