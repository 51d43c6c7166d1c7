// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire-format event payload and per-invocation execution context.
//!
//! The [`InvocationEvent`] is the only state that survives between
//! invocations of one logical operation: the controller serializes it
//! (with the `Poll` marker and trigger bookkeeping injected) into the
//! re-invocation trigger's input, and the next invocation reconstructs
//! everything from it.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The lifecycle operation requested by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    /// Provision a new resource.
    Create,
    /// Reconfigure an existing resource.
    Update,
    /// Tear down an existing resource.
    Delete,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestType::Create => write!(f, "Create"),
            RequestType::Update => write!(f, "Update"),
            RequestType::Delete => write!(f, "Delete"),
        }
    }
}

/// Which handler variant an invocation selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// First invocation of a logical operation.
    Initial,
    /// A trigger-fired re-invocation carrying the `Poll` marker.
    Poll,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Initial => write!(f, "initial"),
            Phase::Poll => write!(f, "poll"),
        }
    }
}

/// The full invocation payload.
///
/// Immutable except for the three fields the controller itself injects when
/// it schedules polling: the `Poll` marker, the `rule` identifier and the
/// `permission` statement id. Field names follow the orchestrator's wire
/// format exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationEvent {
    /// Requested lifecycle operation.
    #[serde(rename = "RequestType")]
    pub request_type: RequestType,
    /// Identifier of the stack this resource belongs to.
    #[serde(rename = "StackId")]
    pub stack_id: String,
    /// Identifier of this request, unique per logical operation.
    #[serde(rename = "RequestId")]
    pub request_id: String,
    /// Template-level identifier of the resource.
    #[serde(rename = "LogicalResourceId")]
    pub logical_resource_id: String,
    /// Pre-signed callback URL for the terminal report.
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    /// Resource-specific properties, opaque to the controller.
    #[serde(rename = "ResourceProperties", default)]
    pub resource_properties: Map<String, Value>,
    /// Physical identifier assigned in an earlier operation, if any.
    #[serde(rename = "PhysicalResourceId", skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    /// Polling marker. Absent on the first invocation, `true` on every
    /// trigger-fired re-invocation.
    #[serde(rename = "Poll", skip_serializing_if = "Option::is_none")]
    pub poll: Option<bool>,
    /// Identifier of the periodic rule driving re-invocations.
    #[serde(rename = "rule", skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Statement id of the invoke permission granted to the rule.
    #[serde(rename = "permission", skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
}

impl InvocationEvent {
    /// Classify this invocation from the presence of the `Poll` marker.
    pub fn phase(&self) -> Phase {
        if self.poll.unwrap_or(false) {
            Phase::Poll
        } else {
            Phase::Initial
        }
    }

    /// Trigger bookkeeping carried by this event, possibly partial.
    pub fn trigger_ref(&self) -> TriggerRef {
        TriggerRef {
            rule: self.rule.clone(),
            permission: self.permission.clone(),
        }
    }
}

/// Read-only facts about the current invocation.
///
/// The remaining time budget decreases monotonically within one invocation;
/// there is no budget carried across invocations.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Identity of the function, used for invoke-permission grants.
    pub function_name: String,
    /// Unique identifier of this invocation.
    pub invocation_id: String,
    deadline: Instant,
}

impl ExecutionContext {
    /// Create a context with the given time budget starting now.
    pub fn new(
        function_name: impl Into<String>,
        invocation_id: impl Into<String>,
        budget: Duration,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            invocation_id: invocation_id.into(),
            deadline: Instant::now() + budget,
        }
    }

    /// Time remaining before the host kills this invocation.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Reference to the external re-invocation trigger.
///
/// Owned by the trigger manager for the lifetime of the polling phase. Not
/// persisted anywhere: its identifiers travel inside the re-invocation
/// event, so the external trigger itself is the only durable carrier.
/// Either field may be absent after a partial installation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerRef {
    /// Identifier of the periodic rule.
    pub rule: Option<String>,
    /// Statement id of the invoke permission.
    pub permission: Option<String>,
}

impl TriggerRef {
    /// True when neither identifier is present.
    pub fn is_empty(&self) -> bool {
        self.rule.is_none() && self.permission.is_none()
    }
}
