// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Terminal report format and callback delivery.
//!
//! Exactly one terminal report ends each logical operation. Delivery is a
//! single synchronous HTTP PUT to the callback URL carried in the event;
//! there is no retry — a lost report leaves the orchestrator waiting until
//! its own timeout, which is an accepted limitation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::dispatch::truncate_reason;
use crate::error::ReportError;
use crate::event::InvocationEvent;

/// Maximum failure-reason length accepted by the callback receiver.
pub const REASON_LIMIT: usize = 256;

/// Bookkeeping keys the controller injects for itself; never echoed back
/// to the orchestrator inside response data.
const BOOKKEEPING_KEYS: [&str; 4] = ["Complete", "Poll", "rule", "permission"];

/// Terminal status on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReportStatus {
    /// The logical operation completed.
    #[serde(rename = "SUCCESS")]
    Success,
    /// The logical operation failed.
    #[serde(rename = "FAILED")]
    Failed,
}

/// The terminal status report delivered to the callback endpoint.
///
/// Field names follow the orchestrator's wire format exactly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalReport {
    /// Terminal status.
    #[serde(rename = "Status")]
    pub status: ReportStatus,
    /// Failure reason; empty on success, truncated to [`REASON_LIMIT`].
    #[serde(rename = "Reason")]
    pub reason: String,
    /// Physical identifier of the resource, stringified.
    #[serde(rename = "PhysicalResourceId")]
    pub physical_resource_id: String,
    /// Stack identifier echoed from the event.
    #[serde(rename = "StackId")]
    pub stack_id: String,
    /// Request identifier echoed from the event.
    #[serde(rename = "RequestId")]
    pub request_id: String,
    /// Logical resource identifier echoed from the event.
    #[serde(rename = "LogicalResourceId")]
    pub logical_resource_id: String,
    /// Opaque response data. Empty on failure.
    #[serde(rename = "Data")]
    pub data: Map<String, Value>,
}

impl TerminalReport {
    /// A SUCCESS report with the resolved physical id and scrubbed data.
    pub fn success(event: &InvocationEvent, physical_id: String, data: Map<String, Value>) -> Self {
        Self {
            status: ReportStatus::Success,
            reason: String::new(),
            physical_resource_id: physical_id,
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            data: scrub(data),
        }
    }

    /// A FAILED report using the best-known physical id carried in the
    /// event (empty when none was ever assigned). Data is dropped.
    pub fn failed(event: &InvocationEvent, reason: &str) -> Self {
        let physical_id = event.physical_resource_id.clone().unwrap_or_default();
        Self::failed_with_id(event, physical_id, reason)
    }

    /// A FAILED report with an explicitly resolved physical id.
    pub fn failed_with_id(event: &InvocationEvent, physical_id: String, reason: &str) -> Self {
        Self {
            status: ReportStatus::Failed,
            reason: truncate_reason(reason, REASON_LIMIT),
            physical_resource_id: physical_id,
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            data: Map::new(),
        }
    }
}

fn scrub(mut data: Map<String, Value>) -> Map<String, Value> {
    for key in BOOKKEEPING_KEYS {
        data.remove(key);
    }
    data
}

/// Transport delivering a serialized report to the callback endpoint.
///
/// Abstracted so tests can record reports in memory instead of performing
/// network calls.
#[async_trait]
pub trait ReportTransport: Send + Sync {
    /// PUT the body to the callback URL.
    async fn put(&self, url: &str, body: String) -> Result<(), ReportError>;
}

/// Production transport: an HTTP PUT via reqwest.
///
/// The callback receiver requires an empty `Content-Type` and an explicit
/// `Content-Length`, so both headers are set by hand.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a fresh HTTP client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReportTransport for HttpTransport {
    async fn put(&self, url: &str, body: String) -> Result<(), ReportError> {
        let response = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "")
            .header(reqwest::header::CONTENT_LENGTH, body.len().to_string())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::Status(status.as_u16()));
        }
        debug!(status = status.as_u16(), "callback endpoint acknowledged report");
        Ok(())
    }
}

/// Formats and delivers terminal reports.
#[derive(Clone)]
pub struct Reporter {
    transport: Arc<dyn ReportTransport>,
}

impl Reporter {
    /// Create a reporter over a transport.
    pub fn new(transport: Arc<dyn ReportTransport>) -> Self {
        Self { transport }
    }

    /// Create a reporter using the production HTTP transport.
    pub fn http() -> Self {
        Self::new(Arc::new(HttpTransport::new()))
    }

    /// Serialize and deliver one report.
    ///
    /// Delivery failures are logged and returned to the caller; there is
    /// no retry.
    pub async fn deliver(&self, url: &str, report: &TerminalReport) -> Result<(), ReportError> {
        let body = serde_json::to_string(report)?;
        info!(
            status = ?report.status,
            physical_resource_id = %report.physical_resource_id,
            request_id = %report.request_id,
            "delivering terminal report"
        );
        if let Err(e) = self.transport.put(url, body).await {
            error!(error = %e, "terminal report delivery failed");
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> InvocationEvent {
        serde_json::from_value(serde_json::json!({
            "RequestType": "Create",
            "StackId": "arn:stack/demo/1",
            "RequestId": "req-1",
            "LogicalResourceId": "Workspace",
            "ResponseURL": "https://callback.example/put",
            "PhysicalResourceId": "i-existing"
        }))
        .unwrap()
    }

    #[test]
    fn test_success_report_wire_fields() {
        let mut data = Map::new();
        data.insert("Output".to_string(), Value::String("ok".to_string()));

        let report = TerminalReport::success(&sample_event(), "i-123".to_string(), data);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["Status"], "SUCCESS");
        assert_eq!(json["Reason"], "");
        assert_eq!(json["PhysicalResourceId"], "i-123");
        assert_eq!(json["StackId"], "arn:stack/demo/1");
        assert_eq!(json["RequestId"], "req-1");
        assert_eq!(json["LogicalResourceId"], "Workspace");
        assert_eq!(json["Data"]["Output"], "ok");
    }

    #[test]
    fn test_success_report_scrubs_bookkeeping_keys() {
        let mut data = Map::new();
        data.insert("Poll".to_string(), Value::Bool(true));
        data.insert("rule".to_string(), Value::String("r".to_string()));
        data.insert("permission".to_string(), Value::String("p".to_string()));
        data.insert("Complete".to_string(), Value::Bool(true));
        data.insert("Kept".to_string(), Value::String("yes".to_string()));

        let report = TerminalReport::success(&sample_event(), "i-123".to_string(), data);

        assert_eq!(report.data.len(), 1);
        assert_eq!(report.data.get("Kept").unwrap(), "yes");
    }

    #[test]
    fn test_failed_report_uses_event_id_and_drops_data() {
        let report = TerminalReport::failed(&sample_event(), "boom");

        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.physical_resource_id, "i-existing");
        assert_eq!(report.reason, "boom");
        assert!(report.data.is_empty());
    }

    #[test]
    fn test_failed_report_without_known_id_is_empty_string() {
        let mut event = sample_event();
        event.physical_resource_id = None;

        let report = TerminalReport::failed(&event, "boom");
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["PhysicalResourceId"], "");
    }

    #[test]
    fn test_failed_report_truncates_reason() {
        let report = TerminalReport::failed(&sample_event(), &"e".repeat(1000));

        assert_eq!(report.reason.chars().count(), REASON_LIMIT);
    }
}
