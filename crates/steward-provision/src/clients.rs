// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Collaborator interfaces to the host inventory and the remote command
//! service, plus the shared submit-and-await plumbing.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use steward_core::{ExecutionContext, InvocationEvent};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Handle identifying one submitted remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHandle(pub String);

/// State of a submitted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPoll {
    /// Still running.
    Pending,
    /// Finished; output captured.
    Finished {
        /// Captured standard output.
        stdout: String,
        /// Captured standard error. Non-empty means the command failed.
        stderr: String,
    },
}

/// Errors from the remote command service.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The service has no record of the invocation yet (results become
    /// visible slightly after submission).
    #[error("command invocation not found: {0}")]
    InvocationNotFound(String),

    /// The service rejected or failed the call.
    #[error("command service error: {0}")]
    Service(String),
}

/// Runs shell commands on a managed host.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Submit a command sequence to the target host. Returns `None` when
    /// the host is not yet reachable by the service; the caller retries on
    /// a later invocation. Duplicate submissions are tolerated.
    async fn submit(
        &self,
        target: &str,
        command_lines: &[String],
    ) -> Result<Option<CommandHandle>, CommandError>;

    /// Fetch the state of a previously submitted command.
    async fn fetch_result(
        &self,
        target: &str,
        handle: &CommandHandle,
    ) -> Result<CommandPoll, CommandError>;
}

/// What the inventory knows about one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDescription {
    /// Instance identifier.
    pub instance_id: String,
    /// Identifier of the root block volume.
    pub root_volume_id: String,
}

/// Errors from the host inventory service.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// No host matches the query.
    #[error("host not found: {0}")]
    NotFound(String),

    /// The service rejected or failed the call.
    #[error("inventory service error: {0}")]
    Service(String),
}

/// Looks up and mutates managed hosts.
#[async_trait]
pub trait HostInventory: Send + Sync {
    /// Find the single host carrying the given tag.
    async fn find_by_tag(&self, key: &str, value: &str)
    -> Result<HostDescription, InventoryError>;

    /// Describe a host by instance identifier.
    async fn describe(&self, instance_id: &str) -> Result<HostDescription, InventoryError>;

    /// Attach an instance profile to a host.
    async fn attach_profile(&self, instance_id: &str, profile: &str)
    -> Result<(), InventoryError>;

    /// Grow a block volume to the given size in GiB.
    async fn resize_volume(&self, volume_id: &str, size_gib: u64) -> Result<(), InventoryError>;
}

/// Read a required string property from the event.
pub(crate) fn require_prop(event: &InvocationEvent, name: &str) -> anyhow::Result<String> {
    match event.resource_properties.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(other) => anyhow::bail!("property {name} must be a non-empty string, got {other}"),
        None => anyhow::bail!("missing required property {name}"),
    }
}

/// Below this much remaining budget we stop waiting in-invocation and let
/// the next scheduled invocation pick the work back up.
pub(crate) const LOW_BUDGET: Duration = Duration::from_secs(20);

/// Outcome of one submit-and-await round.
#[derive(Debug)]
pub(crate) enum CommandWait {
    /// The command ran to completion with this output.
    Finished { stdout: String },
    /// Not done within this invocation; retry on the next one.
    Retry,
}

/// Submit a command and wait for its result within the remaining budget.
///
/// An unreachable target and a nearly exhausted budget both come back as
/// `Retry`: the next scheduled invocation re-submits from scratch, which
/// the command contract tolerates. A finished command with non-empty
/// stderr is an error.
pub(crate) async fn submit_and_await(
    runner: &dyn CommandRunner,
    target: &str,
    command_lines: &[String],
    ctx: &ExecutionContext,
    poll_delay: Duration,
) -> anyhow::Result<CommandWait> {
    let Some(handle) = runner.submit(target, command_lines).await? else {
        warn!(%target, "target not reachable yet, retrying on the next invocation");
        return Ok(CommandWait::Retry);
    };
    debug!(%target, handle = %handle.0, "command submitted");

    loop {
        if ctx.remaining() < LOW_BUDGET {
            warn!(%target, "time budget low, deferring to the next invocation");
            return Ok(CommandWait::Retry);
        }
        match runner.fetch_result(target, &handle).await {
            Ok(CommandPoll::Pending) => sleep(poll_delay).await,
            Ok(CommandPoll::Finished { stdout, stderr }) => {
                if !stderr.trim().is_empty() {
                    anyhow::bail!("command failed on {target}: {stderr}");
                }
                return Ok(CommandWait::Finished { stdout });
            }
            // Results become visible slightly after submission; keep polling.
            Err(CommandError::InvocationNotFound(_)) => sleep(poll_delay).await,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Runner scripted with a fixed sequence of poll results.
    pub(crate) struct ScriptedRunner {
        pub ready: bool,
        pub results: Mutex<Vec<Result<CommandPoll, CommandError>>>,
        pub submissions: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        pub fn finishing_with(stdout: &str, stderr: &str) -> Self {
            Self {
                ready: true,
                results: Mutex::new(vec![Ok(CommandPoll::Finished {
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                })]),
                submissions: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn submit(
            &self,
            _target: &str,
            command_lines: &[String],
        ) -> Result<Option<CommandHandle>, CommandError> {
            self.submissions
                .lock()
                .unwrap()
                .push(command_lines.to_vec());
            if !self.ready {
                return Ok(None);
            }
            Ok(Some(CommandHandle("cmd-1".to_string())))
        }

        async fn fetch_result(
            &self,
            _target: &str,
            _handle: &CommandHandle,
        ) -> Result<CommandPoll, CommandError> {
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                return Ok(CommandPoll::Pending);
            }
            results.remove(0)
        }
    }

    fn sample_event() -> InvocationEvent {
        serde_json::from_value(serde_json::json!({
            "RequestType": "Create",
            "StackId": "arn:stack/demo/1",
            "RequestId": "req-1",
            "LogicalResourceId": "Workspace",
            "ResponseURL": "https://callback.example/put",
            "ResourceProperties": {"InstanceId": "i-0abc", "Count": 3}
        }))
        .unwrap()
    }

    #[test]
    fn test_require_prop() {
        let event = sample_event();
        assert_eq!(require_prop(&event, "InstanceId").unwrap(), "i-0abc");
        assert!(
            require_prop(&event, "Missing")
                .unwrap_err()
                .to_string()
                .contains("missing required property Missing")
        );
        assert!(
            require_prop(&event, "Count")
                .unwrap_err()
                .to_string()
                .contains("must be a non-empty string")
        );
    }

    #[tokio::test]
    async fn test_unready_target_defers() {
        let runner = ScriptedRunner {
            ready: false,
            results: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
        };
        let ctx = ExecutionContext::new("fn", "inv", Duration::from_secs(60));

        let wait = submit_and_await(
            &runner,
            "i-0abc",
            &["echo hi".to_string()],
            &ctx,
            Duration::from_millis(1),
        )
        .await
        .unwrap();

        assert!(matches!(wait, CommandWait::Retry));
    }

    #[tokio::test]
    async fn test_pending_then_finished() {
        let runner = ScriptedRunner {
            ready: true,
            results: Mutex::new(vec![
                Ok(CommandPoll::Pending),
                Err(CommandError::InvocationNotFound("cmd-1".to_string())),
                Ok(CommandPoll::Finished {
                    stdout: "done".to_string(),
                    stderr: String::new(),
                }),
            ]),
            submissions: Mutex::new(Vec::new()),
        };
        let ctx = ExecutionContext::new("fn", "inv", Duration::from_secs(60));

        let wait = submit_and_await(
            &runner,
            "i-0abc",
            &["echo hi".to_string()],
            &ctx,
            Duration::from_millis(1),
        )
        .await
        .unwrap();

        match wait {
            CommandWait::Finished { stdout, .. } => assert_eq!(stdout, "done"),
            CommandWait::Retry => panic!("expected finished"),
        }
    }

    #[tokio::test]
    async fn test_stderr_is_a_failure() {
        let runner = ScriptedRunner::finishing_with("", "growpart: no space");
        let ctx = ExecutionContext::new("fn", "inv", Duration::from_secs(60));

        let err = submit_and_await(
            &runner,
            "i-0abc",
            &["grow".to_string()],
            &ctx,
            Duration::from_millis(1),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("growpart: no space"));
    }

    #[tokio::test]
    async fn test_low_budget_defers_instead_of_waiting() {
        let runner = ScriptedRunner {
            ready: true,
            results: Mutex::new(Vec::new()), // forever pending
            submissions: Mutex::new(Vec::new()),
        };
        // below LOW_BUDGET from the start
        let ctx = ExecutionContext::new("fn", "inv", Duration::from_secs(5));

        let wait = submit_and_await(
            &runner,
            "i-0abc",
            &["grow".to_string()],
            &ctx,
            Duration::from_millis(1),
        )
        .await
        .unwrap();

        assert!(matches!(wait, CommandWait::Retry));
    }
}
