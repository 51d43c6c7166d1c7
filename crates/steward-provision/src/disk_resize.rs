// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Root-volume resize handlers.
//!
//! Create grows the block volume and hands off to polling; the poll
//! handler grows the partition and filesystem on the host once the bigger
//! volume is visible there. Update and Delete are no-ops: a resize leaves
//! nothing behind to reconfigure or tear down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use steward_core::{
    ExecutionContext, Handler, HandlerOutcome, HandlerRegistry, InvocationEvent,
};
use tracing::info;

use crate::clients::{CommandRunner, CommandWait, HostInventory, require_prop, submit_and_await};

const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(5);

/// Shell sequence growing the root partition and filesystem, covering
/// both nvme and xvd device naming.
fn grow_fs_commands() -> Vec<String> {
    [
        "if [ -e /dev/nvme0n1 ]; then sudo growpart /dev/nvme0n1 1; else sudo growpart /dev/xvda 1; fi",
        "if [ -e /dev/nvme0n1p1 ]; then sudo resize2fs /dev/nvme0n1p1; else sudo resize2fs /dev/xvda1; fi",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Create: grow the instance's root volume to `VolumeSize` GiB.
pub struct DiskResizeCreate {
    inventory: Arc<dyn HostInventory>,
}

impl DiskResizeCreate {
    /// Create the handler.
    pub fn new(inventory: Arc<dyn HostInventory>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl Handler for DiskResizeCreate {
    async fn run(
        &self,
        event: &InvocationEvent,
        _ctx: &ExecutionContext,
    ) -> anyhow::Result<HandlerOutcome> {
        let instance_id = require_prop(event, "InstanceId")?;
        let size_raw = require_prop(event, "VolumeSize")?;
        let size_gib: u64 = size_raw
            .parse()
            .map_err(|_| anyhow::anyhow!("VolumeSize must be an integer, got {size_raw:?}"))?;

        let host = self.inventory.describe(&instance_id).await?;
        self.inventory
            .resize_volume(&host.root_volume_id, size_gib)
            .await?;
        info!(%instance_id, volume = %host.root_volume_id, size_gib, "volume resize requested");

        // the filesystem grow happens on the poll side once the volume
        // modification has propagated
        Ok(HandlerOutcome::InProgress)
    }
}

/// Poll: grow the partition and filesystem on the host.
pub struct DiskResizePoll {
    runner: Arc<dyn CommandRunner>,
    poll_delay: Duration,
}

impl DiskResizePoll {
    /// Create the handler.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            poll_delay: DEFAULT_POLL_DELAY,
        }
    }

    /// Override the in-invocation result poll delay.
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }
}

#[async_trait]
impl Handler for DiskResizePoll {
    async fn run(
        &self,
        event: &InvocationEvent,
        ctx: &ExecutionContext,
    ) -> anyhow::Result<HandlerOutcome> {
        let instance_id = require_prop(event, "InstanceId")?;

        let wait = submit_and_await(
            self.runner.as_ref(),
            &instance_id,
            &grow_fs_commands(),
            ctx,
            self.poll_delay,
        )
        .await?;

        match wait {
            CommandWait::Finished { .. } => {
                info!(%instance_id, "filesystem grown");
                Ok(HandlerOutcome::done(instance_id))
            }
            CommandWait::Retry => Ok(HandlerOutcome::InProgress),
        }
    }
}

/// Handler that completes without doing anything.
pub struct NoOpHandler;

#[async_trait]
impl Handler for NoOpHandler {
    async fn run(
        &self,
        _event: &InvocationEvent,
        _ctx: &ExecutionContext,
    ) -> anyhow::Result<HandlerOutcome> {
        Ok(HandlerOutcome::finished())
    }
}

/// The full disk-resize handler set.
pub fn registry(
    inventory: Arc<dyn HostInventory>,
    runner: Arc<dyn CommandRunner>,
) -> HandlerRegistry {
    HandlerRegistry::builder()
        .create(DiskResizeCreate::new(inventory))
        .poll_create(DiskResizePoll::new(runner))
        .update(NoOpHandler)
        .delete(NoOpHandler)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{CommandError, CommandHandle, CommandPoll, HostDescription, InventoryError};
    use std::sync::Mutex;

    struct FakeInventory {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HostInventory for FakeInventory {
        async fn find_by_tag(
            &self,
            _key: &str,
            _value: &str,
        ) -> Result<HostDescription, InventoryError> {
            unimplemented!("not used by disk resize")
        }

        async fn describe(&self, instance_id: &str) -> Result<HostDescription, InventoryError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("describe {instance_id}"));
            Ok(HostDescription {
                instance_id: instance_id.to_string(),
                root_volume_id: "vol-root".to_string(),
            })
        }

        async fn attach_profile(
            &self,
            _instance_id: &str,
            _profile: &str,
        ) -> Result<(), InventoryError> {
            unimplemented!("not used by disk resize")
        }

        async fn resize_volume(
            &self,
            volume_id: &str,
            size_gib: u64,
        ) -> Result<(), InventoryError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("resize {volume_id} {size_gib}"));
            Ok(())
        }
    }

    struct OneShotRunner {
        poll: CommandPoll,
    }

    #[async_trait]
    impl CommandRunner for OneShotRunner {
        async fn submit(
            &self,
            _target: &str,
            _command_lines: &[String],
        ) -> Result<Option<CommandHandle>, CommandError> {
            Ok(Some(CommandHandle("cmd-1".to_string())))
        }

        async fn fetch_result(
            &self,
            _target: &str,
            _handle: &CommandHandle,
        ) -> Result<CommandPoll, CommandError> {
            Ok(self.poll.clone())
        }
    }

    fn resize_event() -> InvocationEvent {
        serde_json::from_value(serde_json::json!({
            "RequestType": "Create",
            "StackId": "arn:stack/demo/1",
            "RequestId": "req-1",
            "LogicalResourceId": "WorkspaceDisk",
            "ResponseURL": "https://callback.example/put",
            "ResourceProperties": {"InstanceId": "i-0abc", "VolumeSize": "64"}
        }))
        .unwrap()
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("fn", "inv-1", Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_create_resizes_root_volume_and_goes_in_progress() {
        let inventory = Arc::new(FakeInventory {
            calls: Mutex::new(Vec::new()),
        });
        let handler = DiskResizeCreate::new(inventory.clone());

        let outcome = handler.run(&resize_event(), &ctx()).await.unwrap();

        assert_eq!(outcome, HandlerOutcome::InProgress);
        assert_eq!(
            *inventory.calls.lock().unwrap(),
            vec!["describe i-0abc", "resize vol-root 64"]
        );
    }

    #[tokio::test]
    async fn test_create_rejects_non_numeric_size() {
        let inventory = Arc::new(FakeInventory {
            calls: Mutex::new(Vec::new()),
        });
        let handler = DiskResizeCreate::new(inventory.clone());
        let mut event = resize_event();
        event
            .resource_properties
            .insert("VolumeSize".to_string(), "plenty".into());

        let err = handler.run(&event, &ctx()).await.unwrap_err();

        assert!(err.to_string().contains("VolumeSize must be an integer"));
        assert!(inventory.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poll_completes_with_instance_id() {
        let runner = Arc::new(OneShotRunner {
            poll: CommandPoll::Finished {
                stdout: "CHANGED".to_string(),
                stderr: String::new(),
            },
        });
        let handler = DiskResizePoll::new(runner).with_poll_delay(Duration::from_millis(1));

        let outcome = handler.run(&resize_event(), &ctx()).await.unwrap();

        assert_eq!(outcome, HandlerOutcome::done("i-0abc"));
    }

    #[tokio::test]
    async fn test_poll_surfaces_command_stderr() {
        let runner = Arc::new(OneShotRunner {
            poll: CommandPoll::Finished {
                stdout: String::new(),
                stderr: "growpart: NOCHANGE".to_string(),
            },
        });
        let handler = DiskResizePoll::new(runner).with_poll_delay(Duration::from_millis(1));

        let err = handler.run(&resize_event(), &ctx()).await.unwrap_err();

        assert!(err.to_string().contains("growpart: NOCHANGE"));
    }

    #[tokio::test]
    async fn test_registry_shape() {
        let inventory = Arc::new(FakeInventory {
            calls: Mutex::new(Vec::new()),
        });
        let runner = Arc::new(OneShotRunner {
            poll: CommandPoll::Pending,
        });
        let registry = registry(inventory, runner);

        assert!(registry.poll_enabled(steward_core::RequestType::Create));
        assert!(!registry.poll_enabled(steward_core::RequestType::Delete));

        // delete is a no-op that completes immediately
        let handler = registry
            .get(
                steward_core::RequestType::Delete,
                steward_core::Phase::Initial,
            )
            .unwrap();
        let outcome = handler.run(&resize_event(), &ctx()).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::finished());
    }
}
