// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process stand-ins for the inventory and command collaborators.
//!
//! Every call succeeds with canned data so a whole lifecycle can be walked
//! through offline; the stubs log what a real backend would have done.

use std::sync::Mutex;

use async_trait::async_trait;
use steward_provision::{
    CommandError, CommandHandle, CommandPoll, CommandRunner, HostDescription, HostInventory,
    InventoryError,
};
use tracing::info;

/// Inventory stub describing a single imaginary host.
pub struct ScriptedInventory;

#[async_trait]
impl HostInventory for ScriptedInventory {
    async fn find_by_tag(
        &self,
        key: &str,
        value: &str,
    ) -> Result<HostDescription, InventoryError> {
        info!(%key, %value, "stub: tag lookup");
        Ok(HostDescription {
            instance_id: "i-local0001".to_string(),
            root_volume_id: "vol-local0001".to_string(),
        })
    }

    async fn describe(&self, instance_id: &str) -> Result<HostDescription, InventoryError> {
        info!(%instance_id, "stub: describe");
        Ok(HostDescription {
            instance_id: instance_id.to_string(),
            root_volume_id: "vol-local0001".to_string(),
        })
    }

    async fn attach_profile(
        &self,
        instance_id: &str,
        profile: &str,
    ) -> Result<(), InventoryError> {
        info!(%instance_id, %profile, "stub: attach profile");
        Ok(())
    }

    async fn resize_volume(&self, volume_id: &str, size_gib: u64) -> Result<(), InventoryError> {
        info!(%volume_id, size_gib, "stub: resize volume");
        Ok(())
    }
}

/// Command runner stub: every command finishes successfully on the second
/// result fetch, exercising the pending path once.
pub struct ScriptedRunner {
    fetches: Mutex<u32>,
}

impl ScriptedRunner {
    /// Create the stub.
    pub fn new() -> Self {
        Self {
            fetches: Mutex::new(0),
        }
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn submit(
        &self,
        target: &str,
        command_lines: &[String],
    ) -> Result<Option<CommandHandle>, CommandError> {
        info!(%target, commands = command_lines.len(), "stub: command submitted");
        Ok(Some(CommandHandle("cmd-local-1".to_string())))
    }

    async fn fetch_result(
        &self,
        target: &str,
        handle: &CommandHandle,
    ) -> Result<CommandPoll, CommandError> {
        let mut fetches = self.fetches.lock().unwrap();
        *fetches += 1;
        info!(%target, handle = %handle.0, fetch = *fetches, "stub: result fetch");
        if *fetches < 2 {
            Ok(CommandPoll::Pending)
        } else {
            Ok(CommandPoll::Finished {
                stdout: "stub command output".to_string(),
                stderr: String::new(),
            })
        }
    }
}
