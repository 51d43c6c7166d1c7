// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workspace host bootstrap handlers.
//!
//! Create locates the workspace host by its environment tag and attaches
//! the requested instance profile; the poll handler then fetches and runs
//! the bootstrap script on the host. The host is looked up again on every
//! poll because no state beyond the event survives between invocations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use steward_core::{
    ExecutionContext, Handler, HandlerOutcome, HandlerRegistry, InvocationEvent,
};
use tracing::info;

use crate::clients::{CommandRunner, CommandWait, HostInventory, require_prop, submit_and_await};
use crate::disk_resize::NoOpHandler;

const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(5);

/// Tag key identifying which workspace environment a host belongs to.
pub const ENVIRONMENT_TAG: &str = "steward:environment";

const STAGE_DIR: &str = "/tmp/steward-setup";

fn bootstrap_commands(url: &str, args: &str) -> Vec<String> {
    vec![
        format!("mkdir -p {STAGE_DIR}"),
        format!("curl -fsSL {url} -o {STAGE_DIR}/bootstrap.sh"),
        format!("chmod +x {STAGE_DIR}/bootstrap.sh"),
        format!("{STAGE_DIR}/bootstrap.sh {args}"),
    ]
}

/// Create: attach the instance profile to the workspace host.
pub struct HostSetupCreate {
    inventory: Arc<dyn HostInventory>,
}

impl HostSetupCreate {
    /// Create the handler.
    pub fn new(inventory: Arc<dyn HostInventory>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl Handler for HostSetupCreate {
    async fn run(
        &self,
        event: &InvocationEvent,
        _ctx: &ExecutionContext,
    ) -> anyhow::Result<HandlerOutcome> {
        let environment_id = require_prop(event, "EnvironmentId")?;
        let profile = require_prop(event, "InstanceProfile")?;

        let host = self
            .inventory
            .find_by_tag(ENVIRONMENT_TAG, &environment_id)
            .await?;
        self.inventory
            .attach_profile(&host.instance_id, &profile)
            .await?;
        info!(instance_id = %host.instance_id, %profile, "instance profile attached");

        // bootstrap runs on the poll side once the profile is effective
        Ok(HandlerOutcome::InProgress)
    }
}

/// Poll: run the bootstrap script on the host.
pub struct HostSetupPoll {
    inventory: Arc<dyn HostInventory>,
    runner: Arc<dyn CommandRunner>,
    poll_delay: Duration,
}

impl HostSetupPoll {
    /// Create the handler.
    pub fn new(inventory: Arc<dyn HostInventory>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            inventory,
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
impl Handler for HostSetupPoll {
    async fn run(
        &self,
        event: &InvocationEvent,
        ctx: &ExecutionContext,
    ) -> anyhow::Result<HandlerOutcome> {
        let environment_id = require_prop(event, "EnvironmentId")?;
        let url = require_prop(event, "BootstrapUrl")?;
        let args = event
            .resource_properties
            .get("BootstrapArgs")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let host = self
            .inventory
            .find_by_tag(ENVIRONMENT_TAG, &environment_id)
            .await?;

        let wait = submit_and_await(
            self.runner.as_ref(),
            &host.instance_id,
            &bootstrap_commands(&url, args),
            ctx,
            self.poll_delay,
        )
        .await?;

        match wait {
            CommandWait::Finished { stdout, .. } => {
                info!(instance_id = %host.instance_id, "bootstrap finished");
                let mut data = Map::new();
                data.insert("Output".to_string(), Value::String(stdout));
                Ok(HandlerOutcome::done_with_data(host.instance_id, data))
            }
            CommandWait::Retry => Ok(HandlerOutcome::InProgress),
        }
    }
}

/// The full host-setup handler set.
pub fn registry(
    inventory: Arc<dyn HostInventory>,
    runner: Arc<dyn CommandRunner>,
) -> HandlerRegistry {
    HandlerRegistry::builder()
        .create(HostSetupCreate::new(inventory.clone()))
        .poll_create(HostSetupPoll::new(inventory, runner))
        .update(NoOpHandler)
        .delete(NoOpHandler)
        .build()
}
