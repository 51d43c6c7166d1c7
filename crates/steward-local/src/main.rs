// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Steward Local - Offline Lifecycle Harness
//!
//! Runs one controller invocation against stub collaborators, so handler
//! flows can be exercised without any cloud backend. The event payload is
//! read from a JSON file given as the first argument; the controller runs
//! in local mode, so no re-invocation trigger is ever installed and an
//! in-progress outcome simply ends the run.
//!
//! ```text
//! STEWARD_SCENARIO=disk-resize steward-local event.json
//! ```
//!
//! The callback URL in the event is contacted for real, so point it at a
//! local listener (or anything that accepts a PUT) when trying this out.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use steward_core::{Controller, ControllerConfig, ExecutionContext, InvocationEvent};
use steward_provision::{disk_resize, host_setup};

mod stubs;

use stubs::{ScriptedInventory, ScriptedRunner};

const DEFAULT_BUDGET_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("steward_core=debug".parse().unwrap())
                .add_directive("steward_local=info".parse().unwrap()),
        )
        .init();

    info!("Starting Steward Local");

    let event_path = std::env::args()
        .nth(1)
        .context("usage: steward-local <event.json>")?;
    let raw = std::fs::read_to_string(&event_path)
        .with_context(|| format!("reading event file {event_path}"))?;
    let event: InvocationEvent =
        serde_json::from_str(&raw).with_context(|| format!("parsing event file {event_path}"))?;

    let config = ControllerConfig::from_env()
        .map_err(|e| {
            error!("Configuration error: {}", e);
            e
        })?
        .with_local_mode(true);

    let scenario = std::env::var("STEWARD_SCENARIO").unwrap_or_else(|_| "disk-resize".to_string());
    let inventory = Arc::new(ScriptedInventory);
    let runner = Arc::new(ScriptedRunner::new());
    let registry = match scenario.as_str() {
        "disk-resize" => disk_resize::registry(inventory, runner),
        "host-setup" => host_setup::registry(inventory, runner),
        other => anyhow::bail!("unknown STEWARD_SCENARIO {other:?}"),
    };

    info!(
        %scenario,
        kind = %event.request_type,
        phase = %event.phase(),
        "Invoking controller"
    );

    let controller = Controller::builder()
        .registry(registry)
        .config(config)
        .build();
    let ctx = ExecutionContext::new(
        "steward-local",
        format!("local-{}", std::process::id()),
        std::time::Duration::from_secs(DEFAULT_BUDGET_SECS),
    );

    controller.handle(event, &ctx).await?;
    info!("Invocation finished");
    Ok(())
}
