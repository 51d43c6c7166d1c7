// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Self-re-scheduling trigger installation and teardown.
//!
//! While an operation is in progress the controller has no process to wait
//! in, so it installs a periodic rule in an external schedule service that
//! re-invokes the function with the full event as input. The trigger's own
//! identifiers ride inside that event; there is no other persistence.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{debug, error, info};

use crate::error::{ControllerError, Result, ScheduleError};
use crate::event::{ExecutionContext, InvocationEvent, TriggerRef};

const NAME_SUFFIX_LEN: usize = 8;

/// Schedule-service operations needed to manage a re-invocation trigger.
///
/// Injected so tests (and the offline harness) can substitute an in-memory
/// implementation for the real service client.
#[async_trait]
pub trait ScheduleApi: Send + Sync {
    /// Create (or overwrite) a periodic rule firing every `rate_minutes`
    /// minutes. Returns the rule identifier used by the other calls.
    async fn put_rule(&self, name: &str, rate_minutes: u64)
    -> std::result::Result<String, ScheduleError>;

    /// Grant the rule permission to invoke the function.
    async fn grant_invoke(
        &self,
        function: &str,
        statement_id: &str,
        rule: &str,
    ) -> std::result::Result<(), ScheduleError>;

    /// Bind the function as the rule's target, with `input_json` delivered
    /// verbatim as the invocation payload.
    async fn bind_target(
        &self,
        rule: &str,
        function: &str,
        input_json: &str,
    ) -> std::result::Result<(), ScheduleError>;

    /// Unbind the rule's target.
    async fn unbind_target(&self, rule: &str) -> std::result::Result<(), ScheduleError>;

    /// Revoke the invoke permission identified by `statement_id`.
    async fn revoke_invoke(
        &self,
        function: &str,
        statement_id: &str,
    ) -> std::result::Result<(), ScheduleError>;

    /// Delete the rule.
    async fn delete_rule(&self, rule: &str) -> std::result::Result<(), ScheduleError>;
}

/// Installs and removes the re-invocation trigger for one logical operation.
pub struct TriggerManager {
    schedule: Arc<dyn ScheduleApi>,
    rate_minutes: u64,
}

impl TriggerManager {
    /// Create a manager over a schedule service.
    pub fn new(schedule: Arc<dyn ScheduleApi>, rate_minutes: u64) -> Self {
        Self {
            schedule,
            rate_minutes,
        }
    }

    /// Install the trigger and inject the polling bookkeeping into the event.
    ///
    /// The rule identifier and permission statement id are recorded on the
    /// event as soon as each is created, so a failure partway through still
    /// leaves enough state behind for a best-effort removal. The target
    /// input is the full serialized event, `Poll` marker included.
    pub async fn install(
        &self,
        event: &mut InvocationEvent,
        ctx: &ExecutionContext,
    ) -> Result<TriggerRef> {
        let rule_name = scoped_name(&event.logical_resource_id);
        let statement_id = scoped_name(&event.logical_resource_id);

        let rule = self
            .schedule
            .put_rule(&rule_name, self.rate_minutes)
            .await
            .map_err(|e| ControllerError::TriggerInstall(format!("create rule: {e}")))?;
        event.rule = Some(rule.clone());
        debug!(%rule, "periodic rule created");

        self.schedule
            .grant_invoke(&ctx.function_name, &statement_id, &rule)
            .await
            .map_err(|e| ControllerError::TriggerInstall(format!("grant invoke: {e}")))?;
        event.permission = Some(statement_id.clone());
        debug!(statement_id = %statement_id, "invoke permission granted");

        event.poll = Some(true);
        let input = serde_json::to_string(event)?;
        self.schedule
            .bind_target(&rule, &ctx.function_name, &input)
            .await
            .map_err(|e| ControllerError::TriggerInstall(format!("bind target: {e}")))?;

        info!(%rule, rate_minutes = self.rate_minutes, "re-invocation trigger installed");
        Ok(TriggerRef {
            rule: Some(rule),
            permission: Some(statement_id),
        })
    }

    /// Tear down the trigger.
    ///
    /// The three sub-steps are attempted independently: a failure (or a
    /// missing reference) in one never stops the others. Any problem is
    /// collected and surfaced as [`ControllerError::PollingCleanupIncomplete`]
    /// after everything attemptable was attempted.
    pub async fn remove(&self, trigger: &TriggerRef, ctx: &ExecutionContext) -> Result<()> {
        self.remove_inner(trigger, ctx, true).await
    }

    /// Best-effort teardown after a partial installation.
    ///
    /// Unlike [`remove`](Self::remove), references that were never created
    /// are skipped silently instead of counting as problems.
    pub async fn remove_partial(&self, trigger: &TriggerRef, ctx: &ExecutionContext) -> Result<()> {
        self.remove_inner(trigger, ctx, false).await
    }

    async fn remove_inner(
        &self,
        trigger: &TriggerRef,
        ctx: &ExecutionContext,
        missing_is_problem: bool,
    ) -> Result<()> {
        let mut problems: Vec<String> = Vec::new();

        match &trigger.rule {
            Some(rule) => {
                if let Err(e) = self.schedule.unbind_target(rule).await {
                    error!(%rule, error = %e, "failed to unbind trigger target");
                    problems.push(format!("unbind target: {e}"));
                }
            }
            None if missing_is_problem => {
                error!("no rule reference in event, cannot unbind target");
                problems.push("unbind target: rule reference missing".to_string());
            }
            None => {}
        }

        match &trigger.permission {
            Some(statement_id) => {
                if let Err(e) = self
                    .schedule
                    .revoke_invoke(&ctx.function_name, statement_id)
                    .await
                {
                    error!(statement_id = %statement_id, error = %e, "failed to revoke invoke permission");
                    problems.push(format!("revoke invoke: {e}"));
                }
            }
            None if missing_is_problem => {
                error!("no permission reference in event, cannot revoke invoke");
                problems.push("revoke invoke: permission reference missing".to_string());
            }
            None => {}
        }

        match &trigger.rule {
            Some(rule) => {
                if let Err(e) = self.schedule.delete_rule(rule).await {
                    error!(%rule, error = %e, "failed to delete rule");
                    problems.push(format!("delete rule: {e}"));
                }
            }
            None if missing_is_problem => {
                problems.push("delete rule: rule reference missing".to_string());
            }
            None => {}
        }

        if problems.is_empty() {
            info!("re-invocation trigger removed");
            Ok(())
        } else {
            Err(ControllerError::PollingCleanupIncomplete(
                problems.join("; "),
            ))
        }
    }
}

/// `{logical-id}-{random 8 alnum}`: unique enough to avoid collisions
/// between concurrent operations on the same logical resource.
fn scoped_name(logical_id: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(NAME_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{logical_id}-{suffix}")
}
