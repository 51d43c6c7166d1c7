// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Time-budget watchdog and the exactly-once report guard.
//!
//! The host kills an invocation the instant its budget runs out, which
//! would leave the orchestrator waiting with no terminal report at all.
//! The watchdog runs as a background task that fires slightly before the
//! deadline and delivers a FAILED report on the main flow's behalf. The
//! [`ReportGuard`] arbitrates between the watchdog and the main flow so
//! that whichever claims it first is the only one that reports.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::event::{ExecutionContext, InvocationEvent};
use crate::report::{Reporter, TerminalReport};

/// Reason attached to the watchdog's FAILED report.
pub const TIMEOUT_REASON: &str = "Execution timed out";

/// One-shot token guaranteeing at most one terminal report per invocation.
///
/// Cloneable; all clones share the claim. `claim` uses a compare-exchange
/// so concurrent claimants resolve to exactly one winner.
#[derive(Clone, Default)]
pub struct ReportGuard {
    claimed: Arc<AtomicBool>,
}

impl ReportGuard {
    /// A fresh, unclaimed guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the right to report. Returns `true` exactly once
    /// across all clones.
    pub fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether anyone has claimed the guard yet.
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

/// Background task that reports a timeout failure just before the host
/// kills the invocation.
pub struct Watchdog {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Watchdog {
    /// Arm the watchdog for the current invocation.
    ///
    /// The task sleeps until `margin` before the context deadline, then
    /// races the main flow for the guard. A zero-or-negative window fires
    /// immediately. Disarming cancels the sleep without reporting.
    pub fn arm(
        reporter: Reporter,
        event: InvocationEvent,
        ctx: &ExecutionContext,
        guard: ReportGuard,
        margin: Duration,
    ) -> Self {
        let window = ctx.remaining().saturating_sub(margin);
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => {
                    debug!("watchdog disarmed");
                }
                _ = sleep(window) => {
                    if !guard.claim() {
                        debug!("watchdog fired after report was already sent");
                        return;
                    }
                    warn!(
                        request_id = %event.request_id,
                        "time budget nearly exhausted, reporting timeout failure"
                    );
                    let report = TerminalReport::failed(&event, TIMEOUT_REASON);
                    if let Err(e) = reporter.deliver(&event.response_url, &report).await {
                        error!(error = %e, "watchdog report delivery failed");
                    }
                }
            }
        });

        Self { token, handle }
    }

    /// Disarm the watchdog. Must be called before the main flow claims
    /// the guard, so a concurrently firing watchdog cannot win the race
    /// after the real outcome is known.
    pub fn disarm(&self) {
        self.token.cancel();
    }

    /// Wait for the background task to finish. Used by tests; production
    /// code disarms and lets the task wind down on its own.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}
