// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Controller configuration.

use std::env;
use std::time::Duration;

use crate::error::{ControllerError, Result};
use crate::report::REASON_LIMIT;

const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 2;
const DEFAULT_WATCHDOG_MARGIN_MS: u64 = 500;

/// Tunables for one controller instance.
///
/// Built from the environment in production, or via the `with_*` methods
/// in tests and the offline harness.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Minutes between trigger-fired re-invocations.
    pub poll_interval_minutes: u64,
    /// Safety margin the watchdog keeps before the hard deadline.
    pub watchdog_margin: Duration,
    /// Maximum failure-reason length in terminal reports.
    pub reason_limit: usize,
    /// Local mode: skip trigger installation and removal entirely.
    pub local_mode: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval_minutes: DEFAULT_POLL_INTERVAL_MINUTES,
            watchdog_margin: Duration::from_millis(DEFAULT_WATCHDOG_MARGIN_MS),
            reason_limit: REASON_LIMIT,
            local_mode: false,
        }
    }
}

impl ControllerConfig {
    /// Build a configuration from the environment.
    ///
    /// Reads `STEWARD_POLL_INTERVAL_MINUTES`, `STEWARD_WATCHDOG_MARGIN_MS`
    /// and `STEWARD_LOCAL`; unset variables keep their defaults, malformed
    /// values are an error.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("STEWARD_POLL_INTERVAL_MINUTES") {
            config.poll_interval_minutes = raw.parse().map_err(|_| {
                ControllerError::Config(format!(
                    "STEWARD_POLL_INTERVAL_MINUTES must be an integer, got {raw:?}"
                ))
            })?;
        }
        if let Ok(raw) = env::var("STEWARD_WATCHDOG_MARGIN_MS") {
            let ms: u64 = raw.parse().map_err(|_| {
                ControllerError::Config(format!(
                    "STEWARD_WATCHDOG_MARGIN_MS must be an integer, got {raw:?}"
                ))
            })?;
            config.watchdog_margin = Duration::from_millis(ms);
        }
        if let Ok(raw) = env::var("STEWARD_LOCAL") {
            config.local_mode = matches!(raw.as_str(), "1" | "true" | "TRUE");
        }

        Ok(config)
    }

    /// Override the polling interval.
    pub fn with_poll_interval_minutes(mut self, minutes: u64) -> Self {
        self.poll_interval_minutes = minutes;
        self
    }

    /// Override the watchdog margin.
    pub fn with_watchdog_margin(mut self, margin: Duration) -> Self {
        self.watchdog_margin = margin;
        self
    }

    /// Enable or disable local mode.
    pub fn with_local_mode(mut self, local: bool) -> Self {
        self.local_mode = local;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize the tests that touch them.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        keys: Vec<&'static str>,
    }

    impl EnvGuard {
        fn set(vars: &[(&'static str, &str)]) -> Self {
            for (key, value) in vars {
                unsafe { env::set_var(key, value) };
            }
            Self {
                keys: vars.iter().map(|(k, _)| *k).collect(),
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for key in &self.keys {
                unsafe { env::remove_var(key) };
            }
        }
    }

    #[test]
    fn test_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let config = ControllerConfig::from_env().unwrap();

        assert_eq!(config.poll_interval_minutes, 2);
        assert_eq!(config.watchdog_margin, Duration::from_millis(500));
        assert_eq!(config.reason_limit, 256);
        assert!(!config.local_mode);
    }

    #[test]
    fn test_env_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::set(&[
            ("STEWARD_POLL_INTERVAL_MINUTES", "5"),
            ("STEWARD_WATCHDOG_MARGIN_MS", "1000"),
            ("STEWARD_LOCAL", "true"),
        ]);

        let config = ControllerConfig::from_env().unwrap();

        assert_eq!(config.poll_interval_minutes, 5);
        assert_eq!(config.watchdog_margin, Duration::from_secs(1));
        assert!(config.local_mode);
    }

    #[test]
    fn test_malformed_interval_is_an_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::set(&[("STEWARD_POLL_INTERVAL_MINUTES", "soon")]);

        let err = ControllerConfig::from_env().unwrap_err();
        assert!(matches!(err, ControllerError::Config(_)));
    }

    #[test]
    fn test_builder_overrides() {
        let config = ControllerConfig::default()
            .with_poll_interval_minutes(1)
            .with_watchdog_margin(Duration::from_millis(50))
            .with_local_mode(true);

        assert_eq!(config.poll_interval_minutes, 1);
        assert_eq!(config.watchdog_margin, Duration::from_millis(50));
        assert!(config.local_mode);
    }
}
