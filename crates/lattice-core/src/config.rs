// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

/// Lattice core configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default timeout for managed handler invocations.
    pub handler_timeout: Duration,
    /// Queue depth for the deferred event dispatch worker.
    pub event_queue_depth: usize,
    /// Granularity of the scheduler's delayed resumptions.
    pub scheduler_tick: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional:
    /// - `LATTICE_HANDLER_TIMEOUT_MS`: managed handler timeout (default: 30000)
    /// - `LATTICE_EVENT_QUEUE_DEPTH`: async event queue depth (default: 256)
    /// - `LATTICE_SCHEDULER_TICK_MS`: scheduler granularity (default: 50)
    pub fn from_env() -> Result<Self, ConfigError> {
        let handler_timeout_ms: u64 = std::env::var("LATTICE_HANDLER_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("LATTICE_HANDLER_TIMEOUT_MS", "must be a positive integer")
            })?;

        let event_queue_depth: usize = std::env::var("LATTICE_EVENT_QUEUE_DEPTH")
            .unwrap_or_else(|_| "256".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("LATTICE_EVENT_QUEUE_DEPTH", "must be a positive integer")
            })?;

        let scheduler_tick_ms: u64 = std::env::var("LATTICE_SCHEDULER_TICK_MS")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("LATTICE_SCHEDULER_TICK_MS", "must be a positive integer")
            })?;

        if event_queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "LATTICE_EVENT_QUEUE_DEPTH",
                "must be at least 1",
            ));
        }

        Ok(Self {
            handler_timeout: Duration::from_millis(handler_timeout_ms),
            event_queue_depth,
            scheduler_tick: Duration::from_millis(scheduler_tick_ms),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(30),
            event_queue_depth: 256,
            scheduler_tick: Duration::from_millis(50),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("LATTICE_HANDLER_TIMEOUT_MS");
        guard.remove("LATTICE_EVENT_QUEUE_DEPTH");
        guard.remove("LATTICE_SCHEDULER_TICK_MS");

        let config = Config::from_env().unwrap();

        assert_eq!(config.handler_timeout, Duration::from_secs(30));
        assert_eq!(config.event_queue_depth, 256);
        assert_eq!(config.scheduler_tick, Duration::from_millis(50));
    }

    #[test]
    fn test_config_custom_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("LATTICE_HANDLER_TIMEOUT_MS", "1500");
        guard.set("LATTICE_EVENT_QUEUE_DEPTH", "32");
        guard.set("LATTICE_SCHEDULER_TICK_MS", "10");

        let config = Config::from_env().unwrap();

        assert_eq!(config.handler_timeout, Duration::from_millis(1500));
        assert_eq!(config.event_queue_depth, 32);
        assert_eq!(config.scheduler_tick, Duration::from_millis(10));
    }

    #[test]
    fn test_config_rejects_garbage() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("LATTICE_HANDLER_TIMEOUT_MS", "soon");

        let result = Config::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid("LATTICE_HANDLER_TIMEOUT_MS", _))
        ));
    }

    #[test]
    fn test_config_rejects_zero_queue_depth() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("LATTICE_HANDLER_TIMEOUT_MS");
        guard.set("LATTICE_EVENT_QUEUE_DEPTH", "0");
        guard.remove("LATTICE_SCHEDULER_TICK_MS");

        let result = Config::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid("LATTICE_EVENT_QUEUE_DEPTH", _))
        ));
    }

    #[test]
    fn test_config_default_matches_from_env_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("LATTICE_HANDLER_TIMEOUT_MS");
        guard.remove("LATTICE_EVENT_QUEUE_DEPTH");
        guard.remove("LATTICE_SCHEDULER_TICK_MS");

        let from_env = Config::from_env().unwrap();
        let default = Config::default();

        assert_eq!(from_env.handler_timeout, default.handler_timeout);
        assert_eq!(from_env.event_queue_depth, default.event_queue_depth);
        assert_eq!(from_env.scheduler_tick, default.scheduler_tick);
    }
}
