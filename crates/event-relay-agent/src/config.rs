// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;

use event_relay_core::aggregator::{BatchPolicy, FailurePolicy};

const DEFAULT_LISTEN_PORT: u16 = 33383;
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_BATCH_WAIT_SECS: u64 = 2;
const DEFAULT_SEND_DEADLINE_BASE_SECS: u64 = 1;
const DEFAULT_MAX_REQUEST_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// How the agent moves accepted messages toward the queue broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Publish each message inline with the request, with retries.
    Direct,
    /// Hand messages to the batch aggregator and respond immediately.
    Batch,
}

impl FromStr for RelayMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(RelayMode::Direct),
            "batch" => Ok(RelayMode::Batch),
            _ => Err(anyhow::anyhow!("invalid relay mode: {s}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_port: u16,
    pub mode: RelayMode,
    /// Accept and acknowledge messages but never publish them. Used when
    /// exercising producers against an agent with no broker behind it.
    pub disable_deliver: bool,
    pub batch_size: usize,
    pub batch_wait: Duration,
    pub send_retry_enabled: bool,
    pub send_deadline_base: Duration,
    pub max_request_content_length: usize,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Config, anyhow::Error> {
        let listen_port = parse_env("RELAY_PORT")?.unwrap_or(DEFAULT_LISTEN_PORT);
        let mode = match env::var("RELAY_MODE") {
            Ok(value) => value.parse()?,
            Err(_) => RelayMode::Direct,
        };
        let disable_deliver = parse_env("RELAY_DISABLE_DELIVER")?.unwrap_or(false);
        let batch_size = parse_env("RELAY_BATCH_SIZE")?.unwrap_or(DEFAULT_BATCH_SIZE);
        let batch_wait_secs = parse_env("RELAY_BATCH_WAIT_SECS")?.unwrap_or(DEFAULT_BATCH_WAIT_SECS);
        let send_retry_enabled = parse_env("RELAY_SEND_RETRY")?.unwrap_or(true);
        let send_deadline_base_secs =
            parse_env("RELAY_SEND_DEADLINE_BASE_SECS")?.unwrap_or(DEFAULT_SEND_DEADLINE_BASE_SECS);
        let log_level = env::var("RELAY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        if batch_size == 0 {
            return Err(anyhow::anyhow!("RELAY_BATCH_SIZE must be greater than zero"));
        }

        Ok(Config {
            listen_port,
            mode,
            disable_deliver,
            batch_size,
            batch_wait: Duration::from_secs(batch_wait_secs),
            send_retry_enabled,
            send_deadline_base: Duration::from_secs(send_deadline_base_secs),
            max_request_content_length: DEFAULT_MAX_REQUEST_CONTENT_LENGTH,
            log_level,
        })
    }

    /// Policy for the batch-mode aggregator. Failed batches are dropped;
    /// the agent offers at-most-once delivery and producers never block
    /// on a slow broker.
    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            max_batch_size: self.batch_size,
            max_wait: self.batch_wait,
            on_failure: FailurePolicy::Drop,
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>, anyhow::Error>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid value for {name}: {e}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_relay_env() {
        for name in [
            "RELAY_PORT",
            "RELAY_MODE",
            "RELAY_DISABLE_DELIVER",
            "RELAY_BATCH_SIZE",
            "RELAY_BATCH_WAIT_SECS",
            "RELAY_SEND_RETRY",
            "RELAY_SEND_DEADLINE_BASE_SECS",
            "RELAY_LOG_LEVEL",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_default_config() {
        clear_relay_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config.listen_port, 33383);
        assert_eq!(config.mode, RelayMode::Direct);
        assert!(!config.disable_deliver);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.batch_wait, Duration::from_secs(2));
        assert!(config.send_retry_enabled);
        assert_eq!(config.send_deadline_base, Duration::from_secs(1));
    }

    #[test]
    #[serial]
    fn test_batch_mode_config() {
        clear_relay_env();
        env::set_var("RELAY_MODE", "batch");
        env::set_var("RELAY_BATCH_SIZE", "25");
        env::set_var("RELAY_BATCH_WAIT_SECS", "5");
        let config = Config::from_env().unwrap();
        assert_eq!(config.mode, RelayMode::Batch);
        let policy = config.batch_policy();
        assert_eq!(policy.max_batch_size, 25);
        assert_eq!(policy.max_wait, Duration::from_secs(5));
        clear_relay_env();
    }

    #[test]
    #[serial]
    fn test_invalid_mode_is_rejected() {
        clear_relay_env();
        env::set_var("RELAY_MODE", "broadcast");
        assert!(Config::from_env().is_err());
        clear_relay_env();
    }

    #[test]
    #[serial]
    fn test_invalid_port_is_rejected() {
        clear_relay_env();
        env::set_var("RELAY_PORT", "not-a-port");
        assert!(Config::from_env().is_err());
        clear_relay_env();
    }

    #[test]
    #[serial]
    fn test_zero_batch_size_is_rejected() {
        clear_relay_env();
        env::set_var("RELAY_BATCH_SIZE", "0");
        assert!(Config::from_env().is_err());
        clear_relay_env();
    }

    #[test]
    #[serial]
    fn test_disable_deliver() {
        clear_relay_env();
        env::set_var("RELAY_DISABLE_DELIVER", "true");
        let config = Config::from_env().unwrap();
        assert!(config.disable_deliver);
        clear_relay_env();
    }
}
