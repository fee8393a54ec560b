// SPDX-License-Identifier: Apache-2.0

use rifa_store::RetryPolicy;
use std::env;
use std::time::Duration;

pub fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

pub fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

pub fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

pub fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(name, default_ms))
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Base URL of the remote document store; empty means the in-process
    /// store (useful for local operation and demos).
    pub store_url: Option<String>,
    pub store_bearer: Option<String>,
    pub store_allow_private_hosts: bool,
    pub collection: String,
    pub op_timeout: Duration,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub log_json: bool,
    pub shutdown_drain: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            store_url: None,
            store_bearer: None,
            store_allow_private_hosts: false,
            collection: rifa_registry::DEFAULT_COLLECTION.to_string(),
            op_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            log_json: true,
            shutdown_drain: Duration::from_millis(2000),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env::var("RIFA_BIND").unwrap_or(defaults.bind_addr),
            store_url: env::var("RIFA_STORE_URL").ok().filter(|v| !v.trim().is_empty()),
            store_bearer: env::var("RIFA_STORE_BEARER").ok(),
            store_allow_private_hosts: env_bool("RIFA_STORE_ALLOW_PRIVATE_HOSTS", false),
            collection: env::var("RIFA_COLLECTION").unwrap_or(defaults.collection),
            op_timeout: env_duration_ms("RIFA_OP_TIMEOUT_MS", 5000),
            poll_interval: env_duration_ms("RIFA_POLL_INTERVAL_MS", 500),
            retry: RetryPolicy {
                max_attempts: env_usize("RIFA_RETRY_ATTEMPTS", 4),
                base_backoff_ms: env_u64("RIFA_RETRY_BASE_MS", 120),
            },
            log_json: env_bool("RIFA_LOG_JSON", true),
            shutdown_drain: env_duration_ms("RIFA_SHUTDOWN_DRAIN_MS", 2000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ServerConfig::default();
        assert!(cfg.store_url.is_none());
        assert_eq!(cfg.collection, "sold");
        assert_eq!(cfg.retry.max_attempts, 4);
    }
}
