//! Agent configuration: coordinator endpoint, capability set, reconnect
//! policy, and runner command.
//!
//! Every field has a default so the agent runs with no config file at all.
//! The coordinator endpoint can be overridden via `AGENT_SERVER_URL`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Environment variable selecting the coordinator endpoint.
pub const SERVER_URL_ENV: &str = "AGENT_SERVER_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Coordinator endpoint (http/https base URL).
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Browser engines advertised at registration. Fixed for the process
    /// lifetime; order is preserved on the wire.
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    /// Delay between full connect cycles once the reconnect budget is
    /// exhausted. The supervisor retries forever at this cadence.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

/// Reconnection policy for a single connect cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// How supplied test code is executed out-of-process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Interpreter invoked with the materialized test script.
    #[serde(default = "default_runner_command")]
    pub command: String,

    /// Extra arguments placed before the script path.
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_server_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_browsers() -> Vec<String> {
    vec!["chromium".into(), "firefox".into(), "webkit".into()]
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_runner_command() -> String {
    "python3".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            browsers: default_browsers(),
            reconnect: ReconnectConfig::default(),
            runner: RunnerConfig::default(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: default_runner_command(),
            args: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Load config from a JSON file, or defaults when no path is given.
    /// The `AGENT_SERVER_URL` environment override is applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p).map_err(|e| {
                    AgentError::Config(format!("cannot read {}: {e}", p.display()))
                })?;
                serde_json::from_str(&raw)
                    .map_err(|e| AgentError::Config(format!("invalid config: {e}")))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.is_empty() {
                self.server_url = url;
            }
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl ReconnectConfig {
    /// Exponential backoff delay before the given retry attempt (1-based),
    /// capped at `max_delay_ms`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.server_url, "http://127.0.0.1:5000");
        assert_eq!(config.browsers, vec!["chromium", "firefox", "webkit"]);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.retry_delay_secs, 5);
        assert_eq!(config.runner.command, "python3");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AgentConfig =
            serde_json::from_str(r#"{"server_url": "http://coordinator:9000"}"#).unwrap();
        assert_eq!(config.server_url, "http://coordinator:9000");
        assert_eq!(config.reconnect.base_delay_ms, 1_000);
        assert_eq!(config.browsers.len(), 3);
    }

    #[test]
    fn test_env_override() {
        let mut config = AgentConfig::default();
        unsafe { std::env::set_var("AGENT_SERVER_URL", "http://10.0.0.7:5000") };
        config.apply_env();
        assert_eq!(config.server_url, "http://10.0.0.7:5000");
        unsafe { std::env::remove_var("AGENT_SERVER_URL") };
    }

    #[test]
    fn test_backoff_sequence() {
        let rc = ReconnectConfig::default();
        let delays: Vec<u64> = (1..=5)
            .map(|a| rc.backoff_delay(a).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 5_000, 5_000]);
    }

    #[test]
    fn test_backoff_does_not_overflow() {
        let rc = ReconnectConfig {
            base_delay_ms: u64::MAX / 2,
            ..ReconnectConfig::default()
        };
        assert_eq!(rc.backoff_delay(64), Duration::from_millis(rc.max_delay_ms));
    }
}
