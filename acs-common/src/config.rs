//! Process configuration: TOML file with environment overrides.
//!
//! Precedence (lowest to highest): built-in defaults, the config file at
//! `<config-dir>/acs/config.toml`, then `ACS_*` environment variables.

use crate::pool::PoolConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Known-hosts policy for SSH handshakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KnownHostsPolicy {
    /// Strictly verify known hosts.
    Strict,
    /// Add unknown hosts automatically.
    #[default]
    Add,
    /// Accept all hosts without verification (testing only).
    AcceptAll,
}

fn default_pool_max() -> usize {
    10
}
fn default_pool_min() -> usize {
    0
}
fn default_idle_timeout_ms() -> u64 {
    120_000
}
fn default_acquire_timeout_ms() -> u64 {
    30_000
}
fn default_test_on_borrow() -> bool {
    true
}

/// Pool sizing and borrow policy, per sub-pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_pool_max")]
    pub max: usize,
    #[serde(default = "default_pool_min")]
    pub min: usize,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default = "default_test_on_borrow")]
    pub test_on_borrow: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max: default_pool_max(),
            min: default_pool_min(),
            idle_timeout_ms: default_idle_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            test_on_borrow: default_test_on_borrow(),
        }
    }
}

impl PoolSettings {
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            max: self.max,
            min: self.min,
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            test_on_borrow: self.test_on_borrow,
        }
    }
}

fn default_ready_timeout_ms() -> u64 {
    20_000
}
fn default_command_timeout_ms() -> u64 {
    300_000
}
fn default_keepalive_secs() -> u64 {
    15
}

/// SSH handshake and exec tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// Handshake budget for steady-state connects.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    /// Budget for a single remote command.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// ServerAliveInterval sent to the transport.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default)]
    pub known_hosts: KnownHostsPolicy,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            ready_timeout_ms: default_ready_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            keepalive_secs: default_keepalive_secs(),
            known_hosts: KnownHostsPolicy::default(),
        }
    }
}

fn default_wsl_command() -> String {
    "wsl".to_string()
}
fn default_wsl_exec_timeout_ms() -> u64 {
    5_000
}
fn default_wsl_transfer_timeout_ms() -> u64 {
    10_000
}
fn default_wsl_max_output_bytes() -> u64 {
    10 * 1024 * 1024
}

/// Local WSL launcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WslSettings {
    /// Launcher binary; overridable for tests and odd PATH setups.
    #[serde(default = "default_wsl_command")]
    pub command: String,
    /// Budget for short control commands (list, start, probe).
    #[serde(default = "default_wsl_exec_timeout_ms")]
    pub exec_timeout_ms: u64,
    /// Budget for content transfers (read/write).
    #[serde(default = "default_wsl_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,
    /// Hard cap on captured output per invocation.
    #[serde(default = "default_wsl_max_output_bytes")]
    pub max_output_bytes: u64,
}

impl Default for WslSettings {
    fn default() -> Self {
        Self {
            command: default_wsl_command(),
            exec_timeout_ms: default_wsl_exec_timeout_ms(),
            transfer_timeout_ms: default_wsl_transfer_timeout_ms(),
            max_output_bytes: default_wsl_max_output_bytes(),
        }
    }
}

/// Top-level configuration for the switcher core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcsConfig {
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub ssh: SshSettings,
    #[serde(default)]
    pub wsl: WslSettings,
}

impl AcsConfig {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("acs").join("config.toml"))
    }

    /// Load the config file (if present) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("invalid TOML in {}", path.display()))?
            }
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `ACS_*` environment variable overrides in place.
    pub fn apply_env(&mut self) {
        if let Some(max) = env_parse("ACS_POOL_MAX") {
            self.pool.max = max;
        }
        if let Some(ms) = env_parse("ACS_POOL_ACQUIRE_TIMEOUT_MS") {
            self.pool.acquire_timeout_ms = ms;
        }
        if let Some(ms) = env_parse("ACS_POOL_IDLE_TIMEOUT_MS") {
            self.pool.idle_timeout_ms = ms;
        }
        if let Some(flag) = env_flag("ACS_POOL_TEST_ON_BORROW") {
            self.pool.test_on_borrow = flag;
        }
        if let Some(ms) = env_parse("ACS_SSH_READY_TIMEOUT_MS") {
            self.ssh.ready_timeout_ms = ms;
        }
        if let Some(ms) = env_parse("ACS_SSH_COMMAND_TIMEOUT_MS") {
            self.ssh.command_timeout_ms = ms;
        }
        if let Ok(command) = std::env::var("ACS_WSL_COMMAND") {
            if !command.trim().is_empty() {
                self.wsl.command = command;
            }
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn env_flag(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pool_contract() {
        let settings = PoolSettings::default();
        assert_eq!(settings.max, 10);
        assert_eq!(settings.min, 0);
        assert_eq!(settings.idle_timeout_ms, 120_000);
        assert_eq!(settings.acquire_timeout_ms, 30_000);
        assert!(settings.test_on_borrow);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: AcsConfig = toml::from_str(
            r#"
            [pool]
            max = 4

            [wsl]
            command = "wsl.exe"
            "#,
        )
        .unwrap();
        assert_eq!(config.pool.max, 4);
        assert_eq!(config.pool.acquire_timeout_ms, 30_000);
        assert_eq!(config.wsl.command, "wsl.exe");
        assert_eq!(config.ssh.ready_timeout_ms, 20_000);
    }

    #[test]
    fn pool_settings_convert_to_durations() {
        let pool = PoolSettings {
            acquire_timeout_ms: 5_000,
            ..PoolSettings::default()
        }
        .to_pool_config();
        assert_eq!(pool.acquire_timeout, Duration::from_secs(5));
        assert_eq!(pool.idle_timeout, Duration::from_secs(120));
    }
}
