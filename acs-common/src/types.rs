//! Shared types for targets, credentials, and operation results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical identity of a network target: one sub-pool per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub host: String,
    pub port: u16,
    /// Login principal (username).
    pub principal: String,
}

impl ConnectionKey {
    pub fn new(host: impl Into<String>, port: u16, principal: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            principal: principal.into(),
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.principal, self.host, self.port)
    }
}

/// Credential material for an SSH target.
///
/// Mirrors the on-disk record format: `{"type": "password", ...}` or
/// `{"type": "privateKey", ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthConfig {
    Password {
        password: String,
    },
    #[serde(rename_all = "camelCase")]
    PrivateKey {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        private_key_path: Option<String>,
        /// Inline key text. Materialized to a 0600 temp file for the
        /// lifetime of the connection when no path is given.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        private_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        passphrase: Option<String>,
    },
}

fn default_ssh_port() -> u16 {
    22
}

/// Connection parameters for a pooled SSH target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshTargetParams {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    pub auth: AuthConfig,
}

impl SshTargetParams {
    /// Derive the sub-pool key for these parameters.
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(self.host.clone(), self.port, self.username.clone())
    }
}

/// Parameters naming a local WSL distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WslTargetParams {
    pub distro_name: String,
}

/// A resolved execution target: exactly two backends exist, and dispatch is
/// exhaustive, so adding a third is a compile-time change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TargetDescriptor {
    Ssh(SshTargetParams),
    Wsl(WslTargetParams),
}

impl TargetDescriptor {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ssh(_) => "ssh",
            Self::Wsl(_) => "wsl",
        }
    }

    /// Human-readable identity of the target (pool key or distro name).
    pub fn label(&self) -> String {
        match self {
            Self::Ssh(p) => p.key().to_string(),
            Self::Wsl(p) => p.distro_name.clone(),
        }
    }
}

/// Result of a remote command execution, both backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit code of the command.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Execution duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandResult {
    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Verdict of a reachability test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Ok,
    Error,
    Timeout,
}

/// Outcome of a single reachability/latency probe against a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub timeout: bool,
    pub tested_at: DateTime<Utc>,
}

impl TestReport {
    pub fn status(&self) -> TestStatus {
        if self.ok {
            TestStatus::Ok
        } else if self.timeout {
            TestStatus::Timeout
        } else {
            TestStatus::Error
        }
    }
}

/// Running state of a WSL distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistroState {
    Running,
    Stopped,
}

impl fmt::Display for DistroState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// One discovered WSL distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistroInfo {
    pub name: String,
    pub state: DistroState,
    /// WSL protocol version (1 or 2).
    pub version: u8,
    pub is_default: bool,
    /// Best-effort resolved home directory; `None` when resolution failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_key_display_is_canonical() {
        let key = ConnectionKey::new("build01", 2222, "deploy");
        assert_eq!(key.to_string(), "deploy@build01:2222");
    }

    #[test]
    fn target_descriptor_round_trips() {
        let target = TargetDescriptor::Ssh(SshTargetParams {
            host: "build01".into(),
            port: 22,
            username: "deploy".into(),
            auth: AuthConfig::PrivateKey {
                private_key_path: Some("~/.ssh/id_ed25519".into()),
                private_key: None,
                passphrase: None,
            },
        });

        let json = serde_json::to_string(&target).unwrap();
        assert!(json.contains("\"kind\":\"ssh\""));
        assert!(json.contains("\"privateKey\""));

        let back: TargetDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), "ssh");
        assert_eq!(back.label(), "deploy@build01:22");
    }

    #[test]
    fn ssh_port_defaults_to_22() {
        let params: SshTargetParams = serde_json::from_str(
            r#"{"host":"h","username":"u","auth":{"type":"password","password":"p"}}"#,
        )
        .unwrap();
        assert_eq!(params.port, 22);
    }

    #[test]
    fn test_report_status_classification() {
        let ok = TestReport {
            ok: true,
            latency_ms: Some(12),
            error: None,
            timeout: false,
            tested_at: Utc::now(),
        };
        assert_eq!(ok.status(), TestStatus::Ok);

        let timed_out = TestReport {
            ok: false,
            latency_ms: None,
            error: Some("connection test timed out".into()),
            timeout: true,
            tested_at: Utc::now(),
        };
        assert_eq!(timed_out.status(), TestStatus::Timeout);
    }
}
