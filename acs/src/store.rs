//! Environment-record store: a JSON file of connection records.
//!
//! The remote core never persists connection parameters; this store is the
//! collaborator that supplies them by id. Records keep the original wire
//! format (camelCase, tagged auth) so existing `environments.json` files
//! load unchanged.

use acs_common::{
    AuthConfig, RemoteError, RemoteResult, SshTargetParams, TargetDescriptor, TestReport,
    TestStatus, WslTargetParams, is_valid_distro_name,
};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One stored environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentRecord {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Backend kind: "ssh" or "wsl". Free-form in the file so foreign
    /// records surface as [`RemoteError::UnsupportedBackend`] instead of
    /// breaking the whole store.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wsl_config: Option<WslTargetParams>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_test_status: Option<TestStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_test_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_test_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_test_error: Option<String>,
}

impl EnvironmentRecord {
    /// Resolve this record into a dispatchable target.
    pub fn descriptor(&self) -> RemoteResult<TargetDescriptor> {
        match self.kind.as_str() {
            "ssh" => {
                let host = self
                    .host
                    .clone()
                    .ok_or_else(|| RemoteError::InvalidTarget("record missing host".into()))?;
                let username = self
                    .username
                    .clone()
                    .ok_or_else(|| RemoteError::InvalidTarget("record missing username".into()))?;
                let auth = self
                    .auth
                    .clone()
                    .ok_or_else(|| RemoteError::InvalidTarget("record missing auth".into()))?;
                Ok(TargetDescriptor::Ssh(SshTargetParams {
                    host,
                    port: self.port.unwrap_or(22),
                    username,
                    auth,
                }))
            }
            "wsl" => {
                let wsl = self.wsl_config.clone().ok_or_else(|| {
                    RemoteError::InvalidTarget("record missing wslConfig".into())
                })?;
                Ok(TargetDescriptor::Wsl(wsl))
            }
            other => Err(RemoteError::UnsupportedBackend(other.to_string())),
        }
    }

    /// Fold a test outcome into the record's visible fields.
    pub fn apply_test(&mut self, report: &TestReport) {
        self.last_test_status = Some(report.status());
        self.last_test_latency_ms = report.latency_ms;
        self.last_test_at = Some(report.tested_at);
        self.last_test_error = report.error.clone();
    }
}

/// Input for creating a record.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub kind: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub auth: Option<AuthConfig>,
    pub wsl_config: Option<WslTargetParams>,
}

fn validate_payload(payload: &EnvironmentPayload) -> Result<()> {
    match payload.kind.as_str() {
        "ssh" => {
            if payload.host.as_deref().unwrap_or("").trim().is_empty() {
                bail!("host is required for ssh environments");
            }
            if payload.username.as_deref().unwrap_or("").trim().is_empty() {
                bail!("username is required for ssh environments");
            }
            match &payload.auth {
                None => bail!("an auth method is required for ssh environments"),
                Some(AuthConfig::Password { password }) if password.is_empty() => {
                    bail!("password must not be empty");
                }
                Some(AuthConfig::PrivateKey {
                    private_key_path,
                    private_key,
                    ..
                }) if private_key_path.is_none() && private_key.is_none() => {
                    bail!("a private key path or inline key is required");
                }
                Some(_) => {}
            }
        }
        "wsl" => match &payload.wsl_config {
            None => bail!("a distribution name is required for wsl environments"),
            Some(wsl) if !is_valid_distro_name(&wsl.distro_name) => {
                bail!("invalid distribution name {:?}", wsl.distro_name);
            }
            Some(_) => {}
        },
        other => bail!("unknown environment kind {other:?}"),
    }
    Ok(())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    environments: Vec<EnvironmentRecord>,
}

/// JSON-file-backed record store.
pub struct EnvironmentStore {
    path: PathBuf,
}

impl EnvironmentStore {
    /// Store at the platform config dir: `<config>/acs/environments.json`.
    pub fn open_default() -> Result<Self> {
        let dir = dirs::config_dir().context("no config directory on this platform")?;
        Ok(Self::at(dir.join("acs").join("environments.json")))
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> Result<Vec<EnvironmentRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let file: StoreFile = serde_json::from_str(&raw)
            .with_context(|| format!("malformed store at {}", self.path.display()))?;
        Ok(file.environments)
    }

    fn save(&self, environments: Vec<EnvironmentRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(&StoreFile { environments })?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<EnvironmentRecord>> {
        self.load()
    }

    pub fn get(&self, id: &str) -> Result<EnvironmentRecord> {
        self.load()?
            .into_iter()
            .find(|record| record.id == id)
            .with_context(|| format!("no environment with id {id}"))
    }

    pub fn insert(&self, payload: EnvironmentPayload) -> Result<EnvironmentRecord> {
        validate_payload(&payload)?;
        let mut environments = self.load()?;
        let now = Utc::now();
        let title = payload.title.clone().unwrap_or_else(|| match &payload.kind[..] {
            "wsl" => payload
                .wsl_config
                .as_ref()
                .map(|w| w.distro_name.clone())
                .unwrap_or_default(),
            _ => payload.host.clone().unwrap_or_default(),
        });
        let record = EnvironmentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            description: payload.description,
            kind: payload.kind,
            host: payload.host,
            port: payload.port,
            username: payload.username,
            auth: payload.auth,
            wsl_config: payload.wsl_config,
            created_at: now,
            updated_at: now,
            last_test_status: None,
            last_test_latency_ms: None,
            last_test_at: None,
            last_test_error: None,
        };
        environments.push(record.clone());
        self.save(environments)?;
        Ok(record)
    }

    /// Remove a record, returning it so the caller can tear down pooled
    /// connections for the target.
    pub fn remove(&self, id: &str) -> Result<EnvironmentRecord> {
        let mut environments = self.load()?;
        let index = environments
            .iter()
            .position(|record| record.id == id)
            .with_context(|| format!("no environment with id {id}"))?;
        let removed = environments.remove(index);
        self.save(environments)?;
        Ok(removed)
    }

    /// Persist a test outcome onto the record.
    pub fn record_test(&self, id: &str, report: &TestReport) -> Result<EnvironmentRecord> {
        let mut environments = self.load()?;
        let record = environments
            .iter_mut()
            .find(|record| record.id == id)
            .with_context(|| format!("no environment with id {id}"))?;
        record.apply_test(report);
        record.updated_at = Utc::now();
        let updated = record.clone();
        self.save(environments)?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, EnvironmentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::at(dir.path().join("environments.json"));
        (dir, store)
    }

    fn wsl_payload(name: &str) -> EnvironmentPayload {
        EnvironmentPayload {
            kind: "wsl".into(),
            wsl_config: Some(WslTargetParams {
                distro_name: name.into(),
            }),
            ..EnvironmentPayload::default()
        }
    }

    #[test]
    fn insert_list_remove_round_trip() {
        let (_dir, store) = temp_store();
        assert!(store.list().unwrap().is_empty());

        let record = store.insert(wsl_payload("Ubuntu-22.04")).unwrap();
        assert_eq!(record.title, "Ubuntu-22.04");
        assert_eq!(store.list().unwrap().len(), 1);

        let removed = store.remove(&record.id).unwrap();
        assert_eq!(removed.id, record.id);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn payload_validation_rejects_incomplete_records() {
        let (_dir, store) = temp_store();

        let err = store
            .insert(EnvironmentPayload {
                kind: "ssh".into(),
                host: Some("build01".into()),
                ..EnvironmentPayload::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("username"));

        let err = store.insert(wsl_payload("bad;name")).unwrap_err();
        assert!(err.to_string().contains("invalid distribution name"));
    }

    #[test]
    fn unknown_kind_fails_loudly_at_the_descriptor_boundary() {
        let (_dir, store) = temp_store();
        let mut record = store.insert(wsl_payload("Ubuntu")).unwrap();
        record.kind = "docker".into();
        let err = record.descriptor().unwrap_err();
        assert!(matches!(err, RemoteError::UnsupportedBackend(kind) if kind == "docker"));
    }

    #[test]
    fn test_outcome_is_persisted_onto_the_record() {
        let (_dir, store) = temp_store();
        let record = store.insert(wsl_payload("Ubuntu")).unwrap();

        let report = TestReport {
            ok: false,
            latency_ms: None,
            error: Some("connection test timed out after 5000 ms".into()),
            timeout: true,
            tested_at: Utc::now(),
        };
        let updated = store.record_test(&record.id, &report).unwrap();
        assert_eq!(updated.last_test_status, Some(TestStatus::Timeout));
        assert!(updated.last_test_error.is_some());

        let reloaded = store.get(&record.id).unwrap();
        assert_eq!(reloaded.last_test_status, Some(TestStatus::Timeout));
    }

    #[test]
    fn store_format_stays_camel_case_on_disk() {
        let (_dir, store) = temp_store();
        let record = store.insert(wsl_payload("Ubuntu")).unwrap();
        store
            .record_test(
                &record.id,
                &TestReport {
                    ok: true,
                    latency_ms: Some(3),
                    error: None,
                    timeout: false,
                    tested_at: Utc::now(),
                },
            )
            .unwrap();

        let raw = std::fs::read_to_string(store.path.clone()).unwrap();
        assert!(raw.contains("\"environments\""));
        assert!(raw.contains("\"wslConfig\""));
        assert!(raw.contains("\"distroName\""));
        assert!(raw.contains("\"lastTestStatus\""));
    }
}
