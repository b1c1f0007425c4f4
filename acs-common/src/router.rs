//! Single entry point dispatching file and command operations to the
//! matching backend.
//!
//! Dispatch is an exhaustive match over [`TargetDescriptor`]; a third
//! backend cannot be added without the compiler pointing at every arm.
//! The JSON helpers absorb *any* read failure (missing file, transport
//! fault, malformed content) into the caller-supplied fallback so callers
//! never need defensive parsing.

use crate::config::AcsConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::ssh::SshBackend;
use crate::types::{CommandResult, TargetDescriptor};
use crate::wsl::WslBackend;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Routes operations to the SSH or WSL backend by target kind.
pub struct BackendRouter {
    ssh: SshBackend,
    wsl: WslBackend,
}

impl BackendRouter {
    pub fn new(config: &AcsConfig) -> Self {
        Self {
            ssh: SshBackend::new(config.ssh.clone(), config.pool.to_pool_config()),
            wsl: WslBackend::new(config.wsl.clone()),
        }
    }

    pub fn from_parts(ssh: SshBackend, wsl: WslBackend) -> Self {
        Self { ssh, wsl }
    }

    pub fn ssh(&self) -> &SshBackend {
        &self.ssh
    }

    pub fn wsl(&self) -> &WslBackend {
        &self.wsl
    }

    pub async fn read_file(&self, target: &TargetDescriptor, path: &str) -> RemoteResult<String> {
        debug!(target = %target.label(), path, "read file");
        match target {
            TargetDescriptor::Ssh(params) => self.ssh.read_file(params, path).await,
            TargetDescriptor::Wsl(params) => self.wsl.read_file(&params.distro_name, path).await,
        }
    }

    pub async fn write_file(
        &self,
        target: &TargetDescriptor,
        path: &str,
        content: &str,
    ) -> RemoteResult<()> {
        debug!(target = %target.label(), path, bytes = content.len(), "write file");
        match target {
            TargetDescriptor::Ssh(params) => self.ssh.write_file(params, path, content).await,
            TargetDescriptor::Wsl(params) => {
                self.wsl
                    .write_file(&params.distro_name, path, content)
                    .await
            }
        }
    }

    pub async fn unlink(&self, target: &TargetDescriptor, path: &str) -> RemoteResult<()> {
        debug!(target = %target.label(), path, "unlink file");
        match target {
            TargetDescriptor::Ssh(params) => self.ssh.unlink(params, path).await,
            TargetDescriptor::Wsl(params) => self.wsl.unlink(&params.distro_name, path).await,
        }
    }

    pub async fn exec(
        &self,
        target: &TargetDescriptor,
        command: &str,
    ) -> RemoteResult<CommandResult> {
        match target {
            TargetDescriptor::Ssh(params) => self.ssh.exec(params, command).await,
            TargetDescriptor::Wsl(params) => self.wsl.exec(&params.distro_name, command).await,
        }
    }

    pub async fn home(&self, target: &TargetDescriptor) -> RemoteResult<String> {
        match target {
            TargetDescriptor::Ssh(params) => self.ssh.resolve_home(params).await,
            TargetDescriptor::Wsl(params) => self.wsl.resolve_home(&params.distro_name).await,
        }
    }

    /// Read and parse a JSON file, falling back on any failure.
    pub async fn read_json<T: DeserializeOwned>(
        &self,
        target: &TargetDescriptor,
        path: &str,
        fallback: T,
    ) -> T {
        let text = match self.read_file(target, path).await {
            Ok(text) => text,
            Err(err) => {
                debug!(target = %target.label(), path, error = %err, "json read failed, using fallback");
                return fallback;
            }
        };
        match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                debug!(target = %target.label(), path, error = %err, "json parse failed, using fallback");
                fallback
            }
        }
    }

    /// Serialize `value` (pretty, two-space) and replace the file.
    pub async fn write_json<T: Serialize>(
        &self,
        target: &TargetDescriptor,
        path: &str,
        value: &T,
    ) -> RemoteResult<()> {
        let text = serde_json::to_string_pretty(value)
            .map_err(|err| RemoteError::io(format!("serialize {path}"), err))?;
        self.write_file(target, path, &text).await
    }

    /// Tear down pooled state for one target. Connectionless WSL targets
    /// have nothing to tear down.
    pub async fn close_target(&self, target: &TargetDescriptor) {
        match target {
            TargetDescriptor::Ssh(params) => self.ssh.close_target(params).await,
            TargetDescriptor::Wsl(_) => {}
        }
    }

    pub async fn close_all(&self) {
        self.ssh.close_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WslSettings;
    use crate::pool::PoolConfig;
    use crate::types::WslTargetParams;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
    struct Settings {
        model: String,
    }

    fn router_with_wsl_command(command: &str) -> BackendRouter {
        BackendRouter::from_parts(
            SshBackend::new(crate::config::SshSettings::default(), PoolConfig::default()),
            WslBackend::new(WslSettings {
                command: command.to_string(),
                ..WslSettings::default()
            }),
        )
    }

    fn wsl_target() -> TargetDescriptor {
        TargetDescriptor::Wsl(WslTargetParams {
            distro_name: "Ubuntu".into(),
        })
    }

    #[tokio::test]
    async fn read_json_falls_back_when_the_read_fails() {
        let router = router_with_wsl_command("acs-no-such-launcher");
        let fallback = Settings {
            model: "default".into(),
        };
        let value = router
            .read_json(&wsl_target(), "/home/u/.config/tool.json", fallback.clone())
            .await;
        assert_eq!(value, fallback);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn read_json_falls_back_on_malformed_content() {
        // `echo` happily succeeds and prints the argv back, which is not
        // JSON; the helper must still fall back rather than error.
        let router = router_with_wsl_command("echo");
        let value = router
            .read_json(
                &wsl_target(),
                "/home/u/.config/tool.json",
                Settings {
                    model: "fallback".into(),
                },
            )
            .await;
        assert_eq!(value.model, "fallback");
    }

    #[tokio::test]
    async fn invalid_paths_are_rejected_through_the_router() {
        let router = router_with_wsl_command("acs-no-such-launcher");
        let err = router
            .read_file(&wsl_target(), "../../etc/passwd")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::InvalidTarget(_)));
    }
}
