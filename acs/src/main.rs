//! AI CLI Configuration Switcher - command-line interface
//!
//! Manages stored remote environments (SSH hosts and local WSL
//! distributions) and drives the shared remote execution core: probing
//! reachability, running commands, and moving config files.

#![forbid(unsafe_code)]

mod commands;
mod store;

use acs_common::{AcsConfig, AuthConfig, BackendRouter, LogConfig, WslTargetParams, init_logging};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use store::{EnvironmentPayload, EnvironmentStore};

#[derive(Parser)]
#[command(name = "acs")]
#[command(
    author,
    version,
    about = "AI CLI configuration switcher - remote target management",
    after_help = r#"ENVIRONMENT VARIABLES:
    ACS_LOG_LEVEL               Logging level: trace, debug, info, warn, error, off
    ACS_LOG_FORMAT              Log format: compact, json
    ACS_LOG_FILE                Path to a daily-rolling log file
    ACS_POOL_MAX                Max pooled connections per target
    ACS_POOL_ACQUIRE_TIMEOUT_MS Borrow budget before PoolTimeout
    ACS_SSH_READY_TIMEOUT_MS    SSH handshake budget
    ACS_WSL_COMMAND             WSL launcher binary (default: wsl)"#
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit machine-readable JSON where applicable.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage stored environments.
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },
    /// Inspect and control local WSL distributions.
    Wsl {
        #[command(subcommand)]
        action: WslAction,
    },
    /// Test reachability of a stored environment.
    Test {
        id: String,
        /// Overall test budget in milliseconds.
        #[arg(long, default_value_t = 5_000)]
        timeout_ms: u64,
    },
    /// Run a command on a stored environment.
    Exec { id: String, command: String },
    /// Print a remote file.
    Cat { id: String, path: String },
    /// Write --content, --file, or stdin to a remote file.
    Put {
        id: String,
        path: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Delete a remote file (missing files are fine).
    Rm { id: String, path: String },
    /// Print the environment's home directory.
    Home { id: String },
}

#[derive(Subcommand)]
enum EnvAction {
    /// List stored environments with their last test verdict.
    List,
    /// Store a new environment.
    Add {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Register a local WSL distribution instead of an SSH host.
        #[arg(long, value_name = "DISTRO", conflicts_with_all = ["host", "username"])]
        wsl: Option<String>,
        #[arg(long, requires = "username")]
        host: Option<String>,
        #[arg(long, default_value_t = 22)]
        port: u16,
        #[arg(long)]
        username: Option<String>,
        /// Path to the private key for the ssh target.
        #[arg(long, value_name = "PATH", conflicts_with = "password")]
        key: Option<String>,
        /// Password for the ssh target (stored in the record).
        #[arg(long)]
        password: Option<String>,
    },
    /// Delete a stored environment and close its pooled connections.
    Remove { id: String },
}

#[derive(Subcommand)]
enum WslAction {
    /// Discover distributions with state, version, and home path.
    List,
    /// Start a stopped distribution (idempotent).
    Start { name: String },
    /// Terminate a distribution.
    Stop { name: String },
    /// Make a distribution the default.
    Default { name: String },
}

fn add_payload(
    title: Option<String>,
    description: Option<String>,
    wsl: Option<String>,
    host: Option<String>,
    port: u16,
    username: Option<String>,
    key: Option<String>,
    password: Option<String>,
) -> EnvironmentPayload {
    if let Some(distro_name) = wsl {
        return EnvironmentPayload {
            title,
            description,
            kind: "wsl".into(),
            wsl_config: Some(WslTargetParams { distro_name }),
            ..EnvironmentPayload::default()
        };
    }
    let auth = match (key, password) {
        (Some(path), _) => Some(AuthConfig::PrivateKey {
            private_key_path: Some(path),
            private_key: None,
            passphrase: None,
        }),
        (None, Some(password)) => Some(AuthConfig::Password { password }),
        (None, None) => None,
    };
    EnvironmentPayload {
        title,
        description,
        kind: "ssh".into(),
        host,
        port: Some(port),
        username,
        auth,
        ..EnvironmentPayload::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _logging = init_logging(&LogConfig::from_env("warn"))?;
    let cli = Cli::parse();
    let config = AcsConfig::load()?;
    let router = Arc::new(BackendRouter::new(&config));
    let store = EnvironmentStore::open_default()?;

    match cli.command {
        Commands::Env { action } => match action {
            EnvAction::List => commands::env_list(&store, cli.json)?,
            EnvAction::Add {
                title,
                description,
                wsl,
                host,
                port,
                username,
                key,
                password,
            } => {
                let payload =
                    add_payload(title, description, wsl, host, port, username, key, password);
                commands::env_add(&store, payload, cli.json)?;
            }
            EnvAction::Remove { id } => commands::env_remove(&store, &router, &id).await?,
        },
        Commands::Wsl { action } => match action {
            WslAction::List => commands::wsl_list(&router, cli.json).await?,
            WslAction::Start { name } => commands::wsl_start(&router, &name).await?,
            WslAction::Stop { name } => commands::wsl_stop(&router, &name).await?,
            WslAction::Default { name } => commands::wsl_set_default(&router, &name).await?,
        },
        Commands::Test { id, timeout_ms } => {
            commands::test(&store, router.clone(), &id, timeout_ms, cli.json).await?;
        }
        Commands::Exec { id, command } => {
            let exit_code = commands::exec(&store, &router, &id, &command).await?;
            router.close_all().await;
            std::process::exit(exit_code);
        }
        Commands::Cat { id, path } => commands::cat(&store, &router, &id, &path).await?,
        Commands::Put {
            id,
            path,
            content,
            file,
        } => commands::put(&store, &router, &id, &path, content, file).await?,
        Commands::Rm { id, path } => commands::rm(&store, &router, &id, &path).await?,
        Commands::Home { id } => commands::home(&store, &router, &id).await?,
    }

    router.close_all().await;
    Ok(())
}
