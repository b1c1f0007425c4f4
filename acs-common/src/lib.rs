//! AI CLI Configuration Switcher - Common Library
//!
//! The remote execution backbone shared by the CLI: a keyed connection
//! pool over SSH, a connectionless WSL subprocess backend, a router
//! unifying both behind one file/command interface, and the reachability
//! tester, plus logging and configuration plumbing.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod homedir;
pub mod logging;
pub mod mock;
pub mod pool;
pub mod router;
pub mod ssh;
pub mod tester;
pub mod types;
pub mod wsl;

pub use config::{AcsConfig, KnownHostsPolicy, PoolSettings, SshSettings, WslSettings};
pub use error::{RemoteError, RemoteResult, classify_connect_failure, looks_like_timeout};
pub use homedir::HomeDirCache;
pub use logging::{LogConfig, LogFormat, LoggingGuard, init_logging};
pub use pool::{
    AcquireOverrides, ConnectionPool, Connector, HealthObserver, PoolConfig, PoolKeyed,
    PoolStatus, PoolableConnection, PooledConn,
};
pub use router::BackendRouter;
pub use ssh::{SshBackend, SshConnection, SshConnector, SshPool};
pub use tester::{ConnectionTester, DEFAULT_TEST_TIMEOUT};
pub use types::{
    AuthConfig, CommandResult, ConnectionKey, DistroInfo, DistroState, SshTargetParams,
    TargetDescriptor, TestReport, TestStatus, WslTargetParams,
};
pub use wsl::{WslBackend, is_valid_distro_name, is_valid_linux_path};
