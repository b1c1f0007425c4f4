//! Mock transport for deterministic pool testing.
//!
//! Provides a scriptable [`Connector`] whose handshake and probe behavior
//! is controlled by a [`MockProfile`], plus counters and per-connection
//! handles so tests can observe accounting and sever transports while
//! they sit idle, with no network involved.

use crate::error::{RemoteError, RemoteResult};
use crate::pool::{Connector, HealthObserver, PoolKeyed, PoolableConnection};
use crate::types::ConnectionKey;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted behavior for handshakes and probes.
#[derive(Debug, Clone, Default)]
pub struct MockProfile {
    /// Delay before the handshake resolves (simulates a slow or hung target).
    pub connect_delay: Duration,
    /// Refuse the handshake with a connectivity error.
    pub refuse_connect: bool,
    /// Refuse the handshake with a credential error.
    pub reject_auth: bool,
    /// Fail every behavioral probe.
    pub fail_probe: bool,
    /// Delay before each probe resolves.
    pub probe_delay: Duration,
}

/// Lifecycle counters across all connections of one connector.
#[derive(Debug, Default)]
pub struct MockCounters {
    created: AtomicUsize,
    closed: AtomicUsize,
    probes: AtomicUsize,
    current: AtomicIsize,
    peak: AtomicIsize,
}

impl MockCounters {
    fn on_create(&self) {
        self.created.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn on_close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live connections observed.
    pub fn peak(&self) -> isize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Pool parameters for a mock target; the name is the whole identity.
#[derive(Debug, Clone)]
pub struct MockParams {
    pub name: String,
}

impl MockParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl PoolKeyed for MockParams {
    fn connection_key(&self) -> ConnectionKey {
        ConnectionKey::new("mock", 0, self.name.clone())
    }
}

/// External handle onto a live mock connection.
#[derive(Clone)]
pub struct MockHandle {
    open: Arc<AtomicBool>,
    observer: Arc<Mutex<Option<HealthObserver>>>,
}

impl MockHandle {
    /// Kill the transport out-of-band, as a rebooted host or dropped
    /// network would, and fire the failure callback.
    pub fn sever(&self) {
        self.open.store(false, Ordering::SeqCst);
        if let Some(observer) = self.observer.lock().unwrap().as_ref() {
            observer.report_broken();
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// One scripted connection.
pub struct MockConnection {
    open: Arc<AtomicBool>,
    observer: Arc<Mutex<Option<HealthObserver>>>,
    profile: MockProfile,
    counters: Arc<MockCounters>,
}

impl MockConnection {
    fn handle(&self) -> MockHandle {
        MockHandle {
            open: self.open.clone(),
            observer: self.observer.clone(),
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.counters.on_close();
    }
}

impl PoolableConnection for MockConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn probe(&self) -> RemoteResult<()> {
        self.counters.probes.fetch_add(1, Ordering::SeqCst);
        if !self.profile.probe_delay.is_zero() {
            tokio::time::sleep(self.profile.probe_delay).await;
        }
        if self.profile.fail_probe || !self.is_open() {
            return Err(RemoteError::io("mock probe", "no-op command failed"));
        }
        Ok(())
    }

    fn attach_observer(&mut self, observer: HealthObserver) {
        *self.observer.lock().unwrap() = Some(observer);
    }

    async fn close(self) {
        // Teardown is counted by Drop.
    }
}

/// Scriptable connector for pool tests.
pub struct MockConnector {
    profile: Arc<Mutex<MockProfile>>,
    counters: Arc<MockCounters>,
    handles: Arc<Mutex<Vec<MockHandle>>>,
}

impl MockConnector {
    pub fn new(profile: MockProfile) -> Self {
        Self {
            profile: Arc::new(Mutex::new(profile)),
            counters: Arc::new(MockCounters::default()),
            handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn counters(&self) -> Arc<MockCounters> {
        self.counters.clone()
    }

    /// Live profile; mutate mid-test to change behavior of later
    /// handshakes and probes.
    pub fn profile_handle(&self) -> Arc<Mutex<MockProfile>> {
        self.profile.clone()
    }

    /// Handles for every connection created so far, in creation order.
    pub fn handle_registry(&self) -> Arc<Mutex<Vec<MockHandle>>> {
        self.handles.clone()
    }
}

impl Connector for MockConnector {
    type Params = MockParams;
    type Conn = MockConnection;

    fn default_ready_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn connect(
        &self,
        params: &MockParams,
        _ready_timeout: Duration,
    ) -> RemoteResult<MockConnection> {
        let profile = self.profile.lock().unwrap().clone();
        if !profile.connect_delay.is_zero() {
            tokio::time::sleep(profile.connect_delay).await;
        }
        let key = params.connection_key().to_string();
        if profile.reject_auth {
            return Err(RemoteError::AuthFailed {
                key,
                message: "permission denied (mock)".into(),
            });
        }
        if profile.refuse_connect {
            return Err(RemoteError::ConnectFailed {
                key,
                message: "connection refused (mock)".into(),
            });
        }

        self.counters.on_create();
        let conn = MockConnection {
            open: Arc::new(AtomicBool::new(true)),
            observer: Arc::new(Mutex::new(None)),
            profile,
            counters: self.counters.clone(),
        };
        self.handles.lock().unwrap().push(conn.handle());
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn severed_handle_fails_structural_and_behavioral_checks() {
        let connector = MockConnector::new(MockProfile::default());
        let conn = connector
            .connect(&MockParams::new("t"), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(conn.is_open());
        assert!(conn.probe().await.is_ok());

        conn.handle().sever();
        assert!(!conn.is_open());
        assert!(conn.probe().await.is_err());
    }

    #[tokio::test]
    async fn counters_track_lifecycle() {
        let connector = MockConnector::new(MockProfile::default());
        let counters = connector.counters();
        let conn = connector
            .connect(&MockParams::new("t"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(counters.created(), 1);
        assert_eq!(counters.peak(), 1);

        drop(conn);
        assert_eq!(counters.closed(), 1);
    }
}
