//! Keyed connection pool with health validation.
//!
//! One bounded sub-pool per [`ConnectionKey`]. Borrowing is exclusive: a
//! connection is owned by its sub-pool while idle and by exactly one caller
//! while checked out. Every borrow is matched by a release-or-destroy; the
//! borrow guard settles accounts in its `Drop`, so error and panic paths
//! are covered without caller cooperation.
//!
//! Validation on borrow (default on) runs a structural check plus a short
//! behavioral probe against idle candidates; failures destroy the
//! connection and the borrow falls through to a fresh handshake or a
//! [`RemoteError::PoolTimeout`]. Connections that die between borrows
//! self-report through [`HealthObserver::report_broken`], which removes
//! them from the sub-pool without waiting for the next borrow attempt.

use crate::error::{RemoteError, RemoteResult};
use crate::types::ConnectionKey;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Budget for the behavioral no-op probe run before reusing an idle
/// connection.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Sizing and borrow policy for each sub-pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on live (idle + borrowed + connecting) connections per key.
    pub max: usize,
    /// Idle connections kept through expiry pruning.
    pub min: usize,
    /// Idle age after which a connection is discarded instead of reused.
    pub idle_timeout: Duration,
    /// How long a borrow may wait for capacity before failing.
    pub acquire_timeout: Duration,
    /// Validate idle connections (structural + probe) before handing them out.
    pub test_on_borrow: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max: 10,
            min: 0,
            idle_timeout: Duration::from_secs(120),
            acquire_timeout: Duration::from_secs(30),
            test_on_borrow: true,
        }
    }
}

/// Per-call budget overrides. Probe callers shorten both without touching
/// the steady-state sub-pool configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireOverrides {
    pub acquire_timeout: Option<Duration>,
    pub ready_timeout: Option<Duration>,
}

/// Anything that can derive a sub-pool key.
pub trait PoolKeyed {
    fn connection_key(&self) -> ConnectionKey;
}

/// An authenticated session that can live in a sub-pool.
pub trait PoolableConnection: Send + Sync + 'static {
    /// Structural liveness: transport open and not flagged broken.
    fn is_open(&self) -> bool;

    /// Behavioral liveness: a no-op remote command. Bounded by the pool's
    /// probe budget; any error fails validation.
    fn probe(&self) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Wire the owning sub-pool's failure observer into the transport so
    /// out-of-band failures reach the pool.
    fn attach_observer(&mut self, observer: HealthObserver);

    /// Graceful teardown.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Factory performing the authenticated handshake for one backend.
pub trait Connector: Send + Sync + 'static {
    type Params: PoolKeyed + Sync;
    type Conn: PoolableConnection;

    /// Ready budget applied when the caller does not override it.
    fn default_ready_timeout(&self) -> Duration;

    /// Perform the handshake. Failures are typed by the connector
    /// ([`RemoteError::ConnectFailed`] / [`RemoteError::AuthFailed`]) and
    /// are never retried by the pool.
    fn connect(
        &self,
        params: &Self::Params,
        ready_timeout: Duration,
    ) -> impl Future<Output = RemoteResult<Self::Conn>> + Send;
}

/// Back-reference from a connection to its owning sub-pool.
///
/// The single entry point for transport-level failure callbacks: calling
/// [`report_broken`](Self::report_broken) removes the connection from the
/// idle set (accounting included) without waiting for the next borrow.
#[derive(Clone)]
pub struct HealthObserver {
    sink: Arc<dyn Fn() + Send + Sync>,
}

impl HealthObserver {
    /// Observer that ignores reports; for connections outside any pool.
    pub fn detached() -> Self {
        Self {
            sink: Arc::new(|| {}),
        }
    }

    /// Report the underlying transport as dead.
    pub fn report_broken(&self) {
        (self.sink)()
    }
}

impl fmt::Debug for HealthObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HealthObserver")
    }
}

/// Point-in-time accounting for one sub-pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Live connections: idle + borrowed + mid-handshake.
    pub size: usize,
    /// Idle connections available for borrow.
    pub idle: usize,
    pub max: usize,
}

struct IdleEntry<C> {
    id: u64,
    conn: C,
    since: Instant,
}

struct SubPoolState<C> {
    idle: VecDeque<IdleEntry<C>>,
    /// Idle + borrowed + reserved-for-handshake.
    live: usize,
    next_id: u64,
    closed: bool,
}

struct SubPool<C: PoolableConnection> {
    key: ConnectionKey,
    config: PoolConfig,
    state: Mutex<SubPoolState<C>>,
    /// Signaled on every capacity change (release, destroy, expiry).
    available: Notify,
    /// Signaled on every decrement while closing, so `close` can re-check.
    drained: Notify,
}

impl<C: PoolableConnection> SubPool<C> {
    fn new(key: ConnectionKey, config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            key,
            config,
            state: Mutex::new(SubPoolState {
                idle: VecDeque::new(),
                live: 0,
                next_id: 0,
                closed: false,
            }),
            available: Notify::new(),
            drained: Notify::new(),
        })
    }

    fn observer(self: &Arc<Self>, id: u64) -> HealthObserver {
        let weak: Weak<Self> = Arc::downgrade(self);
        HealthObserver {
            sink: Arc::new(move || {
                if let Some(sub) = weak.upgrade() {
                    sub.remove_broken(id);
                }
            }),
        }
    }

    /// Out-of-band removal of an idle connection whose transport reported
    /// failure. A borrowed connection is left to its guard, which will see
    /// the broken structural state on release.
    fn remove_broken(&self, id: u64) {
        let removed = {
            let mut state = self.state.lock().unwrap();
            match state.idle.iter().position(|entry| entry.id == id) {
                Some(index) => {
                    let entry = state.idle.remove(index);
                    state.live -= 1;
                    if state.closed {
                        self.drained.notify_one();
                    }
                    entry
                }
                None => return,
            }
        };
        self.available.notify_one();
        warn!(key = %self.key, id, "idle connection reported broken, destroyed");
        // The transport already declared itself dead; drop in place rather
        // than attempting a graceful close.
        drop(removed);
    }

    /// Return a borrowed connection. Broken or post-close connections are
    /// destroyed instead of idled.
    fn give_back(&self, id: u64, conn: C) {
        let mut slot = Some(conn);
        {
            let mut state = self.state.lock().unwrap();
            if state.closed || !slot.as_ref().is_some_and(C::is_open) {
                state.live -= 1;
                if state.closed {
                    self.drained.notify_one();
                }
            } else {
                state.idle.push_back(IdleEntry {
                    id,
                    conn: slot.take().unwrap(),
                    since: Instant::now(),
                });
            }
        }
        self.available.notify_one();
        match slot {
            Some(conn) => {
                debug!(key = %self.key, id, "connection destroyed on release");
                spawn_close(conn);
            }
            None => debug!(key = %self.key, id, "connection released to pool"),
        }
    }

    /// Drop a connection that never reaches the idle set (failed
    /// validation or explicit destroy).
    fn discard(&self, id: u64, conn: C) {
        {
            let mut state = self.state.lock().unwrap();
            state.live -= 1;
            if state.closed {
                self.drained.notify_one();
            }
        }
        self.available.notify_one();
        debug!(key = %self.key, id, "connection destroyed");
        spawn_close(conn);
    }

    /// Release a handshake reservation that produced no connection.
    fn release_reservation(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.live -= 1;
            if state.closed {
                self.drained.notify_one();
            }
        }
        self.available.notify_one();
    }

    /// Discard idle entries past the idle timeout, keeping `min` around.
    fn prune_expired_locked(&self, state: &mut SubPoolState<C>) {
        while state.idle.len() > self.config.min {
            let expired = state
                .idle
                .front()
                .is_some_and(|entry| entry.since.elapsed() >= self.config.idle_timeout);
            if !expired {
                break;
            }
            let entry = state.idle.pop_front().unwrap();
            state.live -= 1;
            debug!(key = %self.key, id = entry.id, "idle connection expired");
            spawn_close(entry.conn);
        }
    }

    /// Structural + behavioral validation of an idle candidate.
    async fn validate(&self, conn: &C) -> bool {
        if !conn.is_open() {
            debug!(key = %self.key, "idle connection failed structural check");
            return false;
        }
        match tokio::time::timeout(PROBE_TIMEOUT, conn.probe()).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                debug!(key = %self.key, error = %err, "idle connection failed probe");
                false
            }
            Err(_) => {
                debug!(key = %self.key, "idle connection probe timed out");
                false
            }
        }
    }

    /// Drain outstanding borrows, then terminate every member connection.
    async fn close(self: &Arc<Self>) {
        loop {
            let drained: Vec<IdleEntry<C>> = {
                let mut state = self.state.lock().unwrap();
                state.closed = true;
                let entries: Vec<_> = state.idle.drain(..).collect();
                state.live -= entries.len();
                entries
            };
            for entry in drained {
                entry.conn.close().await;
            }
            if self.state.lock().unwrap().live == 0 {
                return;
            }
            self.drained.notified().await;
        }
    }
}

fn spawn_close<C: PoolableConnection>(conn: C) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                conn.close().await;
            });
        }
        // Outside a runtime, teardown falls to the connection's Drop.
        Err(_) => drop(conn),
    }
}

/// Decrements the handshake reservation unless disarmed. Covers the case
/// where the caller's future is dropped mid-handshake (timeout racing).
struct CreateReservation<C: PoolableConnection> {
    sub: Arc<SubPool<C>>,
    armed: bool,
}

impl<C: PoolableConnection> CreateReservation<C> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<C: PoolableConnection> Drop for CreateReservation<C> {
    fn drop(&mut self) {
        if self.armed {
            self.sub.release_reservation();
        }
    }
}

/// Exclusive borrow of a pooled connection.
///
/// Dropping the guard releases the connection back to its sub-pool, or
/// destroys it if the sub-pool is gone or the transport is broken.
pub struct PooledConn<C: PoolableConnection> {
    sub: Arc<SubPool<C>>,
    slot: Option<(u64, C)>,
}

impl<C: PoolableConnection> std::fmt::Debug for PooledConn<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConn")
            .field("id", &self.slot.as_ref().map(|(id, _)| *id))
            .finish_non_exhaustive()
    }
}

impl<C: PoolableConnection> PooledConn<C> {
    /// Key of the owning sub-pool.
    pub fn key(&self) -> &ConnectionKey {
        &self.sub.key
    }

    /// Remove this connection from the pool outside the normal release
    /// path; use when the connection is known-bad.
    pub fn destroy(mut self) {
        if let Some((id, conn)) = self.slot.take() {
            self.sub.discard(id, conn);
        }
    }
}

impl<C: PoolableConnection> Deref for PooledConn<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.slot.as_ref().expect("connection present until drop").1
    }
}

impl<C: PoolableConnection> DerefMut for PooledConn<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.slot.as_mut().expect("connection present until drop").1
    }
}

impl<C: PoolableConnection> Drop for PooledConn<C> {
    fn drop(&mut self) {
        if let Some((id, conn)) = self.slot.take() {
            self.sub.give_back(id, conn);
        }
    }
}

/// Keyed pool of authenticated connections for one backend.
///
/// Constructed once per process and shared by reference; there is no
/// ambient global instance.
pub struct ConnectionPool<C: Connector> {
    connector: C,
    defaults: PoolConfig,
    pools: Mutex<HashMap<ConnectionKey, Arc<SubPool<C::Conn>>>>,
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(connector: C, defaults: PoolConfig) -> Self {
        Self {
            connector,
            defaults,
            pools: Mutex::new(HashMap::new()),
        }
    }

    fn sub_pool(&self, key: &ConnectionKey) -> Arc<SubPool<C::Conn>> {
        let mut pools = self.pools.lock().unwrap();
        pools
            .entry(key.clone())
            .or_insert_with(|| SubPool::new(key.clone(), self.defaults.clone()))
            .clone()
    }

    /// Borrow a connection for `params`, waiting up to the acquire budget.
    ///
    /// A failed handshake surfaces as [`RemoteError::ConnectFailed`] (or
    /// `AuthFailed`) immediately; it is never retried here.
    pub async fn acquire(
        &self,
        params: &C::Params,
        overrides: AcquireOverrides,
    ) -> RemoteResult<PooledConn<C::Conn>> {
        let key = params.connection_key();
        let mut sub = self.sub_pool(&key);
        let acquire_timeout = overrides
            .acquire_timeout
            .unwrap_or(sub.config.acquire_timeout);
        let ready_timeout = overrides
            .ready_timeout
            .unwrap_or_else(|| self.connector.default_ready_timeout());
        let deadline = tokio::time::Instant::now() + acquire_timeout;

        enum Step<Conn> {
            Candidate(u64, Conn),
            Handshake,
            Wait,
            /// The sub-pool closed under us; start over on a fresh one.
            Reset,
        }

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(RemoteError::PoolTimeout {
                    key: key.to_string(),
                    waited_ms: acquire_timeout.as_millis() as u64,
                });
            }

            let step = {
                let mut state = sub.state.lock().unwrap();
                if state.closed {
                    Step::Reset
                } else {
                    sub.prune_expired_locked(&mut state);
                    if let Some(entry) = state.idle.pop_front() {
                        Step::Candidate(entry.id, entry.conn)
                    } else if state.live < sub.config.max {
                        state.live += 1;
                        Step::Handshake
                    } else {
                        Step::Wait
                    }
                }
            };

            match step {
                Step::Reset => {
                    sub = self.sub_pool(&key);
                }
                Step::Candidate(id, conn) => {
                    if !sub.config.test_on_borrow || sub.validate(&conn).await {
                        return Ok(PooledConn {
                            sub,
                            slot: Some((id, conn)),
                        });
                    }
                    sub.discard(id, conn);
                }
                Step::Handshake => {
                    let mut reservation = CreateReservation {
                        sub: sub.clone(),
                        armed: true,
                    };
                    let started = Instant::now();
                    let outcome =
                        tokio::time::timeout(ready_timeout, self.connector.connect(params, ready_timeout))
                            .await;
                    match outcome {
                        Ok(Ok(mut conn)) => {
                            reservation.disarm();
                            let id = {
                                let mut state = sub.state.lock().unwrap();
                                state.next_id += 1;
                                state.next_id
                            };
                            conn.attach_observer(sub.observer(id));
                            info!(
                                key = %key,
                                id,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "connection created"
                            );
                            return Ok(PooledConn {
                                sub,
                                slot: Some((id, conn)),
                            });
                        }
                        Ok(Err(err)) => return Err(err),
                        Err(_) => {
                            return Err(RemoteError::ConnectFailed {
                                key: key.to_string(),
                                message: format!(
                                    "handshake did not become ready within {} ms",
                                    ready_timeout.as_millis()
                                ),
                            });
                        }
                    }
                }
                Step::Wait => {
                    tokio::select! {
                        _ = sub.available.notified() => {}
                        _ = tokio::time::sleep_until(deadline) => {
                            return Err(RemoteError::PoolTimeout {
                                key: key.to_string(),
                                waited_ms: acquire_timeout.as_millis() as u64,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Borrow, run `op`, and release-or-destroy on every exit path.
    ///
    /// The borrow guard settles accounts in its `Drop`, so `op` failing
    /// (or panicking) still returns the connection's slot to the pool.
    pub async fn with_connection<T, F>(
        &self,
        params: &C::Params,
        overrides: AcquireOverrides,
        op: F,
    ) -> RemoteResult<T>
    where
        F: AsyncFnOnce(&mut C::Conn) -> RemoteResult<T>,
    {
        let mut conn = self.acquire(params, overrides).await?;
        op(&mut *conn).await
    }

    /// Accounting snapshot for one key.
    pub fn status(&self, key: &ConnectionKey) -> Option<PoolStatus> {
        let pools = self.pools.lock().unwrap();
        let sub = pools.get(key)?;
        let state = sub.state.lock().unwrap();
        Some(PoolStatus {
            size: state.live,
            idle: state.idle.len(),
            max: sub.config.max,
        })
    }

    /// Keys with an instantiated sub-pool.
    pub fn active_keys(&self) -> Vec<ConnectionKey> {
        self.pools.lock().unwrap().keys().cloned().collect()
    }

    /// Drain outstanding borrows for `key`, then terminate its members and
    /// forget the sub-pool. New borrows for the key start a fresh sub-pool.
    pub async fn close(&self, key: &ConnectionKey) {
        let sub = self.pools.lock().unwrap().remove(key);
        if let Some(sub) = sub {
            sub.close().await;
            info!(key = %key, "sub-pool closed");
        }
    }

    /// [`close`](Self::close) every active key.
    pub async fn close_all(&self) {
        let subs: Vec<_> = self.pools.lock().unwrap().drain().collect();
        for (key, sub) in subs {
            sub.close().await;
            info!(key = %key, "sub-pool closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConnector, MockParams, MockProfile};

    fn pool_with(profile: MockProfile, config: PoolConfig) -> ConnectionPool<MockConnector> {
        ConnectionPool::new(MockConnector::new(profile), config)
    }

    async fn settle() {
        // Let spawned teardown tasks run.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_borrows_never_exceed_max() {
        let connector = MockConnector::new(MockProfile::default());
        let counters = connector.counters();
        let pool = Arc::new(ConnectionPool::new(
            connector,
            PoolConfig {
                max: 2,
                ..PoolConfig::default()
            },
        ));
        let params = MockParams::new("build");

        let mut tasks = Vec::new();
        for _ in 0..3 {
            let pool = pool.clone();
            let params = params.clone();
            tasks.push(tokio::spawn(async move {
                pool.with_connection(&params, AcquireOverrides::default(), async |_conn| {
                    tokio::time::sleep(Duration::from_millis(80)).await;
                    Ok::<(), RemoteError>(())
                })
                .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert!(counters.peak() <= 2, "peak {} exceeded max", counters.peak());
        // The third borrow waited for a release instead of over-creating.
        assert_eq!(counters.created(), 2);
    }

    #[tokio::test]
    async fn failed_handshake_yields_connect_failed_without_leaking_slots() {
        let pool = pool_with(
            MockProfile {
                refuse_connect: true,
                ..MockProfile::default()
            },
            PoolConfig::default(),
        );
        let params = MockParams::new("down");

        let err = pool
            .acquire(&params, AcquireOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::ConnectFailed { .. }));

        let status = pool.status(&params.connection_key()).unwrap();
        assert_eq!(status.size, 0);
        assert_eq!(status.idle, 0);
    }

    #[tokio::test]
    async fn auth_rejection_is_typed() {
        let pool = pool_with(
            MockProfile {
                reject_auth: true,
                ..MockProfile::default()
            },
            PoolConfig::default(),
        );
        let err = pool
            .acquire(&MockParams::new("locked"), AcquireOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::AuthFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_times_out_when_key_is_exhausted() {
        let pool = pool_with(
            MockProfile::default(),
            PoolConfig {
                max: 1,
                ..PoolConfig::default()
            },
        );
        let params = MockParams::new("busy");

        let _held = pool
            .acquire(&params, AcquireOverrides::default())
            .await
            .unwrap();
        let err = pool
            .acquire(
                &params,
                AcquireOverrides {
                    acquire_timeout: Some(Duration::from_millis(200)),
                    ..AcquireOverrides::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::PoolTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_handshake_releases_its_reservation() {
        let connector = MockConnector::new(MockProfile {
            connect_delay: Duration::from_secs(60),
            ..MockProfile::default()
        });
        let pool = ConnectionPool::new(
            connector,
            PoolConfig {
                max: 1,
                ..PoolConfig::default()
            },
        );
        let params = MockParams::new("slow");

        tokio::select! {
            _ = pool.acquire(&params, AcquireOverrides::default()) => {
                panic!("handshake should not finish")
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }

        let status = pool.status(&params.connection_key()).unwrap();
        assert_eq!(status.size, 0, "abandoned handshake must free its slot");
    }

    #[tokio::test]
    async fn with_connection_releases_on_error() {
        let connector = MockConnector::new(MockProfile::default());
        let counters = connector.counters();
        let pool = ConnectionPool::new(
            connector,
            PoolConfig {
                max: 1,
                ..PoolConfig::default()
            },
        );
        let params = MockParams::new("flaky-op");

        let result: RemoteResult<()> = pool
            .with_connection(&params, AcquireOverrides::default(), async |_conn| {
                Err(RemoteError::io("exec", "boom"))
            })
            .await;
        assert!(result.is_err());

        let status = pool.status(&params.connection_key()).unwrap();
        assert_eq!(status.idle, 1, "connection must be back in the pool");

        pool.with_connection(&params, AcquireOverrides::default(), async |_conn| {
            Ok::<(), RemoteError>(())
        })
        .await
        .unwrap();
        assert_eq!(counters.created(), 1, "healthy connection was reused");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn with_connection_releases_on_panic() {
        let pool = Arc::new(pool_with(
            MockProfile::default(),
            PoolConfig {
                max: 1,
                ..PoolConfig::default()
            },
        ));
        let params = MockParams::new("panicky");

        fn explode() {
            panic!("operation exploded");
        }

        let task = {
            let pool = pool.clone();
            let params = params.clone();
            tokio::spawn(async move {
                pool.with_connection(&params, AcquireOverrides::default(), async |_conn| {
                    explode();
                    Ok::<(), RemoteError>(())
                })
                .await
            })
        };
        assert!(task.await.is_err());

        let status = pool.status(&params.connection_key()).unwrap();
        assert_eq!(status.size, 1);
        assert_eq!(status.idle, 1, "borrow settled despite the panic");
    }

    #[tokio::test]
    async fn severed_idle_connection_is_destroyed_out_of_band() {
        let connector = MockConnector::new(MockProfile::default());
        let counters = connector.counters();
        let handles = connector.handle_registry();
        let pool = ConnectionPool::new(connector, PoolConfig::default());
        let params = MockParams::new("partition");
        let key = params.connection_key();

        pool.with_connection(&params, AcquireOverrides::default(), async |_conn| {
            Ok::<(), RemoteError>(())
        })
        .await
        .unwrap();
        assert_eq!(pool.status(&key).unwrap().idle, 1);

        // Transport dies while the connection sits idle; accounting is
        // corrected without waiting for the next borrow.
        handles.lock().unwrap()[0].sever();
        let status = pool.status(&key).unwrap();
        assert_eq!(status.size, 0);
        assert_eq!(status.idle, 0);

        // The next borrow gets a fresh handshake, not the corpse.
        pool.with_connection(&params, AcquireOverrides::default(), async |_conn| {
            Ok::<(), RemoteError>(())
        })
        .await
        .unwrap();
        assert_eq!(counters.created(), 2);
    }

    #[tokio::test]
    async fn failed_probe_destroys_candidate_and_hands_out_fresh() {
        let connector = MockConnector::new(MockProfile::default());
        let counters = connector.counters();
        let profile = connector.profile_handle();
        let pool = ConnectionPool::new(connector, PoolConfig::default());
        let params = MockParams::new("stale");

        pool.with_connection(&params, AcquireOverrides::default(), async |_conn| {
            Ok::<(), RemoteError>(())
        })
        .await
        .unwrap();

        profile.lock().unwrap().fail_probe = true;
        let conn = pool
            .acquire(&params, AcquireOverrides::default())
            .await
            .unwrap();
        drop(conn);
        settle().await;

        assert_eq!(counters.created(), 2, "invalid candidate was replaced");
        assert_eq!(counters.closed(), 1, "invalid candidate was destroyed");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_waits_for_outstanding_borrows() {
        let connector = MockConnector::new(MockProfile::default());
        let counters = connector.counters();
        let pool = Arc::new(ConnectionPool::new(connector, PoolConfig::default()));
        let params = MockParams::new("teardown");
        let key = params.connection_key();

        let held = pool
            .acquire(&params, AcquireOverrides::default())
            .await
            .unwrap();
        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(held);
        });

        pool.close(&key).await;
        releaser.await.unwrap();

        assert!(pool.status(&key).is_none());
        settle().await;
        assert_eq!(counters.closed(), counters.created());
    }

    #[tokio::test]
    async fn expired_idle_connections_are_replaced() {
        let connector = MockConnector::new(MockProfile::default());
        let counters = connector.counters();
        let pool = ConnectionPool::new(
            connector,
            PoolConfig {
                idle_timeout: Duration::ZERO,
                ..PoolConfig::default()
            },
        );
        let params = MockParams::new("short-lived");

        for _ in 0..2 {
            pool.with_connection(&params, AcquireOverrides::default(), async |_conn| {
                Ok::<(), RemoteError>(())
            })
            .await
            .unwrap();
        }
        assert_eq!(counters.created(), 2, "expired idle entry was not reused");
    }

    #[tokio::test]
    async fn min_idle_connections_survive_expiry() {
        let connector = MockConnector::new(MockProfile::default());
        let counters = connector.counters();
        let pool = ConnectionPool::new(
            connector,
            PoolConfig {
                min: 1,
                idle_timeout: Duration::ZERO,
                ..PoolConfig::default()
            },
        );
        let params = MockParams::new("warm");

        for _ in 0..2 {
            pool.with_connection(&params, AcquireOverrides::default(), async |_conn| {
                Ok::<(), RemoteError>(())
            })
            .await
            .unwrap();
        }
        assert_eq!(counters.created(), 1, "min floor kept the idle connection");
    }
}
