//! # Keyed Connection Pool
//!
//! Holds at most one connection per logical resource name (typically a
//! database), hands out shared references to it, and closes connections that
//! were not acquired within their TTL.
//!
//! Every operation is serialized by a single pool-wide lock, including the
//! factory call that opens a new connection. Call frequency is low compared
//! to lock hold time, so correctness is preferred over concurrency here.
//!
//! With `max_connections` set, opening a new connection while at capacity
//! evicts the least recently used connection that is neither active nor
//! persistent. If none qualifies the acquisition fails with
//! [`PoolError::PoolFull`], optionally after waiting for a slot.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::errors::{ConnectionError, PoolError, PoolResult};
use crate::config::ConnectionPoolConfig;
use crate::constants::defaults;
use crate::logging::log_pool_operation;
use crate::utils::time::deadline_after;

const SLOT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A driver connection managed by [`ConnectionPool`]
#[async_trait]
pub trait PooledConnection: Send + Sync + 'static {
    fn is_closed(&self) -> bool;

    /// False when the connection was left mid-transaction or otherwise
    /// needs [`reset`](PooledConnection::reset) before reuse.
    fn is_ready(&self) -> bool {
        true
    }

    /// Bring a non-ready connection back to a usable state (e.g. rollback)
    async fn reset(&self) -> Result<(), ConnectionError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError>;
}

/// Opens connections for a resource name
#[async_trait]
pub trait ConnectionFactory<C>: Send + Sync {
    async fn connect(&self, resource_name: &str) -> Result<C, ConnectionError>;
}

#[async_trait]
impl<C, F, Fut> ConnectionFactory<C> for F
where
    C: Send + 'static,
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<C, ConnectionError>> + Send,
{
    async fn connect(&self, resource_name: &str) -> Result<C, ConnectionError> {
        (self)(resource_name.to_string()).await
    }
}

/// Per-acquisition options
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    /// Persistent connections are never evicted to make room
    pub persistent: bool,
    /// Pool key becomes `<prefix>-<resource_name>`; the factory still receives the bare name
    pub prefix: Option<String>,
    /// How long to wait for a free slot at capacity before failing
    pub timeout: Option<Duration>,
}

impl ConnectionOptions {
    pub fn persistent() -> Self {
        Self {
            persistent: true,
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Pool key for a resource name and optional prefix
pub fn connection_key(resource_name: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}-{resource_name}"),
        None => resource_name.to_string(),
    }
}

/// Lifetime counters for pool activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub connection_opened: u64,
    pub connection_pruned: u64,
    pub connection_closed: u64,
    pub connection_closed_failed: u64,
    pub connection_evicted: u64,
    pub connection_reset: u64,
}

struct PoolEntry<C> {
    connection: Arc<C>,
    deadline: Instant,
    last_accessed: Instant,
    active: bool,
    persistent: bool,
}

struct PoolState<C> {
    entries: HashMap<String, PoolEntry<C>>,
    stats: PoolStats,
    closed: bool,
}

pub struct ConnectionPool<C: PooledConnection> {
    factory: Box<dyn ConnectionFactory<C>>,
    max_connections: Option<usize>,
    default_ttl: Duration,
    state: Mutex<PoolState<C>>,
}

impl<C: PooledConnection> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("max_connections", &self.max_connections)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl<C: PooledConnection> ConnectionPool<C> {
    pub fn new(factory: impl ConnectionFactory<C> + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            max_connections: None,
            default_ttl: defaults::CONNECTION_TTL,
            state: Mutex::new(PoolState {
                entries: HashMap::new(),
                stats: PoolStats::default(),
                closed: false,
            }),
        }
    }

    pub fn from_config(
        config: &ConnectionPoolConfig,
        factory: impl ConnectionFactory<C> + 'static,
    ) -> Self {
        let pool = Self::new(factory).with_default_ttl(config.default_ttl());
        match config.max_connections {
            Some(max) => pool.with_max_connections(max),
            None => pool,
        }
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = Some(max_connections.max(1));
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }

    /// Acquire the connection for `resource_name` using the default TTL
    pub async fn get(&self, resource_name: &str) -> PoolResult<Arc<C>> {
        self.get_connection(resource_name, self.default_ttl).await
    }

    /// Acquire the connection for `resource_name`, extending its deadline to now + `ttl`
    pub async fn get_connection(&self, resource_name: &str, ttl: Duration) -> PoolResult<Arc<C>> {
        self.get_connection_with(resource_name, ttl, &ConnectionOptions::default())
            .await
    }

    /// Acquire with explicit options.
    ///
    /// Expired entries are pruned first. A cached connection that is closed is
    /// replaced; one that is not ready is reset, and replaced only if the reset
    /// fails. The entry is marked active until [`release`](Self::release).
    #[instrument(skip(self, options), fields(prefix = ?options.prefix))]
    pub async fn get_connection_with(
        &self,
        resource_name: &str,
        ttl: Duration,
        options: &ConnectionOptions,
    ) -> PoolResult<Arc<C>> {
        let started = Instant::now();
        let key = connection_key(resource_name, options.prefix.as_deref());

        loop {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            if state.closed {
                return Err(PoolError::Closed);
            }
            Self::prune_locked(state).await;

            if let Some(connection) = Self::reuse_locked(state, &key, ttl).await {
                return Ok(connection);
            }

            if let Some(max_connections) = self.max_connections {
                if !Self::make_room_locked(state, max_connections).await {
                    match options.timeout {
                        Some(timeout) if started.elapsed() < timeout => {
                            drop(guard);
                            tokio::time::sleep(SLOT_POLL_INTERVAL).await;
                            continue;
                        }
                        _ => {
                            warn!(
                                resource_name = %resource_name,
                                max_connections = max_connections,
                                "Connection pool full, no connection eligible for eviction"
                            );
                            return Err(PoolError::PoolFull { max_connections });
                        }
                    }
                }
            }

            let connection = self
                .factory
                .connect(resource_name)
                .await
                .map(Arc::new)
                .map_err(|source| PoolError::Connect {
                    resource_name: resource_name.to_string(),
                    source,
                })?;

            let now = Instant::now();
            state.stats.connection_opened += 1;
            state.entries.insert(
                key.clone(),
                PoolEntry {
                    connection: Arc::clone(&connection),
                    deadline: deadline_after(now, ttl),
                    last_accessed: now,
                    active: true,
                    persistent: options.persistent,
                },
            );
            log_pool_operation("open", &key, "success", state.entries.len(), None);
            return Ok(connection);
        }
    }

    /// Reuse a cached connection if it is still usable. Persistence is kept
    /// from the first acquisition.
    async fn reuse_locked(state: &mut PoolState<C>, key: &str, ttl: Duration) -> Option<Arc<C>> {
        let connection = Arc::clone(&state.entries.get(key)?.connection);

        if connection.is_closed() {
            debug!(resource_name = %key, "Cached connection closed, reconnecting");
            state.entries.remove(key);
            return None;
        }

        if !connection.is_ready() {
            match connection.reset().await {
                Ok(()) => {
                    state.stats.connection_reset += 1;
                    debug!(resource_name = %key, "Reset connection left in a non-ready state");
                }
                Err(e) => {
                    warn!(
                        resource_name = %key,
                        error = %e,
                        "Failed to reset connection, replacing it"
                    );
                    Self::terminate_locked(state, key).await;
                    return None;
                }
            }
        }

        let entry = state.entries.get_mut(key)?;
        let now = Instant::now();
        entry.deadline = deadline_after(now, ttl);
        entry.last_accessed = now;
        entry.active = true;
        Some(connection)
    }

    /// Evict until below capacity. False if nothing could be evicted.
    async fn make_room_locked(state: &mut PoolState<C>, max_connections: usize) -> bool {
        while state.entries.len() >= max_connections {
            if Self::evict_lru_locked(state).await.is_none() {
                return false;
            }
        }
        true
    }

    async fn evict_lru_locked(state: &mut PoolState<C>) -> Option<String> {
        let candidate = state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.active && !entry.persistent)
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(name, _)| name.clone())?;

        Self::terminate_locked(state, &candidate).await;
        state.stats.connection_evicted += 1;
        log_pool_operation("evict", &candidate, "success", state.entries.len(), None);
        Some(candidate)
    }

    /// Remove and close an entry. The entry is removed even if closing fails.
    async fn terminate_locked(state: &mut PoolState<C>, key: &str) -> bool {
        let Some(entry) = state.entries.remove(key) else {
            return true;
        };
        match entry.connection.close().await {
            Ok(()) => {
                state.stats.connection_closed += 1;
                true
            }
            Err(e) => {
                state.stats.connection_closed_failed += 1;
                warn!(
                    resource_name = %key,
                    error = %e,
                    "Failed to close pooled connection, dropping it"
                );
                false
            }
        }
    }

    async fn prune_locked(state: &mut PoolState<C>) {
        let now = Instant::now();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(name, _)| name.clone())
            .collect();

        for key in expired {
            Self::terminate_locked(state, &key).await;
            state.stats.connection_pruned += 1;
            log_pool_operation("prune", &key, "expired", state.entries.len(), None);
        }
    }

    /// Mark a connection as no longer in use so it may be evicted.
    ///
    /// `key` is the pool key, see [`connection_key`]. Unknown keys are ignored.
    pub async fn release(&self, key: &str) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.entries.get_mut(key) {
            entry.active = false;
        }
    }

    /// Close and remove every connection whose deadline has passed
    pub async fn prune_connections(&self) {
        let mut state = self.state.lock().await;
        Self::prune_locked(&mut state).await;
    }

    /// Close and remove every connection.
    ///
    /// Returns false if any connection failed to close; those entries are
    /// removed regardless.
    pub async fn close_all_connections(&self) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let keys: Vec<String> = state.entries.keys().cloned().collect();

        let mut success = true;
        for key in keys {
            if !Self::terminate_locked(state, &key).await {
                success = false;
            }
        }
        log_pool_operation(
            "close_all",
            "*",
            if success { "success" } else { "partial" },
            state.entries.len(),
            None,
        );
        success
    }

    /// Close every connection and reject later acquisitions
    pub async fn shutdown(&self) -> bool {
        self.state.lock().await.closed = true;
        let success = self.close_all_connections().await;
        info!(success = success, "🛑 Connection pool shut down");
        success
    }

    pub async fn stats(&self) -> PoolStats {
        self.state.lock().await.stats
    }

    pub async fn reset_stats(&self) {
        self.state.lock().await.stats = PoolStats::default();
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.state.lock().await.entries.contains_key(key)
    }

    pub async fn is_shutdown(&self) -> bool {
        self.state.lock().await.closed
    }
}
