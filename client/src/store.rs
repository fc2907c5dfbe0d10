//! Projected telemetry state read by the dashboard
//!
//! The store owns the two maps the UI renders from (status and metrics per
//! server) plus the bookkeeping of which connection handles are currently
//! live. Handles may only write their own key, and only while their
//! generation is the live one, so a handle that has been torn down can never
//! resurrect stale data.
//!
//! The lock is a plain `RwLock`: no guard is ever held across an `.await`,
//! which keeps teardown synchronous for the registry.

use log::warn;
use serde::Serialize;
use shared::{ServerMetrics, ServerStatus};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Where a connection handle currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Connecting,
    Authenticating,
    Streaming,
    /// Transport gone, reconnect scheduled
    Closed,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Authenticating => "authenticating",
            ConnectionPhase::Streaming => "streaming",
            ConnectionPhase::Closed => "closed",
        };
        f.pad(name)
    }
}

/// Bookkeeping for one live connection handle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionState {
    pub generation: u64,
    pub phase: ConnectionPhase,
    /// Connection attempts started by this handle, including the first
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl ConnectionState {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            phase: ConnectionPhase::Connecting,
            attempts: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    statuses: HashMap<String, ServerStatus>,
    metrics: HashMap<String, ServerMetrics>,
    connections: HashMap<String, ConnectionState>,
}

impl StoreInner {
    fn live_mut(&mut self, server_id: &str, generation: u64) -> Option<&mut ConnectionState> {
        self.connections
            .get_mut(server_id)
            .filter(|state| state.generation == generation)
    }

    fn is_live(&self, server_id: &str, generation: u64) -> bool {
        self.connections
            .get(server_id)
            .map_or(false, |state| state.generation == generation)
    }
}

/// Cheaply cloneable handle to the shared status/metrics maps
#[derive(Debug, Clone, Default)]
pub struct TelemetryStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Every write is a single map operation, so a poisoned lock still holds
    // consistent maps.
    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `generation` as the live handle for `server_id`
    pub(crate) fn admit(&self, server_id: &str, generation: u64) {
        let mut inner = self.write();
        inner
            .connections
            .insert(server_id.to_string(), ConnectionState::new(generation));
    }

    /// Revokes the live handle; later writes from it are discarded.
    /// Status and metrics already recorded stay readable.
    pub(crate) fn retire(&self, server_id: &str) {
        let mut inner = self.write();
        inner.connections.remove(server_id);
    }

    pub(crate) fn begin_attempt(&self, server_id: &str, generation: u64) -> bool {
        let mut inner = self.write();
        match inner.live_mut(server_id, generation) {
            Some(state) => {
                state.attempts += 1;
                state.phase = ConnectionPhase::Connecting;
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_phase(
        &self,
        server_id: &str,
        generation: u64,
        phase: ConnectionPhase,
    ) -> bool {
        let mut inner = self.write();
        match inner.live_mut(server_id, generation) {
            Some(state) => {
                state.phase = phase;
                true
            }
            None => false,
        }
    }

    /// Marks the handle closed, keeping the reason for display
    pub(crate) fn record_closed(
        &self,
        server_id: &str,
        generation: u64,
        error: Option<String>,
    ) -> bool {
        let mut inner = self.write();
        match inner.live_mut(server_id, generation) {
            Some(state) => {
                state.phase = ConnectionPhase::Closed;
                if error.is_some() {
                    state.last_error = error;
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn record_metrics(
        &self,
        server_id: &str,
        generation: u64,
        metrics: ServerMetrics,
    ) -> bool {
        let mut inner = self.write();
        if !inner.is_live(server_id, generation) {
            return false;
        }
        inner.metrics.insert(server_id.to_string(), metrics);
        true
    }

    /// Stores a raw status string from the daemon. Values outside the four
    /// known states are logged and stored as offline.
    pub(crate) fn record_status(&self, server_id: &str, generation: u64, raw: &str) -> bool {
        let status = match raw.parse::<ServerStatus>() {
            Ok(status) => status,
            Err(e) => {
                warn!("[{}] {}, treating as offline", server_id, e);
                ServerStatus::Offline
            }
        };

        let mut inner = self.write();
        if !inner.is_live(server_id, generation) {
            return false;
        }
        inner.statuses.insert(server_id.to_string(), status);
        true
    }

    /// Snapshot of every status received so far
    pub fn statuses(&self) -> HashMap<String, ServerStatus> {
        self.read().statuses.clone()
    }

    /// Snapshot of every metrics triple received so far
    pub fn metrics(&self) -> HashMap<String, ServerMetrics> {
        self.read().metrics.clone()
    }

    /// Current status, `offline` until the first status frame
    pub fn status(&self, server_id: &str) -> ServerStatus {
        self.read()
            .statuses
            .get(server_id)
            .copied()
            .unwrap_or_default()
    }

    /// Current metrics, all zero until the first stats frame
    pub fn server_metrics(&self, server_id: &str) -> ServerMetrics {
        self.read()
            .metrics
            .get(server_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn connection(&self, server_id: &str) -> Option<ConnectionState> {
        self.read().connections.get(server_id).cloned()
    }
}
