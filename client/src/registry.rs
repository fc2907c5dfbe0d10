//! Connection registry for monitored servers
//!
//! This module keeps exactly one live connection handle per monitored server:
//! - Reconciling the handle set against the servers the dashboard shows
//! - Spawning a lifecycle task for each newly monitored server
//! - Tearing handles down (pending reconnect and open transport included)
//!   when a server stops being monitored or the owning view goes away
//!
//! Teardown retires the handle's generation in the [`TelemetryStore`] and
//! aborts its task without awaiting anything, so it cannot be interrupted
//! halfway and nothing a torn-down handle does afterwards reaches the status
//! or metrics maps.

use crate::backend::CredentialSource;
use crate::config::TelemetryConfig;
use crate::lifecycle::Lifecycle;
use crate::store::TelemetryStore;
use crate::transport::Connector;
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A live (or reconnecting) connection to one monitored server
///
/// The handle owns the lifecycle task; the task in turn owns the transport
/// and the reconnect timer. Dropping the handle aborts the task, cancelling
/// both.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Hosting-panel server identifier
    pub server_id: String,
    /// Distinguishes this handle from earlier ones for the same server
    pub generation: u64,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Returns true if the lifecycle task is no longer running
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Owns every connection handle and the store they project into
///
/// The registry is driven from one place (`&mut self`), so no two
/// operations race on the same server id. Lifecycle tasks run on the tokio
/// runtime independently of each other.
pub struct ConnectionRegistry<C, K> {
    /// Live handles indexed by server id
    handles: HashMap<String, ConnectionHandle>,
    credentials: Arc<C>,
    connector: Arc<K>,
    store: TelemetryStore,
    config: TelemetryConfig,
    /// Next generation number handed to a new handle
    next_generation: u64,
}

impl<C: CredentialSource, K: Connector> ConnectionRegistry<C, K> {
    pub fn new(credentials: C, connector: K, config: TelemetryConfig) -> Self {
        Self {
            handles: HashMap::new(),
            credentials: Arc::new(credentials),
            connector: Arc::new(connector),
            store: TelemetryStore::new(),
            config,
            next_generation: 1,
        }
    }

    /// Read side shared with the UI layer
    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    /// Brings the handle set in line with `server_ids`
    ///
    /// Servers no longer listed are torn down, newly listed servers get a
    /// handle, and servers already monitored keep their existing handle.
    /// Connection failures never surface here; each handle retries on its own.
    ///
    /// Must be called from within a tokio runtime.
    pub fn reconcile<I, S>(&mut self, server_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let wanted: HashSet<String> = server_ids.into_iter().map(Into::into).collect();

        let stale: Vec<String> = self
            .handles
            .keys()
            .filter(|id| !wanted.contains(*id))
            .cloned()
            .collect();
        for server_id in &stale {
            self.remove_handle(server_id);
        }

        for server_id in wanted {
            let restart = match self.handles.get(&server_id) {
                Some(handle) if !handle.is_finished() => continue,
                Some(_) => true,
                None => false,
            };

            if restart {
                warn!("[{}] Lifecycle task ended unexpectedly, restarting", server_id);
                self.remove_handle(&server_id);
            }
            self.add_handle(server_id);
        }
    }

    /// Tears down every handle
    ///
    /// Safe to call repeatedly and regardless of each handle's state.
    pub fn dispose_all(&mut self) {
        let server_ids: Vec<String> = self.handles.keys().cloned().collect();
        for server_id in &server_ids {
            self.remove_handle(server_id);
        }
    }

    fn add_handle(&mut self, server_id: String) {
        let generation = self.next_generation;
        self.next_generation += 1;

        self.store.admit(&server_id, generation);

        let lifecycle = Lifecycle::new(
            server_id.clone(),
            generation,
            Arc::clone(&self.credentials),
            Arc::clone(&self.connector),
            self.store.clone(),
            self.config.reconnect_delay,
        );
        let task = tokio::spawn(lifecycle.run());

        info!("[{}] Monitoring started (generation {})", server_id, generation);
        self.handles.insert(
            server_id.clone(),
            ConnectionHandle {
                server_id,
                generation,
                task,
            },
        );
    }

    /// Removes a handle, returning false if the server was not monitored
    fn remove_handle(&mut self, server_id: &str) -> bool {
        match self.handles.remove(server_id) {
            Some(handle) => {
                self.store.retire(server_id);
                drop(handle);
                info!("[{}] Monitoring stopped", server_id);
                true
            }
            None => false,
        }
    }
}

impl<C, K> ConnectionRegistry<C, K> {
    /// Returns the number of monitored servers
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if no servers are monitored
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn contains(&self, server_id: &str) -> bool {
        self.handles.contains_key(server_id)
    }

    pub fn handle(&self, server_id: &str) -> Option<&ConnectionHandle> {
        self.handles.get(server_id)
    }

    /// Monitored server ids in sorted order
    pub fn monitored_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handles.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl<C, K> Drop for ConnectionRegistry<C, K> {
    fn drop(&mut self) {
        for (server_id, handle) in self.handles.drain() {
            self.store.retire(&server_id);
            drop(handle);
        }
    }
}
