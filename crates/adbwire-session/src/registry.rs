use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adbwire_transport::DaemonAddress;
use tracing::debug;

use crate::connection::{connect_with_timeout, Connection, ConnectionConfig};
use crate::error::Result;
use crate::lock;

static NEXT_HOLDER_ID: AtomicU64 = AtomicU64::new(1);

/// A lifetime owner of a shared connection.
///
/// Every acquisition names a holder and is reference counted: each one
/// needs a matching release, and a connection closes once none remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Holder(u64);

impl Holder {
    /// A fresh, process-unique holder.
    pub fn new() -> Self {
        Self(NEXT_HOLDER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for Holder {
    fn default() -> Self {
        Self::new()
    }
}

type Entries = Arc<Mutex<HashMap<DaemonAddress, Connection>>>;

/// Shares connections between independent callers, keyed by address.
///
/// The first acquisition for an address connects and handshakes; later ones
/// get the same connection while it is open. A closed connection is dropped
/// from the registry and replaced on the next acquisition.
pub struct Registry {
    config: ConnectionConfig,
    entries: Entries,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(ConnectionConfig::default())
    }

    pub fn with_config(config: ConnectionConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get or create the connection for `address` on behalf of `holder`.
    pub fn acquire(&self, holder: Holder, address: &DaemonAddress) -> Result<Connection> {
        self.acquire_inner(holder, address, None)
    }

    /// Like [`acquire`](Self::acquire), but a new connection must finish its
    /// connect and handshake within `timeout`.
    pub fn acquire_with_timeout(
        &self,
        holder: Holder,
        address: &DaemonAddress,
        timeout: Duration,
    ) -> Result<Connection> {
        self.acquire_inner(holder, address, Some(timeout))
    }

    fn acquire_inner(
        &self,
        holder: Holder,
        address: &DaemonAddress,
        timeout: Option<Duration>,
    ) -> Result<Connection> {
        // Held across connect so one address never gets two connections.
        let mut entries = lock(&self.entries);

        if let Some(existing) = entries.get(address) {
            if !existing.is_closed() {
                existing.hold(holder);
                return Ok(existing.clone());
            }
            debug!(%address, "replacing closed connection");
            entries.remove(address);
        }

        let connection = match timeout {
            Some(timeout) => connect_with_timeout(address, &self.config, timeout)?,
            None => Connection::connect(address, &self.config)?,
        };
        connection.hold(holder);

        let registry = Arc::downgrade(&self.entries);
        let key = address.clone();
        let id = connection.id();
        connection.on_before_close(move || {
            let Some(entries) = registry.upgrade() else {
                return;
            };
            let mut entries = lock(&entries);
            if entries.get(&key).is_some_and(|current| current.id() == id) {
                entries.remove(&key);
                debug!(address = %key, "removed closing connection from registry");
            }
        });

        entries.insert(address.clone(), connection.clone());
        Ok(connection)
    }

    /// Release `holder` from the connection for `address`.
    ///
    /// Returns `true` if that closed the connection.
    pub fn release(&self, holder: Holder, address: &DaemonAddress) -> bool {
        let connection = lock(&self.entries).get(address).cloned();
        connection.is_some_and(|connection| connection.release(holder))
    }

    /// The open connection for `address`, if any, without taking a hold.
    pub fn get(&self, address: &DaemonAddress) -> Option<Connection> {
        lock(&self.entries)
            .get(address)
            .filter(|connection| !connection.is_closed())
            .cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Close every registered connection regardless of holders.
    pub fn close_all(&self) {
        let connections: Vec<Connection> = lock(&self.entries).drain().map(|(_, c)| c).collect();
        for connection in connections {
            connection.close();
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
