//! Published DNS state.
//!
//! A [`Snapshot`] holds one refresh cycle's hosts, services and aliases.
//! [`DnsState`] guards the current snapshot with a single read-write lock:
//! queries hold the read side for the duration of building one answer, and
//! the refresh loop takes the write side only to swap in a fully built
//! replacement. Readers therefore see one whole generation or the next,
//! never a mix.

use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;
use tracing::{debug, info};

use crate::alias::AliasMap;
use crate::metrics;
use crate::normalize::{HostMap, HostRecord, ServiceMap, ServiceRecord};

/// One consistent generation of discovered records.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// hostname -> HostRecord
    pub hosts: HostMap,

    /// service key -> members sorted by hostname
    pub services: ServiceMap,

    /// alias -> target hostname
    pub aliases: AliasMap,

    /// Publish counter; 0 means nothing has been published yet.
    generation: u64,
}

impl Snapshot {
    /// Bundle the three collections of a refresh cycle.
    pub fn new(hosts: HostMap, services: ServiceMap, aliases: AliasMap) -> Self {
        Self {
            hosts,
            services,
            aliases,
            generation: 0,
        }
    }

    /// Generation number assigned at publish time.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Look up a host by fully-qualified name.
    pub fn host(&self, name: &str) -> Option<&HostRecord> {
        self.hosts.get(name)
    }

    /// Look up an alias target by alias name.
    pub fn alias(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    /// Look up the members of a service by service key.
    pub fn service(&self, key: &str) -> Option<&[ServiceRecord]> {
        self.services.get(key).map(Vec::as_slice)
    }
}

/// Thread-safe, atomically swappable DNS state.
#[derive(Debug, Clone, Default)]
pub struct DnsState {
    inner: Arc<RwLock<Snapshot>>,
}

impl DnsState {
    /// Create a new empty DNS state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot with `snapshot`.
    ///
    /// Returns the generation number given to it.
    pub fn publish(&self, mut snapshot: Snapshot) -> u64 {
        let (hosts, services, aliases) = (
            snapshot.hosts.len(),
            snapshot.services.len(),
            snapshot.aliases.len(),
        );

        let generation = {
            let mut inner = self.inner.write();
            snapshot.generation = inner.generation + 1;
            let generation = snapshot.generation;
            *inner = snapshot;
            generation
        };

        if generation == 1 {
            info!(hosts, services, aliases, "first snapshot published");
        } else {
            debug!(generation, hosts, services, aliases, "snapshot published");
        }
        metrics::record_snapshot(hosts, services, aliases, generation);

        generation
    }

    /// Borrow the current snapshot.
    ///
    /// Publishing waits until the guard is dropped, so keep it short-lived.
    pub fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.inner.read()
    }

    /// Check if at least one snapshot has been published.
    pub fn is_ready(&self) -> bool {
        self.inner.read().generation > 0
    }

    /// Get current generation.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Get count of hosts.
    pub fn hosts_count(&self) -> usize {
        self.inner.read().hosts.len()
    }

    /// Get count of published services.
    pub fn services_count(&self) -> usize {
        self.inner.read().services.len()
    }

    /// Get count of aliases.
    pub fn aliases_count(&self) -> usize {
        self.inner.read().aliases.len()
    }
}
