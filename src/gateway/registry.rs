//! Service discovery and correlation tables.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use dashmap::DashMap;

use crate::connection::ConnectionHandle;

#[derive(Debug, Default)]
struct Routes {
    providers: HashMap<String, Vec<ConnectionHandle>>,
    calls: HashMap<String, usize>,
}

/// Route table, round-robin counters, ping set and open-connection map.
///
/// The route table and its counters sit behind one mutex so selecting a
/// provider and advancing the counter happen atomically. The ping set and
/// the open-connection map are independent keyed tables.
#[derive(Debug, Default)]
pub struct Registry {
    routes: Mutex<Routes>,
    ping: DashMap<String, ConnectionHandle>,
    open: DashMap<String, ConnectionHandle>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn routes(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `provider` to each route in `routes`, resetting each route's
    /// counter, and add it to the ping set.
    pub fn register(&self, provider: &ConnectionHandle, routes: &[String]) {
        let mut table = self.routes();
        for route in routes {
            table
                .providers
                .entry(route.clone())
                .or_default()
                .push(provider.clone());
            table.calls.insert(route.clone(), 0);
        }
        drop(table);
        self.ping
            .insert(provider.remote_addr().to_owned(), provider.clone());
    }

    /// Pick the next provider for `route`.
    ///
    /// The counter is incremented before indexing, so right after
    /// registration the second provider is chosen first.
    #[must_use]
    pub fn dispatch(&self, route: &str) -> Option<ConnectionHandle> {
        let mut table = self.routes();
        let Routes { providers, calls } = &mut *table;
        let list = providers.get(route).filter(|list| !list.is_empty())?;
        let count = calls.entry(route.to_owned()).or_insert(0);
        *count = count.wrapping_add(1);
        Some(list[*count % list.len()].clone())
    }

    /// Remove every entry whose remote address matches `provider`'s, from the
    /// ping set and from every route. Returns the number of route entries
    /// removed.
    pub fn deregister(&self, provider: &ConnectionHandle) -> usize {
        let addr = provider.remote_addr();
        self.ping.remove(addr);
        let mut removed = 0;
        for list in self.routes().providers.values_mut() {
            let before = list.len();
            list.retain(|conn| conn.remote_addr() != addr);
            removed += before - list.len();
        }
        removed
    }

    /// Snapshot of the ping set.
    #[must_use]
    pub fn ping_targets(&self) -> Vec<(String, ConnectionHandle)> {
        self.ping
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Number of providers in the ping set.
    #[must_use]
    pub fn provider_count(&self) -> usize { self.ping.len() }

    /// Remote addresses serving `route`, in registration order.
    #[must_use]
    pub fn providers(&self, route: &str) -> Vec<String> {
        self.routes()
            .providers
            .get(route)
            .map(|list| list.iter().map(|c| c.remote_addr().to_owned()).collect())
            .unwrap_or_default()
    }

    /// Remember `conn` as waiting for the response correlated by `id`.
    pub fn track_open(&self, id: impl Into<String>, conn: ConnectionHandle) {
        self.open.insert(id.into(), conn);
    }

    /// Remove and return the connection waiting on `id`.
    #[must_use]
    pub fn take_open(&self, id: &str) -> Option<ConnectionHandle> {
        self.open.remove(id).map(|(_, conn)| conn)
    }

    /// Drop `conn` from the open-connection map if it is still the entry
    /// stored under its address.
    pub fn forget_open(&self, conn: &ConnectionHandle) {
        self.open
            .remove_if(conn.remote_addr(), |_, stored| stored.id() == conn.id());
    }

    /// Number of external connections awaiting a response.
    #[must_use]
    pub fn open_count(&self) -> usize { self.open.len() }
}
