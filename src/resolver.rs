//! Copy-on-write site resolver.
//!
//! The resolver serves the hot path: every inbound request maps its `Host`
//! header to a [`SiteSnapshot`] through a single immutable `domain → snapshot`
//! table. Readers clone an `Arc` pointer and walk away; they never wait on a
//! writer building a new table.
//!
//! Writers serialize on a dedicated mutex, clone the current table, apply
//! their mutation, and publish the result wholesale. Readers in flight keep
//! the old table alive until their `Arc` drops. The registry is always
//! written first; the resolver is a view, not a source of truth.

use crate::error::Result;
use crate::site::{Site, SiteSnapshot};
use crate::store::SiteStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

type SnapshotTable = HashMap<String, Arc<SiteSnapshot>>;

/// Lock-free (for readers) domain → site mapping.
pub struct SiteResolver {
    /// Published table. The read-side critical section is a pointer clone.
    table: RwLock<Arc<SnapshotTable>>,
    /// Serializes writers so concurrent mutations apply in a total order.
    write_lock: Mutex<()>,
    store: Arc<SiteStore>,
}

impl SiteResolver {
    pub fn new(store: Arc<SiteStore>) -> Self {
        Self {
            table: RwLock::new(Arc::new(HashMap::new())),
            write_lock: Mutex::new(()),
            store,
        }
    }

    /// Rebuilds the table from the registry (enabled sites only) and
    /// publishes it, replacing whatever was there before.
    pub fn load(&self) -> Result<()> {
        let sites = self.store.load()?;

        let _writer = self.write_lock.lock().expect("resolver write lock poisoned");
        let mut table = SnapshotTable::new();
        for site in sites.iter().filter(|s| s.enabled) {
            table.insert(site.domain.clone(), Arc::new(site.snapshot()));
        }
        let count = table.len();
        self.publish(table);
        debug!(sites = count, "resolver table rebuilt");
        Ok(())
    }

    /// Resolves a `Host` header value. The port suffix, if any, is ignored.
    pub fn get(&self, host: &str) -> Option<Arc<SiteSnapshot>> {
        let domain = host.split(':').next().unwrap_or(host);
        self.current().get(domain).cloned()
    }

    /// Looks a snapshot up by tenant and id.
    pub fn get_by_id_for_user(&self, username: &str, id: &str) -> Option<Arc<SiteSnapshot>> {
        self.current()
            .values()
            .find(|s| s.username == username && s.id == id)
            .cloned()
    }

    /// All published (enabled) snapshots.
    pub fn list(&self) -> Vec<Arc<SiteSnapshot>> {
        self.current().values().cloned().collect()
    }

    /// Number of published sites.
    pub fn count(&self) -> usize {
        self.current().len()
    }

    /// True when a published site already owns `domain`.
    pub fn exists(&self, domain: &str) -> bool {
        self.current().contains_key(domain)
    }

    /// Persists a new site and publishes it when enabled.
    pub fn add(&self, site: &Site) -> Result<()> {
        self.store.add(site)?;

        if site.enabled {
            let _writer = self.write_lock.lock().expect("resolver write lock poisoned");
            let mut table = (*self.current()).clone();
            table.insert(site.domain.clone(), Arc::new(site.snapshot()));
            self.publish(table);
        }
        Ok(())
    }

    /// Persists an update and republishes. The site's previous domain entry
    /// is dropped regardless of where it pointed; the new entry appears only
    /// when the site is enabled.
    pub fn update(&self, site: &Site) -> Result<()> {
        self.store.update(site)?;

        let _writer = self.write_lock.lock().expect("resolver write lock poisoned");
        let mut table: SnapshotTable = self
            .current()
            .iter()
            .filter(|(_, snap)| !(snap.id == site.id && snap.username == site.username))
            .map(|(d, s)| (d.clone(), s.clone()))
            .collect();
        if site.enabled {
            table.insert(site.domain.clone(), Arc::new(site.snapshot()));
        }
        self.publish(table);
        Ok(())
    }

    /// Removes a site from the registry and unpublishes it. The registry
    /// write comes first; a failed removal leaves the table untouched.
    pub fn remove_for_user(&self, username: &str, id: &str) -> Result<()> {
        self.store.remove_for_user(username, id)?;

        let _writer = self.write_lock.lock().expect("resolver write lock poisoned");
        let table: SnapshotTable = self
            .current()
            .iter()
            .filter(|(_, snap)| !(snap.id == id && snap.username == username))
            .map(|(d, s)| (d.clone(), s.clone()))
            .collect();
        self.publish(table);
        Ok(())
    }

    fn current(&self) -> Arc<SnapshotTable> {
        self.table.read().expect("resolver table poisoned").clone()
    }

    fn publish(&self, table: SnapshotTable) {
        *self.table.write().expect("resolver table poisoned") = Arc::new(table);
    }
}
