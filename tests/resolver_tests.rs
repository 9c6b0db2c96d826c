//! Tests for the copy-on-write site resolver.
//!
//! Validates publish/unpublish semantics, reload convergence, and that
//! readers stay coherent while writers republish the table.

use pagehost::resolver::SiteResolver;
use pagehost::site::Site;
use pagehost::store::SiteStore;
use std::sync::Arc;
use tempfile::TempDir;

fn resolver_over(temp: &TempDir) -> (Arc<SiteStore>, SiteResolver) {
    let store = Arc::new(SiteStore::new(temp.path()));
    let resolver = SiteResolver::new(store.clone());
    (store, resolver)
}

// =============================================================================
// Publish / Lookup Tests
// =============================================================================

#[test]
fn test_add_publishes_enabled_site() {
    let temp = TempDir::new().unwrap();
    let (_store, resolver) = resolver_over(&temp);

    resolver.add(&Site::new("blog", "blog.localhost", "")).unwrap();

    let snapshot = resolver.get("blog.localhost").expect("published");
    assert_eq!(snapshot.id, "blog");
    assert_eq!(snapshot.username, "default");
    assert_eq!(snapshot.root_dir, std::path::PathBuf::from("default/blog"));
}

#[test]
fn test_get_strips_port() {
    let temp = TempDir::new().unwrap();
    let (_store, resolver) = resolver_over(&temp);
    resolver.add(&Site::new("blog", "blog.localhost", "")).unwrap();

    assert!(resolver.get("blog.localhost:9999").is_some());
    assert!(resolver.get("blog.localhost:80").is_some());
    assert!(resolver.get("other.localhost:9999").is_none());
}

#[test]
fn test_disabled_site_not_published() {
    let temp = TempDir::new().unwrap();
    let (store, resolver) = resolver_over(&temp);

    let mut site = Site::new("blog", "blog.localhost", "");
    site.enabled = false;
    resolver.add(&site).unwrap();

    assert!(resolver.get("blog.localhost").is_none(), "disabled sites are invisible");
    assert_eq!(store.load().unwrap().len(), 1, "but present in the registry");
    assert_eq!(resolver.count(), 0);
}

#[test]
fn test_lookup_by_id_for_user() {
    let temp = TempDir::new().unwrap();
    let (_store, resolver) = resolver_over(&temp);
    resolver.add(&Site::new("blog", "alice.localhost", "alice")).unwrap();
    resolver.add(&Site::new("blog", "bob.localhost", "bob")).unwrap();

    let snapshot = resolver.get_by_id_for_user("bob", "blog").expect("found");
    assert_eq!(snapshot.domain, "bob.localhost");
    assert!(resolver.get_by_id_for_user("carol", "blog").is_none());
}

// =============================================================================
// Update / Remove Tests
// =============================================================================

#[test]
fn test_update_disable_unpublishes() {
    let temp = TempDir::new().unwrap();
    let (_store, resolver) = resolver_over(&temp);
    resolver.add(&Site::new("blog", "blog.localhost", "")).unwrap();

    let mut site = resolver
        .get("blog.localhost")
        .map(|s| Site::new(s.id.clone(), s.domain.clone(), &s.username))
        .unwrap();
    site.enabled = false;
    resolver.update(&site).unwrap();

    assert!(resolver.get("blog.localhost").is_none());

    // Re-enable brings it back.
    site.enabled = true;
    resolver.update(&site).unwrap();
    assert!(resolver.get("blog.localhost").is_some());
}

#[test]
fn test_update_domain_change_moves_entry() {
    let temp = TempDir::new().unwrap();
    let (store, resolver) = resolver_over(&temp);
    resolver.add(&Site::new("blog", "old.localhost", "")).unwrap();

    let mut site = store.get("default", "blog").unwrap();
    site.domain = "new.localhost".to_string();
    resolver.update(&site).unwrap();

    assert!(resolver.get("old.localhost").is_none(), "stale domain is gone");
    assert!(resolver.get("new.localhost").is_some());
}

#[test]
fn test_remove_unpublishes_and_deletes() {
    let temp = TempDir::new().unwrap();
    let (store, resolver) = resolver_over(&temp);
    resolver.add(&Site::new("blog", "blog.localhost", "")).unwrap();

    resolver.remove_for_user("default", "blog").unwrap();

    assert!(resolver.get("blog.localhost").is_none());
    assert!(store.load().unwrap().is_empty());
}

// =============================================================================
// Reload Convergence Tests
// =============================================================================

#[test]
fn test_reload_converges_on_registry_state() {
    let temp = TempDir::new().unwrap();
    let (store, resolver) = resolver_over(&temp);

    // Mutate the registry behind the resolver's back.
    store.add(&Site::new("a", "a.localhost", "")).unwrap();
    store.add(&Site::new("b", "b.localhost", "")).unwrap();
    let mut disabled = Site::new("c", "c.localhost", "");
    disabled.enabled = false;
    store.add(&disabled).unwrap();

    resolver.load().unwrap();

    assert_eq!(resolver.count(), 2);
    assert!(resolver.get("a.localhost").is_some());
    assert!(resolver.get("b.localhost").is_some());
    assert!(resolver.get("c.localhost").is_none());

    // Reload from any prior state produces the same table.
    resolver.load().unwrap();
    assert_eq!(resolver.count(), 2);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_readers_stay_coherent_during_writes() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(SiteStore::new(temp.path()));
    let resolver = Arc::new(SiteResolver::new(store));

    resolver.add(&Site::new("blog", "blog.localhost", "")).unwrap();

    let mut readers = Vec::new();
    for _ in 0..8 {
        let resolver = resolver.clone();
        readers.push(std::thread::spawn(move || {
            for _ in 0..200 {
                // Whatever table version a reader sees, the entry it finds
                // must be internally consistent.
                if let Some(snapshot) = resolver.get("blog.localhost") {
                    assert_eq!(snapshot.id, "blog");
                    assert_eq!(snapshot.domain, "blog.localhost");
                }
            }
        }));
    }

    for i in 0..20 {
        let mut site = Site::new("blog", "blog.localhost", "");
        site.enabled = i % 2 == 0;
        resolver.update(&site).unwrap();
    }

    for handle in readers {
        handle.join().unwrap();
    }

    // Leave the site enabled; the final table reflects the last write.
    let mut site = Site::new("blog", "blog.localhost", "");
    site.enabled = true;
    resolver.update(&site).unwrap();
    assert!(resolver.get("blog.localhost").is_some());
}
