//! Site model.
//!
//! A [`Site`] is the registry's unit of ownership: a `(username, id)` pair
//! bound to a domain and a directory of static files. The serving path never
//! touches `Site` directly; it reads [`SiteSnapshot`] values published by the
//! resolver, which carry only the fields needed to answer a request.

use crate::constants::{DEFAULT_INDEX_FILE, DEFAULT_USERNAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A tenant-owned publishable unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Site {
    /// Unique within the tenant; doubles as the site's directory name.
    pub id: String,
    /// Tenant identifier.
    #[serde(default = "default_username")]
    pub username: String,
    /// Exact `Host` value (without port) routed to this site. Globally unique.
    pub domain: String,
    /// Default file served for directory requests.
    #[serde(default = "default_index")]
    pub index: String,
    /// Disabled sites stay in the registry but are absent from the resolver.
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

fn default_index() -> String {
    DEFAULT_INDEX_FILE.to_string()
}

impl Site {
    /// Creates an enabled site for a tenant. An empty `username` falls back
    /// to the default tenant.
    pub fn new(id: impl Into<String>, domain: impl Into<String>, username: &str) -> Self {
        let now = Utc::now();
        let username = if username.is_empty() {
            DEFAULT_USERNAME.to_string()
        } else {
            username.to_string()
        };
        Self {
            id: id.into(),
            username,
            domain: domain.into(),
            index: DEFAULT_INDEX_FILE.to_string(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Absolute root directory of the live tree: `{base}/{username}/{id}`.
    /// Derived, never stored.
    pub fn root_dir(&self, base: &Path) -> PathBuf {
        base.join(&self.username).join(&self.id)
    }

    /// Root directory relative to the sites base.
    pub fn relative_root_dir(&self) -> PathBuf {
        PathBuf::from(&self.username).join(&self.id)
    }

    /// Produces the resolver's read-only view of this site.
    pub fn snapshot(&self) -> SiteSnapshot {
        SiteSnapshot {
            id: self.id.clone(),
            username: self.username.clone(),
            domain: self.domain.clone(),
            index: self.index.clone(),
            enabled: self.enabled,
            root_dir: self.relative_root_dir(),
        }
    }
}

/// Immutable per-request view of a site, published by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSnapshot {
    pub id: String,
    pub username: String,
    pub domain: String,
    pub index: String,
    pub enabled: bool,
    /// Root directory relative to the sites base.
    pub root_dir: PathBuf,
}

/// Creates the live root for `site` if missing and drops in a placeholder
/// index page, so a freshly registered site serves something before its
/// first deploy. Existing files are never touched.
pub fn initialize_site_root(sites_dir: &Path, site: &Site) -> io::Result<()> {
    let root = site.root_dir(sites_dir);
    fs::create_dir_all(&root)?;

    let index_path = root.join(&site.index);
    if !index_path.exists() {
        fs::write(&index_path, placeholder_index(&site.domain))?;
    }
    Ok(())
}

fn placeholder_index(domain: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{domain}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            max-width: 800px;
            margin: 100px auto;
            padding: 20px;
            text-align: center;
        }}
        h1 {{ color: #333; }}
        p {{ color: #666; }}
        .domain {{ color: #007bff; font-weight: bold; }}
    </style>
</head>
<body>
    <h1>Welcome</h1>
    <p>This static site is bound to <span class="domain">{domain}</span>.</p>
    <p>Deploy an archive to replace this placeholder.</p>
</body>
</html>
"#
    )
}
