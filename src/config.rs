//! Server configuration.
//!
//! Configuration lives in a TOML file and covers the server only; site data
//! is owned by the registry. On first boot the file is created with defaults
//! so a bare `pagehost` invocation comes up self-contained. Every field can
//! be overridden through a `PAGES_*` environment variable; overrides are
//! applied in memory and never written back to the file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port the HTTP server binds on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Log level filter (`error`, `warn`, `info`, `debug`, `trace`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory holding the site registry and other host data.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Root directory of live site trees.
    #[serde(default = "default_sites_dir")]
    pub sites_dir: PathBuf,
    /// Basic Auth username for the admin API.
    #[serde(default = "default_admin_user")]
    pub admin_user: String,
    /// Basic Auth password for the admin API.
    #[serde(default = "default_admin_pass")]
    pub admin_pass: String,
}

fn default_port() -> u16 {
    1323
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_sites_dir() -> PathBuf {
    PathBuf::from("./data/sites")
}

fn default_admin_user() -> String {
    "admin".to_string()
}

fn default_admin_pass() -> String {
    "admin".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: default_port(),
                log_level: default_log_level(),
                data_dir: default_data_dir(),
                sites_dir: default_sites_dir(),
                admin_user: default_admin_user(),
                admin_pass: default_admin_pass(),
            },
        }
    }
}

impl Config {
    /// Loads configuration from `path`, creating the file with defaults if
    /// it does not exist yet. Returns the config and whether it was created.
    ///
    /// Environment overrides are applied after the file is read. On first
    /// boot they are applied before the file is written, so the created file
    /// reflects the effective configuration.
    pub fn load_or_init(path: &Path, env_override: bool) -> Result<(Self, bool)> {
        let mut created = false;

        if !path.exists() {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            if let Err(e) = cfg.save(path) {
                warn!(path = %path.display(), error = %e, "failed to write default config, continuing with in-memory defaults");
                return Ok((cfg, true));
            }
            created = true;
        }

        let data = fs::read_to_string(path).map_err(|e| Error::Config {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        let mut cfg: Config = toml::from_str(&data).map_err(|e| Error::Config {
            reason: format!("failed to parse {}: {}", path.display(), e),
        })?;

        if env_override {
            apply_env_overrides(&mut cfg);
        }

        Ok((cfg, created))
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = toml::to_string_pretty(self).map_err(|e| Error::Config {
            reason: format!("failed to serialize config: {}", e),
        })?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, data)?;
        Ok(())
    }

    /// Directory holding per-site checkpoint metadata and archives.
    ///
    /// Lives beside the sites dir rather than inside it so checkpoint
    /// archives never collide with a tenant directory.
    pub fn checkpoints_dir(&self) -> PathBuf {
        let mut name = self
            .server
            .sites_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sites".to_string());
        name.push_str(crate::constants::CHECKPOINTS_DIR_SUFFIX);
        match self.server.sites_dir.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }
}

/// Applies `PAGES_*` environment variables on top of `cfg`.
fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PAGES_PORT") {
        match v.parse() {
            Ok(port) => cfg.server.port = port,
            Err(_) => warn!(value = %v, "ignoring invalid PAGES_PORT"),
        }
    }
    if let Ok(v) = std::env::var("PAGES_LOG_LEVEL") {
        cfg.server.log_level = v;
    }
    if let Ok(v) = std::env::var("PAGES_DATA_DIR") {
        cfg.server.data_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("PAGES_SITES_DIR") {
        cfg.server.sites_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("PAGES_ADMIN_USER") {
        cfg.server.admin_user = v;
    }
    if let Ok(v) = std::env::var("PAGES_ADMIN_PASS") {
        cfg.server.admin_pass = v;
    }
}
