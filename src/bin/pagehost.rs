//! pagehost - multi-tenant static-site host.
//!
//! ## Usage
//!
//! ```sh
//! pagehost [--config <path>]
//! ```
//!
//! Configuration comes from a TOML file (created with defaults on first
//! boot) with `PAGES_*` environment overrides. The server publishes every
//! enabled site by `Host` header and exposes the admin API under `/_api`.

use pagehost::config::Config;
use pagehost::server::{self, AppState};
use pagehost::site::{self, Site};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Default configuration file path.
const CONFIG_PATH: &str = "config.toml";

fn parse_args() -> Result<PathBuf, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = PathBuf::from(CONFIG_PATH);

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    return Err("--config requires a path".to_string());
                }
            }
            "--help" | "-h" => {
                println!("usage: pagehost [--config <path>]");
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {}", other)),
        }
    }

    Ok(config_path)
}

fn init_tracing(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = match parse_args() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (config, created) = match Config::load_or_init(&config_path, true) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.server.log_level);
    if created {
        info!(path = %config_path.display(), "wrote default configuration file");
    }

    let checkpoints_dir = config.checkpoints_dir();
    let state = AppState::new(config.server.clone(), checkpoints_dir);

    if let Err(e) = bootstrap_sites(&state) {
        error!(error = %e, "site bootstrap failed");
        return ExitCode::FAILURE;
    }

    match server::run(state).await {
        Ok(()) => {
            info!("server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "server exited with error");
            ExitCode::FAILURE
        }
    }
}

/// Loads the registry into the resolver, seeding default sites on a fresh
/// install, and makes sure every published site has a root to serve.
fn bootstrap_sites(state: &AppState) -> pagehost::Result<()> {
    state.resolver.load()?;

    if state.resolver.count() == 0 {
        info!("empty registry, creating default sites");
        for default in [
            Site::new("default", "localhost", ""),
            Site::new("example", "example.localhost", ""),
        ] {
            state.resolver.add(&default)?;
        }
    }

    for snapshot in state.resolver.list() {
        let mut placeholder = Site::new(
            snapshot.id.clone(),
            snapshot.domain.clone(),
            &snapshot.username,
        );
        placeholder.index = snapshot.index.clone();
        if let Err(e) = site::initialize_site_root(&state.config.sites_dir, &placeholder) {
            warn!(domain = %snapshot.domain, error = %e, "failed to initialize site root");
        }
    }

    info!(sites = state.resolver.count(), "sites published");
    Ok(())
}
