//! # pagehost
//!
//! **Multi-tenant static-site host with versioned deployments.**
//!
//! Uploaded archives become live sites through a pipeline that never leaves
//! a site half-deployed, and every deploy leaves a rollback point behind:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           pagehost                               │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  upload ─► extract (containment-checked) ─► normalize            │
//! │     ─► checkpoint outgoing root ─► atomic swap ─► recount        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Host header ─► resolver (copy-on-write snapshot table)          │
//! │     ─► site root ─► static file                                  │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  registry: sites.json        checkpoints: per-site metadata.json │
//! │            (load→modify→save)             + {id}.tar.gz archives │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Subsystems
//!
//! - [`store`]: the durable site registry, a single JSON document holding
//!   all sites across tenants; every mutation is load → modify → save with
//!   a crash-safe replace.
//! - [`extract`] / [`normalize`] / [`swap`]: the deployment pipeline —
//!   untrusted-archive extraction with path containment and symlink
//!   rejection, single-wrapper flattening, and rename-based atomic root
//!   replacement with rollback.
//! - [`checkpoint`]: content-addressed snapshots of site roots with a
//!   `current` pointer, checkout (rollback), and storage accounting. All
//!   mutations for one site serialize on a per-site lock.
//! - [`resolver`]: the copy-on-write `domain → snapshot` table serving
//!   every inbound request without reader contention.
//! - [`deploy`]: the orchestrator binding the pipeline together with the
//!   deploy failure semantics (checkpoint failures are non-fatal, swap
//!   failures restore the backup).
//! - [`server`] / [`api`] / [`serve`]: axum wiring, the Basic-Auth admin
//!   API under `/_api`, and Host-routed public static serving.
//!
//! # Security Model
//!
//! Archives are hostile input. Extraction re-roots every entry under the
//! staging directory, rejects symlink and hardlink entries, and bounds
//! entry counts; the serving path applies the same containment to request
//! paths. A rejected archive never touches the live tree.

pub mod api;
pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod deploy;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod resolver;
pub mod serve;
pub mod server;
pub mod site;
pub mod store;
pub mod swap;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointSource, DiskUsage};
pub use config::Config;
pub use deploy::{DeployOutcome, DeploymentOrchestrator};
pub use error::{Error, Result};
pub use resolver::SiteResolver;
pub use site::{Site, SiteSnapshot};
pub use store::SiteStore;
