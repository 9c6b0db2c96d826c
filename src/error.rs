//! Error types for the site host.

use std::path::PathBuf;

/// Result type alias for site host operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing sites, deployments, and checkpoints.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Registry Errors
    // =========================================================================
    /// Site id already taken within the tenant.
    #[error("site id '{id}' already exists for tenant '{username}'")]
    SiteIdExists { username: String, id: String },

    /// Domain already bound to another site.
    #[error("domain '{domain}' is already bound to a site")]
    DomainTaken { domain: String },

    /// Site not found.
    #[error("site '{id}' not found for tenant '{username}'")]
    SiteNotFound { username: String, id: String },

    /// Registry file could not be read or written.
    #[error("site registry error: {reason}")]
    Store { reason: String },

    // =========================================================================
    // Archive Errors
    // =========================================================================
    /// Upload filename does not carry a supported archive suffix.
    #[error("unsupported archive format: {name} (expected .zip, .tar or .tar.gz)")]
    ArchiveFormat { name: String },

    /// Archive entry would land outside the extraction directory.
    #[error("archive entry escapes extraction root: {path}")]
    PathEscape { path: String },

    /// Archive contains a symlink or hardlink entry.
    #[error("symlinks are not allowed in archives: {path}")]
    SymlinkForbidden { path: String },

    /// Archive parsing or entry I/O failure.
    #[error("failed to extract archive: {reason}")]
    Extract { reason: String },

    // =========================================================================
    // Deployment Errors
    // =========================================================================
    /// Atomic directory replacement failed (backup restore already attempted).
    #[error("failed to swap site root '{path}': {reason}")]
    SwapFailed { path: PathBuf, reason: String },

    // =========================================================================
    // Checkpoint Errors
    // =========================================================================
    /// Checkpoint id not present in metadata, or its archive file is gone.
    #[error("checkpoint not found: {id}")]
    CheckpointMissing { id: String },

    /// The currently active checkpoint cannot be deleted.
    #[error("cannot delete the currently active checkpoint: {id}")]
    CurrentCheckpointUndeletable { id: String },

    /// Checkpoint packing, metadata, or restore failure.
    #[error("checkpoint operation failed: {reason}")]
    Checkpoint { reason: String },

    // =========================================================================
    // Ambient Errors
    // =========================================================================
    /// Configuration file failure.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for errors caused by the uploaded content rather than the host.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::ArchiveFormat { .. }
                | Error::PathEscape { .. }
                | Error::SymlinkForbidden { .. }
                | Error::Extract { .. }
        )
    }
}
