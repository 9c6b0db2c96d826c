//! Constants for the site host.
//!
//! All limits, file names, and retry policy are defined here to ensure
//! consistency and prevent magic numbers throughout the codebase.

use std::time::Duration;

// =============================================================================
// Registry and Checkpoint Layout
// =============================================================================

/// File name of the site registry inside the data directory.
pub const SITES_FILE: &str = "sites.json";

/// Per-site checkpoint metadata file name.
pub const METADATA_FILE: &str = "metadata.json";

/// Subdirectory holding checkpoint archives within a site's checkpoint dir.
pub const CHECKPOINTS_SUBDIR: &str = "checkpoints";

/// Suffix appended to a sites dir to form the checkpoint base dir.
pub const CHECKPOINTS_DIR_SUFFIX: &str = "-checkpoints";

/// File extension of checkpoint archives.
pub const CHECKPOINT_ARCHIVE_EXT: &str = ".tar.gz";

/// Timestamp layout of the leading checkpoint id component.
pub const CHECKPOINT_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Hex characters of the content hash kept in a checkpoint id.
pub const CHECKPOINT_HASH_LEN: usize = 8;

// =============================================================================
// Site Defaults
// =============================================================================

/// Tenant used when a request does not name one.
pub const DEFAULT_USERNAME: &str = "default";

/// Index file served for directory requests unless the site overrides it.
pub const DEFAULT_INDEX_FILE: &str = "index.html";

/// Fallback page looked up in the site root on a missing file.
pub const NOT_FOUND_PAGE: &str = "404.html";

// =============================================================================
// Archive Limits
// =============================================================================

/// Maximum accepted upload size (512 MiB).
/// Prevents disk exhaustion from oversized archives.
pub const MAX_ARCHIVE_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of entries in an uploaded archive.
/// Prevents inode exhaustion from crafted archives.
pub const MAX_ARCHIVE_ENTRIES: usize = 65_536;

/// macOS resource-fork directory ignored during normalization.
pub const MACOS_METADATA_DIR: &str = "__MACOSX";

// =============================================================================
// Swap Retry Policy
// =============================================================================

/// Rename attempts during an atomic directory swap.
/// Transient filesystem locks (notably on Windows) clear within a few retries.
pub const SWAP_MAX_RETRIES: u32 = 5;

/// Rename attempts when restoring a backup after a failed swap.
pub const RESTORE_MAX_RETRIES: u32 = 3;

/// Base delay between rename retries; multiplied by the attempt number.
pub const SWAP_RETRY_DELAY: Duration = Duration::from_millis(100);

// =============================================================================
// Server
// =============================================================================

/// Prefix under which the admin API is mounted.
pub const ADMIN_API_PREFIX: &str = "/_api";

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "PAGES_";

/// Deadline for in-flight requests to drain on shutdown.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);
