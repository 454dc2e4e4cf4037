//! Error types for the dropbox2pages library.
//!
//! Two tiers of error reflect two distinct failure modes:
//!
//! * [`MigrateError`] — **Fatal**: the run cannot proceed or cannot finish
//!   (unreadable spreadsheet, invalid configuration, unwritable output
//!   directory). Returned as `Err(MigrateError)` from the top-level
//!   `migrate*` functions.
//!
//! * [`ItemError`] — **Non-fatal**: a single image failed to download
//!   ([`FetchError`]) or to upload ([`UploadError`]) while every other image
//!   is fine. Stored inside [`crate::mapping::MappingEntry`] and written to
//!   the mapping file so the run always ends with a complete report.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the dropbox2pages library.
///
/// Per-image failures use [`ItemError`] and are recorded in the
/// [`crate::mapping::MappingTable`] rather than propagated here.
#[derive(Debug, Error)]
pub enum MigrateError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input spreadsheet was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but could not be parsed as delimited text.
    #[error("Could not read '{path}' as CSV: {detail}")]
    InputUnreadable { path: PathBuf, detail: String },

    /// The header row is missing or has no columns.
    #[error("Input '{path}' has no columns\nA header row is required.")]
    EmptyTable { path: PathBuf },

    /// A column requested in the configuration does not exist in the input.
    #[error("Column '{column}' not found in input (available: {available})")]
    UnknownColumn { column: String, available: String },

    // ── Repository errors ─────────────────────────────────────────────────
    /// The up-front repository check failed (bad token, missing repo).
    #[error("Repository '{repo}' is not usable: {detail}\nCheck GITHUB_TOKEN has `contents: write` on this repository.")]
    RepositoryUnavailable { repo: String, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write one of the output files.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialising a table to CSV failed.
    #[error("Failed to encode CSV for '{path}': {detail}")]
    OutputEncodeFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a single image could not be downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum FetchError {
    /// No response within the configured timeout.
    #[error("download timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection, TLS or body-read failure.
    #[error("download failed: {reason}")]
    Transport { reason: String },

    /// Server answered with a non-2xx status.
    #[error("download returned HTTP {status}")]
    HttpStatus { status: u16 },

    /// 2xx with a zero-length body.
    #[error("download returned an empty body")]
    EmptyBody,

    /// The host served a web page instead of the file (e.g. a Dropbox preview).
    #[error("download returned '{content_type}' instead of an image")]
    NotAnImage { content_type: String },
}

/// Why a single image could not be committed to the repository.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum UploadError {
    /// 401 — token missing, expired or revoked.
    #[error("unauthorized: {detail}")]
    Unauthorized { detail: String },

    /// 403 without rate-limit headers — token lacks permission.
    #[error("forbidden: {detail}")]
    Forbidden { detail: String },

    /// Primary or secondary rate limit hit.
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// 404 on the contents endpoint — repository or branch does not exist.
    #[error("repository or branch not found")]
    RepositoryNotFound,

    /// 409 / 422 — the file changed underneath us or the sha was stale.
    #[error("conflict writing '{path}': {detail}")]
    Conflict { path: String, detail: String },

    /// The path already holds a file with different content.
    #[error("'{path}' already holds a different file")]
    NameTaken { path: String },

    /// Any other non-2xx status.
    #[error("upload returned HTTP {status}: {detail}")]
    HttpStatus { status: u16, detail: String },

    /// No response within the configured timeout.
    #[error("upload timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection, TLS or decode failure.
    #[error("upload failed: {reason}")]
    Transport { reason: String },
}

/// A non-fatal failure for one candidate URL.
///
/// The variant tells which stage of the item's lifecycle failed; the run
/// continues with the next URL either way.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    #[error("fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("upload failed for {filename}: {source}")]
    Upload {
        filename: String,
        #[source]
        source: UploadError,
    },
}

impl ItemError {
    /// Short reason without the URL/filename prefix, used in the mapping file.
    pub fn reason(&self) -> String {
        match self {
            ItemError::Fetch { source, .. } => source.to_string(),
            ItemError::Upload { source, .. } => source.to_string(),
        }
    }
}
