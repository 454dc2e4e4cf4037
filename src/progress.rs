//! Progress-callback trait for per-image migration events.
//!
//! Inject an [`Arc<dyn MigrationProgressCallback>`] via
//! [`crate::config::MigrationConfigBuilder::progress_callback`] to receive
//! events as the pipeline processes each candidate URL.
//!
//! # Example
//!
//! ```rust
//! use dropbox2pages::{MigrationConfig, MigrationProgressCallback, RepoCoordinates};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl MigrationProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, index: usize, total: usize, published_url: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} → {}", index, total, published_url);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = MigrationConfig::builder()
//!     .repo(RepoCoordinates::new("owner", "repo"))
//!     .token("ghp_example")
//!     .progress_callback(counter as Arc<dyn MigrationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;
use std::time::Duration;

/// Called by the migration pipeline as it processes each candidate URL.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Indices are 1-based.
pub trait MigrationProgressCallback: Send + Sync {
    /// Called once after extraction, before the first download.
    fn on_migration_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before an item is downloaded.
    fn on_item_start(&self, index: usize, total: usize, url: &str) {
        let _ = (index, total, url);
    }

    /// Called when an item was uploaded (or already present under `Skip`).
    fn on_item_complete(&self, index: usize, total: usize, published_url: &str) {
        let _ = (index, total, published_url);
    }

    /// Called when an item failed to download or upload.
    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called when the pacer is about to sleep.
    fn on_pause(&self, duration: Duration) {
        let _ = duration;
    }

    /// Called once after every item has been attempted.
    fn on_migration_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl MigrationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::MigrationConfig`].
pub type ProgressCallback = Arc<dyn MigrationProgressCallback>;
