//! # dropbox2pages
//!
//! Move product images referenced from a spreadsheet off Dropbox and onto
//! GitHub Pages, then hand back a copy of the spreadsheet that points at the
//! new URLs.
//!
//! ## Why this crate?
//!
//! Dropbox share links make poor image hosts: they answer with an HTML
//! preview page unless the link is rewritten, they get rate-limited, and
//! they break when the file is moved. A GitHub Pages repository gives every
//! image a stable, cacheable URL. This crate does the tedious part: find
//! every Dropbox URL in a product export, copy each image into the
//! repository once, and rewrite the export.
//!
//! ## Pipeline Overview
//!
//! ```text
//! CSV
//!  │
//!  ├─ 1. Input    parse the table, pick the image/URL columns
//!  ├─ 2. Extract  distinct Dropbox URLs, first-seen order
//!  ├─ 3. Fetch    download bytes (dl=0 → dl=1), reject HTML / empty bodies
//!  ├─ 4. Upload   commit to {dest}/{filename} via the contents API
//!  ├─ 5. Pace     pause every K uploads, honour rate-limit headers
//!  └─ 6. Output   rewritten CSV + original→published mapping CSV
//! ```
//!
//! Items are processed one at a time. A failure on one URL is recorded in
//! the mapping and the run moves on; only unreadable input, bad
//! configuration, or an unusable repository stop it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dropbox2pages::{migrate_to_files, MigrationConfig, OutputPaths, RepoCoordinates};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MigrationConfig::builder()
//!         .token(std::env::var("GITHUB_TOKEN")?)
//!         .repo(RepoCoordinates::parse("acme/product-images")?)
//!         .build()?;
//!     let paths = OutputPaths::beside("products.csv");
//!     let stats = migrate_to_files("products.csv", &paths, &config).await?;
//!     eprintln!("{}/{} images migrated", stats.succeeded(), stats.candidates);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `dropbox2pages` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! dropbox2pages = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod mapping;
pub mod migrate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod table;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CollisionPolicy, MigrationConfig, MigrationConfigBuilder, RepoCoordinates, RewriteMode,
};
pub use error::{FetchError, ItemError, MigrateError, UploadError};
pub use mapping::{ItemState, MappingEntry, MappingTable};
pub use migrate::{migrate, migrate_sync, migrate_to_files, plan};
pub use output::{MigrationOutput, MigrationPlan, MigrationStats, PlannedItem};
pub use pipeline::fetch::{FetchedImage, HttpImageFetcher, ImageSource};
pub use pipeline::upload::{ContentStore, GitHubUploader, UploadOutcome, UploadReceipt};
pub use pipeline::write::OutputPaths;
pub use progress::{MigrationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use table::{Row, Table};
