//! Migration entry points.
//!
//! [`migrate`] runs the whole pipeline and returns the rewritten table and
//! the mapping in memory; [`migrate_to_files`] additionally writes both
//! outputs. Items are processed strictly one after another: one URL is
//! fetched, uploaded and recorded before the next one starts, and the only
//! deliberate delay is the [`Pacer`] between batches.

use crate::config::MigrationConfig;
use crate::error::{ItemError, MigrateError, UploadError};
use crate::mapping::{ItemState, MappingTable};
use crate::output::{MigrationOutput, MigrationPlan, MigrationStats, PlannedItem};
use crate::pipeline::extract::{self, direct_download_url};
use crate::pipeline::fetch::{HttpImageFetcher, ImageSource};
use crate::pipeline::filename::FilenameAllocator;
use crate::pipeline::input;
use crate::pipeline::pacer::Pacer;
use crate::pipeline::upload::{ContentStore, GitHubUploader, UploadOutcome};
use crate::pipeline::write::{self, OutputPaths, RewriteOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-URL working state. Only its derived fields outlive the run.
struct ImageRecord {
    original_url: String,
    filename: String,
    bytes: Option<Vec<u8>>,
    published_url: Option<String>,
    state: ItemState,
}

impl ImageRecord {
    fn new(original_url: &str, filename: String) -> Self {
        Self {
            original_url: original_url.to_string(),
            filename,
            bytes: None,
            published_url: None,
            state: ItemState::Pending,
        }
    }

    fn advance(&mut self, next: ItemState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("{}: {:?} -> {:?}", self.original_url, self.state, next);
        self.state = next;
    }
}

/// Migrate every Dropbox image referenced by the spreadsheet at `input`.
///
/// # Returns
/// `Ok(MigrationOutput)` once every candidate has been attempted, even if
/// some of them failed (see `output.stats` and the mapping entries).
///
/// # Errors
/// Only fatal problems: unreadable input, unknown column, invalid
/// configuration, or a failed repository preflight.
pub async fn migrate(
    input: impl AsRef<Path>,
    config: &MigrationConfig,
) -> Result<MigrationOutput, MigrateError> {
    let total_start = Instant::now();
    let input = input.as_ref();
    info!("Starting migration: {}", input.display());

    // ── Step 1: Read input ───────────────────────────────────────────────
    let table = input::read_table(input)?;
    let url_columns = input::resolve_url_columns(&table, &config.url_columns)?;
    if url_columns.is_empty() {
        warn!("No image/URL columns found in {}", input.display());
    }

    // ── Step 2: Extract candidates ───────────────────────────────────────
    let candidates = extract::extract_candidates(&table, &url_columns, &config.source_hosts);
    info!("Found {} unique source image URLs", candidates.len());

    let mut stats = MigrationStats {
        rows: table.rows.len(),
        url_columns: url_columns.iter().map(|&i| table.headers[i].clone()).collect(),
        candidates: candidates.len(),
        ..Default::default()
    };

    // ── Step 3: Fetch + upload, one item at a time ───────────────────────
    let mut mapping = MappingTable::new();
    if !candidates.is_empty() {
        let source = resolve_source(config)?;
        let store = resolve_store(config)?;

        if config.verify_repository {
            store
                .preflight()
                .await
                .map_err(|e| MigrateError::RepositoryUnavailable {
                    repo: config.repo.slug(),
                    detail: e.to_string(),
                })?;
        }

        process_sequential(
            &candidates,
            source.as_ref(),
            store.as_ref(),
            config,
            &mut mapping,
            &mut stats,
        )
        .await;
    }

    // ── Step 4: Rewrite the table ────────────────────────────────────────
    let options = RewriteOptions {
        mode: config.rewrite_mode,
        failure_marker: config.failure_marker.clone(),
    };
    let table = write::rewrite_table(&table, &url_columns, &mapping, &options);

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Migration complete: {}/{} images, {}ms total",
        stats.succeeded(),
        stats.candidates,
        stats.total_duration_ms
    );

    Ok(MigrationOutput {
        table,
        mapping,
        stats,
    })
}

/// Migrate and write both output files.
///
/// Either both files are written or neither is.
pub async fn migrate_to_files(
    input: impl AsRef<Path>,
    paths: &OutputPaths,
    config: &MigrationConfig,
) -> Result<MigrationStats, MigrateError> {
    let output = migrate(input, config).await?;
    write::write_outputs(&output.table, &output.mapping, paths)?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`migrate`].
///
/// Creates a temporary tokio runtime internally.
pub fn migrate_sync(
    input: impl AsRef<Path>,
    config: &MigrationConfig,
) -> Result<MigrationOutput, MigrateError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| MigrateError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(migrate(input, config))
}

/// Work out what a run would do, without touching the network.
///
/// Filenames are allocated exactly as [`migrate`] allocates them, so the
/// planned published URLs match a real run over the same input.
pub fn plan(input: impl AsRef<Path>, config: &MigrationConfig) -> Result<MigrationPlan, MigrateError> {
    let table = input::read_table(input)?;
    let url_columns = input::resolve_url_columns(&table, &config.url_columns)?;
    let candidates = extract::extract_candidates(&table, &url_columns, &config.source_hosts);

    let mut names = FilenameAllocator::new();
    let items = candidates
        .into_iter()
        .map(|url| {
            let filename = names.allocate(&url);
            PlannedItem {
                download_url: direct_download_url(&url),
                repo_path: config.repo.path_for(&filename),
                published_url: config.repo.published_url(&filename),
                original_url: url,
            }
        })
        .collect();

    Ok(MigrationPlan {
        rows: table.rows.len(),
        url_columns: url_columns.iter().map(|&i| table.headers[i].clone()).collect(),
        items,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Injected source, or the HTTP fetcher.
fn resolve_source(config: &MigrationConfig) -> Result<Arc<dyn ImageSource>, MigrateError> {
    if let Some(ref source) = config.source {
        return Ok(Arc::clone(source));
    }
    let fetcher = HttpImageFetcher::new(config.fetch_timeout_secs)
        .map_err(|e| MigrateError::Internal(format!("HTTP client: {e}")))?;
    Ok(Arc::new(fetcher))
}

/// Injected store, or the GitHub uploader.
fn resolve_store(config: &MigrationConfig) -> Result<Arc<dyn ContentStore>, MigrateError> {
    if let Some(ref store) = config.store {
        return Ok(Arc::clone(store));
    }
    Ok(Arc::new(GitHubUploader::new(config)?))
}

async fn process_sequential(
    candidates: &[String],
    source: &dyn ImageSource,
    store: &dyn ContentStore,
    config: &MigrationConfig,
    mapping: &mut MappingTable,
    stats: &mut MigrationStats,
) {
    let total = candidates.len();
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_migration_start(total);
    }

    let mut names = FilenameAllocator::new();
    let mut pacer = Pacer::new(config.batch_size, config.pause, config.max_quota_wait)
        .with_progress(config.progress_callback.clone());

    for (i, url) in candidates.iter().enumerate() {
        let index = i + 1;
        if let Some(cb) = cb {
            cb.on_item_start(index, total, url);
        }

        let mut record = ImageRecord::new(url, names.allocate(url));
        let outcome = migrate_one(
            &mut record,
            source,
            store,
            config,
            &mut names,
            &mut pacer,
            stats,
        )
        .await;

        match &outcome {
            Ok(published) => {
                info!("[{}/{}] {} → {}", index, total, url, published);
                if let Some(cb) = cb {
                    cb.on_item_complete(index, total, published);
                }
            }
            Err(e) => {
                warn!("[{}/{}] {}", index, total, e);
                if let Some(cb) = cb {
                    cb.on_item_error(index, total, &e.to_string());
                }
            }
        }
        mapping.record(url.clone(), outcome);
    }

    if let Some(cb) = cb {
        cb.on_migration_complete(total, mapping.success_count());
    }
}

/// How many alternative names one image may try when the repository already
/// holds different files under them.
const MAX_RENAMES: usize = 8;

/// Drive one record through fetch → upload. Never fails the run.
async fn migrate_one(
    record: &mut ImageRecord,
    source: &dyn ImageSource,
    store: &dyn ContentStore,
    config: &MigrationConfig,
    names: &mut FilenameAllocator,
    pacer: &mut Pacer,
    stats: &mut MigrationStats,
) -> Result<String, ItemError> {
    match source.fetch(&record.original_url).await {
        Ok(image) => {
            record.bytes = Some(image.bytes);
            record.advance(ItemState::Fetched);
        }
        Err(e) => {
            record.advance(ItemState::FetchFailed);
            stats.fetch_failed += 1;
            return Err(ItemError::Fetch {
                url: record.original_url.clone(),
                source: e,
            });
        }
    }

    let mut renames = 0;
    let result = loop {
        let path = config.repo.path_for(&record.filename);
        let message = format!("Add image {}", record.filename);
        pacer.ready().await;
        let result = store
            .put_file(&path, record.bytes.as_deref().unwrap_or_default(), &message)
            .await;
        pacer.note_upload();

        match result {
            Err(UploadError::NameTaken { .. }) if renames < MAX_RENAMES => {
                renames += 1;
                let next = names.alternative(&record.original_url);
                info!("{} holds a different image; trying {}", path, next);
                record.filename = next;
            }
            other => break other,
        }
    };
    record.bytes = None;

    match result {
        Ok(receipt) => {
            match receipt.outcome {
                UploadOutcome::Created | UploadOutcome::Updated => stats.uploaded += 1,
                UploadOutcome::SkippedExisting => stats.skipped_existing += 1,
            }
            if let Some(quota) = receipt.quota {
                pacer.observe_quota(quota);
            }
            record.advance(ItemState::Uploaded);
            let published = record
                .published_url
                .insert(config.repo.published_url(&record.filename));
            Ok(published.clone())
        }
        Err(e) => {
            if let UploadError::RateLimited {
                retry_after_secs: Some(secs),
            } = e
            {
                pacer.observe_retry_after(secs);
            }
            record.advance(ItemState::UploadFailed);
            stats.upload_failed += 1;
            Err(ItemError::Upload {
                filename: record.filename.clone(),
                source: e,
            })
        }
    }
}
