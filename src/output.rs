//! Result types returned by the migration entry points.

use crate::mapping::MappingTable;
use crate::table::Table;
use serde::Serialize;

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStats {
    /// Data rows in the input.
    pub rows: usize,
    /// Headers of the columns that were scanned.
    pub url_columns: Vec<String>,
    /// Distinct candidate URLs.
    pub candidates: usize,
    /// Newly committed (created or overwritten).
    pub uploaded: usize,
    /// Already present and left alone under the skip policy.
    pub skipped_existing: usize,
    pub fetch_failed: usize,
    pub upload_failed: usize,
    pub total_duration_ms: u64,
}

impl MigrationStats {
    pub fn succeeded(&self) -> usize {
        self.uploaded + self.skipped_existing
    }

    pub fn failed(&self) -> usize {
        self.fetch_failed + self.upload_failed
    }
}

/// Everything a run produced, before anything is written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationOutput {
    /// The input with migrated URLs substituted.
    pub table: Table,
    pub mapping: MappingTable,
    pub stats: MigrationStats,
}

/// One candidate as it would be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedItem {
    pub original_url: String,
    /// What is actually requested (Dropbox `dl=0` links become `dl=1`).
    pub download_url: String,
    pub repo_path: String,
    pub published_url: String,
}

/// Dry-run view of a migration: no network access involved.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationPlan {
    pub rows: usize,
    pub url_columns: Vec<String>,
    pub items: Vec<PlannedItem>,
}
