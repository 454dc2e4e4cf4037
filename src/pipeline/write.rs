//! Output Writer: rewritten spreadsheet and mapping table.
//!
//! Both files are encoded in memory first, written to temp files in their
//! destination directories, and only then renamed into place. If the second
//! rename fails the first file is rolled back (restored from a copy of the
//! previous run's table, or removed when there was none), so a run leaves
//! either both new outputs or what was there before.

use crate::config::RewriteMode;
use crate::error::MigrateError;
use crate::mapping::MappingTable;
use crate::table::Table;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Suffix of the rewritten spreadsheet, appended to the input's stem.
pub const TABLE_SUFFIX: &str = "_with_github_urls.csv";
/// Suffix of the mapping table, appended to the input's stem.
pub const MAPPING_SUFFIX: &str = "_url_mappings.csv";

/// Header row of the mapping table.
pub const MAPPING_HEADERS: [&str; 4] = ["original_url", "published_url", "status", "detail"];

/// How values are substituted into the spreadsheet.
#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    pub mode: RewriteMode,
    pub failure_marker: Option<String>,
}

/// Destination of both output files.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct OutputPaths {
    pub table: PathBuf,
    pub mapping: PathBuf,
}

impl OutputPaths {
    /// `<stem>_with_github_urls.csv` and `<stem>_url_mappings.csv` next to `input`.
    pub fn beside(input: impl AsRef<Path>) -> Self {
        let input = input.as_ref();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let dir = input.parent().unwrap_or_else(|| Path::new(""));
        Self {
            table: dir.join(format!("{stem}{TABLE_SUFFIX}")),
            mapping: dir.join(format!("{stem}{MAPPING_SUFFIX}")),
        }
    }
}

/// Prefix of the columns added in [`RewriteMode::Augment`].
pub const AUGMENT_PREFIX: &str = "GitHub_";

/// Header of the column appended in [`RewriteMode::Augment`].
pub fn augment_column_name(header: &str) -> String {
    format!("{AUGMENT_PREFIX}{}", header.trim().replace(' ', "_"))
}

/// Produce the rewritten copy of `table`.
///
/// Only values that are keys of `mapping` are touched. A successful entry
/// contributes its published URL; a failed one the failure marker, or the
/// original value when no marker is configured.
///
/// In augment mode a table that already carries the added column (the
/// output of an earlier augment run) has it updated in place; cells the
/// mapping says nothing about keep what the earlier run wrote.
pub fn rewrite_table(
    table: &Table,
    url_columns: &[usize],
    mapping: &MappingTable,
    options: &RewriteOptions,
) -> Table {
    let substitute = |value: &str| -> Option<String> {
        let entry = mapping.lookup(value.trim())?;
        match (&entry.published_url, &options.failure_marker) {
            (Some(url), _) => Some(url.clone()),
            (None, Some(marker)) => Some(marker.clone()),
            (None, None) => None,
        }
    };

    let mut out = table.clone();
    match options.mode {
        RewriteMode::Replace => {
            for row in &mut out.rows {
                for &idx in url_columns {
                    if let Some(new_value) = substitute(row.get(idx)) {
                        row.set(idx, new_value);
                    }
                }
            }
        }
        RewriteMode::Augment => {
            for &idx in url_columns {
                let name = augment_column_name(&table.headers[idx]);
                let target = match out.column_index(&name) {
                    Some(existing) => existing,
                    None => out.push_column(name),
                };
                for row in &mut out.rows {
                    let original = row.get(idx).to_string();
                    let value = match substitute(&original) {
                        Some(new_value) => new_value,
                        None if !row.get(target).is_empty() => continue,
                        None => original,
                    };
                    row.set(target, value);
                }
            }
        }
    }
    out
}

fn encode_error(path: &Path, e: impl std::fmt::Display) -> MigrateError {
    MigrateError::OutputEncodeFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}

fn encode_table(table: &Table, path: &Path) -> Result<Vec<u8>, MigrateError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&table.headers)
        .map_err(|e| encode_error(path, e))?;
    for row in &table.rows {
        writer
            .write_record(row.values())
            .map_err(|e| encode_error(path, e))?;
    }
    writer.into_inner().map_err(|e| encode_error(path, e))
}

fn encode_mapping(mapping: &MappingTable, path: &Path) -> Result<Vec<u8>, MigrateError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(MAPPING_HEADERS)
        .map_err(|e| encode_error(path, e))?;
    for entry in mapping.entries() {
        let status = if entry.is_success() { "success" } else { "failure" };
        let detail = entry.error.as_ref().map(|e| e.reason()).unwrap_or_default();
        writer
            .write_record([
                entry.original_url.as_str(),
                entry.published_url.as_deref().unwrap_or(""),
                status,
                detail.as_str(),
            ])
            .map_err(|e| encode_error(path, e))?;
    }
    writer.into_inner().map_err(|e| encode_error(path, e))
}

/// Write `bytes` to a temp file in `path`'s directory, not yet renamed.
fn stage(path: &Path, bytes: &[u8]) -> Result<NamedTempFile, MigrateError> {
    let write_failed = |source| MigrateError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_failed)?;
    let mut tmp = NamedTempFile::new_in(&dir).map_err(write_failed)?;
    tmp.write_all(bytes).map_err(write_failed)?;
    tmp.flush().map_err(write_failed)?;
    Ok(tmp)
}

/// Copy an existing file at `path` aside, in the same directory.
fn backup(path: &Path) -> Result<Option<NamedTempFile>, MigrateError> {
    match std::fs::read(path) {
        Ok(bytes) => stage(path, &bytes).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(MigrateError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write the rewritten spreadsheet and the mapping table, all or nothing.
pub fn write_outputs(
    table: &Table,
    mapping: &MappingTable,
    paths: &OutputPaths,
) -> Result<(), MigrateError> {
    let table_bytes = encode_table(table, &paths.table)?;
    let mapping_bytes = encode_mapping(mapping, &paths.mapping)?;

    let staged_table = stage(&paths.table, &table_bytes)?;
    let staged_mapping = stage(&paths.mapping, &mapping_bytes)?;
    let previous_table = backup(&paths.table)?;

    staged_table
        .persist(&paths.table)
        .map_err(|e| MigrateError::OutputWriteFailed {
            path: paths.table.clone(),
            source: e.error,
        })?;

    if let Err(e) = staged_mapping.persist(&paths.mapping) {
        let rollback = match previous_table {
            Some(previous) => previous.persist(&paths.table).map(|_| ()).map_err(|e| e.error),
            None => std::fs::remove_file(&paths.table),
        };
        if let Err(cleanup) = rollback {
            warn!(
                "Could not roll back {} after failed write: {}",
                paths.table.display(),
                cleanup
            );
        }
        return Err(MigrateError::OutputWriteFailed {
            path: paths.mapping.clone(),
            source: e.error,
        });
    }

    info!(
        "Wrote {} and {}",
        paths.table.display(),
        paths.mapping.display()
    );
    Ok(())
}
