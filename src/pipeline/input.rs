//! Input Reader: load the spreadsheet and locate its URL-bearing columns.
//!
//! Shopify exports carry images in `Image Src` and `Variant Image`, but
//! other tools name them differently, so columns are found heuristically:
//! a header mentioning `image`/`url`, or any value that looks like a web
//! link. Callers who know better can name the columns explicitly.

use crate::error::MigrateError;
use crate::pipeline::write::AUGMENT_PREFIX;
use crate::table::Table;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

static RE_URL_VALUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https?://\S+$").unwrap());
static RE_URL_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)image|url").unwrap());

/// Check whether a cell value looks like an absolute web link.
pub fn looks_like_url(value: &str) -> bool {
    RE_URL_VALUE.is_match(value.trim())
}

/// Read a CSV file with a header row into a [`Table`].
pub fn read_table(path: impl AsRef<Path>) -> Result<Table, MigrateError> {
    let path = path.as_ref().to_path_buf();

    let file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(MigrateError::PermissionDenied { path });
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MigrateError::InputNotFound { path });
        }
        Err(e) => {
            return Err(MigrateError::InputUnreadable {
                path,
                detail: e.to_string(),
            });
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| unreadable(&path, e))?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.to_string()
            }
        })
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(MigrateError::EmptyTable { path });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| unreadable(&path, e))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    info!(
        "Read {} rows × {} columns from {}",
        rows.len(),
        headers.len(),
        path.display()
    );
    Ok(Table::new(headers, rows))
}

fn unreadable(path: &PathBuf, e: csv::Error) -> MigrateError {
    MigrateError::InputUnreadable {
        path: path.clone(),
        detail: e.to_string(),
    }
}

/// Guess which columns hold image URLs.
///
/// A column qualifies when its header mentions `image` or `url`, or when any
/// of its values is an http(s) link. Columns added by an earlier augment run
/// (`GitHub_…`) never qualify.
pub fn detect_url_columns(table: &Table) -> Vec<usize> {
    let columns: Vec<usize> = (0..table.headers.len())
        .filter(|&idx| {
            let header = &table.headers[idx];
            if header.trim().starts_with(AUGMENT_PREFIX) {
                return false;
            }
            RE_URL_HEADER.is_match(header) || table.column(idx).any(looks_like_url)
        })
        .collect();
    debug!(
        "Detected URL columns: {:?}",
        columns.iter().map(|&i| &table.headers[i]).collect::<Vec<_>>()
    );
    columns
}

/// Resolve explicit column names, or fall back to detection when none are given.
pub fn resolve_url_columns(table: &Table, names: &[String]) -> Result<Vec<usize>, MigrateError> {
    if names.is_empty() {
        return Ok(detect_url_columns(table));
    }
    names
        .iter()
        .map(|name| {
            table
                .column_index(name)
                .ok_or_else(|| MigrateError::UnknownColumn {
                    column: name.clone(),
                    available: table.headers.join(", "),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_looks_like_url() {
        assert!(looks_like_url("https://example.com/a.jpg"));
        assert!(looks_like_url("  HTTP://example.com/a.jpg "));
        assert!(!looks_like_url("example.com/a.jpg"));
        assert!(!looks_like_url(""));
        assert!(!looks_like_url("https://a b"));
    }

    #[test]
    fn reads_quoted_fields_and_bom() {
        let f = write_csv(
            "\u{feff}Handle,Title,Image Src\nshoe,\"Shoe, red\",https://www.dropbox.com/s/x/shoe.jpg?dl=0\n",
        );
        let t = read_table(f.path()).unwrap();
        assert_eq!(t.headers, vec!["Handle", "Title", "Image Src"]);
        assert_eq!(t.rows.len(), 1);
        assert_eq!(t.rows[0].get(1), "Shoe, red");
    }

    #[test]
    fn ragged_rows_are_normalised() {
        let f = write_csv("a,b,c\n1\n1,2,3,4\n");
        let t = read_table(f.path()).unwrap();
        assert_eq!(t.rows[0].len(), 3);
        assert_eq!(t.rows[1].len(), 3);
    }

    #[test]
    fn missing_file_is_input_not_found() {
        let err = read_table("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, MigrateError::InputNotFound { .. }));
    }

    #[test]
    fn empty_file_is_empty_table() {
        let f = write_csv("");
        let err = read_table(f.path()).unwrap_err();
        assert!(matches!(err, MigrateError::EmptyTable { .. }), "got {err:?}");
    }

    #[test]
    fn detects_columns_by_header_and_value() {
        let f = write_csv(
            "Handle,Image Src,Variant Image,Notes,Link\n\
             a,,,,https://example.com/x\n",
        );
        let t = read_table(f.path()).unwrap();
        assert_eq!(detect_url_columns(&t), vec![1, 2, 4]);
    }

    #[test]
    fn augment_columns_are_not_detected() {
        let f = write_csv(
            "Handle,Image Src,GitHub_Image_Src\n\
             a,https://www.dropbox.com/s/x/a.jpg?dl=0,https://owner.github.io/repo/images/a.jpg\n",
        );
        let t = read_table(f.path()).unwrap();
        assert_eq!(detect_url_columns(&t), vec![1]);
    }

    #[test]
    fn explicit_columns_override_detection() {
        let t = Table::new(
            vec!["Image Src".into(), "Other".into()],
            vec![vec!["".into(), "".into()]],
        );
        assert_eq!(resolve_url_columns(&t, &["Other".into()]).unwrap(), vec![1]);
        let err = resolve_url_columns(&t, &["Nope".into()]).unwrap_err();
        assert!(err.to_string().contains("Nope"));
    }
}
