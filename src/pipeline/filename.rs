//! Repository filenames for downloaded images.
//!
//! The name comes from the last path segment of the source URL, reduced to
//! characters that are safe both in a git tree and in a GitHub Pages URL
//! (`[A-Za-z0-9._-]`), so the published link never needs escaping. Names
//! that cannot be salvaged fall back to a digest of the URL.

use reqwest::Url;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::debug;

/// Longest name kept verbatim; longer names are replaced by a digest.
const MAX_NAME_LEN: usize = 100;

/// Extension used when the URL carries none.
const DEFAULT_EXTENSION: &str = ".jpg";

/// Hex SHA-256 of `url`.
fn url_digest(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// Replace unsafe characters with `_`, collapse runs, trim `._` at the ends.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;
    for c in name.chars() {
        let safe = c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_');
        if safe && c != '_' {
            out.push(c);
            prev_underscore = false;
        } else if !prev_underscore {
            out.push('_');
            prev_underscore = true;
        }
    }
    out.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Split `name` into `(stem, ".ext")`; the extension is empty when absent.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos < name.len() - 1 => name.split_at(pos),
        _ => (name, ""),
    }
}

/// Derive a filename for `url` without considering other URLs.
pub fn derive_filename(url: &str) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .unwrap_or_default();
    let name = sanitize(&segment);

    let (stem, ext) = split_extension(&name);
    if stem.is_empty() || name.len() > MAX_NAME_LEN {
        let ext = if ext.is_empty() || ext.len() > 10 {
            DEFAULT_EXTENSION
        } else {
            ext
        };
        return format!("{}{}", &url_digest(url)[..32], ext.to_ascii_lowercase());
    }
    name
}

/// Hands out unique filenames within one destination directory.
///
/// The first URL to claim a name gets it as-is; a later, different URL that
/// derives the same name gets `stem-<8 hex of its digest>.ext`, then a
/// numeric suffix if even that is taken. Comparison is case-insensitive so
/// the repository also checks out cleanly on case-insensitive filesystems.
#[derive(Debug, Default)]
pub struct FilenameAllocator {
    used: HashSet<String>,
}

impl FilenameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, url: &str) -> String {
        let base = derive_filename(url);
        if self.claim(&base) {
            return base;
        }
        self.alternative(url)
    }

    /// Next unclaimed fallback name for `url`, skipping its derived name.
    ///
    /// Used when the repository already holds a different file under the
    /// name this run handed out.
    pub fn alternative(&mut self, url: &str) -> String {
        let base = derive_filename(url);
        let (stem, ext) = split_extension(&base);
        let tag = &url_digest(url)[..8];
        let tagged = format!("{stem}-{tag}{ext}");
        if self.claim(&tagged) {
            debug!("Filename {} taken; using {}", base, tagged);
            return tagged;
        }

        let mut n = 2usize;
        loop {
            let candidate = format!("{stem}-{tag}-{n}{ext}");
            if self.claim(&candidate) {
                debug!("Filename {} taken; using {}", base, candidate);
                return candidate;
            }
            n += 1;
        }
    }

    fn claim(&mut self, name: &str) -> bool {
        self.used.insert(name.to_ascii_lowercase())
    }
}
