//! URL Extractor: collect the distinct links that need migrating.
//!
//! Only links on a configured source host are candidates. Everything else
//! (blank cells, links already on GitHub Pages, unrelated hosts) is passed
//! through to the output untouched and never downloaded.

use crate::table::Table;
use reqwest::Url;
use std::collections::HashSet;
use tracing::debug;

/// Whether `value` is a link on one of `hosts` (exact host or subdomain).
pub fn is_candidate(value: &str, hosts: &[String]) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }
    let Ok(url) = Url::parse(value) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    hosts.iter().any(|h| {
        let h = h.as_str();
        host == h || host.strip_suffix(h).is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Distinct candidate URLs in first-seen, row-major order.
///
/// Values are compared after trimming surrounding whitespace; comparison is
/// otherwise exact and case-sensitive.
pub fn extract_candidates(table: &Table, columns: &[usize], hosts: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in &table.rows {
        for &idx in columns {
            let value = row.get(idx).trim();
            if is_candidate(value, hosts) && seen.insert(value.to_string()) {
                out.push(value.to_string());
            }
        }
    }
    debug!("Extracted {} distinct candidate URLs", out.len());
    out
}

/// URL to actually GET for a candidate.
///
/// Dropbox share links ending in `dl=0` render a preview page; `dl=1` makes
/// the same link return the raw file.
pub fn direct_download_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let is_dropbox = parsed
        .host_str()
        .is_some_and(|h| h == "dropbox.com" || h.ends_with(".dropbox.com"));
    if !is_dropbox || !parsed.query_pairs().any(|(k, v)| k == "dl" && v == "0") {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "dl" { "1".into() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SOURCE_HOSTS;

    fn hosts() -> Vec<String> {
        DEFAULT_SOURCE_HOSTS.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn candidate_hosts() {
        let h = hosts();
        assert!(is_candidate("https://dl.dropboxusercontent.com/s/xyz/shoe.jpg", &h));
        assert!(is_candidate("https://www.dropbox.com/s/xyz/shoe.jpg?dl=0", &h));
        assert!(is_candidate("https://dropbox.com/s/xyz/shoe.jpg", &h));
        assert!(is_candidate("  https://www.dropbox.com/s/a.jpg  ", &h));
        assert!(!is_candidate("https://owner.github.io/repo/images/shoe.jpg", &h));
        assert!(!is_candidate("https://notdropbox.com/a.jpg", &h));
        assert!(!is_candidate("https://dropbox.com.evil.net/a.jpg", &h));
        assert!(!is_candidate("ftp://dropbox.com/a.jpg", &h));
        assert!(!is_candidate("", &h));
        assert!(!is_candidate("shoe.jpg", &h));
    }

    #[test]
    fn extract_dedups_in_first_seen_order() {
        let a = "https://www.dropbox.com/s/1/a.jpg?dl=0";
        let b = "https://dl.dropboxusercontent.com/s/2/b.jpg";
        let rows = vec![
            vec!["x".into(), b.into(), "".into()],
            vec!["y".into(), a.into(), b.into()],
            vec!["z".into(), "https://owner.github.io/repo/images/c.jpg".into(), a.into()],
        ];
        let t = Table::new(vec!["sku".into(), "img".into(), "variant".into()], rows);
        assert_eq!(extract_candidates(&t, &[1, 2], &hosts()), vec![b, a]);
    }

    #[test]
    fn extract_is_case_sensitive() {
        let rows = vec![
            vec!["https://www.dropbox.com/s/1/A.jpg".into()],
            vec!["https://www.dropbox.com/s/1/a.jpg".into()],
        ];
        let t = Table::new(vec!["img".into()], rows);
        assert_eq!(extract_candidates(&t, &[0], &hosts()).len(), 2);
    }

    #[test]
    fn dl0_becomes_dl1() {
        assert_eq!(
            direct_download_url("https://www.dropbox.com/s/abc/shoe.jpg?dl=0"),
            "https://www.dropbox.com/s/abc/shoe.jpg?dl=1"
        );
        assert_eq!(
            direct_download_url("https://www.dropbox.com/scl/fi/abc/shoe.jpg?rlkey=k&dl=0"),
            "https://www.dropbox.com/scl/fi/abc/shoe.jpg?rlkey=k&dl=1"
        );
    }

    #[test]
    fn other_links_unchanged() {
        let direct = "https://dl.dropboxusercontent.com/s/xyz/shoe.jpg";
        assert_eq!(direct_download_url(direct), direct);
        let already = "https://www.dropbox.com/s/abc/shoe.jpg?dl=1";
        assert_eq!(direct_download_url(already), already);
        assert_eq!(direct_download_url("not a url"), "not a url");
    }
}
