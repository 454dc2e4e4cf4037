//! Pipeline stages for a spreadsheet image migration.
//!
//! Each submodule implements exactly one step and is independently testable.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ filename ──▶ fetch ──▶ upload ──▶ pacer ──▶ write
//! (CSV)     (URLs)      (names)      (GET)     (PUT)      (sleep)   (CSV × 2)
//! ```
//!
//! 1. [`input`]    — read the spreadsheet, find the URL-bearing columns
//! 2. [`extract`]  — distinct candidate URLs on the configured source hosts
//! 3. [`filename`] — unique repository filename per candidate URL
//! 4. [`fetch`]    — download image bytes; failures stay per-item
//! 5. [`upload`]   — commit bytes through the GitHub contents API
//! 6. [`pacer`]    — pause every K uploads to stay under the API rate limit
//! 7. [`write`]    — rewritten spreadsheet + mapping table, written together

pub mod extract;
pub mod fetch;
pub mod filename;
pub mod input;
pub mod pacer;
pub mod upload;
pub mod write;

#[cfg(test)]
pub(crate) mod http_stub;
