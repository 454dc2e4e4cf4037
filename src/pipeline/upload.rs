//! Repository Uploader: commit image bytes through the GitHub contents API.
//!
//! Each image becomes one commit made by
//! `PUT /repos/{owner}/{repo}/contents/{path}` with the bytes base64-encoded
//! in the JSON body. The API creates intermediate directories on its own, so
//! no directory bootstrap is needed.
//!
//! ## Existing files
//!
//! Before writing, the uploader asks whether `path` already exists on the
//! branch. Under [`CollisionPolicy::Skip`] an existing file counts as
//! migrated only when its blob sha equals [`git_blob_sha`] of the new bytes;
//! a different file at that path is reported as [`UploadError::NameTaken`]
//! and the caller moves on to another name. Under
//! [`CollisionPolicy::Overwrite`] the existing blob `sha` is sent so GitHub
//! accepts the update. Distinct source URLs never share a path within one
//! run (see [`crate::pipeline::filename`]).

use crate::config::{CollisionPolicy, MigrationConfig, RepoCoordinates};
use crate::error::{MigrateError, UploadError};
use crate::pipeline::pacer::RateQuota;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const API_VERSION: &str = "2022-11-28";

/// What the store did with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadOutcome {
    Created,
    Updated,
    /// The path already existed and [`CollisionPolicy::Skip`] left it alone.
    SkippedExisting,
}

/// Result of a successful `put_file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub outcome: UploadOutcome,
    /// Rate-limit state from the last response, when the API reported it.
    pub quota: Option<RateQuota>,
}

/// A place that stores files under repository-relative paths.
///
/// The GitHub implementation is [`GitHubUploader`]; tests and embedders can
/// inject their own through [`crate::config::MigrationConfigBuilder::store`].
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Check the store is usable before any work starts.
    async fn preflight(&self) -> Result<(), UploadError> {
        Ok(())
    }

    /// Write `bytes` to `path` with the given commit message.
    async fn put_file(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
    ) -> Result<UploadReceipt, UploadError>;
}

#[derive(Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Deserialize)]
struct ContentsInfo {
    sha: String,
}

#[derive(Deserialize)]
struct RepoInfo {
    #[serde(default)]
    permissions: Option<RepoPermissions>,
}

#[derive(Deserialize)]
struct RepoPermissions {
    #[serde(default)]
    push: bool,
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

/// GitHub REST contents-API client.
pub struct GitHubUploader {
    client: reqwest::Client,
    api_base: Url,
    repo: RepoCoordinates,
    collision: CollisionPolicy,
    timeout_secs: u64,
}

impl GitHubUploader {
    pub fn new(config: &MigrationConfig) -> Result<Self, MigrateError> {
        let token = config
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MigrateError::InvalidConfig("a GitHub token is required".into()))?;

        let api_base = Url::parse(&config.api_base_url).map_err(|e| {
            MigrateError::InvalidConfig(format!("invalid API URL '{}': {e}", config.api_base_url))
        })?;
        if api_base.cannot_be_a_base() {
            return Err(MigrateError::InvalidConfig(format!(
                "invalid API URL '{}'",
                config.api_base_url
            )));
        }

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| MigrateError::InvalidConfig("token contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .user_agent(concat!("dropbox2pages/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| MigrateError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base,
            repo: config.repo.clone(),
            collision: config.collision,
            timeout_secs: config.api_timeout_secs,
        })
    }

    /// `{api}/repos/{owner}/{repo}` followed by `tail` segments, each escaped.
    fn endpoint<'a>(&self, tail: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["repos", self.repo.owner.as_str(), self.repo.name.as_str()])
                .extend(tail);
        }
        url
    }

    fn contents_url(&self, path: &str) -> Url {
        let tail = std::iter::once("contents").chain(path.split('/').filter(|s| !s.is_empty()));
        self.endpoint(tail)
    }

    fn transport_error(&self, e: reqwest::Error) -> UploadError {
        if e.is_timeout() {
            UploadError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            UploadError::Transport {
                reason: e.to_string(),
            }
        }
    }

    /// Blob sha of `path` on the branch, or `None` when it does not exist.
    async fn existing_sha(&self, path: &str) -> Result<Option<String>, UploadError> {
        let mut url = self.contents_url(path);
        url.query_pairs_mut().append_pair("ref", &self.repo.branch);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let info: ContentsInfo = response.json().await.map_err(|e| UploadError::Conflict {
                    path: path.to_string(),
                    detail: format!("existing entry is not a file: {e}"),
                })?;
                Ok(Some(info.sha))
            }
            s => {
                let headers = response.headers().clone();
                let body = response.text().await.unwrap_or_default();
                Err(classify_status(s, &headers, &body, path))
            }
        }
    }
}

#[async_trait]
impl ContentStore for GitHubUploader {
    async fn preflight(&self) -> Result<(), UploadError> {
        let response = self
            .client
            .get(self.endpoint(std::iter::empty()))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &headers, &body, ""));
        }

        let info: RepoInfo = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;
        if let Some(perms) = info.permissions {
            if !perms.push {
                return Err(UploadError::Forbidden {
                    detail: "token has no push access to this repository".into(),
                });
            }
        }
        info!("Repository {} is reachable", self.repo.slug());
        Ok(())
    }

    async fn put_file(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
    ) -> Result<UploadReceipt, UploadError> {
        let existing = self.existing_sha(path).await?;
        let outcome = match (&existing, self.collision) {
            (Some(sha), CollisionPolicy::Skip) if *sha == git_blob_sha(bytes) => {
                info!("{} already exists on {}; skipping", path, self.repo.branch);
                return Ok(UploadReceipt {
                    outcome: UploadOutcome::SkippedExisting,
                    quota: None,
                });
            }
            (Some(_), CollisionPolicy::Skip) => {
                debug!("{} holds different content", path);
                return Err(UploadError::NameTaken {
                    path: path.to_string(),
                });
            }
            (Some(_), CollisionPolicy::Overwrite) => UploadOutcome::Updated,
            (None, _) => UploadOutcome::Created,
        };

        let body = PutContentsRequest {
            message,
            content: STANDARD.encode(bytes),
            branch: &self.repo.branch,
            sha: existing,
        };

        debug!("PUT {} ({} bytes)", path, bytes.len());
        let response = self
            .client
            .put(self.contents_url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &headers, &text, path));
        }

        info!("Committed {} ({:?})", path, outcome);
        Ok(UploadReceipt {
            outcome,
            quota: parse_quota(&headers),
        })
    }
}

/// Git blob id of `bytes`, the `sha` the contents API reports for a file.
pub fn git_blob_sha(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", bytes.len()).as_bytes());
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Read `x-ratelimit-remaining` / `x-ratelimit-reset`.
pub fn parse_quota(headers: &HeaderMap) -> Option<RateQuota> {
    Some(RateQuota {
        remaining: header_u64(headers, "x-ratelimit-remaining")?,
        reset_epoch_secs: header_u64(headers, "x-ratelimit-reset")?,
    })
}

/// The `message` field of a GitHub error body, or the raw body.
fn api_message(body: &str) -> String {
    serde_json::from_str::<ApiMessage>(body)
        .map(|m| m.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

/// Map a non-2xx GitHub response to an [`UploadError`].
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str, path: &str) -> UploadError {
    let detail = api_message(body);
    let retry_after = header_u64(headers, RETRY_AFTER.as_str());
    let quota = parse_quota(headers);
    let exhausted = quota.is_some_and(|q| q.remaining == 0);

    match status.as_u16() {
        401 => UploadError::Unauthorized { detail },
        403 | 429
            if retry_after.is_some()
                || exhausted
                || detail.to_ascii_lowercase().contains("rate limit")
                || status == StatusCode::TOO_MANY_REQUESTS =>
        {
            let from_reset = quota.filter(|q| q.remaining == 0).map(|q| {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                q.wait_from(now).as_secs()
            });
            UploadError::RateLimited {
                retry_after_secs: retry_after.or(from_reset),
            }
        }
        403 => UploadError::Forbidden { detail },
        404 => UploadError::RepositoryNotFound,
        409 | 422 => UploadError::Conflict {
            path: path.to_string(),
            detail,
        },
        code => UploadError::HttpStatus { status: code, detail },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MigrationConfig {
        MigrationConfig::builder()
            .repo(RepoCoordinates::new("owner", "repo"))
            .token("ghp_test")
            .build()
            .unwrap()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        h
    }

    #[test]
    fn contents_url_escapes_segments() {
        let up = GitHubUploader::new(&config()).unwrap();
        assert_eq!(
            up.contents_url("images/shoe.jpg").as_str(),
            "https://api.github.com/repos/owner/repo/contents/images/shoe.jpg"
        );
        assert_eq!(
            up.contents_url("my images/a b.jpg").as_str(),
            "https://api.github.com/repos/owner/repo/contents/my%20images/a%20b.jpg"
        );
        assert_eq!(
            up.endpoint(std::iter::empty()).as_str(),
            "https://api.github.com/repos/owner/repo"
        );
    }

    #[test]
    fn api_base_with_path_prefix() {
        let mut c = config();
        c.api_base_url = "https://ghe.example.com/api/v3/".into();
        let up = GitHubUploader::new(&c).unwrap();
        assert_eq!(
            up.contents_url("images/a.jpg").as_str(),
            "https://ghe.example.com/api/v3/repos/owner/repo/contents/images/a.jpg"
        );
    }

    #[test]
    fn new_requires_token_and_valid_base() {
        let mut c = config();
        c.token = None;
        assert!(GitHubUploader::new(&c).is_err());

        let mut c = config();
        c.api_base_url = "not a url".into();
        assert!(GitHubUploader::new(&c).is_err());
    }

    #[test]
    fn request_body_shape() {
        let body = PutContentsRequest {
            message: "Add image shoe.jpg",
            content: STANDARD.encode(b"abc"),
            branch: "main",
            sha: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["content"], "YWJj");
        assert_eq!(json["branch"], "main");
        assert!(json.get("sha").is_none());

        let body = PutContentsRequest {
            sha: Some("deadbeef".into()),
            ..body
        };
        assert_eq!(serde_json::to_value(&body).unwrap()["sha"], "deadbeef");
    }

    #[test]
    fn classify_auth_and_not_found() {
        let h = HeaderMap::new();
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, &h, r#"{"message":"Bad credentials"}"#, "p"),
            UploadError::Unauthorized { detail } if detail == "Bad credentials"
        ));
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, &h, "", "p"),
            UploadError::RepositoryNotFound
        );
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, &h, r#"{"message":"Resource not accessible"}"#, "p"),
            UploadError::Forbidden { .. }
        ));
    }

    #[test]
    fn classify_rate_limits() {
        let h = headers(&[("retry-after", "60")]);
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, &h, "{}", "p"),
            UploadError::RateLimited {
                retry_after_secs: Some(60)
            }
        );

        let h = headers(&[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", "0")]);
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, &h, "{}", "p"),
            UploadError::RateLimited {
                retry_after_secs: Some(0)
            }
        );

        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), "", "p"),
            UploadError::RateLimited { retry_after_secs: None }
        ));
    }

    #[test]
    fn classify_conflict_and_other() {
        let h = HeaderMap::new();
        assert!(matches!(
            classify_status(StatusCode::CONFLICT, &h, r#"{"message":"sha mismatch"}"#, "images/a.jpg"),
            UploadError::Conflict { path, .. } if path == "images/a.jpg"
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, &h, "oops", "p"),
            UploadError::HttpStatus { status: 502, .. }
        ));
    }

    #[test]
    fn quota_headers() {
        let h = headers(&[("x-ratelimit-remaining", "4999"), ("x-ratelimit-reset", "1700000000")]);
        assert_eq!(
            parse_quota(&h),
            Some(RateQuota {
                remaining: 4999,
                reset_epoch_secs: 1_700_000_000
            })
        );
        assert_eq!(parse_quota(&HeaderMap::new()), None);
    }

    #[test]
    fn blob_sha_matches_git() {
        assert_eq!(git_blob_sha(b""), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        assert_eq!(
            git_blob_sha(b"hello\n"),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
    }

    // ── Against a local HTTP server ─────────────────────────────────────

    use crate::pipeline::http_stub::{Reply, StubServer};
    use serde_json::json;

    fn uploader(server: &StubServer, collision: CollisionPolicy) -> GitHubUploader {
        let mut c = config();
        c.api_base_url = server.base_url();
        c.collision = collision;
        GitHubUploader::new(&c).unwrap()
    }

    #[tokio::test]
    async fn preflight_checks_push_permission() {
        let server = StubServer::start(vec![Reply::json(
            200,
            json!({"full_name": "owner/repo", "permissions": {"push": true}}),
        )])
        .await;
        uploader(&server, CollisionPolicy::Skip).preflight().await.unwrap();
        let reqs = server.requests();
        assert_eq!(reqs[0].method, "GET");
        assert_eq!(reqs[0].target, "/repos/owner/repo");
        assert_eq!(reqs[0].header("authorization"), Some("Bearer ghp_test"));
        assert_eq!(reqs[0].header("x-github-api-version"), Some(API_VERSION));

        let server = StubServer::start(vec![Reply::json(
            200,
            json!({"permissions": {"push": false}}),
        )])
        .await;
        let err = uploader(&server, CollisionPolicy::Skip).preflight().await.unwrap_err();
        assert!(matches!(err, UploadError::Forbidden { .. }));

        let server = StubServer::start(vec![Reply::json(404, json!({"message": "Not Found"}))]).await;
        let err = uploader(&server, CollisionPolicy::Skip).preflight().await.unwrap_err();
        assert_eq!(err, UploadError::RepositoryNotFound);
    }

    #[tokio::test]
    async fn missing_file_is_created() {
        let server = StubServer::start(vec![
            Reply::json(404, json!({"message": "Not Found"})),
            Reply::json(201, json!({"content": {"sha": "abc"}}))
                .header("x-ratelimit-remaining", "4998")
                .header("x-ratelimit-reset", "1700000000"),
        ])
        .await;
        let receipt = uploader(&server, CollisionPolicy::Skip)
            .put_file("images/shoe.jpg", b"jpeg", "Add image shoe.jpg")
            .await
            .unwrap();

        assert_eq!(receipt.outcome, UploadOutcome::Created);
        assert_eq!(
            receipt.quota,
            Some(RateQuota {
                remaining: 4998,
                reset_epoch_secs: 1_700_000_000
            })
        );

        let reqs = server.requests();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].method, "GET");
        assert_eq!(reqs[0].target, "/repos/owner/repo/contents/images/shoe.jpg?ref=main");
        assert_eq!(reqs[1].method, "PUT");
        assert_eq!(reqs[1].target, "/repos/owner/repo/contents/images/shoe.jpg");
        let body = reqs[1].json();
        assert_eq!(body["message"], "Add image shoe.jpg");
        assert_eq!(body["content"], STANDARD.encode(b"jpeg"));
        assert_eq!(body["branch"], "main");
        assert!(body.get("sha").is_none());
    }

    #[tokio::test]
    async fn identical_file_is_skipped() {
        let server = StubServer::start(vec![Reply::json(
            200,
            json!({"type": "file", "sha": git_blob_sha(b"jpeg")}),
        )])
        .await;
        let receipt = uploader(&server, CollisionPolicy::Skip)
            .put_file("images/shoe.jpg", b"jpeg", "Add image shoe.jpg")
            .await
            .unwrap();
        assert_eq!(receipt.outcome, UploadOutcome::SkippedExisting);
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn different_file_is_name_taken_under_skip() {
        let server = StubServer::start(vec![Reply::json(
            200,
            json!({"type": "file", "sha": git_blob_sha(b"someone else")}),
        )])
        .await;
        let err = uploader(&server, CollisionPolicy::Skip)
            .put_file("images/shoe.jpg", b"jpeg", "Add image shoe.jpg")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            UploadError::NameTaken {
                path: "images/shoe.jpg".into()
            }
        );
        assert_eq!(server.requests().len(), 1, "nothing must be written");
    }

    #[tokio::test]
    async fn overwrite_sends_existing_sha() {
        let server = StubServer::start(vec![
            Reply::json(200, json!({"type": "file", "sha": "0123abcd"})),
            Reply::json(200, json!({"content": {"sha": "fedc"}})),
        ])
        .await;
        let receipt = uploader(&server, CollisionPolicy::Overwrite)
            .put_file("images/shoe.jpg", b"jpeg", "Add image shoe.jpg")
            .await
            .unwrap();
        assert_eq!(receipt.outcome, UploadOutcome::Updated);
        let reqs = server.requests();
        assert_eq!(reqs[1].method, "PUT");
        assert_eq!(reqs[1].json()["sha"], "0123abcd");
    }

    #[tokio::test]
    async fn rejected_put_is_classified() {
        let server = StubServer::start(vec![
            Reply::json(404, json!({"message": "Not Found"})),
            Reply::json(401, json!({"message": "Bad credentials"})),
        ])
        .await;
        let err = uploader(&server, CollisionPolicy::Skip)
            .put_file("images/shoe.jpg", b"jpeg", "Add image shoe.jpg")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            UploadError::Unauthorized {
                detail: "Bad credentials".into()
            }
        );
    }
}
