//! Configuration types for a Dropbox → GitHub Pages migration.
//!
//! Every knob of a run lives in one immutable [`MigrationConfig`], built via
//! [`MigrationConfigBuilder`] once at startup and passed by reference into
//! every pipeline stage. Nothing is read from ambient state after that: the
//! CLI maps its flags and environment variables onto the builder, library
//! callers set only the fields they care about.

use crate::error::MigrateError;
use crate::pipeline::fetch::ImageSource;
use crate::pipeline::upload::ContentStore;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Hosts whose links are migrated when no `source_hosts` are configured.
pub const DEFAULT_SOURCE_HOSTS: &[&str] = &["dropbox.com", "dropboxusercontent.com"];

/// Where images are committed and how their public URL is formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCoordinates {
    /// Account or organisation login, e.g. `alex-halloran`.
    pub owner: String,
    /// Repository name, e.g. `shopify-product-images`.
    pub name: String,
    /// Branch that GitHub Pages publishes from. Default: `main`.
    pub branch: String,
    /// Directory inside the repository, without leading/trailing slashes.
    /// Default: `images`.
    pub destination: String,
}

impl RepoCoordinates {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            branch: "main".to_string(),
            destination: "images".to_string(),
        }
    }

    /// Parse an `owner/name` slug.
    pub fn parse(slug: &str) -> Result<Self, MigrateError> {
        match slug.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner, name))
            }
            _ => Err(MigrateError::InvalidConfig(format!(
                "repository must be 'owner/name', got '{slug}'"
            ))),
        }
    }

    /// `owner/name`, as used in API paths and log lines.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Repository-relative path for a stored file.
    pub fn path_for(&self, filename: &str) -> String {
        if self.destination.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", self.destination, filename)
        }
    }

    /// Public GitHub Pages URL for a stored file.
    ///
    /// A repository named `{owner}.github.io` is a user site served from the
    /// domain root, so the repository segment is left out.
    pub fn published_url(&self, filename: &str) -> String {
        let site = format!("{}.github.io", self.owner);
        let path = self.path_for(filename);
        if self.name.eq_ignore_ascii_case(&site) {
            format!("https://{site}/{path}")
        } else {
            format!("https://{site}/{}/{path}", self.name)
        }
    }
}

/// What to do when the destination path already holds a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollisionPolicy {
    /// Leave the existing file alone and treat the item as migrated. (default)
    ///
    /// Makes reruns over a half-migrated spreadsheet cheap: nothing that is
    /// already in the repository is uploaded again.
    #[default]
    Skip,
    /// Replace the existing file with the freshly downloaded bytes.
    Overwrite,
}

/// How migrated URLs are written back into the spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RewriteMode {
    /// Replace each migrated value in place. (default)
    #[default]
    Replace,
    /// Keep the original columns and append a `GitHub_<Column>` column
    /// at the end of each row for every URL column.
    Augment,
}

/// Configuration for one migration run.
///
/// Built via [`MigrationConfig::builder()`].
///
/// # Example
/// ```rust
/// use dropbox2pages::{MigrationConfig, RepoCoordinates};
///
/// let config = MigrationConfig::builder()
///     .token("ghp_example")
///     .repo(RepoCoordinates::new("owner", "repo"))
///     .batch_size(10)
///     .pause_secs(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.repo.published_url("shoe.jpg"),
///            "https://owner.github.io/repo/images/shoe.jpg");
/// ```
#[derive(Clone)]
pub struct MigrationConfig {
    /// GitHub token with `contents: write` on the target repository.
    pub token: Option<String>,

    /// Target repository, branch and directory.
    pub repo: RepoCoordinates,

    /// Hosts whose URLs are migrated. Default: [`DEFAULT_SOURCE_HOSTS`].
    ///
    /// A value matches when its host equals an entry or is a subdomain of it,
    /// so `dropbox.com` also covers `www.dropbox.com`.
    pub source_hosts: Vec<String>,

    /// Explicit URL column names. Empty means detect them from headers/values.
    pub url_columns: Vec<String>,

    /// Uploads between pauses (K). Default: 10.
    pub batch_size: usize,

    /// Pause after every `batch_size` uploads. Default: 10 s.
    pub pause: Duration,

    /// Longest wait honoured when the API reports an exhausted quota. Default: 15 min.
    pub max_quota_wait: Duration,

    /// Per-image download timeout in seconds. Default: 30.
    pub fetch_timeout_secs: u64,

    /// Per-request GitHub API timeout in seconds. Default: 30.
    pub api_timeout_secs: u64,

    /// GitHub REST base URL. Default: `https://api.github.com`.
    pub api_base_url: String,

    /// Existing-file policy. Default: [`CollisionPolicy::Skip`].
    pub collision: CollisionPolicy,

    /// Output layout. Default: [`RewriteMode::Replace`].
    pub rewrite_mode: RewriteMode,

    /// Text written in place of a URL that failed to migrate. Default: none
    /// (the original value is kept).
    pub failure_marker: Option<String>,

    /// Check the repository is reachable before the first download. Default: true.
    pub verify_repository: bool,

    /// Pre-constructed image source. Takes precedence over the HTTP fetcher.
    pub source: Option<Arc<dyn ImageSource>>,

    /// Pre-constructed content store. Takes precedence over the GitHub uploader.
    pub store: Option<Arc<dyn ContentStore>>,

    /// Per-item progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            token: None,
            repo: RepoCoordinates::new("", ""),
            source_hosts: DEFAULT_SOURCE_HOSTS.iter().map(|h| h.to_string()).collect(),
            url_columns: Vec::new(),
            batch_size: 10,
            pause: Duration::from_secs(10),
            max_quota_wait: Duration::from_secs(15 * 60),
            fetch_timeout_secs: 30,
            api_timeout_secs: 30,
            api_base_url: "https://api.github.com".to_string(),
            collision: CollisionPolicy::default(),
            rewrite_mode: RewriteMode::default(),
            failure_marker: None,
            verify_repository: true,
            source: None,
            store: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for MigrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("repo", &self.repo)
            .field("source_hosts", &self.source_hosts)
            .field("url_columns", &self.url_columns)
            .field("batch_size", &self.batch_size)
            .field("pause", &self.pause)
            .field("max_quota_wait", &self.max_quota_wait)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("api_base_url", &self.api_base_url)
            .field("collision", &self.collision)
            .field("rewrite_mode", &self.rewrite_mode)
            .field("failure_marker", &self.failure_marker)
            .field("verify_repository", &self.verify_repository)
            .field("source", &self.source.as_ref().map(|_| "<dyn ImageSource>"))
            .field("store", &self.store.as_ref().map(|_| "<dyn ContentStore>"))
            .finish()
    }
}

impl MigrationConfig {
    /// Create a new builder for `MigrationConfig`.
    pub fn builder() -> MigrationConfigBuilder {
        MigrationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`MigrationConfig`].
#[derive(Debug)]
pub struct MigrationConfigBuilder {
    config: MigrationConfig,
}

impl MigrationConfigBuilder {
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    pub fn repo(mut self, repo: RepoCoordinates) -> Self {
        self.config.repo = repo;
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.config.repo.branch = branch.into();
        self
    }

    /// Destination directory; surrounding slashes are stripped.
    pub fn destination(mut self, dir: impl AsRef<str>) -> Self {
        self.config.repo.destination = dir.as_ref().trim_matches('/').to_string();
        self
    }

    pub fn source_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.source_hosts = hosts
            .into_iter()
            .map(|h| h.into().trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        self
    }

    pub fn url_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.url_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n.max(1);
        self
    }

    pub fn pause_secs(mut self, secs: u64) -> Self {
        self.config.pause = Duration::from_secs(secs);
        self
    }

    pub fn pause(mut self, pause: Duration) -> Self {
        self.config.pause = pause;
        self
    }

    pub fn max_quota_wait(mut self, wait: Duration) -> Self {
        self.config.max_quota_wait = wait;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn collision(mut self, policy: CollisionPolicy) -> Self {
        self.config.collision = policy;
        self
    }

    pub fn rewrite_mode(mut self, mode: RewriteMode) -> Self {
        self.config.rewrite_mode = mode;
        self
    }

    pub fn failure_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.failure_marker = Some(marker.into());
        self
    }

    pub fn verify_repository(mut self, v: bool) -> Self {
        self.config.verify_repository = v;
        self
    }

    pub fn source(mut self, source: Arc<dyn ImageSource>) -> Self {
        self.config.source = Some(source);
        self
    }

    pub fn store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.config.store = Some(store);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Credentials are only required when no content store was injected;
    /// an injected store brings its own.
    pub fn build(self) -> Result<MigrationConfig, MigrateError> {
        self.validate(true)?;
        Ok(self.config)
    }

    /// Like [`build`](Self::build) but without requiring credentials.
    ///
    /// For configurations only passed to [`crate::plan`], which never
    /// touches the network.
    pub fn build_offline(self) -> Result<MigrationConfig, MigrateError> {
        self.validate(false)?;
        Ok(self.config)
    }

    fn validate(&self, require_credentials: bool) -> Result<(), MigrateError> {
        let c = &self.config;
        if c.repo.owner.is_empty() || c.repo.name.is_empty() {
            return Err(MigrateError::InvalidConfig(
                "target repository is not set (expected owner/name)".into(),
            ));
        }
        if c.repo.branch.trim().is_empty() {
            return Err(MigrateError::InvalidConfig("branch must not be empty".into()));
        }
        if c.source_hosts.is_empty() {
            return Err(MigrateError::InvalidConfig(
                "at least one source host is required".into(),
            ));
        }
        if require_credentials
            && c.store.is_none()
            && c.token.as_deref().is_none_or(str::is_empty)
        {
            return Err(MigrateError::InvalidConfig(
                "a GitHub token is required (set GITHUB_TOKEN or --token)".into(),
            ));
        }
        if c.fetch_timeout_secs == 0 || c.api_timeout_secs == 0 {
            return Err(MigrateError::InvalidConfig("timeouts must be ≥ 1s".into()));
        }
        Ok(())
    }
}
