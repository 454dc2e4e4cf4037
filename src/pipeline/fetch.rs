//! Image Fetcher: download the bytes behind a candidate URL.
//!
//! One GET per URL per run, bounded by a timeout. Every failure mode maps to
//! a [`FetchError`] that is handed back to the caller; nothing here aborts
//! the run. Rerunning the whole migration is the retry mechanism.

use crate::error::FetchError;
use crate::pipeline::extract::direct_download_url;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, info};

/// Downloaded image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    /// `Content-Type` reported by the server, if any.
    pub content_type: Option<String>,
}

/// Anything that can turn a URL into image bytes.
///
/// The HTTP implementation is [`HttpImageFetcher`]; tests and embedders can
/// inject their own through [`crate::config::MigrationConfigBuilder::source`].
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError>;
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpImageFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, reqwest::Error> {
        Self::with_builder(reqwest::Client::builder(), timeout_secs)
    }

    /// Like [`new`](Self::new) on top of a caller-prepared builder
    /// (proxies, DNS overrides, extra root certificates).
    pub fn with_builder(
        builder: reqwest::ClientBuilder,
        timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = builder
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("dropbox2pages/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            FetchError::Transport {
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl ImageSource for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let download_url = direct_download_url(url);
        info!("Downloading {}", download_url);

        let response = self
            .client
            .get(&download_url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        let image = check_body(bytes.to_vec(), content_type)?;
        debug!(
            "Downloaded {} bytes ({})",
            image.bytes.len(),
            image.content_type.as_deref().unwrap_or("unknown type")
        );
        Ok(image)
    }
}

/// Reject bodies that cannot be an image: empty, or an HTML page.
///
/// Dropbox answers an expired or private share link with `200 OK` and a
/// sign-in page, so a 2xx status alone is not proof of success.
pub fn check_body(bytes: Vec<u8>, content_type: Option<String>) -> Result<FetchedImage, FetchError> {
    if bytes.is_empty() {
        return Err(FetchError::EmptyBody);
    }
    if let Some(ct) = content_type.as_deref() {
        let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if mime == "text/html" || mime == "application/xhtml+xml" {
            return Err(FetchError::NotAnImage {
                content_type: ct.to_string(),
            });
        }
    }
    Ok(FetchedImage {
        bytes,
        content_type,
    })
}
