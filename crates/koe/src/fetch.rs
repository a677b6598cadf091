//! Audio retrieval: download a URL into the run's scratch directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{StatusCode, Url};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use koe_conf::FetchConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid audio URL {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme {0}")]
    UnsupportedScheme(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server answered {0}")]
    Status(StatusCode),

    #[error("audio exceeds {0} bytes")]
    TooLarge(u64),

    #[error("failed to spool audio: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP client for audio downloads.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    /// Download `url` into `dir`, keeping the URL's file extension as a format hint.
    #[instrument(skip(self, dir), fields(bytes = tracing::field::Empty))]
    pub async fn download(&self, url: &str, dir: &Path) -> Result<PathBuf, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let mut response = self.client.get(parsed.as_str()).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(FetchError::TooLarge(self.max_bytes));
        }

        let path = dir.join(spool_name(&parsed));
        let mut file = tokio::fs::File::create(&path).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(FetchError::TooLarge(self.max_bytes));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::Span::current().record("bytes", written);
        debug!(path = %path.display(), "audio downloaded");
        Ok(path)
    }
}

fn spool_name(url: &Url) -> String {
    let extension = url
        .path_segments()
        .and_then(|segments| segments.last())
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    match extension {
        Some(ext) => format!("input.{}", ext.to_ascii_lowercase()),
        None => "input".to_string(),
    }
}
