//! Dataset archive download
//!
//! The prefix database is rebuilt from a tarball that some collaborator
//! supplies. [`HttpFetcher`] downloads it over HTTPS; [`InMemoryFetcher`]
//! serves bytes the caller already holds.

use crate::config::{Ip2AsConfig, DEFAULT_DATASET_URL, DEFAULT_FETCH_TIMEOUT_SECS, USER_AGENT};
use async_trait::async_trait;
use log::info;
use std::io::Write;
use std::time::Duration;

/// Error type for dataset downloads
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Server answered with a non-success status
    #[error("Server returned HTTP status {0}")]
    Status(u16),

    /// Request timeout
    #[error("Request timed out")]
    Timeout,

    /// Writing the downloaded bytes failed
    #[error("Failed to store download: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(e.to_string())
        }
    }
}

/// Source of the raw dataset archive
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Write the complete archive into `sink`, returning the byte count.
    async fn fetch(&self, sink: &mut (dyn Write + Send)) -> Result<u64, FetchError>;
}

/// Downloads the dataset archive over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    url: String,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher for `url` with the default timeout
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }

    /// Create a fetcher from the URL and timeout in `config`
    pub fn from_config(config: &Ip2AsConfig) -> Self {
        Self::new(config.dataset_url.clone()).with_timeout(config.fetch_timeout)
    }

    /// Set the overall request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL this fetcher downloads from
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_DATASET_URL)
    }
}

#[async_trait]
impl ArchiveFetcher for HttpFetcher {
    async fn fetch(&self, sink: &mut (dyn Write + Send)) -> Result<u64, FetchError> {
        info!("Downloading {} ...", self.url);

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        let mut response = client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut progress = Progress::new(response.content_length());
        while let Some(chunk) = response.chunk().await? {
            sink.write_all(&chunk)?;
            if let Some(line) = progress.advance(chunk.len() as u64) {
                info!("{line}");
            }
        }
        sink.flush()?;

        Ok(progress.done)
    }
}

/// Serves an archive already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryFetcher {
    bytes: Vec<u8>,
}

impl InMemoryFetcher {
    /// Wrap raw archive bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

#[async_trait]
impl ArchiveFetcher for InMemoryFetcher {
    async fn fetch(&self, sink: &mut (dyn Write + Send)) -> Result<u64, FetchError> {
        sink.write_all(&self.bytes)?;
        sink.flush()?;
        Ok(self.bytes.len() as u64)
    }
}

/// Download progress, reported at each whole percent (or each MB when the
/// length is unknown)
#[derive(Debug)]
struct Progress {
    total: Option<u64>,
    done: u64,
    last_step: u64,
}

const BYTES_PER_MB: f64 = 1e6;

impl Progress {
    fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            done: 0,
            last_step: 0,
        }
    }

    fn advance(&mut self, bytes: u64) -> Option<String> {
        self.done += bytes;
        let done_mb = self.done as f64 / BYTES_PER_MB;
        match self.total {
            Some(total) => {
                let percent = (self.done * 100 / total).min(100);
                if percent == self.last_step {
                    return None;
                }
                self.last_step = percent;
                Some(format!(
                    "  {done_mb:.1} / {:.1} MB ({percent}%)",
                    total as f64 / BYTES_PER_MB
                ))
            }
            None => {
                let step = self.done / 1_000_000;
                if step == self.last_step {
                    return None;
                }
                self.last_step = step;
                Some(format!("  {done_mb:.1} MB"))
            }
        }
    }
}
