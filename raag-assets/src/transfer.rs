//! Transfer adapter
//!
//! One fetch attempt: given a resolved URL and the exact path to write, the
//! adapter either leaves the complete body at that path and reports how many
//! bytes it wrote, or removes whatever it partially wrote and reports why.

use crate::error::AcquireError;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Result of a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transferred {
    /// The path the body was written to (always the requested destination)
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// Single-attempt fetch primitive
#[async_trait]
pub trait TransferAdapter: Send + Sync {
    /// Fetch `url` into `destination`, giving up after `timeout`
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        timeout: Duration,
    ) -> Result<Transferred, AcquireError>;
}

/// HTTP(S) transfer over reqwest
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    client: reqwest::Client,
}

impl HttpTransfer {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_inner(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<Transferred, AcquireError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e))?;

        let status = response.status();
        if let Some(err) = status_error(status, url) {
            return Err(err);
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AcquireError::filesystem(parent, e))?;
        }
        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| AcquireError::filesystem(destination, e))?;

        let mut bytes_written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| map_reqwest_error(&e))? {
            file.write_all(&chunk)
                .await
                .map_err(|e| AcquireError::filesystem(destination, e))?;
            bytes_written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| AcquireError::filesystem(destination, e))?;
        file.sync_all()
            .await
            .map_err(|e| AcquireError::filesystem(destination, e))?;

        Ok(Transferred {
            path: destination.to_path_buf(),
            bytes_written,
        })
    }
}

#[async_trait]
impl TransferAdapter for HttpTransfer {
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        timeout: Duration,
    ) -> Result<Transferred, AcquireError> {
        debug!(url = %url, destination = %destination.display(), "Fetching");

        let result = match tokio::time::timeout(timeout, self.fetch_inner(url, destination)).await
        {
            Ok(result) => result,
            Err(_) => Err(AcquireError::Transient(format!(
                "timed out after {}s",
                timeout.as_secs_f32()
            ))),
        };

        if result.is_err() {
            remove_partial(destination).await;
        }
        result
    }
}

/// Map a non-success HTTP status to the error taxonomy
pub fn status_error(status: StatusCode, url: &str) -> Option<AcquireError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            AcquireError::NotFound(format!("HTTP {} for {}", status.as_u16(), url))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            AcquireError::QuotaExceeded(format!("HTTP 429 for {}", url))
        }
        _ => AcquireError::Transient(format!("HTTP {} for {}", status.as_u16(), url)),
    })
}

fn map_reqwest_error(err: &reqwest::Error) -> AcquireError {
    if err.is_timeout() {
        AcquireError::Transient(format!("timed out: {}", err))
    } else if err.is_connect() {
        AcquireError::Transient(format!("connection failed: {}", err))
    } else {
        AcquireError::Transient(err.to_string())
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!(path = %path.display(), error = %e, "Could not remove partial download"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::OK, "u").is_none());
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "u"),
            Some(AcquireError::NotFound(_))
        ));
        assert!(matches!(
            status_error(StatusCode::GONE, "u"),
            Some(AcquireError::NotFound(_))
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "u"),
            Some(AcquireError::QuotaExceeded(_))
        ));
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, "u"),
            Some(AcquireError::Transient(_))
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "u"),
            Some(AcquireError::Transient(_))
        ));
    }

    #[test]
    fn test_client_creation() {
        assert!(HttpTransfer::new("raag-assets/test").is_ok());
    }
}
