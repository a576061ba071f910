//! Single-asset acquisition
//!
//! One attempt resolves the source URL (searching when the catalog gives a
//! query), downloads into a `.part` staging sibling, and validates the
//! staged bytes. Query-only audio is searched and downloaded in one step by
//! the audio search tool, straight into the same staging path. The retry controller wraps the whole attempt; a successful
//! result is then promoted over the destination.

use crate::audio_search::AudioSearch;
use crate::catalog::{AssetDescriptor, MediaKind, SourceHint};
use crate::classifier::placeholder_siblings;
use crate::content::validate_staged;
use crate::error::AcquireError;
use crate::retry::{retry_with_backoff, AcquireFailure, RetryPolicy};
use crate::search::{full_query, SearchProvider};
use crate::transfer::TransferAdapter;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Genuine content now at the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    pub path: PathBuf,
    pub bytes_written: u64,
    /// URL fetched, or the full query for searched audio
    pub source_url: String,
    pub attempts: u32,
}

/// Staging sibling used while downloading `destination`
pub fn staging_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Fetches one asset with retries
pub struct Acquirer<'a> {
    pub transfer: &'a dyn TransferAdapter,
    pub search: Option<&'a dyn SearchProvider>,
    pub audio_search: Option<&'a dyn AudioSearch>,
    pub policy: RetryPolicy,
    pub timeout: Duration,
}

impl<'a> Acquirer<'a> {
    /// Acquire `descriptor` into `root`
    ///
    /// `search_context` is appended to query-based sources. `network_used`
    /// is set once any request went out, so the caller knows whether a
    /// courtesy delay is due.
    pub async fn acquire(
        &self,
        root: &Path,
        descriptor: &AssetDescriptor,
        search_context: &str,
        cancel: &CancellationToken,
        network_used: &mut bool,
    ) -> Result<Acquired, AcquireFailure> {
        let destination = descriptor.destination_under(root);
        let staging = staging_path(&destination);
        let kind = descriptor.media_kind();

        // Search hits are reused across attempts so retries do not spend quota
        let resolved: Mutex<Option<String>> = Mutex::new(None);
        let attempts = Mutex::new(0u32);
        let touched = Mutex::new(false);

        let result = retry_with_backoff(&descriptor.id, &self.policy, cancel, |attempt| {
            let resolved = &resolved;
            let attempts = &attempts;
            let touched = &touched;
            let staging = &staging;
            let destination = &destination;
            async move {
                *lock(attempts) = attempt + 1;
                let (url, transferred) = match self.audio_query(descriptor, kind) {
                    Some((query, audio_search)) => {
                        *lock(touched) = true;
                        debug!(asset_id = %descriptor.id, attempt, query = %query, "Audio search attempt");
                        let transferred = audio_search
                            .fetch_query(query, search_context, staging)
                            .await?;
                        (full_query(query, search_context), transferred)
                    }
                    None => {
                        let cached = lock(resolved).clone();
                        let url = match cached {
                            Some(url) => url,
                            None => {
                                let url = self
                                    .resolve_url(descriptor, kind, search_context, touched)
                                    .await?;
                                *lock(resolved) = Some(url.clone());
                                url
                            }
                        };

                        *lock(touched) = true;
                        debug!(asset_id = %descriptor.id, attempt, url = %url, "Transfer attempt");
                        let transferred = self.transfer.fetch(&url, staging, self.timeout).await?;
                        (url, transferred)
                    }
                };
                let bytes = validate_staged(&transferred.path, destination, kind)
                    .map_err(|e| {
                        discard(&transferred.path);
                        e
                    })?;
                Ok((url, bytes))
            }
        })
        .await;

        if *lock(&touched) {
            *network_used = true;
        }

        match result {
            Ok((source_url, bytes_written)) => {
                promote(&staging, &destination, kind).map_err(|error| AcquireFailure::Terminal {
                    attempts: *lock(&attempts),
                    error,
                })?;
                Ok(Acquired {
                    path: destination,
                    bytes_written,
                    source_url,
                    attempts: *lock(&attempts),
                })
            }
            Err(failure) => {
                discard(&staging);
                Err(failure)
            }
        }
    }

    /// Query and tool for query-only audio, when audio search is available
    fn audio_query<'d>(
        &self,
        descriptor: &'d AssetDescriptor,
        kind: MediaKind,
    ) -> Option<(&'d str, &'a dyn AudioSearch)> {
        match (&descriptor.source, kind, self.audio_search) {
            (SourceHint::Query(query), MediaKind::Audio, Some(audio_search)) => {
                Some((query.as_str(), audio_search))
            }
            _ => None,
        }
    }

    async fn resolve_url(
        &self,
        descriptor: &AssetDescriptor,
        kind: MediaKind,
        search_context: &str,
        touched: &Mutex<bool>,
    ) -> Result<String, AcquireError> {
        match &descriptor.source {
            SourceHint::Url(url) => Ok(url.clone()),
            SourceHint::Query(query) => {
                if kind == MediaKind::Audio {
                    return Err(AcquireError::NotFound(
                        "audio search is not available".to_string(),
                    ));
                }
                let provider = self.search.ok_or_else(|| {
                    AcquireError::NotFound("image search is not configured".to_string())
                })?;
                *lock(touched) = true;
                provider
                    .search(query, search_context)
                    .await?
                    .ok_or_else(|| AcquireError::NotFound(format!("no search results for '{}'", query)))
            }
        }
    }
}

/// Move the validated staging file over the destination and drop placeholder siblings
pub fn promote(staging: &Path, destination: &Path, kind: MediaKind) -> Result<(), AcquireError> {
    if let Err(e) = fs::rename(staging, destination) {
        discard(staging);
        return Err(AcquireError::filesystem(destination, e));
    }

    for sibling in placeholder_siblings(destination, kind) {
        match fs::remove_file(&sibling) {
            Ok(()) => debug!(path = %sibling.display(), "Removed superseded placeholder"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %sibling.display(), error = %e, "Could not remove superseded placeholder"),
        }
    }
    Ok(())
}

/// Remove a staging file, ignoring absence
pub fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Could not remove staging file");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::audio_placeholder_path;
    use tempfile::TempDir;

    #[test]
    fn test_staging_path() {
        assert_eq!(
            staging_path(Path::new("/root/images/a.jpg")),
            PathBuf::from("/root/images/a.jpg.part")
        );
    }

    #[test]
    fn test_promote_supersedes_audio_placeholder() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("river.mp3");
        let staging = staging_path(&destination);
        fs::write(&staging, b"ID3 genuine").unwrap();
        fs::write(audio_placeholder_path(&destination), b"RIFF silence").unwrap();

        promote(&staging, &destination, MediaKind::Audio).unwrap();

        assert_eq!(fs::read(&destination).unwrap(), b"ID3 genuine");
        assert!(!staging.exists());
        assert!(!audio_placeholder_path(&destination).exists());
    }

    #[test]
    fn test_promote_missing_staging_is_filesystem_error() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("a.jpg");
        let result = promote(&staging_path(&destination), &destination, MediaKind::Image);
        assert!(matches!(result, Err(AcquireError::Filesystem { .. })));
    }
}
