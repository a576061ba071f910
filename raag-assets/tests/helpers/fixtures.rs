//! Scripted adapters and fixture payloads for pipeline tests

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use raag_assets::audio_search::AudioSearch;
use raag_assets::config::PipelineConfig;
use raag_assets::error::AcquireError;
use raag_assets::search::SearchProvider;
use raag_assets::transfer::{TransferAdapter, Transferred};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One scripted response of [`MockTransfer`]
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Write these bytes to the destination
    Body(Vec<u8>),
    Fail(AcquireError),
    /// Cancel the token, then never complete
    CancelAndHang(CancellationToken),
}

#[derive(Default)]
struct TransferState {
    scripts: HashMap<String, VecDeque<Scripted>>,
    calls: HashMap<String, usize>,
}

/// Transfer adapter that replays scripted responses per URL
///
/// Each call consumes the next response; the last one repeats forever.
/// Unknown URLs answer `NotFound`. Clones share state, so a test can keep a
/// handle after boxing one into the orchestrator.
#[derive(Clone, Default)]
pub struct MockTransfer {
    state: Arc<Mutex<TransferState>>,
}

impl MockTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, url: &str, responses: Vec<Scripted>) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(url.to_string(), responses.into());
        self
    }

    pub fn body(self, url: &str, bytes: Vec<u8>) -> Self {
        self.script(url, vec![Scripted::Body(bytes)])
    }

    pub fn fail(self, url: &str, error: AcquireError) -> Self {
        self.script(url, vec![Scripted::Fail(error)])
    }

    pub fn calls(&self, url: &str) -> usize {
        self.state.lock().unwrap().calls.get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    fn next_step(&self, url: &str) -> Scripted {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(url.to_string()).or_insert(0) += 1;
        match state.scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Scripted::Fail(AcquireError::NotFound(format!("HTTP 404 for {}", url))),
        }
    }
}

#[async_trait]
impl TransferAdapter for MockTransfer {
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        _timeout: Duration,
    ) -> Result<Transferred, AcquireError> {
        match self.next_step(url) {
            Scripted::Body(bytes) => {
                if let Some(parent) = destination.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| AcquireError::filesystem(parent, e))?;
                }
                std::fs::write(destination, &bytes)
                    .map_err(|e| AcquireError::filesystem(destination, e))?;
                Ok(Transferred {
                    path: destination.to_path_buf(),
                    bytes_written: bytes.len() as u64,
                })
            }
            Scripted::Fail(error) => Err(error),
            Scripted::CancelAndHang(token) => {
                token.cancel();
                std::future::pending().await
            }
        }
    }
}

/// Search provider answering from a fixed table of query → URL
#[derive(Clone, Default)]
pub struct MockSearch {
    answers: Arc<Mutex<HashMap<String, Result<Option<String>, AcquireError>>>>,
    queries: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, query: &str, result: Result<Option<String>, AcquireError>) -> Self {
        self.answers.lock().unwrap().insert(query.to_string(), result);
        self
    }

    /// Every (query, context) pair seen so far
    pub fn queries(&self) -> Vec<(String, String)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, query: &str, context: &str) -> Result<Option<String>, AcquireError> {
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), context.to_string()));
        self.answers
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or(Ok(None))
    }
}

/// Audio search that replays scripted responses per query
///
/// Same replay rules as [`MockTransfer`]; unknown queries find nothing.
#[derive(Clone, Default)]
pub struct MockAudioSearch {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Scripted>>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockAudioSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, query: &str, responses: Vec<Scripted>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(query.to_string(), responses.into());
        self
    }

    /// Every (query, context) pair seen so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn next_step(&self, query: &str) -> Scripted {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(query) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Scripted::Fail(AcquireError::NotFound(format!("no audio found for '{}'", query))),
        }
    }
}

#[async_trait]
impl AudioSearch for MockAudioSearch {
    async fn fetch_query(
        &self,
        query: &str,
        context: &str,
        destination: &Path,
    ) -> Result<Transferred, AcquireError> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), context.to_string()));
        match self.next_step(query) {
            Scripted::Body(bytes) => {
                if let Some(parent) = destination.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| AcquireError::filesystem(parent, e))?;
                }
                std::fs::write(destination, &bytes)
                    .map_err(|e| AcquireError::filesystem(destination, e))?;
                Ok(Transferred {
                    path: destination.to_path_buf(),
                    bytes_written: bytes.len() as u64,
                })
            }
            Scripted::Fail(error) => Err(error),
            Scripted::CancelAndHang(token) => {
                token.cancel();
                std::future::pending().await
            }
        }
    }
}

/// An MPEG-2 Layer III stream without an ID3 tag, above the audio threshold
pub fn untagged_mp3_bytes() -> Vec<u8> {
    let mut bytes = vec![0u8; 400_000];
    bytes[..4].copy_from_slice(&[0xFF, 0xF3, 0x90, 0xC4]);
    bytes
}

/// Pipeline config for tests: short backoff, no courtesy delay
pub fn test_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::new(root);
    config.max_attempts = 3;
    config.base_delay = Duration::from_millis(10);
    config.inter_asset_delay = Duration::ZERO;
    config.request_timeout = Duration::from_secs(5);
    config
}

/// A decodable JPEG comfortably above the 50 KB genuine threshold
///
/// Noise compresses poorly, so a 512x512 frame stays large at high quality.
pub fn genuine_jpeg_bytes() -> Vec<u8> {
    let mut seed: u32 = 0x2545_f491;
    let img = RgbImage::from_fn(512, 512, |_, _| {
        let mut channel = || {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (seed >> 24) as u8
        };
        image::Rgb([channel(), channel(), channel()])
    });

    let mut buf = Vec::new();
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 95))
        .unwrap();
    assert!(buf.len() > 50_000, "fixture JPEG too small: {} bytes", buf.len());
    buf
}

/// Parse the manifest written under `root`
pub fn read_manifest_json(path: &Path) -> serde_json::Value {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("manifest {} unreadable: {}", path.display(), e));
    serde_json::from_str(&content).unwrap()
}

/// `root/<relative>` with parents created
pub fn write_file(root: &Path, relative: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, bytes).unwrap();
    path
}
