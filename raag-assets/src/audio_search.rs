//! Audio search through spotdl
//!
//! Audio entries that only carry a query are found and downloaded in one
//! step by the `spotdl` command-line tool. Each attempt gets a private work
//! directory and an output template with a fixed file stem, so the file the
//! tool wrote is known exactly and is moved onto the staging path.

use crate::error::{truncate_reason, AcquireError};
use crate::search::full_query;
use crate::transfer::Transferred;
use async_trait::async_trait;
use raag_common::config::AudioSearchSettings;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// File stem handed to the output template
const OUTPUT_STEM: &str = "track";

/// How long `--version` may take before the tool counts as unavailable
const VERSION_TIMEOUT: Duration = Duration::from_secs(15);

/// Finds audio for a query and writes it to an exact path
#[async_trait]
pub trait AudioSearch: Send + Sync {
    /// Search for `query` with `context` words appended and write the match
    /// to `destination`
    ///
    /// A search that finds nothing is `NotFound`. On any error nothing is
    /// left at `destination`.
    async fn fetch_query(
        &self,
        query: &str,
        context: &str,
        destination: &Path,
    ) -> Result<Transferred, AcquireError>;
}

/// Runs `spotdl <query> --output <template> --format <fmt> --bitrate <rate>`
#[derive(Debug, Clone)]
pub struct SpotdlClient {
    program: PathBuf,
    args: Vec<String>,
    format: String,
    bitrate: String,
    timeout: Duration,
}

impl SpotdlClient {
    pub fn new(settings: &AudioSearchSettings) -> Self {
        Self {
            program: settings.program.clone(),
            args: settings.args.clone(),
            format: settings.format.clone(),
            bitrate: settings.bitrate.clone(),
            timeout: Duration::from_secs(settings.timeout_secs.max(1)),
        }
    }

    /// Client for `settings` if the tool answers `--version`
    pub async fn detect(settings: &AudioSearchSettings) -> Option<Self> {
        let client = Self::new(settings);
        match client.version().await {
            Ok(version) => {
                info!("Audio search: {} {}", client.program.display(), version);
                Some(client)
            }
            Err(e) => {
                warn!(
                    "Audio search unavailable ({}): query-only audio will get placeholders. Install with `pipx install spotdl`",
                    e
                );
                None
            }
        }
    }

    /// First line printed by `--version`
    pub async fn version(&self) -> Result<String, AcquireError> {
        let mut command = self.command();
        command.arg("--version");

        let output = self.run(command, VERSION_TIMEOUT).await?;
        if !output.status.success() {
            return Err(exit_error(&self.program, &output));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or("").trim().to_string())
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Run to completion; the child is killed if `timeout` passes first
    async fn run(&self, mut command: Command, timeout: Duration) -> Result<Output, AcquireError> {
        match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(AcquireError::NotFound(
                format!("{} is not installed", self.program.display()),
            )),
            Ok(Err(e)) => Err(AcquireError::Transient(format!(
                "failed to run {}: {}",
                self.program.display(),
                e
            ))),
            Err(_) => Err(AcquireError::Transient(format!(
                "{} timed out after {}s",
                self.program.display(),
                timeout.as_secs_f32()
            ))),
        }
    }

    async fn download(
        &self,
        query: &str,
        work_dir: &Path,
        destination: &Path,
    ) -> Result<Transferred, AcquireError> {
        tokio::fs::create_dir_all(work_dir)
            .await
            .map_err(|e| AcquireError::filesystem(work_dir, e))?;

        let mut template = OsString::from(work_dir.join(OUTPUT_STEM));
        template.push(".{output-ext}");

        let mut command = self.command();
        command
            .arg(query)
            .arg("--output")
            .arg(&template)
            .arg("--format")
            .arg(&self.format)
            .arg("--bitrate")
            .arg(&self.bitrate);

        debug!(query = %query, work_dir = %work_dir.display(), "Running audio search");
        let output = self.run(command, self.timeout).await?;
        if !output.status.success() {
            return Err(exit_error(&self.program, &output));
        }

        let written = work_dir.join(format!("{}.{}", OUTPUT_STEM, self.format));
        if !tokio::fs::try_exists(&written).await.unwrap_or(false) {
            return Err(AcquireError::NotFound(format!(
                "no audio found for '{}'",
                query
            )));
        }

        tokio::fs::rename(&written, destination)
            .await
            .map_err(|e| AcquireError::filesystem(destination, e))?;
        let bytes_written = tokio::fs::metadata(destination)
            .await
            .map_err(|e| AcquireError::filesystem(destination, e))?
            .len();

        info!(query = %query, bytes = bytes_written, "Audio search hit");
        Ok(Transferred {
            path: destination.to_path_buf(),
            bytes_written,
        })
    }
}

#[async_trait]
impl AudioSearch for SpotdlClient {
    async fn fetch_query(
        &self,
        query: &str,
        context: &str,
        destination: &Path,
    ) -> Result<Transferred, AcquireError> {
        let q = full_query(query, context);
        let work_dir = work_dir_for(destination);
        remove_work_dir(&work_dir).await;

        let result = self.download(&q, &work_dir, destination).await;

        remove_work_dir(&work_dir).await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(destination).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %destination.display(), error = %e, "Could not remove partial audio");
                }
            }
        }
        result
    }
}

/// Private directory next to `destination` for one attempt
pub fn work_dir_for(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".search");
    destination.with_file_name(name)
}

async fn remove_work_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove audio search directory"),
    }
}

/// Map a failed run to the error taxonomy
///
/// Rate limiting by the upstream services is quota exhaustion; any other
/// non-zero exit may succeed on a later attempt.
fn exit_error(program: &Path, output: &Output) -> AcquireError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lowered = stderr.to_ascii_lowercase();
    let detail = truncate_reason(stderr.trim());
    let code = output
        .status
        .code()
        .map_or_else(|| "signal".to_string(), |c| c.to_string());

    if lowered.contains("rate limit") || lowered.contains("429") {
        AcquireError::QuotaExceeded(format!("{} rate limited: {}", program.display(), detail))
    } else {
        AcquireError::Transient(format!(
            "{} exited with {}: {}",
            program.display(),
            code,
            detail
        ))
    }
}
