//! Checkpoint store
//!
//! Newline-delimited list of asset ids that reached a terminal outcome.
//! Every append opens the file, writes one line and syncs before returning,
//! so an abrupt exit loses at most the asset that was in flight.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Durable, append-only record of resolved asset ids
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    resolved: HashSet<String>,
}

impl CheckpointStore {
    /// Open the store at `path`, reading any ids recorded by prior runs
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let resolved = read_ids(&path)?;
        if !resolved.is_empty() {
            info!(
                path = %path.display(),
                resolved = resolved.len(),
                "Resuming from checkpoint"
            );
        }
        Ok(Self { path, resolved })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resolved.contains(id)
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// Record `id` as resolved; flushed to disk before returning
    ///
    /// Appending an id that is already recorded is a no-op.
    pub fn append(&mut self, id: &str) -> io::Result<()> {
        if self.resolved.contains(id) {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", id)?;
        file.sync_all()?;

        self.resolved.insert(id.to_string());
        debug!(asset_id = id, "Checkpointed");
        Ok(())
    }

    /// Forget every id and remove the file
    pub fn clear(&mut self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.resolved.clear();
        info!(path = %self.path.display(), "Checkpoint cleared");
        Ok(())
    }
}

/// Read ids from a checkpoint file; a missing file is an empty set
pub fn read_ids(path: &Path) -> io::Result<HashSet<String>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            warn!(path = %path.display(), "Checkpoint is not valid UTF-8, ignoring it");
            return Ok(HashSet::new());
        }
        Err(e) => return Err(e),
    };

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
