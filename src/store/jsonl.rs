use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::io::SeekFrom;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// An entry with a unique identity inside a log.
pub trait Keyed {
    type Key: Clone + Eq + Hash + std::fmt::Display;

    fn key(&self) -> Self::Key;
}

/// Append-only newline-delimited JSON log.
///
/// History is never rewritten. On replay the first entry for a key wins and
/// unparseable lines (e.g. a write cut short by a crash) are skipped.
#[derive(Debug, Clone)]
pub struct JsonlLog<T> {
    path: PathBuf,
    _entry: PhantomData<fn() -> T>,
}

impl<T> JsonlLog<T>
where
    T: Serialize + DeserializeOwned + Keyed,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _entry: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replay the log in file order, keeping the first entry per key
    pub async fn load_entries(&self) -> StoreResult<Vec<T>> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        let mut skipped = 0usize;
        let mut duplicates = 0usize;

        for (index, line) in content.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<T>(line) {
                Ok(entry) => {
                    if seen.insert(entry.key()) {
                        entries.push(entry);
                    } else {
                        duplicates += 1;
                    }
                }
                Err(e) => {
                    skipped += 1;
                    warn!(
                        path = %self.path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping unreadable log line"
                    );
                }
            }
        }

        debug!(
            path = %self.path.display(),
            entries = entries.len(),
            skipped,
            duplicates,
            "Log replayed"
        );

        Ok(entries)
    }

    /// Replay the log into a key → entry mapping
    pub async fn load(&self) -> StoreResult<HashMap<T::Key, T>> {
        Ok(self
            .load_entries()
            .await?
            .into_iter()
            .map(|entry| (entry.key(), entry))
            .collect())
    }

    /// Append one entry as a single write
    pub async fn append(&self, entry: &T) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        if self.ends_mid_line().await? {
            line.insert(0, '\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;

        Ok(())
    }

    /// A crash mid-write leaves the file without a trailing newline
    async fn ends_mid_line(&self) -> StoreResult<bool> {
        let mut file = match fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(self.io_error(e)),
        };

        let len = file.metadata().await.map_err(|e| self.io_error(e))?.len();
        if len == 0 {
            return Ok(false);
        }

        file.seek(SeekFrom::End(-1))
            .await
            .map_err(|e| self.io_error(e))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)
            .await
            .map_err(|e| self.io_error(e))?;

        Ok(last[0] != b'\n')
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}
