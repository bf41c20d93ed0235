use crate::{fingerprint::Fingerprint, BackupError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persisted record of one completed backup. Never mutated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub fingerprint: Fingerprint,
    pub dest_path: PathBuf,
    pub backed_up_at: DateTime<Utc>,
}

/// Append-only fingerprint index, one JSON record per line. The file is
/// read fully on open; each `record` appends a line and flushes, so a crash
/// loses at most the write in flight. A corrupt or truncated trailing line
/// is discarded on load with a warning.
pub struct FingerprintStore {
    path: PathBuf,
    entries: Vec<BackupEntry>,
    index: HashMap<Fingerprint, usize>,
    writer: BufWriter<File>,
}

impl FingerprintStore {
    /// Open the store at `path`, creating it (and parent directories) when
    /// missing, and load all valid entries.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BackupError::Store(format!("failed to create {}: {}", parent.display(), e)))?;
        }

        let mut entries = Vec::new();
        let mut index = HashMap::new();
        let mut discarded = 0usize;

        if path.exists() {
            let reader = BufReader::new(
                File::open(&path)
                    .map_err(|e| BackupError::Store(format!("failed to open {}: {}", path.display(), e)))?,
            );

            for (line_number, line) in reader.lines().enumerate() {
                let line = line
                    .map_err(|e| BackupError::Store(format!("failed to read {}: {}", path.display(), e)))?;

                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<BackupEntry>(&line) {
                    Ok(entry) => {
                        if index.contains_key(&entry.fingerprint) {
                            warn!(
                                "Duplicate fingerprint at {}:{}, keeping the first record",
                                path.display(),
                                line_number + 1
                            );
                            continue;
                        }
                        index.insert(entry.fingerprint.clone(), entries.len());
                        entries.push(entry);
                    }
                    Err(e) => {
                        warn!(
                            "Discarding corrupt record at {}:{}: {}",
                            path.display(),
                            line_number + 1,
                            e
                        );
                        discarded += 1;
                    }
                }
            }
        }

        debug!(
            "Loaded {} fingerprint entries from {} ({} discarded)",
            entries.len(),
            path.display(),
            discarded
        );

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| BackupError::Store(format!("failed to open {} for append: {}", path.display(), e)))?;

        Ok(Self {
            path,
            entries,
            index,
            writer: BufWriter::new(file),
        })
    }

    /// Prior record for this fingerprint, if it was ever backed up
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<&BackupEntry> {
        self.index.get(fingerprint).map(|&i| &self.entries[i])
    }

    /// Append a new entry and flush it to disk. Callers are expected to
    /// `lookup` first; recording an existing fingerprint is an invariant
    /// violation and fails with `Conflict`.
    pub fn record(
        &mut self,
        fingerprint: Fingerprint,
        dest_path: &Path,
        backed_up_at: DateTime<Utc>,
    ) -> Result<()> {
        if self.index.contains_key(&fingerprint) {
            return Err(BackupError::Conflict(fingerprint.to_string()));
        }

        let entry = BackupEntry {
            fingerprint: fingerprint.clone(),
            dest_path: dest_path.to_path_buf(),
            backed_up_at,
        };

        let line = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;

        self.index.insert(fingerprint, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in the order they were recorded
    pub fn iter(&self) -> impl Iterator<Item = &BackupEntry> {
        self.entries.iter()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
