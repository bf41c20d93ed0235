use crate::{
    config::BackupConfig,
    device::MediaSource,
    fingerprint::FingerprintComputer,
    metadata::CaptureDateResolver,
    scanner::{FileRecord, FileScanner},
    store::FingerprintStore,
    BackupError, Result,
};
use chrono::{DateTime, Local, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

/// Cooperative stop flag, checked between files. Triggering it lets the
/// current file finish, so the fingerprint store only ever holds entries
/// for fully copied files.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Aggregate counters for one run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackupStats {
    pub copied: usize,
    pub skipped_duplicate: usize,
    pub skipped_excluded: usize,
    pub errors: usize,
    pub bytes_copied: u64,
}

impl BackupStats {
    pub fn total_files(&self) -> usize {
        self.copied + self.skipped_duplicate + self.skipped_excluded + self.errors
    }
}

/// Drives the scan → fingerprint → copy pipeline and aggregates statistics.
/// Files are processed sequentially in scan order; per-file failures are
/// counted and never abort the run.
pub struct BackupExecutor {
    config: BackupConfig,
    scanner: FileScanner,
    computer: FingerprintComputer,
    dates: CaptureDateResolver,
}

impl BackupExecutor {
    pub fn new(config: BackupConfig) -> Result<Self> {
        config.validate()?;
        let scanner = FileScanner::new(&config)?;

        Ok(Self {
            config,
            scanner,
            computer: FingerprintComputer::new(),
            dates: CaptureDateResolver::new(),
        })
    }

    /// Execute a full backup run against `source`, copying new files into
    /// `dest_root` and recording them in the fingerprint store kept there.
    pub async fn run(
        &self,
        source: &dyn MediaSource,
        dest_root: &Path,
        stop: &StopSignal,
    ) -> Result<BackupStats> {
        fs::create_dir_all(dest_root)?;

        let store_path = dest_root.join(&self.config.backup.index_file);
        let mut store = FingerprintStore::open(store_path)?;
        info!("Fingerprint store holds {} entries", store.len());

        info!("Scanning device for photos and videos...");
        let scan = self.scanner.scan(source)?;
        info!(
            "Found {} candidates ({} excluded by filters)",
            scan.files.len(),
            scan.skipped_excluded
        );

        let mut stats = BackupStats {
            skipped_excluded: scan.skipped_excluded,
            ..Default::default()
        };

        for record in &scan.files {
            if stop.is_triggered() {
                info!("Stop requested, ending run early");
                break;
            }

            self.backup_file(source, record, dest_root, &mut store, &mut stats)
                .await?;
        }

        info!(
            "Backup finished: {} copied, {} duplicates, {} excluded, {} errors",
            stats.copied, stats.skipped_duplicate, stats.skipped_excluded, stats.errors
        );
        Ok(stats)
    }

    /// Process one file. Only invariant violations and store failures
    /// propagate; read and copy problems are counted on `stats`.
    async fn backup_file(
        &self,
        source: &dyn MediaSource,
        record: &FileRecord,
        dest_root: &Path,
        store: &mut FingerprintStore,
        stats: &mut BackupStats,
    ) -> Result<()> {
        let fingerprint = match self.computer.compute(source, record) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                warn!("Failed to fingerprint {}: {}", record.source_path, e);
                stats.errors += 1;
                return Ok(());
            }
        };

        if let Some(existing) = store.lookup(&fingerprint) {
            debug!(
                "Skipping duplicate {} (already at {})",
                record.source_path,
                existing.dest_path.display()
            );
            stats.skipped_duplicate += 1;
            return Ok(());
        }

        match self.copy_file(source, record, dest_root).await {
            Ok(dest) => {
                store.record(fingerprint, &dest, Utc::now())?;
                debug!("Copied {} -> {}", record.source_path, dest.display());
                stats.copied += 1;
                stats.bytes_copied += record.size;
            }
            Err(e) => {
                error!("Failed to copy {}: {}", record.source_path, e);
                stats.errors += 1;
            }
        }

        Ok(())
    }

    /// Stream the file into the destination tree. Content lands in a
    /// temporary file first and is renamed into place once complete, so a
    /// failed copy never leaves a partial file at the final path.
    async fn copy_file(
        &self,
        source: &dyn MediaSource,
        record: &FileRecord,
        dest_root: &Path,
    ) -> Result<PathBuf> {
        let mut reader = source.open(&record.source_path)?;

        let mut tmp = NamedTempFile::new_in(dest_root).map_err(|e| BackupError::Copy {
            path: record.source_path.clone(),
            source: e,
        })?;

        std::io::copy(&mut reader, tmp.as_file_mut()).map_err(|e| BackupError::Copy {
            path: record.source_path.clone(),
            source: e,
        })?;

        let captured = self.dates.resolve(tmp.path(), record.modified);
        let dest = self.destination_path(dest_root, record, captured);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| BackupError::Copy {
                path: record.source_path.clone(),
                source: e,
            })?;
        }

        tmp.persist(&dest).map_err(|e| BackupError::Copy {
            path: record.source_path.clone(),
            source: e.error,
        })?;

        if self.config.backup.preserve_timestamps {
            if let Some(modified) = record.modified {
                let mtime = filetime::FileTime::from_unix_time(modified.timestamp(), 0);
                if let Err(e) = filetime::set_file_mtime(&dest, mtime) {
                    warn!("Could not preserve mtime on {}: {}", dest.display(), e);
                }
            }
        }

        Ok(dest)
    }

    /// `<root>/<date dirs>/<original filename>`; when a different file
    /// already holds the name, a numeric suffix keeps both.
    fn destination_path(
        &self,
        dest_root: &Path,
        record: &FileRecord,
        captured: DateTime<Local>,
    ) -> PathBuf {
        let date_dir = captured
            .format(&self.config.backup.date_format)
            .to_string();
        let dir = dest_root.join(date_dir);

        let candidate = dir.join(&record.file_name);
        if !candidate.exists() {
            return candidate;
        }

        let name = Path::new(&record.file_name);
        let stem = name
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| record.file_name.clone());
        let extension = name.extension().map(|s| s.to_string_lossy().into_owned());

        let mut counter = 1usize;
        loop {
            let disambiguated = match &extension {
                Some(ext) => format!("{}_{}.{}", stem, counter, ext),
                None => format!("{}_{}", stem, counter),
            };
            let candidate = dir.join(disambiguated);
            if !candidate.exists() {
                return candidate;
            }
            counter += 1;
        }
    }
}
