use crate::{
    config::BackupConfig,
    device::{MediaSource, SourceFile},
    BackupError, Result,
};
use chrono::{DateTime, Local};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FileCategory {
    #[serde(rename = "photo")]
    Photo,
    #[serde(rename = "video")]
    Video,
}

/// One source file that passed all filters and is a candidate for backup.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub source_path: String,
    pub file_name: String,
    pub category: FileCategory,
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub files: Vec<FileRecord>,
    pub skipped_excluded: usize,
}

/// Enumerates candidate files from a media source, applying the extension
/// sets and exclusion rules from the configuration. Filters run in a fixed
/// order: extension, exact exclusion, glob exclusion.
pub struct FileScanner {
    photo_extensions: HashSet<String>,
    video_extensions: HashSet<String>,
    exclude_files: HashSet<String>,
    exclude_patterns: GlobSet,
}

impl FileScanner {
    pub fn new(config: &BackupConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.files.exclude_patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                BackupError::Config(format!("invalid exclude pattern {:?}: {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let exclude_patterns = builder
            .build()
            .map_err(|e| BackupError::Config(format!("failed to build exclude set: {}", e)))?;

        Ok(Self {
            photo_extensions: normalize_extensions(&config.files.photo_extensions),
            video_extensions: normalize_extensions(&config.files.video_extensions),
            exclude_files: config.files.exclude_files.iter().cloned().collect(),
            exclude_patterns,
        })
    }

    /// Scan the source tree. Each run enumerates from scratch; the order of
    /// the produced records follows the source's stable enumeration order.
    pub fn scan(&self, source: &dyn MediaSource) -> Result<ScanResult> {
        let mut result = ScanResult::default();

        for file in source.enumerate()? {
            match self.admit(&file) {
                Some(record) => result.files.push(record),
                None => result.skipped_excluded += 1,
            }
        }

        debug!(
            "Scan produced {} candidates, {} excluded",
            result.files.len(),
            result.skipped_excluded
        );
        Ok(result)
    }

    fn admit(&self, file: &SourceFile) -> Option<FileRecord> {
        let category = match self.classify(&file.path) {
            Some(category) => category,
            None => {
                trace!("Dropping {} (extension not configured)", file.path);
                return None;
            }
        };

        if self.exclude_files.contains(&file.path) {
            debug!("Excluding {} (exact match)", file.path);
            return None;
        }

        if self.exclude_patterns.is_match(&file.path) {
            debug!("Excluding {} (pattern match)", file.path);
            return None;
        }

        let file_name = Path::new(&file.path)
            .file_name()?
            .to_string_lossy()
            .to_string();

        Some(FileRecord {
            source_path: file.path.clone(),
            file_name,
            category,
            size: file.size,
            modified: file.modified,
        })
    }

    /// Classify by extension, case-insensitively
    fn classify(&self, path: &str) -> Option<FileCategory> {
        let extension = Path::new(path).extension()?.to_string_lossy().to_lowercase();
        let dotted = format!(".{}", extension);

        if self.photo_extensions.contains(&dotted) {
            Some(FileCategory::Photo)
        } else if self.video_extensions.contains(&dotted) {
            Some(FileCategory::Video)
        } else {
            None
        }
    }

    /// Per-category counts over a set of records
    pub fn category_stats(&self, files: &[FileRecord]) -> HashMap<FileCategory, usize> {
        let mut stats = HashMap::new();

        for file in files {
            *stats.entry(file.category).or_insert(0) += 1;
        }

        stats
    }
}

fn normalize_extensions(extensions: &[String]) -> HashSet<String> {
    extensions
        .iter()
        .map(|ext| {
            let ext = ext.to_lowercase();
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{}", ext)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MountedMedia;
    use std::fs;

    fn scanner() -> FileScanner {
        FileScanner::new(&BackupConfig::default()).unwrap()
    }

    fn source_file(path: &str) -> SourceFile {
        SourceFile {
            path: path.to_string(),
            size: 4,
            modified: None,
        }
    }

    #[test]
    fn classifies_extensions_case_insensitively() {
        let scanner = scanner();
        assert_eq!(
            scanner.classify("/DCIM/100APPLE/IMG_0001.HEIC"),
            Some(FileCategory::Photo)
        );
        assert_eq!(
            scanner.classify("/DCIM/100APPLE/IMG_0002.MoV"),
            Some(FileCategory::Video)
        );
        assert_eq!(scanner.classify("/DCIM/100APPLE/leftover.tmp"), None);
        assert_eq!(scanner.classify("/DCIM/100APPLE/noextension"), None);
    }

    #[test]
    fn exclusion_glob_crosses_directories() {
        let scanner = scanner();
        assert!(scanner
            .admit(&source_file("/DCIM/100APPLE/Thumbnails/IMG_0001.JPG"))
            .is_none());
        assert!(scanner
            .admit(&source_file("/DCIM/100APPLE/IMG_0001.JPG"))
            .is_some());
    }

    #[test]
    fn exact_exclusion_wins_over_valid_extension() {
        let mut config = BackupConfig::default();
        config
            .files
            .exclude_files
            .push("/DCIM/100APPLE/IMG_0001.JPG".to_string());
        let scanner = FileScanner::new(&config).unwrap();

        assert!(scanner
            .admit(&source_file("/DCIM/100APPLE/IMG_0001.JPG"))
            .is_none());
        assert!(scanner
            .admit(&source_file("/DCIM/100APPLE/IMG_0002.JPG"))
            .is_some());
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let mut config = BackupConfig::default();
        config.files.exclude_patterns.push("a[".to_string());
        assert!(matches!(
            FileScanner::new(&config),
            Err(BackupError::Config(_))
        ));
    }

    #[test]
    fn scan_tallies_excluded_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("DCIM/100APPLE")).unwrap();
        fs::create_dir_all(dir.path().join("DCIM/Thumbnails")).unwrap();
        fs::write(dir.path().join("DCIM/100APPLE/IMG_0001.JPG"), b"a").unwrap();
        fs::write(dir.path().join("DCIM/100APPLE/IMG_0002.MOV"), b"b").unwrap();
        fs::write(dir.path().join("DCIM/100APPLE/note.tmp"), b"c").unwrap();
        fs::write(dir.path().join("DCIM/Thumbnails/IMG_0001.JPG"), b"d").unwrap();

        let media = MountedMedia::new(dir.path()).unwrap();
        let result = scanner().scan(&media).unwrap();

        assert_eq!(result.files.len(), 2);
        assert_eq!(result.skipped_excluded, 2);

        let stats = scanner().category_stats(&result.files);
        assert_eq!(stats.get(&FileCategory::Photo), Some(&1));
        assert_eq!(stats.get(&FileCategory::Video), Some(&1));
    }

    #[test]
    fn scan_is_deterministic_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("DCIM")).unwrap();
        for name in ["IMG_0003.JPG", "IMG_0001.JPG", "IMG_0002.JPG"] {
            fs::write(dir.path().join("DCIM").join(name), name.as_bytes()).unwrap();
        }

        let media = MountedMedia::new(dir.path()).unwrap();
        let scanner = scanner();
        let first: Vec<String> = scanner
            .scan(&media)
            .unwrap()
            .files
            .into_iter()
            .map(|f| f.source_path)
            .collect();
        let second: Vec<String> = scanner
            .scan(&media)
            .unwrap()
            .files
            .into_iter()
            .map(|f| f.source_path)
            .collect();

        assert_eq!(first, second);
        assert_eq!(first[0], "/DCIM/IMG_0001.JPG");
    }
}
