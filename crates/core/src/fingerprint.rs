use crate::{device::MediaSource, scanner::FileRecord, BackupError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;

/// Content-derived identifier used to detect duplicates across runs.
/// Two files with the same fingerprint are the same logical asset, no
/// matter where they were read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives fingerprints by streaming file content through SHA-256.
pub struct FingerprintComputer;

impl FingerprintComputer {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(&self, source: &dyn MediaSource, record: &FileRecord) -> Result<Fingerprint> {
        let reader = source.open(&record.source_path)?;
        self.compute_from_reader(reader, &record.source_path)
    }

    fn compute_from_reader(&self, mut reader: impl Read, path: &str) -> Result<Fingerprint> {
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = reader.read(&mut buffer).map_err(|e| BackupError::Read {
                path: path.to_string(),
                source: e,
            })?;

            if bytes_read == 0 {
                break;
            }

            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Fingerprint(format!("{:x}", hasher.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MountedMedia;
    use crate::scanner::FileCategory;
    use std::fs;

    fn record(path: &str) -> FileRecord {
        FileRecord {
            source_path: path.to_string(),
            file_name: path.rsplit('/').next().unwrap().to_string(),
            category: FileCategory::Photo,
            size: 0,
            modified: None,
        }
    }

    #[test]
    fn identical_content_yields_identical_fingerprint_regardless_of_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("DCIM/100APPLE")).unwrap();
        fs::create_dir_all(dir.path().join("DCIM/101APPLE")).unwrap();
        fs::write(dir.path().join("DCIM/100APPLE/IMG_0001.JPG"), b"same bytes").unwrap();
        fs::write(dir.path().join("DCIM/101APPLE/IMG_0042.JPG"), b"same bytes").unwrap();

        let media = MountedMedia::new(dir.path()).unwrap();
        let computer = FingerprintComputer::new();

        let a = computer
            .compute(&media, &record("/DCIM/100APPLE/IMG_0001.JPG"))
            .unwrap();
        let b = computer
            .compute(&media, &record("/DCIM/101APPLE/IMG_0042.JPG"))
            .unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn different_content_yields_different_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("DCIM")).unwrap();
        fs::write(dir.path().join("DCIM/IMG_0001.JPG"), b"one").unwrap();
        fs::write(dir.path().join("DCIM/IMG_0002.JPG"), b"two").unwrap();

        let media = MountedMedia::new(dir.path()).unwrap();
        let computer = FingerprintComputer::new();

        let a = computer.compute(&media, &record("/DCIM/IMG_0001.JPG")).unwrap();
        let b = computer.compute(&media, &record("/DCIM/IMG_0002.JPG")).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn known_sha256_vector() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty.jpg"), b"").unwrap();

        let media = MountedMedia::new(dir.path()).unwrap();
        let fp = FingerprintComputer::new()
            .compute(&media, &record("/empty.jpg"))
            .unwrap();

        assert_eq!(
            fp.as_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn unreadable_source_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let media = MountedMedia::new(dir.path()).unwrap();

        let err = FingerprintComputer::new()
            .compute(&media, &record("/DCIM/IMG_0404.JPG"))
            .unwrap_err();
        assert!(matches!(err, BackupError::Read { .. }));
    }
}
