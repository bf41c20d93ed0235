use crate::{
    usbmux::{Device, UsbmuxWrapper},
    BackupError, Result,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub udid: String,
    pub name: String,
    pub model: String,
    pub ios_version: String,
    pub serial: String,
}

pub struct DeviceManager {
    usbmux: UsbmuxWrapper,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            usbmux: UsbmuxWrapper::new(),
        }
    }

    /// Collect device information via lockdown values
    pub fn get_device_info(&self, udid: &str) -> Result<DeviceInfo> {
        debug!("Collecting device info for {}", udid);

        let keys = [
            "DeviceName",
            "ProductType",
            "ProductVersion",
            "SerialNumber",
        ];

        let mut values = Vec::with_capacity(keys.len());
        for key in &keys {
            match self.usbmux.get_value(udid, key) {
                Ok(value) => values.push(value),
                Err(e) => {
                    debug!("Failed to read {}: {}", key, e);
                    values.push("Unknown".to_string());
                }
            }
        }

        Ok(DeviceInfo {
            udid: udid.to_string(),
            name: values[0].clone(),
            model: values[1].clone(),
            ios_version: values[2].clone(),
            serial: values[3].clone(),
        })
    }

    /// List all connected devices
    pub fn list_devices(&self) -> Result<Vec<Device>> {
        self.usbmux.list_devices()
    }

    /// Get first available device UDID
    pub fn get_default_device(&self) -> Result<String> {
        let devices = self.list_devices()?;

        devices
            .first()
            .map(|d| d.udid.clone())
            .ok_or_else(|| {
                BackupError::Connection(
                    "no iPhone found; make sure it is connected and unlocked".to_string(),
                )
            })
    }
}

/// A single file visible on the device, as reported by enumeration.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Device-style path rooted at the media tree, e.g. `/DCIM/100APPLE/IMG_0001.HEIC`
    pub path: String,
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
}

/// Read access to the media tree of a connected device. The backup pipeline
/// only ever enumerates files and opens them for reading; anything protocol
/// specific lives behind this seam.
pub trait MediaSource {
    /// Enumerate every file beneath the media root, in a stable order.
    fn enumerate(&self) -> Result<Vec<SourceFile>>;

    /// Open a file for reading by its device-style path.
    fn open(&self, path: &str) -> Result<Box<dyn Read>>;
}

/// Media tree exposed through an AFC mount point (ifuse, gvfs). Paths
/// handed out are relative to the mount, so records stay valid when the
/// mount point moves.
#[derive(Debug)]
pub struct MountedMedia {
    root: PathBuf,
}

impl MountedMedia {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(BackupError::Connection(format!(
                "media mount {} is not a readable directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl MediaSource for MountedMedia {
    fn enumerate(&self) -> Result<Vec<SourceFile>> {
        debug!("Enumerating media files under {}", self.root.display());
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                BackupError::Connection(format!(
                    "failed to enumerate {}: {}",
                    self.root.display(),
                    e
                ))
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let metadata = entry.metadata().map_err(|e| {
                BackupError::Connection(format!(
                    "failed to stat {}: {}",
                    entry.path().display(),
                    e
                ))
            })?;

            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or_else(|_| entry.path());

            files.push(SourceFile {
                path: format!("/{}", relative.to_string_lossy()),
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Local>::from),
            });
        }

        debug!("Enumerated {} files", files.len());
        Ok(files)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read>> {
        let full = self.resolve(path);
        let file = File::open(&full).map_err(|e| BackupError::Read {
            path: path.to_string(),
            source: e,
        })?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn enumerate_yields_device_style_paths_in_stable_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("DCIM/100APPLE")).unwrap();
        fs::write(dir.path().join("DCIM/100APPLE/IMG_0002.JPG"), b"b").unwrap();
        fs::write(dir.path().join("DCIM/100APPLE/IMG_0001.JPG"), b"a").unwrap();

        let media = MountedMedia::new(dir.path()).unwrap();
        let files = media.enumerate().unwrap();

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/DCIM/100APPLE/IMG_0001.JPG",
                "/DCIM/100APPLE/IMG_0002.JPG"
            ]
        );
        assert_eq!(files[0].size, 1);
        assert!(files[0].modified.is_some());
    }

    #[test]
    fn open_reads_back_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("DCIM")).unwrap();
        fs::write(dir.path().join("DCIM/IMG_0001.JPG"), b"payload").unwrap();

        let media = MountedMedia::new(dir.path()).unwrap();
        let mut reader = media.open("/DCIM/IMG_0001.JPG").unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"payload");
    }

    #[test]
    fn missing_mount_is_a_connection_error() {
        let err = MountedMedia::new("/definitely/not/mounted").unwrap_err();
        assert!(matches!(err, BackupError::Connection(_)));
    }

    #[test]
    fn open_missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let media = MountedMedia::new(dir.path()).unwrap();
        let err = media.open("/DCIM/IMG_0404.JPG").err().unwrap();
        assert!(matches!(err, BackupError::Read { .. }));
    }
}
