use crate::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub backup: BackupSection,
    pub files: FileRules,
    pub device: DeviceSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSection {
    pub default_directory: String,
    pub date_format: String,
    pub preserve_timestamps: bool,
    pub index_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRules {
    pub photo_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
    pub exclude_files: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSection {
    pub media_mount: Option<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup: BackupSection {
                default_directory: "~/Pictures/iPhone Backup".to_string(),
                date_format: "%Y/%Y-%m-%d".to_string(),
                preserve_timestamps: true,
                index_file: ".fingerprints.jsonl".to_string(),
            },
            files: FileRules {
                photo_extensions: vec![
                    ".jpg".to_string(),
                    ".jpeg".to_string(),
                    ".png".to_string(),
                    ".heic".to_string(),
                    ".heif".to_string(),
                    ".gif".to_string(),
                    ".tiff".to_string(),
                    ".bmp".to_string(),
                    ".dng".to_string(),
                    ".raw".to_string(),
                    ".cr2".to_string(),
                    ".nef".to_string(),
                ],
                video_extensions: vec![
                    ".mov".to_string(),
                    ".mp4".to_string(),
                    ".m4v".to_string(),
                    ".avi".to_string(),
                    ".mkv".to_string(),
                ],
                exclude_files: Vec::new(),
                exclude_patterns: vec![
                    "*/Thumbnails/*".to_string(),
                    "*/Cache/*".to_string(),
                    "*/Metadata/*".to_string(),
                    "*.tmp".to_string(),
                    "*.cache".to_string(),
                ],
            },
            device: DeviceSection { media_mount: None },
        }
    }
}

impl BackupConfig {
    /// Load config from file or create default if not exists
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            debug!("Loading config from {}", config_path.display());
            let content = fs::read_to_string(&config_path)
                .map_err(|e| BackupError::Config(format!("failed to read config file: {}", e)))?;

            serde_yaml::from_str(&content)
                .map_err(|e| BackupError::Config(format!("failed to parse config file: {}", e)))
        } else {
            debug!("Config file not found, creating default");
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BackupError::Config(format!("failed to create config directory: {}", e))
            })?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| BackupError::Config(format!("failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| BackupError::Config(format!("failed to write config file: {}", e)))?;

        debug!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Get the config file path
    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| BackupError::Config("could not determine config directory".to_string()))?;

        Ok(config_dir.join("photoport").join("config.yaml"))
    }

    /// Destination root with `~` expanded
    pub fn backup_root(&self) -> PathBuf {
        expand_home(&self.backup.default_directory)
    }

    /// Validate config settings
    pub fn validate(&self) -> Result<()> {
        if self.backup.date_format.trim().is_empty() {
            return Err(BackupError::Config(
                "backup.date_format must not be empty".to_string(),
            ));
        }

        if self.backup.index_file.trim().is_empty() {
            return Err(BackupError::Config(
                "backup.index_file must not be empty".to_string(),
            ));
        }

        if self.files.photo_extensions.is_empty() && self.files.video_extensions.is_empty() {
            return Err(BackupError::Config(
                "no photo or video extensions configured".to_string(),
            ));
        }

        for ext in self
            .files
            .photo_extensions
            .iter()
            .chain(&self.files.video_extensions)
        {
            if !ext.starts_with('.') {
                warn!("Extension {:?} has no leading dot, matching it anyway", ext);
            }
        }

        Ok(())
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
