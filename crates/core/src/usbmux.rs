use crate::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub udid: String,
}

/// Thin wrapper around the libimobiledevice command line tools. Device
/// communication itself stays in those tools; this only parses their output.
pub struct UsbmuxWrapper;

impl UsbmuxWrapper {
    pub fn new() -> Self {
        Self
    }

    /// List UDIDs of connected devices
    pub fn list_devices(&self) -> Result<Vec<Device>> {
        debug!("Listing connected iOS devices");

        let output = Command::new("idevice_id")
            .arg("-l")
            .output()
            .map_err(|e| {
                BackupError::Connection(format!("failed to execute idevice_id: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackupError::Connection(format!(
                "idevice_id failed: {}",
                stderr
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let devices: Vec<Device> = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| Device {
                udid: line.to_string(),
            })
            .collect();

        debug!("Found {} devices", devices.len());
        Ok(devices)
    }

    /// Read a single lockdown value from a device
    pub fn get_value(&self, udid: &str, key: &str) -> Result<String> {
        debug!("Reading {} from device {}", key, udid);

        let output = Command::new("ideviceinfo")
            .args(["-u", udid, "-k", key])
            .output()
            .map_err(|e| {
                BackupError::Connection(format!("failed to execute ideviceinfo: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackupError::Connection(format!(
                "ideviceinfo failed for {}: {}",
                key, stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
