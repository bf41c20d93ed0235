use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Subset of exiftool's JSON output carrying capture timestamps.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExifRecord {
    #[serde(default)]
    date_time_original: String,
    #[serde(default)]
    create_date: String,
}

/// Resolves the capture timestamp of a media file: embedded metadata when
/// exiftool is available, filesystem mtime otherwise, and the current time
/// as a last resort.
pub struct CaptureDateResolver {
    exiftool: bool,
}

impl CaptureDateResolver {
    pub fn new() -> Self {
        let exiftool = Command::new("exiftool")
            .arg("-ver")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);

        if !exiftool {
            debug!("exiftool not found, capture dates fall back to filesystem timestamps");
        }

        Self { exiftool }
    }

    #[cfg(test)]
    fn without_exiftool() -> Self {
        Self { exiftool: false }
    }

    pub fn resolve(&self, local_path: &Path, modified: Option<DateTime<Local>>) -> DateTime<Local> {
        if self.exiftool {
            if let Some(captured) = self.exif_date(local_path) {
                return captured;
            }
        }

        if let Some(mtime) = modified {
            return mtime;
        }

        warn!(
            "No capture date for {}, using current time",
            local_path.display()
        );
        Local::now()
    }

    fn exif_date(&self, path: &Path) -> Option<DateTime<Local>> {
        let output = Command::new("exiftool")
            .args(["-json", "-DateTimeOriginal", "-CreateDate"])
            .arg(path)
            .output()
            .ok()?;

        if !output.status.success() {
            debug!("exiftool failed on {}", path.display());
            return None;
        }

        let records: Vec<ExifRecord> = serde_json::from_slice(&output.stdout).ok()?;
        let record = records.into_iter().next()?;

        for raw in [record.date_time_original, record.create_date] {
            if let Some(captured) = parse_exif_datetime(&raw) {
                return Some(captured);
            }
        }

        None
    }
}

/// EXIF datetimes look like `2024:06:15 10:21:33`, sometimes followed by
/// subseconds or a UTC offset; only the leading 19 characters are parsed.
fn parse_exif_datetime(raw: &str) -> Option<DateTime<Local>> {
    let head = raw.trim().get(..19)?;
    let naive = NaiveDateTime::parse_from_str(head, "%Y:%m:%d %H:%M:%S").ok()?;
    Local.from_local_datetime(&naive).earliest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_plain_exif_datetime() {
        let dt = parse_exif_datetime("2024:06:15 10:21:33").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 6, 15));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (10, 21, 33));
    }

    #[test]
    fn parses_datetime_with_offset_suffix() {
        let dt = parse_exif_datetime("2023:12:25 15:30:45+02:00").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2023, 12, 25));
    }

    #[test]
    fn rejects_empty_and_garbage_values() {
        assert!(parse_exif_datetime("").is_none());
        assert!(parse_exif_datetime("0000:00:00 00:00:00").is_none());
        assert!(parse_exif_datetime("yesterday").is_none());
    }

    #[test]
    fn falls_back_to_mtime_without_exiftool() {
        let resolver = CaptureDateResolver::without_exiftool();
        let mtime = Local.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();

        let resolved = resolver.resolve(Path::new("/nonexistent.jpg"), Some(mtime));
        assert_eq!(resolved, mtime);
    }

    #[test]
    fn falls_back_to_now_without_any_timestamp() {
        let resolver = CaptureDateResolver::without_exiftool();
        let before = Local::now();
        let resolved = resolver.resolve(Path::new("/nonexistent.jpg"), None);
        assert!(resolved >= before);
    }
}
