//! Persisting records and diagnostic snapshots.

use crate::error::SinkError;
use crate::harvest::DetailRecord;
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Write records as CSV with a fixed header and ragged rows: entity URL,
/// one column per field, then one column per related item.
pub fn write_records<W: Write>(
    writer: W,
    header: &[String],
    records: &[DetailRecord],
) -> Result<(), SinkError> {
    let mut csv = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(writer);
    csv.write_record(header)?;
    for record in records {
        csv.write_record(record.row())?;
    }
    csv.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// [`write_records`] into a file, replacing it. Returns the row count.
pub fn write_records_file(
    path: &Path,
    header: &[String],
    records: &[DetailRecord],
) -> Result<usize, SinkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    let file = File::create(path).map_err(|source| io_error(path, source))?;
    write_records(file, header, records)?;
    Ok(records.len())
}

/// Where failure screenshots go.
pub trait SnapshotWriter: Send + Sync {
    /// Store PNG bytes under a name derived from `reason`; returns the path.
    fn save(&self, reason: &str, png: &[u8]) -> Result<PathBuf, SinkError>;
}

/// Snapshots as `<reason>_<YYYYmmdd-HHMMSS>.png` files in one directory,
/// created on first use. Same-second names get a numeric suffix.
#[derive(Debug, Clone)]
pub struct SnapshotDir {
    dir: PathBuf,
}

impl SnapshotDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SnapshotWriter for SnapshotDir {
    fn save(&self, reason: &str, png: &[u8]) -> Result<PathBuf, SinkError> {
        fs::create_dir_all(&self.dir).map_err(|source| io_error(&self.dir, source))?;
        let stem = snapshot_stem(reason, &Local::now().format("%Y%m%d-%H%M%S").to_string());

        let mut n = 1;
        loop {
            let name = if n == 1 {
                format!("{stem}.png")
            } else {
                format!("{stem}_{n}.png")
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(png).map_err(|source| io_error(&path, source))?;
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(source) => return Err(io_error(&path, source)),
            }
        }
    }
}

fn snapshot_stem(reason: &str, timestamp: &str) -> String {
    let reason: String = reason
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let reason = if reason.is_empty() { "error".to_string() } else { reason };
    format!("{reason}_{timestamp}")
}

fn io_error(path: &Path, source: io::Error) -> SinkError {
    SinkError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_sanitises_reason() {
        assert_eq!(snapshot_stem("channel_error", "20240101-120000"), "channel_error_20240101-120000");
        assert_eq!(snapshot_stem("a/b c", "t"), "a_b_c_t");
        assert_eq!(snapshot_stem("", "t"), "error_t");
    }
}
