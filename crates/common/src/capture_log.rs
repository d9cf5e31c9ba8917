//! Append-only log of captured beacons

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::fields::{CanonicalFields, FieldRecord};
use crate::types::Beacon;
use crate::Result;

const LEADING_COLUMNS: [&str; 6] = ["timestamp", "request_id", "row", "method", "status", "url"];

/// CSV file receiving one line per captured beacon.
///
/// The header is written only when the file is empty, so repeated runs
/// append to the same log.
pub struct CaptureLog {
    path: PathBuf,
    writer: csv::Writer<File>,
    entries: usize,
}

impl CaptureLog {
    pub fn open(path: impl AsRef<Path>, fields: &CanonicalFields) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_empty = file.metadata()?.len() == 0;
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);

        if is_empty {
            let header = LEADING_COLUMNS
                .iter()
                .copied()
                .chain(fields.names().iter().map(String::as_str));
            writer.write_record(header)?;
            writer.flush()?;
        }

        debug!("Capture log open at {}", path.display());
        Ok(Self {
            path,
            writer,
            entries: 0,
        })
    }

    pub fn append(&mut self, row: usize, beacon: &Beacon, record: &FieldRecord) -> Result<()> {
        let timestamp = beacon.timestamp.to_rfc3339();
        let row = row.to_string();
        let status = beacon.status_code.to_string();
        let leading = [
            timestamp.as_str(),
            beacon.synthetic_id.as_str(),
            row.as_str(),
            beacon.method.as_str(),
            status.as_str(),
            beacon.raw_url.as_str(),
        ];
        self.writer
            .write_record(leading.into_iter().chain(record.values().iter().map(String::as_str)))?;
        self.writer.flush()?;
        self.entries += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries appended through this handle
    pub fn entries(&self) -> usize {
        self.entries
    }
}
