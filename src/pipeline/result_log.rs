//! Append-only JSON-lines result log.
//!
//! The file is opened in append mode for the whole run and never truncated.
//! Each record is serialized up front and written as one complete line, then
//! flushed, so an interrupted run leaves a valid prefix of whole records.

use crate::models::{Result, ResultRecord, WikiragError};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ResultLog {
    path: PathBuf,
    writer: BufWriter<File>,
    appended: usize,
}

impl ResultLog {
    /// Open (or create) the log for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| WikiragError::io("creating output directory", e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| WikiragError::io("opening result log", e))?;

        debug!(path = %path.display(), "Opened result log");
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            appended: 0,
        })
    }

    /// Append one record as a single line and flush it.
    pub fn append(&mut self, record: &ResultRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| WikiragError::Internal(format!("Failed to serialize result: {e}")))?;
        line.push('\n');

        self.writer
            .write_all(line.as_bytes())
            .map_err(|e| WikiragError::io("writing result log", e))?;
        self.writer
            .flush()
            .map_err(|e| WikiragError::io("flushing result log", e))?;

        self.appended += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines appended by this handle.
    pub fn appended(&self) -> usize {
        self.appended
    }
}
