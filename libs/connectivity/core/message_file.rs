//! Record file format for encoded messages
//!
//! One JSON object per line:
//!
//! ```text
//! {"payload":"A1      7","message":{...},"metadata":{"direction":"RECEIVED","timestamp":"2024-01-01T10:00:00Z"}}
//! ```
//!
//! Used both for unhandled-message persistence and by the file listener, so a
//! file written by one can be read back by the other.

use crate::core::encoded::EncodedMessage;
use crate::error::{ConnectivityError, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Appends encoded messages to a record file
pub struct MessageFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl MessageFileWriter {
    /// Open `path` for writing, creating parent directories as needed
    ///
    /// With `append == false` an existing file is truncated.
    pub fn open(path: impl AsRef<Path>, append: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Write one record
    pub fn write(&mut self, message: &EncodedMessage) -> Result<()> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written through this writer
    pub fn written(&self) -> usize {
        self.written
    }
}

impl Drop for MessageFileWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Reads record files written by [`MessageFileWriter`]
pub struct MessageFileReader;

impl MessageFileReader {
    /// Feed every record of `path` to `consumer`, in file order
    ///
    /// Blank lines are skipped. Returns the number of records read.
    ///
    /// # Errors
    /// Fails on the first unreadable line; records before it have already
    /// been handed to `consumer`.
    pub fn process_messages<F>(path: impl AsRef<Path>, mut consumer: F) -> Result<usize>
    where
        F: FnMut(EncodedMessage),
    {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut count = 0;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let message: EncodedMessage = serde_json::from_str(&line).map_err(|e| {
                ConnectivityError::Persistence(format!(
                    "Could not parse record at {}:{}: {}",
                    path.display(),
                    index + 1,
                    e
                ))
            })?;
            consumer(message);
            count += 1;
        }

        trace!("Read {} record(s) from {}", count, path.display());
        Ok(count)
    }

    /// Read all records of `path`
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<EncodedMessage>> {
        let mut messages = Vec::new();
        Self::process_messages(path, |m| messages.push(m))?;
        Ok(messages)
    }
}
