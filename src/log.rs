use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// One redirection rule as persisted in the links file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub key: String,
    pub url: String,
}

impl LinkRecord {
    pub fn new(key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
        }
    }

    /// Parse a single `key,url` line. Returns `None` unless the line splits
    /// into exactly two fields.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split(',');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(key), Some(url), None) => Some(Self::new(key, url)),
            _ => None,
        }
    }

    /// Bytes appended to the log for this record. The separator goes first so
    /// a file without a trailing newline still gets one record per line.
    fn encode(&self) -> Vec<u8> {
        format!("\n{},{}", self.key, self.url).into_bytes()
    }
}

/// Where the store persists each accepted link before exposing it to readers.
pub trait LinkJournal: Send + Sync {
    /// Durably record `record`. Must not return `Ok` until the write has
    /// reached the journal's storage.
    fn append(&mut self, record: &LinkRecord) -> Result<(), StoreError>;

    /// Release the journal at shutdown.
    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Journal for stores that live only in memory.
#[derive(Debug, Default)]
pub struct NullJournal;

impl LinkJournal for NullJournal {
    fn append(&mut self, _record: &LinkRecord) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Append-only `key,url` file, held open for the life of the store.
#[derive(Debug)]
pub struct LinkLog {
    file: File,
    path: PathBuf,
    sync: bool,
}

impl LinkLog {
    /// Open an existing links file for reading and appending. The file is
    /// never created here; a missing file is an `Io` error.
    pub fn open<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).append(true).open(&path)?;
        Ok(Self { file, path, sync })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream every record from the start of the file into `apply`, in file
    /// order. Blank lines are skipped. Returns the number of records read.
    ///
    /// Bytes that are not UTF-8 are replaced with U+FFFD rather than failing
    /// the load; only the field count makes a line invalid.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<usize, StoreError>
    where
        F: FnMut(LinkRecord),
    {
        let mut reader = BufReader::new(&self.file);
        let mut buf = Vec::new();
        let mut line_number = 0;
        let mut count = 0;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_number += 1;

            let raw = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let line = String::from_utf8_lossy(raw);
            if matches!(line, Cow::Owned(_)) {
                tracing::warn!(
                    "Line {} of {} is not valid UTF-8, loading it with replacement characters",
                    line_number,
                    self.path.display()
                );
            }

            let record = LinkRecord::parse(&line).ok_or_else(|| StoreError::InvalidRecord {
                line_number,
                line: line.into_owned(),
            })?;
            apply(record);
            count += 1;
        }

        Ok(count)
    }
}

impl LinkJournal for LinkLog {
    fn append(&mut self, record: &LinkRecord) -> Result<(), StoreError> {
        self.file.write_all(&record.encode())?;
        self.file.flush()?;
        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}
