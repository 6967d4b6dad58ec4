//! Append-only, human-readable audit log.
//!
//! The audit log is consumed by operators only; its line format is not a
//! contract. Writers must never treat a failed append as fatal for the
//! operation being audited.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

/// Destination for audit lines. Implementations must be safe to share
/// between concurrently running trackers and store writers.
pub trait AuditSink: Send + Sync {
    /// Appends one line.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the line could not be written.
    fn append(&self, line: &str) -> io::Result<()>;
}

/// Appends `line` to `sink`, logging instead of failing when the write does
/// not succeed.
pub fn record(sink: &dyn AuditSink, line: &str) {
    if let Err(e) = sink.append(line) {
        tracing::error!(error = %e, line, "failed to append audit line");
    }
}

/// Audit log backed by a text file; each line is prefixed with a local
/// timestamp.
///
/// Appends are buffered in memory so callers on async tasks never wait on
/// the disk. Buffered lines are written out by [`FileAuditLog::flush`] or
/// when the log is dropped.
#[derive(Debug)]
pub struct FileAuditLog {
    path: PathBuf,
    file: Mutex<BufWriter<File>>,
}

impl FileAuditLog {
    /// Opens (or creates) the log file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or file cannot be created.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(BufWriter::new(file)),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes buffered lines to the file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the write fails.
    pub fn flush(&self) -> io::Result<()> {
        self.file
            .lock()
            .map_err(|_| io::Error::other("audit log mutex poisoned"))?
            .flush()
    }
}

impl AuditSink for FileAuditLog {
    fn append(&self, line: &str) -> io::Result<()> {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("audit log mutex poisoned"))?;
        writeln!(file, "[{stamp}] {line}")
    }
}

/// In-process audit log, useful for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the lines appended so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Lines containing `needle`.
    #[must_use]
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.contains(needle))
            .collect()
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .map_err(|_| io::Error::other("audit log mutex poisoned"))?
            .push(line.to_string());
        Ok(())
    }
}
