//! Rotating file sink.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use warden_common::{SupervisorError, SupervisorResult};

/// Size-bounded rotating file writer.
///
/// Writes fill the current file to exactly `max_bytes` before rotating, so
/// overflow bytes always land in the fresh current file. `max_bytes == 0`
/// disables rotation entirely; `backups == 0` truncates the current file
/// instead of keeping a backup.
pub struct RotatingLogSink {
    path: PathBuf,
    max_bytes: u64,
    backups: u32,
    writer: BufWriter<File>,
    current_size: u64,
}

impl RotatingLogSink {
    /// Open a sink, creating parent directories and appending to an existing
    /// file. The size counter is seeded from file metadata so a reopened sink
    /// rotates at the same boundary.
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backups: u32) -> SupervisorResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    logging_error(&path, format!("Failed to create log directory: {}", e))
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| logging_error(&path, format!("Failed to open log file: {}", e)))?;

        let current_size = file
            .metadata()
            .map_err(|e| logging_error(&path, format!("Failed to stat log file: {}", e)))?
            .len();

        Ok(Self {
            path,
            max_bytes,
            backups,
            writer: BufWriter::new(file),
            current_size,
        })
    }

    /// Path of the current file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes currently in the current file (including buffered bytes).
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    /// Append bytes, rotating at the size boundary.
    pub fn write(&mut self, mut bytes: &[u8]) -> SupervisorResult<()> {
        if self.max_bytes == 0 {
            // Rotation disabled
            self.writer
                .write_all(bytes)
                .map_err(|e| logging_error(&self.path, format!("Failed to write: {}", e)))?;
            self.current_size += bytes.len() as u64;
            return Ok(());
        }

        while !bytes.is_empty() {
            let room = self.max_bytes.saturating_sub(self.current_size) as usize;
            if room == 0 {
                // Pre-existing file already at or past the boundary
                self.rotate()?;
                continue;
            }

            let n = bytes.len().min(room);
            self.writer
                .write_all(&bytes[..n])
                .map_err(|e| logging_error(&self.path, format!("Failed to write: {}", e)))?;
            self.current_size += n as u64;
            bytes = &bytes[n..];

            if self.current_size >= self.max_bytes {
                self.rotate()?;
            }
        }

        Ok(())
    }

    /// Rotate now: shift numbered backups up, rename current to `.1`, open a
    /// fresh current file. With `backups == 0` the current file is truncated.
    pub fn rotate(&mut self) -> SupervisorResult<()> {
        self.writer
            .flush()
            .map_err(|e| logging_error(&self.path, format!("Failed to flush: {}", e)))?;

        if self.backups == 0 {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)
                .map_err(|e| logging_error(&self.path, format!("Failed to truncate: {}", e)))?;
            self.writer = BufWriter::new(file);
            self.current_size = 0;
            tracing::debug!(path = %self.path.display(), "log file truncated");
            return Ok(());
        }

        let oldest = backup_path(&self.path, self.backups);
        if oldest.exists() {
            fs::remove_file(&oldest).map_err(|e| {
                logging_error(&self.path, format!("Failed to delete oldest backup: {}", e))
            })?;
        }

        for i in (1..self.backups).rev() {
            let from = backup_path(&self.path, i);
            if from.exists() {
                fs::rename(&from, backup_path(&self.path, i + 1)).map_err(|e| {
                    logging_error(&self.path, format!("Failed to shift backup .{}: {}", i, e))
                })?;
            }
        }

        fs::rename(&self.path, backup_path(&self.path, 1))
            .map_err(|e| logging_error(&self.path, format!("Failed to rotate: {}", e)))?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| logging_error(&self.path, format!("Failed to reopen: {}", e)))?;
        self.writer = BufWriter::new(file);
        self.current_size = 0;

        tracing::debug!(path = %self.path.display(), "log file rotated");
        Ok(())
    }

    /// Flush buffered output to disk.
    pub fn flush(&mut self) -> SupervisorResult<()> {
        self.writer
            .flush()
            .map_err(|e| logging_error(&self.path, format!("Failed to flush: {}", e)))
    }

    /// Close the sink (flushes).
    pub fn close(&mut self) -> SupervisorResult<()> {
        self.flush()
    }
}

fn backup_path(path: &Path, index: u32) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_os_string();
    os.push(format!(".{}", index));
    PathBuf::from(os)
}

fn logging_error(path: &Path, reason: String) -> SupervisorError {
    SupervisorError::logging(path.display().to_string(), reason)
}
