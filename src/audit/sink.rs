//! Audit sinks
//!
//! A sink receives fully serialized audit lines (one JSON object, no trailing
//! newline) and appends them somewhere. Sinks are driven by a single writer
//! at a time, so implementations need `Send` but not `Sync`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::AuditEvent;

/// Destination for serialized audit lines
pub trait AuditSink: Send {
    /// Short name used in failure logs and alerts
    fn name(&self) -> &str;

    /// Append one line
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Push buffered data to the destination
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Rotating File Sink
// ============================================================================

/// JSON-lines file with size-based rotation.
///
/// When a write would take the file to `max_bytes` or beyond, the current
/// file becomes `<path>.1`, `<path>.1` becomes `<path>.2` and so on; the
/// oldest beyond `backups` is deleted. With `backups == 0` the file never
/// rotates and grows without bound.
#[derive(Debug)]
pub struct RotatingFileSink {
    path: PathBuf,
    display: String,
    max_bytes: u64,
    backups: usize,
    file: Option<File>,
    size: u64,
}

impl RotatingFileSink {
    /// Open (or create) the file, creating parent directories
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = open_append(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            display: path.display().to_string(),
            path,
            max_bytes,
            backups,
            file: Some(file),
            size,
        })
    }

    /// Path of the active file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of backup `n` (1 is the newest)
    pub fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn should_rotate(&self, incoming: u64) -> bool {
        self.backups > 0
            && self.max_bytes > 0
            && self.size > 0
            && self.size + incoming >= self.max_bytes
    }

    fn rotate(&mut self) -> io::Result<()> {
        // Close before renaming
        self.file = None;

        for n in (1..self.backups).rev() {
            let src = self.backup_path(n);
            if src.exists() {
                let dst = self.backup_path(n + 1);
                if dst.exists() {
                    fs::remove_file(&dst)?;
                }
                fs::rename(&src, &dst)?;
            }
        }
        let first = self.backup_path(1);
        if first.exists() {
            fs::remove_file(&first)?;
        }
        fs::rename(&self.path, &first)?;
        self.file = Some(open_append(&self.path)?);

        self.size = 0;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl AuditSink for RotatingFileSink {
    fn name(&self) -> &str {
        &self.display
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let incoming = line.len() as u64 + 1;
        if self.should_rotate(incoming) {
            self.rotate()?;
        }

        // Reopen after an earlier failure left no handle
        if self.file.is_none() {
            let file = open_append(&self.path)?;
            self.size = file.metadata()?.len();
            self.file = Some(file);
        }

        let result = match self.file.as_mut() {
            Some(file) => writeln!(file, "{line}"),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "audit file not open")),
        };
        match result {
            Ok(()) => {
                self.size += incoming;
                Ok(())
            }
            Err(e) => {
                self.file = None;
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Console Sink
// ============================================================================

/// Writes each line to stdout
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl AuditSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{line}")
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().lock().flush()
    }
}

// ============================================================================
// Memory Sink
// ============================================================================

/// Keeps lines in memory. Clones share the buffer, so a test can hand one
/// clone to the logger and read from the other.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw lines in write order
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Lines parsed back into events; unparsable lines are skipped
    pub fn events(&self) -> Vec<AuditEvent> {
        self.lines
            .lock()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Events of one type
    pub fn events_of(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Number of lines written
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Drop all lines
    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl AuditSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}
