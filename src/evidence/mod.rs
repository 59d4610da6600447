//! Evidence persistence.
//!
//! The store has two operations: append one log line, and write one capture
//! image under a key. `FilesystemEvidenceStore` appends to a text file and
//! writes JPEGs into a directory; `InMemoryEvidenceStore` keeps both in memory
//! for tests and dry runs.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;

use crate::policy::{CaptureEvent, LogRecord};

pub const DEFAULT_EVIDENCE_DIR: &str = "captures";
pub const DEFAULT_LOG_PATH: &str = "cap.txt";
const JPEG_QUALITY: u8 = 90;

pub trait EvidenceStore {
    fn append_log(&mut self, record: &LogRecord) -> Result<()>;

    /// Persist a capture and return its storage key.
    fn save_capture(&mut self, capture: &CaptureEvent) -> Result<String>;

    /// Flush buffered records. Called when the run ends.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct EvidenceSettings {
    pub dir: PathBuf,
    pub log_path: PathBuf,
}

impl Default for EvidenceSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_EVIDENCE_DIR),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
        }
    }
}

pub struct FilesystemEvidenceStore {
    dir: PathBuf,
    log_path: PathBuf,
    log: BufWriter<File>,
}

impl FilesystemEvidenceStore {
    /// Create the capture directory and open the log for appending.
    pub fn open(settings: &EvidenceSettings) -> Result<Self> {
        fs::create_dir_all(&settings.dir).with_context(|| {
            format!("failed to create capture directory {}", settings.dir.display())
        })?;
        if let Some(parent) = settings.log_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create log directory {}", parent.display())
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&settings.log_path)
            .with_context(|| format!("failed to open log {}", settings.log_path.display()))?;
        Ok(Self {
            dir: settings.dir.clone(),
            log_path: settings.log_path.clone(),
            log: BufWriter::new(file),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn capture_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.jpg", key))
    }
}

impl EvidenceStore for FilesystemEvidenceStore {
    /// The line is on disk when this returns.
    fn append_log(&mut self, record: &LogRecord) -> Result<()> {
        writeln!(self.log, "{}", record.to_line())
            .and_then(|()| self.log.flush())
            .with_context(|| format!("failed to append to {}", self.log_path.display()))
    }

    fn save_capture(&mut self, capture: &CaptureEvent) -> Result<String> {
        let key = capture.key();
        let path = self.capture_path(&key);
        if path.exists() {
            log::warn!(
                "capture {} already exists and will be overwritten (same role, percent and second)",
                path.display()
            );
        }
        let image = capture.snapshot.to_image()?;
        let file = File::create(&path)
            .with_context(|| format!("failed to create capture {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
            .encode_image(&image)
            .with_context(|| format!("failed to encode capture {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("failed to write capture {}", path.display()))?;
        Ok(key)
    }

    fn flush(&mut self) -> Result<()> {
        self.log
            .flush()
            .with_context(|| format!("failed to flush {}", self.log_path.display()))
    }
}

impl Drop for FilesystemEvidenceStore {
    fn drop(&mut self) {
        if let Err(e) = self.log.flush() {
            log::error!("failed to flush {}: {}", self.log_path.display(), e);
        }
    }
}

/// Keeps records and captures in memory.
#[derive(Debug, Default)]
pub struct InMemoryEvidenceStore {
    lines: Vec<String>,
    captures: Vec<(String, CaptureEvent)>,
}

impl InMemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn captures(&self) -> &[(String, CaptureEvent)] {
        &self.captures
    }
}

impl EvidenceStore for InMemoryEvidenceStore {
    fn append_log(&mut self, record: &LogRecord) -> Result<()> {
        self.lines.push(record.to_line());
        Ok(())
    }

    fn save_capture(&mut self, capture: &CaptureEvent) -> Result<String> {
        let key = capture.key();
        self.captures.retain(|(existing, _)| existing != &key);
        self.captures.push((key.clone(), capture.clone()));
        Ok(key)
    }
}
