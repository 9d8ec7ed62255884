//! Segment files: naming on disk and the writer holding the active handle.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Extension of every segment file.
pub const SEGMENT_EXTENSION: &str = "log";

/// Suffix appended to compressed segments.
pub const COMPRESSED_SUFFIX: &str = ".gz";

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const ROTATION_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]");

/// Naming scheme of one log stream's segments.
///
/// - active: `{directory}/{prefix}_{date}.log`
/// - finalized: `{prefix}_{date}_{rotated-at}.log`, with `.N` before the
///   extension when several rotations share the same second
/// - compressed: finalized name plus `.gz`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentNames {
    directory: PathBuf,
    prefix: String,
}

impl SegmentNames {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Canonical path of the active segment for `date`.
    pub fn active_path(&self, date: Date) -> PathBuf {
        let date = date
            .format(DATE_FORMAT)
            .unwrap_or_else(|_| date.to_string());
        self.directory
            .join(format!("{}_{}.{}", self.prefix, date, SEGMENT_EXTENSION))
    }

    /// Free path the active segment at `active` is renamed to when rotated at `at`.
    pub fn finalized_path(&self, active: &Path, at: OffsetDateTime) -> PathBuf {
        let stem = active
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.prefix.clone());
        let stamp = at
            .format(ROTATION_FORMAT)
            .unwrap_or_else(|_| at.unix_timestamp().to_string());

        let base = format!("{}_{}", stem, stamp);
        let mut candidate = self
            .directory
            .join(format!("{}.{}", base, SEGMENT_EXTENSION));
        let mut n = 1u32;
        while is_taken(&candidate) {
            candidate = self
                .directory
                .join(format!("{}.{}.{}", base, n, SEGMENT_EXTENSION));
            n += 1;
        }
        candidate
    }

    /// Whether `file_name` is a segment (active, finalized or compressed) of this stream.
    pub fn is_segment(&self, file_name: &str) -> bool {
        let Some(rest) = file_name
            .strip_prefix(self.prefix.as_str())
            .and_then(|r| r.strip_prefix('_'))
        else {
            return false;
        };
        if !rest.starts_with(|c: char| c.is_ascii_digit()) {
            return false;
        }
        let rest = rest.strip_suffix(COMPRESSED_SUFFIX).unwrap_or(rest);
        rest.ends_with(&format!(".{}", SEGMENT_EXTENSION))
    }
}

fn is_taken(path: &Path) -> bool {
    if path.exists() {
        return true;
    }
    let mut compressed = path.as_os_str().to_owned();
    compressed.push(COMPRESSED_SUFFIX);
    Path::new(&compressed).exists()
}

/// Holds the active segment's file handle and tracks its size.
///
/// Every swap of the handle bumps the generation, which lets rotation
/// requests detect that the segment they targeted is already gone.
#[derive(Debug, Default)]
pub struct SegmentWriter {
    file: Option<File>,
    path: Option<PathBuf>,
    size: u64,
    generation: u64,
}

impl SegmentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or create) `path` for append and make it the active segment.
    /// Any previously active handle is closed first.
    pub fn open_new(&mut self, path: &Path) -> io::Result<()> {
        if let Err(err) = self.close_active() {
            tracing::warn!(error = %err, "failed to close previous segment cleanly");
        }

        let file = open_append(path)?;
        self.size = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.file = Some(file);
        self.path = Some(path.to_path_buf());
        self.generation += 1;
        Ok(())
    }

    /// Append `buf` to the active segment, reopening its path if the handle was lost.
    pub fn append(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.file.is_none() {
            let path = self
                .path
                .clone()
                .ok_or_else(|| io::Error::other("no active segment"))?;
            self.open_new(&path)?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("no active segment"))?;
        file.write_all(buf)?;
        self.size += buf.len() as u64;
        Ok(buf.len())
    }

    /// Size of the active segment in bytes.
    pub fn current_size(&self) -> u64 {
        self.size
    }

    /// Flush and drop the active handle. The path is remembered.
    pub fn close_active(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(mut file) => {
                file.flush()?;
                file.sync_all()
            }
            None => Ok(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
