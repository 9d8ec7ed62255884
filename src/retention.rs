//! Age-based pruning and compression of finalized segments.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::segment::{COMPRESSED_SUFFIX, SegmentNames};

/// Outcome of one retention sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Segments deleted because they were too old.
    pub removed: Vec<PathBuf>,
    /// Segments that could not be inspected or deleted.
    pub errors: Vec<(PathBuf, io::Error)>,
}

/// Delete finalized segments last modified more than `max_age` before `now`.
///
/// The active segment is never touched. Files that disappear while the sweep
/// runs are skipped. Only a failure to list the directory is returned as an
/// error; everything else is collected in the report.
pub fn sweep(
    names: &SegmentNames,
    active: Option<&Path>,
    max_age: Duration,
    now: SystemTime,
) -> io::Result<SweepReport> {
    let mut report = SweepReport::default();
    let active_name = active.and_then(Path::file_name);

    for entry in fs::read_dir(names.directory())? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                report.errors.push((names.directory().to_path_buf(), err));
                continue;
            }
        };
        let file_name = entry.file_name();
        if Some(file_name.as_os_str()) == active_name {
            continue;
        }
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !names.is_segment(name) {
            continue;
        }

        let path = entry.path();
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                report.errors.push((path, err));
                continue;
            }
        };

        // A modification time in the future counts as fresh.
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= max_age {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), age_secs = age.as_secs(), "removed expired segment");
                report.removed.push(path);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => report.errors.push((path, err)),
        }
    }

    Ok(report)
}

/// Gzip `path` into a `.gz` sibling, then delete the original.
///
/// On failure the original is kept and any partial archive removed.
pub fn compress_segment(path: &Path) -> io::Result<PathBuf> {
    let mut target = path.as_os_str().to_owned();
    target.push(COMPRESSED_SUFFIX);
    let target = PathBuf::from(target);

    if let Err(err) = write_gzip(path, &target) {
        let _ = fs::remove_file(&target);
        return Err(err);
    }

    fs::remove_file(path)?;
    Ok(target)
}

fn write_gzip(source: &Path, target: &Path) -> io::Result<()> {
    let mut input = BufReader::new(File::open(source)?);
    let output = File::create(target)?;

    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| e.into_error())?
        .sync_all()
}

/// Compress `path` on a background thread, handing any failure to `on_error`.
pub fn spawn_compression<F>(path: PathBuf, on_error: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce(&Path, io::Error) + Send + 'static,
{
    thread::Builder::new()
        .name("seglog-compress".to_string())
        .spawn(move || match compress_segment(&path) {
            Ok(target) => {
                tracing::debug!(path = %target.display(), "compressed rotated segment");
            }
            Err(err) => on_error(&path, err),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::{Arc, Mutex};

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn touch(path: &Path, age: Duration) {
        fs::write(path, b"{\"level\":\"INFO\"}\n").unwrap();
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn test_sweep_removes_only_expired_segments() {
        let dir = tempfile::tempdir().unwrap();
        let names = SegmentNames::new(dir.path(), "app");

        let active = dir.path().join("app_2026-01-20.log");
        let fresh = dir.path().join("app_2026-01-19_2026-01-20T00-00-00.log");
        let old = dir.path().join("app_2026-01-01_2026-01-02T00-00-00.log");
        let old_gz = dir.path().join("app_2025-12-01_2025-12-02T00-00-00.log.gz");
        let foreign = dir.path().join("other_2025-12-01.log");
        let unrelated = dir.path().join("notes.txt");

        touch(&active, 30 * DAY);
        touch(&fresh, DAY);
        touch(&old, 10 * DAY);
        touch(&old_gz, 40 * DAY);
        touch(&foreign, 40 * DAY);
        touch(&unrelated, 40 * DAY);

        let report = sweep(&names, Some(&active), 7 * DAY, SystemTime::now()).unwrap();

        assert!(report.errors.is_empty());
        assert_eq!(report.removed.len(), 2);
        assert!(!old.exists());
        assert!(!old_gz.exists());
        assert!(active.exists(), "active segment must survive");
        assert!(fresh.exists());
        assert!(foreign.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_sweep_keeps_segment_inside_window() {
        let dir = tempfile::tempdir().unwrap();
        let names = SegmentNames::new(dir.path(), "app");
        let seg = dir.path().join("app_2026-01-10_2026-01-11T00-00-00.log");
        touch(&seg, 6 * DAY);

        let report = sweep(&names, None, 7 * DAY, SystemTime::now()).unwrap();
        assert!(report.removed.is_empty());
        assert!(seg.exists());
    }

    #[test]
    fn test_sweep_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let names = SegmentNames::new(dir.path().join("gone"), "app");
        assert!(sweep(&names, None, DAY, SystemTime::now()).is_err());
    }

    #[test]
    fn test_compress_segment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app_2026-01-09_2026-01-10T00-00-00.log");
        let content = "{\"n\":1}\n{\"n\":2}\n".repeat(100);
        fs::write(&path, &content).unwrap();

        let target = compress_segment(&path).unwrap();
        assert_eq!(
            target,
            dir.path().join("app_2026-01-09_2026-01-10T00-00-00.log.gz")
        );
        assert!(!path.exists(), "original should be removed");

        let mut decoded = String::new();
        GzDecoder::new(File::open(&target).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn test_compress_missing_segment_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app_2026-01-09.log");
        assert!(compress_segment(&path).is_err());
        assert!(!dir.path().join("app_2026-01-09.log.gz").exists());
    }

    #[test]
    fn test_spawn_compression_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("app_2026-01-09.log");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let handle = spawn_compression(missing.clone(), move |path, err| {
            sink.lock().unwrap().push((path.to_path_buf(), err.kind()));
        })
        .unwrap();
        handle.join().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, missing);
        assert_eq!(seen[0].1, io::ErrorKind::NotFound);
    }
}
