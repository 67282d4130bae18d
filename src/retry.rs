//! Per-backend retry files.
//!
//! When a backend cannot take its metrics they are appended to a plain text
//! file, one line per metric, named after the backend. The dispatcher drains
//! the file on its next successful connection. A retry file never holds more
//! than `capacity` lines once an append has finished: the oldest lines are
//! discarded first.

use metric::Metric;
use std::fmt;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter, SeekFrom};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use util;

/// Retry file errors.
#[derive(Debug)]
pub enum Error {
    /// The file could not be opened, read, written or removed.
    Io(PathBuf, io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref path, ref e) => write!(f, "{}: {}", path.display(), e),
        }
    }
}

impl ::std::error::Error for Error {}

/// What happened to the lines handed to `RetryFile::append`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendReport {
    /// Lines written to the file.
    pub saved: usize,
    /// Lines that could not be written plus lines discarded by compaction.
    pub dropped: usize,
}

/// The retry file of a single backend.
#[derive(Debug, Clone)]
pub struct RetryFile {
    path: PathBuf,
    capacity: usize,
}

impl RetryFile {
    /// The retry file for backend `addr` inside `dir`, holding at most
    /// `capacity` lines.
    pub fn new(dir: &Path, addr: &str, capacity: usize) -> RetryFile {
        RetryFile {
            path: dir.join(util::sanitize(addr)),
            capacity: capacity,
        }
    }

    /// Location of the file on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Maximum number of lines kept after compaction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn io_err(&self, e: io::Error) -> Error {
        Error::Io(self.path.clone(), e)
    }

    /// Append `metrics` to the end of the file, then compact.
    ///
    /// Failing to open the file returns an error and the whole batch is lost.
    /// A failed write loses that line only. Lines discarded by compaction are
    /// reported as dropped as well.
    pub fn append<I>(&self, metrics: I) -> Result<AppendReport, Error>
    where
        I: IntoIterator<Item = Metric>,
    {
        let metrics: Vec<Metric> = metrics.into_iter().collect();
        let mut report = AppendReport::default();
        if metrics.is_empty() {
            return Ok(report);
        }

        let mut fp = match fs::OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .mode(0o600)
            .open(&self.path)
        {
            Ok(fp) => fp,
            Err(e) => return Err(self.io_err(e)),
        };

        // A crash can leave a torn last line behind. Terminate it so that it
        // does not merge with the first new line.
        let torn = match ends_without_newline(&mut fp) {
            Ok(torn) => torn,
            Err(e) => {
                warn!("unable to inspect tail of {:?}: {}", self.path, e);
                false
            }
        };

        {
            let mut writer = BufWriter::new(&mut fp);
            if torn {
                if let Err(e) = writer.write_all(b"\n") {
                    warn!("unable to terminate torn line in {:?}: {}", self.path, e);
                }
            }
            for metric in metrics {
                let res = writer
                    .write_all(metric.as_str().as_bytes())
                    .and_then(|_| writer.write_all(b"\n"));
                match res {
                    Ok(()) => report.saved += 1,
                    Err(e) => {
                        error!("unable to write to {:?}: {}", self.path, e);
                        report.dropped += 1;
                    }
                }
            }
            if let Err(e) = writer.flush() {
                // Buffered lines are lost with the failed flush. The exact
                // number is unknown, treat the whole batch as lost.
                error!("unable to flush {:?}: {}", self.path, e);
                report.dropped += report.saved;
                report.saved = 0;
            }
        }
        drop(fp);

        match self.compact() {
            Ok(discarded) => report.dropped += discarded,
            Err(e) => error!("unable to compact retry file: {}", e),
        }
        Ok(report)
    }

    /// Read every line of the file and remove it.
    ///
    /// A missing file is not an error, it is an empty retry file. On any other
    /// failure the file is left in place.
    pub fn drain_all(&self) -> Result<Vec<Metric>, Error> {
        let lines = match self.read_lines() {
            Ok(lines) => lines,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.io_err(e)),
        }
        Ok(lines.into_iter().map(Metric::new).collect())
    }

    /// Number of lines in the file, zero when there is no file.
    pub fn line_count(&self) -> Result<usize, Error> {
        match self.read_lines() {
            Ok(lines) => Ok(lines.len()),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(self.io_err(e)),
        }
    }

    /// Keep only the newest `capacity` lines. Returns the number of lines
    /// discarded.
    ///
    /// The file is oldest-first, so the newest lines are its tail. The kept
    /// lines are written to a sibling file which then replaces the original,
    /// a crash mid-rewrite leaves the old file intact.
    pub fn compact(&self) -> Result<usize, Error> {
        let mut lines = match self.read_lines() {
            Ok(lines) => lines,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(self.io_err(e)),
        };
        if lines.len() <= self.capacity {
            return Ok(0);
        }
        let discarded = lines.len() - self.capacity;
        warn!(
            "retry file {:?} holds {} lines, more than {}; dropping the {} oldest",
            self.path,
            lines.len(),
            self.capacity,
            discarded
        );
        let kept = lines.split_off(discarded);

        let tmp = self.path.with_extension("compact");
        let res = write_lines(&tmp, &kept).and_then(|_| fs::rename(&tmp, &self.path));
        if let Err(e) = res {
            let _ = fs::remove_file(&tmp);
            return Err(self.io_err(e));
        }
        Ok(discarded)
    }

    fn read_lines(&self) -> io::Result<Vec<String>> {
        let fp = fs::File::open(&self.path)?;
        let mut res = Vec::new();
        for line in BufReader::new(fp).split(b'\n') {
            let line = util::trim_line_ending(&line?);
            if !line.is_empty() {
                res.push(line);
            }
        }
        Ok(res)
    }
}

fn ends_without_newline(fp: &mut fs::File) -> io::Result<bool> {
    let len = fp.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    fp.seek(SeekFrom::Start(len - 1))?;
    fp.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn write_lines(path: &Path, lines: &[String]) -> io::Result<()> {
    let fp = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    let mut writer = BufWriter::new(fp);
    for line in lines {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};
    use tempdir::TempDir;

    fn metrics(range: ::std::ops::Range<usize>) -> Vec<Metric> {
        range
            .map(|i| Metric::new(format!("retry.test.m{} {} 1500000000", i, i)))
            .collect()
    }

    #[test]
    fn file_is_named_after_sanitized_backend() {
        let dir = TempDir::new("grafsy-retry").unwrap();
        let rf = RetryFile::new(dir.path(), "localhost:2003", 10);
        assert_eq!(rf.path(), dir.path().join("localhost_2003").as_path());
    }

    #[test]
    fn drain_missing_file_is_empty() {
        let dir = TempDir::new("grafsy-retry").unwrap();
        let rf = RetryFile::new(dir.path(), "localhost:2003", 10);
        assert_eq!(rf.drain_all().unwrap(), Vec::new());
        assert_eq!(rf.line_count().unwrap(), 0);
    }

    #[test]
    fn round_trip_across_reopen() {
        let dir = TempDir::new("grafsy-retry").unwrap();
        let written = metrics(0..25);
        {
            let rf = RetryFile::new(dir.path(), "localhost:2003", 100);
            let report = rf.append(written.clone()).unwrap();
            assert_eq!(report, AppendReport { saved: 25, dropped: 0 });
        }

        let rf = RetryFile::new(dir.path(), "localhost:2003", 100);
        assert_eq!(rf.line_count().unwrap(), 25);
        let drained = rf.drain_all().unwrap();
        assert_eq!(drained, written);
        assert!(!rf.path().exists());
    }

    #[test]
    fn compaction_keeps_newest() {
        let dir = TempDir::new("grafsy-retry").unwrap();
        let rf = RetryFile::new(dir.path(), "localhost:2003", 10);
        rf.append(metrics(0..6)).unwrap();
        let report = rf.append(metrics(6..15)).unwrap();
        assert_eq!(report, AppendReport { saved: 9, dropped: 5 });

        assert_eq!(rf.line_count().unwrap(), 10);
        assert_eq!(rf.drain_all().unwrap(), metrics(5..15));
    }

    #[test]
    fn torn_last_line_does_not_merge() {
        let dir = TempDir::new("grafsy-retry").unwrap();
        let rf = RetryFile::new(dir.path(), "localhost:2003", 10);
        fs::write(rf.path(), "retry.test.torn 1 15000").unwrap();
        rf.append(metrics(0..1)).unwrap();

        let drained = rf.drain_all().unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], Metric::new("retry.test.torn 1 15000"));
        assert_eq!(drained[1], metrics(0..1)[0]);
    }

    #[test]
    fn unreadable_path_is_an_error() {
        let dir = TempDir::new("grafsy-retry").unwrap();
        let rf = RetryFile::new(dir.path(), "localhost:2003", 10);
        fs::create_dir(rf.path()).unwrap();
        assert!(rf.drain_all().is_err());
        assert!(rf.path().exists());
    }

    #[test]
    fn never_more_than_capacity() {
        fn inner(capacity: u8, batches: Vec<u8>) -> TestResult {
            if capacity == 0 {
                return TestResult::discard();
            }
            let dir = TempDir::new("grafsy-retry").unwrap();
            let rf = RetryFile::new(dir.path(), "localhost:2003", capacity as usize);
            let mut total = 0;
            for b in batches {
                let batch = metrics(total..total + b as usize);
                total += b as usize;
                rf.append(batch).unwrap();
                if rf.line_count().unwrap() > capacity as usize {
                    return TestResult::failed();
                }
            }
            let kept = ::std::cmp::min(total, capacity as usize);
            TestResult::from_bool(rf.drain_all().unwrap() == metrics(total - kept..total))
        }
        QuickCheck::new()
            .tests(50)
            .quickcheck(inner as fn(u8, Vec<u8>) -> TestResult);
    }
}
