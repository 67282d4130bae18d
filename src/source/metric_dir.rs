use glob::{glob, Pattern};
use router::Router;
use source::Source;
use std::fs;
use std::io;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use time;
use util;

/// `MetricDir` is a Source which periodically picks up files dropped into a
/// directory. Every regular file found is read whole, removed and its lines
/// routed. Producers are expected to write a file elsewhere and rename it
/// into the directory, grafsy does not wait for writers to finish.
pub struct MetricDir {
    dir: PathBuf,
    interval: u64,
    router: Router,
}

impl MetricDir {
    /// Scan `dir` every `interval` seconds.
    pub fn new<P>(dir: P, interval: u64, router: Router) -> MetricDir
    where
        P: Into<PathBuf>,
    {
        MetricDir {
            dir: dir.into(),
            interval: interval,
            router: router,
        }
    }

    /// Pick up every file currently in the directory. Returns the number of
    /// lines read.
    pub fn scan(&self) -> usize {
        // the directory name itself must not be read as a pattern
        let pattern = format!("{}/*", Pattern::escape(&self.dir.to_string_lossy()));
        let paths = match glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                error!("bad metric directory pattern {}: {}", pattern, e);
                return 0;
            }
        };

        let mut total = 0;
        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!("unable to inspect metric directory entry: {}", e);
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            let lines = match read_and_remove(&path) {
                Ok(lines) => lines,
                Err(e) => {
                    warn!("unable to read metric file {:?}: {}", path, e);
                    continue;
                }
            };
            trace!("read {} lines from {:?}", lines.len(), path);
            self.router.stats().incr_dir(lines.len());
            total += lines.len();
            self.router.route_all(lines);
        }
        total
    }
}

/// Read every line of `path` and remove it. The file is only removed once it
/// was read in full.
fn read_and_remove(path: &Path) -> io::Result<Vec<String>> {
    let fp = fs::File::open(path)?;
    let mut lines = Vec::new();
    for line in BufReader::new(fp).split(b'\n') {
        lines.push(util::trim_line_ending(&line?));
    }
    if let Err(e) = fs::remove_file(path) {
        error!("unable to remove metric file {:?}: {}", path, e);
    }
    Ok(lines)
}

impl Source for MetricDir {
    fn run(&mut self) {
        loop {
            self.scan();
            time::sleep_secs(self.interval);
        }
    }
}
