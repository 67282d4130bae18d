//! Provides the CLI option parser
//!
//! Used to parse the argv/config file into a struct that the daemon can
//! consume and use as configuration data. Every key of the configuration file
//! is optional. Keys are camelCase, for instance:
//!
//! ```toml
//! carbonAddrs = ["carbon-a:2003", "carbon-b:2003"]
//! clientSendInterval = 10
//! metricDir = "/tmp/grafsy"
//!
//! [[overwrite]]
//! replaceWhatRegexp = "^legacy\\."
//! replaceWith = "app."
//! ```

use buckets::Prefixes;
use clap::{App, Arg};
use constants;
use filter::{Overwrite, Validator};
use libc;
use regex;
use serde::{Deserialize, Deserializer};
use serde::de;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::io::Read;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use supervisor::Supervisor;
use toml;
use util;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

lazy_static! {
    // umask(2) is process wide; held while it is cleared
    static ref UMASK: Mutex<()> = Mutex::new(());
}

/// Where the configuration is read from when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/grafsy/grafsy.toml";

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug)]
pub enum Error {
    /// A file or directory could not be read or created.
    Io(PathBuf, io::Error),
    /// The configuration file is not valid TOML or has mistyped keys.
    Parse(toml::de::Error),
    /// A value is out of range.
    Invalid(String),
    /// A configured regular expression does not compile.
    Regex(regex::Error),
    /// A backend address does not resolve.
    Resolve(String, io::Error),
    /// The local listener could not be bound.
    Bind(SocketAddr, io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref path, ref e) => write!(f, "{}: {}", path.display(), e),
            Error::Parse(ref e) => write!(f, "could not parse config file: {}", e),
            Error::Invalid(ref msg) => write!(f, "invalid configuration: {}", msg),
            Error::Regex(ref e) => write!(f, "invalid regular expression: {}", e),
            Error::Resolve(ref addr, ref e) => {
                write!(f, "could not resolve {}: {}", addr, e)
            }
            Error::Bind(ref addr, ref e) => write!(f, "could not bind {}: {}", addr, e),
        }
    }
}

impl ::std::error::Error for Error {}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Error {
        Error::Parse(e)
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Error {
        Error::Regex(e)
    }
}

/// One configured rename rule, see `filter::Overwrite`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverwriteConfig {
    /// Pattern matched against the whole line.
    pub replace_what_regexp: String,
    /// Replacement for every match, `$1` group references allowed.
    #[serde(default)]
    pub replace_with: String,
}

/// Big configuration struct for the grafsy executable
///
/// This struct is what we construct from parsing the grafsy configuration. It
/// is not intended to be created by external clients. Please see documentation
/// on `parse_args` in this module for more details.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// The supervisor the dispatchers send heartbeats to.
    #[serde(deserialize_with = "deserialize_supervisor")]
    pub supervisor: Supervisor,
    /// Seconds between two send cycles of a dispatcher, also the interval of
    /// the metric directory scan.
    pub client_send_interval: u64,
    /// Expected peak rate of incoming metrics. Sizes the main queues and the
    /// retry files.
    pub metrics_per_second: usize,
    /// Carbon collectors, `host:port`. Every metric goes to each of them.
    pub carbon_addrs: Vec<String>,
    /// Seconds allowed for connecting to a collector.
    pub connect_timeout: u64,
    /// Local `host:port` to accept metrics on. A host resolving to several
    /// addresses gets one listener per address.
    pub local_bind: String,
    /// Log file, `-` for stdout.
    pub log: String,
    /// Directory scanned for metric files.
    pub metric_dir: PathBuf,
    /// Directory holding one retry file per collector.
    pub retry_dir: PathBuf,
    /// Name prefix selecting the sum aggregation.
    pub sum_prefix: String,
    /// Name prefix selecting the average aggregation.
    pub avg_prefix: String,
    /// Name prefix selecting the minimum aggregation.
    pub min_prefix: String,
    /// Name prefix selecting the maximum aggregation.
    pub max_prefix: String,
    /// Seconds in one aggregation window.
    pub aggr_interval: u64,
    /// Expected peak rate of aggregated metrics. Sizes the aggregation queue.
    pub aggr_per_second: usize,
    /// Substituted for `HOSTNAME` in outgoing lines. Derived from the system
    /// hostname, dots replaced by underscores, when empty.
    pub hostname: String,
    /// Path prefix of the self-monitoring metrics.
    pub monitoring_path: String,
    /// Lines not matching this pattern are rejected.
    pub allowed_metrics: String,
    /// Rename rules, first match wins.
    pub overwrite: Vec<OverwriteConfig>,
    /// The verbosity setting of grafsy. Set from the command line only.
    #[serde(skip)]
    pub verbose: u64,
}

impl Default for Config {
    fn default() -> Self {
        let prefixes = Prefixes::default();
        Config {
            supervisor: Supervisor::None,
            client_send_interval: 10,
            metrics_per_second: 10_000,
            carbon_addrs: vec!["localhost:2003".to_string()],
            connect_timeout: 7,
            local_bind: "127.0.0.1:3002".to_string(),
            log: "/var/log/grafsy/grafsy.log".to_string(),
            metric_dir: PathBuf::from("/tmp/grafsy"),
            retry_dir: PathBuf::from("/tmp/grafsy/retry"),
            sum_prefix: prefixes.sum,
            avg_prefix: prefixes.avg,
            min_prefix: prefixes.min,
            max_prefix: prefixes.max,
            aggr_interval: 60,
            aggr_per_second: 100,
            hostname: String::new(),
            monitoring_path: constants::HOSTNAME_PLACEHOLDER.to_string(),
            allowed_metrics: r"^[-a-zA-Z0-9_.]+ [-+0-9.eE]+ [0-9]{10}$".to_string(),
            overwrite: Vec::new(),
            verbose: 0,
        }
    }
}

fn deserialize_supervisor<'de, D>(deserializer: D) -> Result<Supervisor, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    name.parse().map_err(de::Error::custom)
}

/// Queue and file sizes derived from a `Config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Sends allowed per dispatcher cycle for retry plus main lines.
    pub main_buffer_size: usize,
    /// Capacity of the aggregation queue.
    pub aggr_buffer_size: usize,
    /// Most lines a retry file keeps.
    pub file_metric_size: usize,
    /// Number of self-monitoring lines produced per report.
    pub monitor_metrics: usize,
}

impl Limits {
    /// Capacity of each backend's main queue. Leaves room for one
    /// self-monitoring report on top of a full cycle's worth of metrics.
    pub fn main_queue_capacity(&self) -> usize {
        self.main_buffer_size + self.monitor_metrics
    }

    /// Capacity of each backend's monitoring queue.
    pub fn monitoring_queue_capacity(&self) -> usize {
        self.monitor_metrics
    }
}

impl Config {
    /// The configured aggregation prefixes.
    pub fn prefixes(&self) -> Prefixes {
        Prefixes {
            sum: self.sum_prefix.clone(),
            avg: self.avg_prefix.clone(),
            min: self.min_prefix.clone(),
            max: self.max_prefix.clone(),
        }
    }

    /// Queue and file sizes for this configuration.
    pub fn limits(&self) -> Limits {
        let main_buffer_size = self.metrics_per_second * self.client_send_interval as usize;
        Limits {
            main_buffer_size: main_buffer_size,
            aggr_buffer_size: self.aggr_per_second * self.aggr_interval as usize,
            file_metric_size: main_buffer_size * constants::RETRY_FILE_BUFFERS,
            monitor_metrics: constants::SERVER_STAT_METRICS
                + constants::BACKEND_STAT_METRICS * self.carbon_addrs.len(),
        }
    }

    /// Seconds a dispatcher may spend writing once connected.
    pub fn write_timeout(&self) -> u64 {
        self.client_send_interval
            .saturating_sub(self.connect_timeout)
            .saturating_sub(1)
    }

    /// Compile the validation pipeline: allowed-metrics pattern, prefixes and
    /// rename rules.
    pub fn validator(&self) -> Result<Validator, Error> {
        let mut overwrites = Vec::with_capacity(self.overwrite.len());
        for ow in &self.overwrite {
            overwrites.push(Overwrite::new(&ow.replace_what_regexp, &ow.replace_with)?);
        }
        Ok(Validator::new(&self.allowed_metrics, self.prefixes(), overwrites)?)
    }

    /// Check every value for range and consistency.
    pub fn validate(&self) -> Result<(), Error> {
        let positive = [
            ("clientSendInterval", self.client_send_interval as usize),
            ("metricsPerSecond", self.metrics_per_second),
            ("connectTimeout", self.connect_timeout as usize),
            ("aggrInterval", self.aggr_interval as usize),
            ("aggrPerSecond", self.aggr_per_second),
        ];
        for &(key, value) in &positive {
            if value < 1 {
                return Err(Error::Invalid(format!("{} must be greater than 0", key)));
            }
        }
        if self.write_timeout() < 1 {
            return Err(Error::Invalid(format!(
                "clientSendInterval ({}) must be greater than connectTimeout ({}) + 1",
                self.client_send_interval, self.connect_timeout
            )));
        }
        if self.carbon_addrs.is_empty() {
            return Err(Error::Invalid("carbonAddrs must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for addr in &self.carbon_addrs {
            if !seen.insert(util::sanitize(addr)) {
                return Err(Error::Invalid(format!(
                    "carbonAddrs entry {} is listed twice",
                    addr
                )));
            }
        }

        let prefixes = [
            ("sumPrefix", &self.sum_prefix),
            ("avgPrefix", &self.avg_prefix),
            ("minPrefix", &self.min_prefix),
            ("maxPrefix", &self.max_prefix),
        ];
        let mut seen = HashSet::new();
        for &(key, prefix) in &prefixes {
            if prefix.is_empty() {
                return Err(Error::Invalid(format!("{} must not be empty", key)));
            }
            if !seen.insert(prefix.as_str()) {
                return Err(Error::Invalid(format!(
                    "{} duplicates another prefix: {}",
                    key, prefix
                )));
            }
        }

        self.validator().map(|_| ())
    }

    /// Create the directories grafsy works in, check that every backend
    /// resolves and fill in the hostname.
    ///
    /// The metric directory is world writable with the sticky bit set so that
    /// any local user may drop files there. The umask is cleared while it is
    /// created, which affects every thread of the process. Concurrent callers
    /// are serialized, other threads creating files at the same time are not.
    pub fn prepare_environment(&mut self) -> Result<(), Error> {
        let res = {
            let _guard = UMASK.lock().unwrap_or_else(|e| e.into_inner());
            let old_umask = unsafe { libc::umask(0) };
            let res = create_dir(&self.metric_dir, 0o1777);
            unsafe {
                libc::umask(old_umask);
            }
            res
        };
        res?;

        create_dir(&self.retry_dir, 0o750)?;

        if self.log != "-" {
            if let Some(parent) = Path::new(&self.log).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .map_err(|e| Error::Io(parent.to_path_buf(), e))?;
                }
            }
        }

        for addr in &self.carbon_addrs {
            resolve(addr)?;
        }

        if self.hostname.is_empty() {
            let hostname = util::system_hostname()
                .map_err(|e| Error::Io(PathBuf::from("gethostname"), e))?;
            self.hostname = hostname.replace('.', "_");
        }
        Ok(())
    }

    /// The self-monitoring path with the hostname substituted.
    pub fn monitoring_prefix(&self) -> String {
        self.monitoring_path
            .replace(constants::HOSTNAME_PLACEHOLDER, &self.hostname)
    }
}

/// Resolve `addr` to every socket address it stands for. An address that
/// resolves to nothing is an error.
pub fn resolve(addr: &str) -> Result<Vec<SocketAddr>, Error> {
    let addrs: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|e| Error::Resolve(addr.to_string(), e))?
        .collect();
    if addrs.is_empty() {
        return Err(Error::Resolve(
            addr.to_string(),
            io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
        ));
    }
    Ok(addrs)
}

fn create_dir(path: &Path, mode: u32) -> Result<(), Error> {
    if !path.is_dir() {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(path)
            .map_err(|e| Error::Io(path.to_path_buf(), e))?;
    }
    // mkdir(2) may ignore the sticky bit
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| Error::Io(path.to_path_buf(), e))
}

/// Parse the grafsy configuration arguments
///
/// This function will read the environment arguments and construct a
/// `Config`. Most grafsy configuration will be stored in an on-disk file. See
/// `grafsy --help` for more information.
pub fn parse_args() -> Result<Config, Error> {
    let args = App::new("grafsy")
        .version(VERSION.unwrap_or("unknown"))
        .about("local carbon relay: validate, aggregate, forward, retry")
        .arg(
            Arg::with_name("config-file")
                .long("config")
                .short("c")
                .value_name("config")
                .default_value(DEFAULT_CONFIG_FILE)
                .help("The config file to feed in.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Turn on verbose output."),
        )
        .get_matches();

    let verb = args.occurrences_of("verbose");
    let filename = args.value_of("config-file").unwrap_or(DEFAULT_CONFIG_FILE);
    load_config_file(filename, verb)
}

/// Read the grafsy configuration file at `path` and validate it.
pub fn load_config_file<P: AsRef<Path>>(path: P, verbosity: u64) -> Result<Config, Error> {
    let path = path.as_ref();
    let mut buffer = String::new();
    fs::File::open(path)
        .and_then(|mut fp| fp.read_to_string(&mut buffer))
        .map_err(|e| Error::Io(path.to_path_buf(), e))?;
    parse_config_file(&buffer, verbosity)
}

/// Parse the grafsy configuration file and validate it.
pub fn parse_config_file(buffer: &str, verbosity: u64) -> Result<Config, Error> {
    let mut config: Config = toml::from_str(buffer)?;
    config.verbose = verbosity;
    config.validate()?;
    Ok(config)
}
