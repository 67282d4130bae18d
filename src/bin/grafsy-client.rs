extern crate chrono;
extern crate clap;
extern crate fern;
extern crate grafsy;

#[macro_use]
extern crate log;

use chrono::Utc;
use clap::{App, Arg};
use grafsy::client;
use grafsy::config::{self, DEFAULT_CONFIG_FILE};
use std::fmt::Display;
use std::io;
use std::process;
use std::time::Duration;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

fn fatal<E: Display>(context: &str, e: E) -> ! {
    error!("{}: {}", context, e);
    process::exit(1);
}

fn setup_logging() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                record.module_path().unwrap_or("unknown"),
                Utc::now().to_rfc3339(),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(io::stderr())
        .apply()?;
    Ok(())
}

fn main() {
    let mut app = App::new("grafsy-client")
        .version(VERSION.unwrap_or("unknown"))
        .about(
            "Reads metrics from files or STDIN and writes to the grafsy localBind \
             address. If STDIN is not a terminal the files are ignored.",
        )
        .usage(
            "grafsy-client [args] [file1 [fileN...]]\n    \
             metrics-generator | grafsy-client [args]",
        )
        .arg(
            Arg::with_name("config-file")
                .short("c")
                .value_name("config")
                .default_value(DEFAULT_CONFIG_FILE)
                .help("Path to config file.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("timeout")
                .short("w")
                .value_name("seconds")
                .default_value("50")
                .help("Connection timeout in seconds.")
                .takes_value(true)
                .validator(|v| {
                    v.parse::<u64>()
                        .map(|_| ())
                        .map_err(|e| format!("{}: {}", v, e))
                }),
        )
        .arg(Arg::with_name("files").multiple(true).value_name("file"));
    let args = app.clone().get_matches();

    if let Err(e) = setup_logging() {
        eprintln!("grafsy-client: could not set up logging: {}", e);
        process::exit(1);
    }

    let filename = args.value_of("config-file").unwrap_or(DEFAULT_CONFIG_FILE);
    let conf = match config::load_config_file(filename, 0) {
        Ok(conf) => conf,
        Err(e) => fatal("unable to load configuration", e),
    };
    let timeout = args
        .value_of("timeout")
        .and_then(|v| v.parse().ok())
        .unwrap_or(50);

    let conn = match client::connect(&conf.local_bind, Duration::from_secs(timeout)) {
        Ok(conn) => conn,
        Err(e) => fatal("fail to establish connection", e),
    };

    match client::stdin_is_char_device() {
        Ok(false) => {
            let stdin = io::stdin();
            if let Err(e) = client::forward(stdin.lock(), &conn) {
                fatal("unable to send STDIN", e);
            }
            return;
        }
        Ok(true) => {}
        Err(e) => fatal("error in STDIN", e),
    }

    let files: Vec<&str> = args.values_of("files").map(|v| v.collect()).unwrap_or_default();
    if files.is_empty() {
        let _ = app.print_help();
        println!();
    }
    if let Err(e) = client::forward_files(&files, &conn) {
        fatal("unable to send files", e);
    }
}
