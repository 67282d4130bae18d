#![allow(unknown_lints)]

extern crate chrono;
extern crate fern;
extern crate grafsy;

#[macro_use]
extern crate log;

use chrono::Utc;
use grafsy::aggregator::Aggregator;
use grafsy::backend::Backends;
use grafsy::config::{self, Config};
use grafsy::queue::Queue;
use grafsy::router::Router;
use grafsy::sink::{Carbon, CarbonConfig, Sink};
use grafsy::source::{Internal, MetricDir, Source, Tcp};
use grafsy::stats::Stats;
use grafsy::thread::{self, ThreadHandle};
use std::fmt::Display;
use std::process;
use std::sync::Arc;

fn fatal<E: Display>(context: &str, e: E) -> ! {
    error!("{}: {}", context, e);
    eprintln!("grafsy: {}: {}", context, e);
    process::exit(1);
}

fn setup_logging(args: &Config) -> Result<(), fern::InitError> {
    let level = match args.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}][{}] {}",
                record.module_path().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                Utc::now().to_rfc3339(),
                record.level(),
                message
            ))
        })
        .level(level);

    let dispatch = if args.log == "-" {
        dispatch.chain(std::io::stdout())
    } else {
        dispatch.chain(fern::log_file(&args.log)?)
    };
    dispatch.apply()?;
    Ok(())
}

fn spawn<F>(workers: &mut Vec<ThreadHandle>, name: &str, f: F)
where
    F: Send + 'static + FnOnce() -> (),
{
    match thread::spawn(name, f) {
        Ok(handle) => workers.push(handle),
        Err(e) => fatal(&format!("unable to start {}", name), e),
    }
}

fn main() {
    let mut args = match config::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("grafsy: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = args.prepare_environment() {
        eprintln!("grafsy: unable to prepare environment: {}", e);
        process::exit(1);
    }

    if let Err(e) = setup_logging(&args) {
        eprintln!("grafsy: could not set up logging: {}", e);
        process::exit(1);
    }

    info!(
        "grafsy - {} forwarding to {:?}",
        env!("CARGO_PKG_VERSION"),
        args.carbon_addrs
    );

    let limits = args.limits();
    let validator = match args.validator() {
        Ok(v) => v,
        Err(e) => fatal("invalid configuration", e),
    };

    // The backend table and the counters are fixed before any worker starts.
    let backends = Arc::new(Backends::new(&args));
    let stats = Arc::new(Stats::new(backends.len()));
    let aggregation = Queue::new(limits.aggr_buffer_size);
    let router = Router::new(
        validator,
        aggregation.clone(),
        Arc::clone(&backends),
        Arc::clone(&stats),
    );

    let mut workers = Vec::new();

    // SINKS
    let carbon_config = CarbonConfig::from(&args);
    for (idx, backend) in backends.iter().enumerate() {
        let mut carbon = Carbon::new(
            carbon_config.clone(),
            idx,
            backend.clone(),
            Arc::clone(&stats),
        );
        spawn(
            &mut workers,
            &format!("carbon {}", backend.address()),
            move || carbon.run(),
        );
    }

    // AGGREGATION
    let mut aggregator = Aggregator::new(
        aggregation,
        args.prefixes(),
        args.aggr_interval,
        Arc::clone(&backends),
        Arc::clone(&stats),
    );
    spawn(&mut workers, "aggregator", move || aggregator.run());

    // SOURCES
    let mut internal = Internal::new(
        args.monitoring_prefix(),
        Arc::clone(&backends),
        Arc::clone(&stats),
    );
    spawn(&mut workers, "internal", move || internal.run());

    let mut metric_dir = MetricDir::new(
        args.metric_dir.clone(),
        args.client_send_interval,
        router.clone(),
    );
    spawn(&mut workers, "metric dir", move || metric_dir.run());

    let mut tcp = match Tcp::bind(&args.local_bind, router) {
        Ok(tcp) => tcp,
        Err(e) => fatal("unable to start server", e),
    };
    spawn(&mut workers, "tcp", move || tcp.run());

    for worker in workers {
        worker.join();
    }
}
