use config;
use constants;
use router::Router;
use source::Source;
use std::io;
use std::io::{BufRead, BufReader, Read};
use std::net::{SocketAddr, TcpListener};
use thread;
use util;

/// Line oriented TCP server. Every connection is read on its own thread, one
/// Carbon line per `\n`.
///
/// The configured bind host may resolve to several addresses, loopback on
/// IPv4 and IPv6 for instance. One listener is bound per address.
pub struct Tcp {
    listeners: Vec<TcpListener>,
    router: Router,
}

impl Tcp {
    /// Bind a listener for every address `bind` resolves to.
    pub fn bind(bind: &str, router: Router) -> Result<Tcp, config::Error> {
        let mut listeners = Vec::new();
        for addr in config::resolve(bind)? {
            let listener = TcpListener::bind(&addr).map_err(|e| config::Error::Bind(addr, e))?;
            info!("Registering listener for {:?}", addr);
            listeners.push(listener);
        }
        Ok(Tcp {
            listeners: listeners,
            router: router,
        })
    }

    /// Addresses actually bound, with ephemeral ports filled in.
    pub fn local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.listeners.iter().map(|l| l.local_addr()).collect()
    }
}

impl Source for Tcp {
    fn run(&mut self) {
        let mut acceptors = Vec::new();
        for listener in self.listeners.drain(..) {
            let router = self.router.clone();
            let name = match listener.local_addr() {
                Ok(addr) => format!("accept {}", addr),
                Err(_) => "accept".to_string(),
            };
            match thread::spawn(name, move || accept_loop(&listener, &router)) {
                Ok(handle) => acceptors.push(handle),
                Err(e) => error!("unable to start accept loop: {}", e),
            }
        }
        for handle in acceptors {
            handle.join();
        }
    }
}

fn accept_loop(listener: &TcpListener, router: &Router) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let router = router.clone();
                let peer = stream
                    .peer_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                trace!("accepted connection from {}", peer);
                let res = thread::spawn(format!("conn {}", peer), move || {
                    handle_stream(stream, &router)
                });
                // The handle is dropped, connection threads detach.
                if let Err(e) = res {
                    error!("unable to spawn connection handler: {}", e);
                }
            }
            Err(ref e) if is_transient(e) => continue,
            Err(e) => {
                error!("error accepting connection: {}", e);
                continue;
            }
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    match e.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::Interrupted
        | io::ErrorKind::TimedOut
        | io::ErrorKind::WouldBlock => true,
        _ => false,
    }
}

/// What `read_line` found.
#[derive(Debug, PartialEq, Eq)]
enum Line {
    /// The stream is exhausted.
    Eof,
    /// A line, possibly without terminator, is in the buffer.
    Complete,
    /// The line exceeded `MAX_LINE` and was discarded up to its terminator.
    Oversized,
}

/// Read one line into `buf`, never buffering more than `MAX_LINE` bytes.
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Line> {
    let n = reader
        .by_ref()
        .take(constants::MAX_LINE as u64)
        .read_until(b'\n', buf)?;
    if n == 0 {
        return Ok(Line::Eof);
    }
    if n < constants::MAX_LINE || buf.last() == Some(&b'\n') {
        return Ok(Line::Complete);
    }
    skip_line(reader)?;
    Ok(Line::Oversized)
}

/// Consume input up to and including the next `\n`.
fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let (done, used) = {
            let available = reader.fill_buf()?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(i) => (true, i + 1),
                None => (false, available.len()),
            }
        };
        reader.consume(used);
        if done {
            return Ok(());
        }
    }
}

/// Read `\n` terminated lines off `stream` until it closes. A final line
/// without a terminator is routed as well.
pub fn handle_stream<R: Read>(stream: R, router: &Router) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(128);
    loop {
        buf.clear();
        match read_line(&mut reader, &mut buf) {
            Ok(Line::Eof) => break,
            Ok(Line::Complete) => {
                router.stats().incr_net(1);
                router.route(&util::trim_line_ending(&buf));
            }
            Ok(Line::Oversized) => {
                debug!("discarding line longer than {} bytes", constants::MAX_LINE);
                router.stats().incr_net(1);
                router.stats().incr_invalid(1);
            }
            Err(e) => {
                debug!("error reading from connection: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use backend::Backends;
    use config::Config;
    use metric::Metric;
    use queue::Queue;
    use stats::Stats;
    use std::io::{Cursor, Write};
    use std::net::{Shutdown, TcpStream};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempdir::TempDir;

    #[test]
    fn lines_are_split_and_routed() {
        let dir = TempDir::new("grafsy-tcp").unwrap();
        let mut config = Config::default();
        config.retry_dir = dir.path().to_path_buf();
        let backends = Arc::new(Backends::new(&config));
        let stats = Arc::new(Stats::new(backends.len()));
        let router = Router::new(
            config.validator().unwrap(),
            Queue::new(10),
            Arc::clone(&backends),
            Arc::clone(&stats),
        );

        let mut tcp = Tcp::bind("127.0.0.1:0", router).unwrap();
        let addr = tcp.local_addrs().unwrap()[0];
        ::std::thread::spawn(move || tcp.run());

        let mut client = TcpStream::connect(addr).unwrap();
        client
            .write_all(b"a.b 1 1500000000\r\nnot-a-metric\nc.d 2 1500000000")
            .unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        let main = &backends.get(0).unwrap().main;
        let deadline = Instant::now() + Duration::from_secs(10);
        while main.len() < 2 && Instant::now() < deadline {
            ::std::thread::sleep(Duration::from_millis(10));
        }

        let snap = stats.snapshot();
        assert_eq!(snap.server.net, 3);
        assert_eq!(snap.server.invalid, 1);
        assert_eq!(main.pop(), Some(Metric::new("a.b 1 1500000000")));
        assert_eq!(main.pop(), Some(Metric::new("c.d 2 1500000000")));
    }

    #[test]
    fn read_line_caps_long_lines() {
        let mut input = vec![b'a'; constants::MAX_LINE + 10];
        input.extend_from_slice(b"\nshort 1 1500000000\n");
        let mut reader = Cursor::new(input);
        let mut buf = Vec::new();

        assert_eq!(read_line(&mut reader, &mut buf).unwrap(), Line::Oversized);
        assert_eq!(buf.len(), constants::MAX_LINE);
        buf.clear();
        assert_eq!(read_line(&mut reader, &mut buf).unwrap(), Line::Complete);
        assert_eq!(buf, b"short 1 1500000000\n".to_vec());
        buf.clear();
        assert_eq!(read_line(&mut reader, &mut buf).unwrap(), Line::Eof);
    }

    #[test]
    fn line_of_exactly_max_length_is_complete() {
        let mut input = vec![b'a'; constants::MAX_LINE - 1];
        input.push(b'\n');
        let mut reader = Cursor::new(input);
        let mut buf = Vec::new();
        assert_eq!(read_line(&mut reader, &mut buf).unwrap(), Line::Complete);
        assert_eq!(read_line(&mut reader, &mut buf).unwrap(), Line::Eof);
    }

    #[test]
    fn oversized_line_is_counted_invalid() {
        let dir = TempDir::new("grafsy-tcp").unwrap();
        let mut config = Config::default();
        config.retry_dir = dir.path().to_path_buf();
        let backends = Arc::new(Backends::new(&config));
        let stats = Arc::new(Stats::new(backends.len()));
        let router = Router::new(
            config.validator().unwrap(),
            Queue::new(10),
            Arc::clone(&backends),
            Arc::clone(&stats),
        );

        let mut input = b"a.b 1 1500000000\n".to_vec();
        input.extend(vec![b'9'; 3 * constants::MAX_LINE]);
        input.extend_from_slice(b"\nc.d 2 1500000000\n");
        handle_stream(Cursor::new(input), &router);

        let snap = stats.snapshot();
        assert_eq!(snap.server.net, 3);
        assert_eq!(snap.server.invalid, 1);
        let main = &backends.get(0).unwrap().main;
        assert_eq!(main.pop(), Some(Metric::new("a.b 1 1500000000")));
        assert_eq!(main.pop(), Some(Metric::new("c.d 2 1500000000")));
        assert_eq!(main.pop(), None);
    }
}
