//! Feed metric lines to a running grafsy from the command line.
//!
//! `grafsy-client` reads the daemon's configuration to learn where it
//! listens, connects and copies either its standard input or a list of files
//! onto the connection. The lines are sent as they are, grafsy validates
//! them on arrival.

use libc;
use std::fs;
use std::io;
use std::io::{BufReader, BufWriter, Read, Write};
use std::mem;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

/// Connect to `addr`, trying every address it resolves to in turn with
/// `timeout` each. The error of the last attempt is returned when none
/// succeeds.
pub fn connect(addr: &str, timeout: Duration) -> io::Result<TcpStream> {
    let mut last = io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} resolved to no address", addr),
    );
    for ip in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&ip, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("unable to connect to {} using addr {}: {}", addr, ip, e);
                last = e;
            }
        }
    }
    Err(last)
}

/// Whether standard input is a character device, a terminal usually. Piped
/// or redirected input is not.
pub fn stdin_is_char_device() -> io::Result<bool> {
    let mut stat: libc::stat = unsafe { mem::zeroed() };
    if unsafe { libc::fstat(libc::STDIN_FILENO, &mut stat) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(stat.st_mode & libc::S_IFMT == libc::S_IFCHR)
}

/// Copy everything `input` yields to `conn`. Returns the number of bytes
/// copied.
pub fn forward<R, W>(input: R, conn: W) -> io::Result<u64>
where
    R: Read,
    W: Write,
{
    let mut input = BufReader::new(input);
    let mut conn = BufWriter::new(conn);
    let n = io::copy(&mut input, &mut conn)?;
    conn.flush()?;
    Ok(n)
}

/// Copy each of `paths` to `conn` in order. A file that cannot be opened is
/// logged and skipped. Returns the number of files copied in full.
pub fn forward_files<P, W>(paths: &[P], mut conn: W) -> io::Result<usize>
where
    P: AsRef<Path>,
    W: Write,
{
    let mut copied = 0;
    for path in paths {
        let path = path.as_ref();
        let fp = match fs::File::open(path) {
            Ok(fp) => fp,
            Err(e) => {
                error!("failed to open file {}: {}", path.display(), e);
                continue;
            }
        };
        let n = forward(fp, &mut conn)?;
        trace!("sent {} bytes of {}", n, path.display());
        copied += 1;
    }
    Ok(copied)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::TcpListener;
    use std::thread;
    use tempdir::TempDir;

    #[test]
    fn connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let stream = connect(&addr, Duration::from_secs(1)).unwrap();
        assert_eq!(stream.peer_addr().unwrap(), listener.local_addr().unwrap());
    }

    #[test]
    fn connect_refused_is_an_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        assert!(connect(&addr, Duration::from_secs(1)).is_err());
        assert!(connect("not an address", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn files_are_sent_in_order_and_missing_ones_skipped() {
        let dir = TempDir::new("grafsy-client").unwrap();
        let a = dir.path().join("a.metrics");
        let b = dir.path().join("b.metrics");
        fs::write(&a, "a.x 1 1500000000\n").unwrap();
        fs::write(&b, "b.x 2 1500000000\nb.y 3 1500000000").unwrap();
        let missing = dir.path().join("missing.metrics");

        let mut out = Vec::new();
        let copied = forward_files(&[&a, &missing, &b], &mut out).unwrap();
        assert_eq!(copied, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "a.x 1 1500000000\nb.x 2 1500000000\nb.y 3 1500000000"
        );
    }

    #[test]
    fn forward_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let received = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = String::new();
            stream.read_to_string(&mut received).unwrap();
            received
        });

        let conn = connect(&addr, Duration::from_secs(1)).unwrap();
        let n = forward(&b"piped.m 1 1500000000\n"[..], conn).unwrap();
        assert_eq!(n, 21);
        assert_eq!(received.join().unwrap(), "piped.m 1 1500000000\n");
    }
}
