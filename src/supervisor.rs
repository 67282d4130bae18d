//! Process supervisor integration.
//!
//! Each dispatcher reports liveness to the supervisor once per send cycle.
//! Which supervisor grafsy runs under is decided once, from configuration.

use libc;
use std::env;
use std::io;
use std::mem;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixDatagram;
use std::ptr;
use std::str::FromStr;

/// The supervisor managing the grafsy process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Supervisor {
    /// Not supervised, or supervised by something that does not need a
    /// heartbeat.
    None,
    /// systemd with `WatchdogSec` set.
    Systemd,
}

impl Default for Supervisor {
    fn default() -> Supervisor {
        Supervisor::None
    }
}

impl FromStr for Supervisor {
    type Err = String;

    fn from_str(s: &str) -> Result<Supervisor, String> {
        match s {
            "" | "none" => Ok(Supervisor::None),
            "systemd" => Ok(Supervisor::Systemd),
            other => Err(format!("unknown supervisor {:?}", other)),
        }
    }
}

impl Supervisor {
    /// Send a liveness heartbeat. Failures are logged and otherwise ignored.
    pub fn notify(&self) {
        match *self {
            Supervisor::None => {}
            Supervisor::Systemd => notify_systemd(),
        }
    }
}

fn notify_systemd() {
    let socket = match env::var("NOTIFY_SOCKET") {
        Ok(ref s) if !s.is_empty() => s.clone(),
        _ => return,
    };
    let res = UnixDatagram::unbound().and_then(|sock| {
        if socket.starts_with('@') {
            send_to_abstract(&sock, b"WATCHDOG=1", &socket[1..])
        } else {
            sock.send_to(b"WATCHDOG=1", &socket).map(|_| ())
        }
    });
    if let Err(e) = res {
        debug!("unable to notify systemd on {}: {}", socket, e);
    }
}

/// The address of `name` in the Linux abstract socket namespace: a
/// `sun_path` starting with a NUL byte, sized by the name rather than
/// terminated.
fn abstract_addr(name: &str) -> io::Result<(libc::sockaddr_un, libc::socklen_t)> {
    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    if name.len() >= addr.sun_path.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "abstract socket name too long",
        ));
    }
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    unsafe {
        ptr::copy_nonoverlapping(
            name.as_ptr(),
            addr.sun_path.as_mut_ptr().offset(1) as *mut u8,
            name.len(),
        );
    }
    let len = mem::size_of::<libc::sa_family_t>() + 1 + name.len();
    Ok((addr, len as libc::socklen_t))
}

// UnixDatagram::send_to only takes filesystem paths
fn send_to_abstract(sock: &UnixDatagram, buf: &[u8], name: &str) -> io::Result<()> {
    let (addr, len) = abstract_addr(name)?;
    let res = unsafe {
        libc::sendto(
            sock.as_raw_fd(),
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
            0,
            &addr as *const libc::sockaddr_un as *const libc::sockaddr,
            len,
        )
    };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::process;
    use std::sync::Mutex;
    use tempdir::TempDir;

    lazy_static! {
        // NOTIFY_SOCKET is process wide
        static ref ENV: Mutex<()> = Mutex::new(());
    }

    #[test]
    fn from_str() {
        assert_eq!("systemd".parse(), Ok(Supervisor::Systemd));
        assert_eq!("none".parse(), Ok(Supervisor::None));
        assert_eq!("".parse(), Ok(Supervisor::None));
        assert!("upstart".parse::<Supervisor>().is_err());
    }

    #[test]
    fn none_is_a_no_op() {
        Supervisor::None.notify();
    }

    #[test]
    fn systemd_sends_watchdog() {
        let dir = TempDir::new("grafsy-supervisor").unwrap();
        let path = dir.path().join("notify");
        let sock = UnixDatagram::bind(&path).unwrap();

        let _guard = ENV.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("NOTIFY_SOCKET", &path);
        Supervisor::Systemd.notify();
        env::remove_var("NOTIFY_SOCKET");

        let mut buf = [0; 32];
        let n = sock.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"WATCHDOG=1");
    }

    #[cfg(target_os = "linux")]
    fn bind_abstract(name: &str) -> UnixDatagram {
        let sock = UnixDatagram::unbound().unwrap();
        let (addr, len) = abstract_addr(name).unwrap();
        let res = unsafe {
            libc::bind(
                sock.as_raw_fd(),
                &addr as *const libc::sockaddr_un as *const libc::sockaddr,
                len,
            )
        };
        assert_eq!(res, 0, "{}", io::Error::last_os_error());
        sock
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn systemd_sends_watchdog_to_abstract_socket() {
        let name = format!("grafsy-notify-{}", process::id());
        let sock = bind_abstract(&name);

        let _guard = ENV.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("NOTIFY_SOCKET", format!("@{}", name));
        Supervisor::Systemd.notify();
        env::remove_var("NOTIFY_SOCKET");

        let mut buf = [0; 32];
        let n = sock.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"WATCHDOG=1");
    }

    #[test]
    fn abstract_socket_without_listener_is_ignored() {
        let _guard = ENV.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var(
            "NOTIFY_SOCKET",
            format!("@grafsy-nobody-{}", process::id()),
        );
        Supervisor::Systemd.notify();
        env::set_var("NOTIFY_SOCKET", format!("@{}", "x".repeat(200)));
        Supervisor::Systemd.notify();
        env::remove_var("NOTIFY_SOCKET");
    }
}
