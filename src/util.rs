//! Utility module, a grab-bag of functionality

use libc;
use std::ffi::CStr;
use std::io;

/// Make a backend address safe to use as a file name and as a single
/// component of a dotted metric path.
///
/// Every character outside `[A-Za-z0-9_-]` becomes `_`, so `10.0.0.1:2003`
/// turns into `10_0_0_1_2003`.
pub fn sanitize(addr: &str) -> String {
    addr.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The system hostname as reported by `gethostname(2)`.
pub fn system_hostname() -> io::Result<String> {
    let mut buf: [libc::c_char; 256] = [0; 256];
    let res = unsafe { libc::gethostname(buf.as_mut_ptr(), buf.len()) };
    if res != 0 {
        return Err(io::Error::last_os_error());
    }
    // gethostname does not promise NUL termination on truncation
    let last = buf.len() - 1;
    buf[last] = 0;
    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Ok(name.to_string_lossy().into_owned())
}

/// Strip a trailing `\n` and every `\r` from a raw line read off the wire.
pub fn trim_line_ending(raw: &[u8]) -> String {
    let line = String::from_utf8_lossy(raw);
    line.trim_end_matches('\n').replace('\r', "")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sanitize_addresses() {
        assert_eq!(sanitize("localhost:2003"), "localhost_2003");
        assert_eq!(sanitize("10.0.0.1:2003"), "10_0_0_1_2003");
        assert_eq!(sanitize("[::1]:2003"), "___1__2003");
        assert_eq!(sanitize("carbon-a_1"), "carbon-a_1");
    }

    #[test]
    fn trim_crlf() {
        assert_eq!(trim_line_ending(b"a.b 1 1500000000\r\n"), "a.b 1 1500000000");
        assert_eq!(trim_line_ending(b"a.b 1 1500000000"), "a.b 1 1500000000");
        assert_eq!(trim_line_ending(b"\n"), "");
    }

    #[test]
    fn hostname_is_not_empty() {
        let name = system_hostname().unwrap();
        assert!(!name.is_empty());
    }
}
