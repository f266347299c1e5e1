//! Shareable handle used to close a blocking listener from another thread

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Handle to the listening socket the accept loop blocks on.
///
/// `std` offers no way to interrupt `accept`, so [`close`](Self::close)
/// marks the handle closed and then connects to the listener once; the
/// accept loop sees the flag and returns.
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    closed: AtomicBool,
}

impl ListenerHandle {
    pub fn new(listener: &TcpListener) -> io::Result<Self> {
        Ok(Self {
            local_addr: listener.local_addr()?,
            closed: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the listener and wake the accept loop. Idempotent.
    pub fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut target = self.local_addr;
        if target.ip().is_unspecified() {
            target.set_ip(match target.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            });
        }
        TcpStream::connect_timeout(&target, Duration::from_secs(1)).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_wakes_accept() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let handle = ListenerHandle::new(&listener).unwrap();
        assert!(!handle.is_closed());

        handle.close().unwrap();
        assert!(handle.is_closed());
        assert!(listener.accept().is_ok());

        // second close does not connect again
        handle.close().unwrap();
    }

    #[test]
    fn test_unspecified_address_is_reachable() {
        let listener = TcpListener::bind("0.0.0.0:0").unwrap();
        let handle = ListenerHandle::new(&listener).unwrap();
        handle.close().unwrap();
        assert!(listener.accept().is_ok());
    }
}
