//! Bookkeeping of open connections for close/shutdown

use std::collections::HashMap;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::warn;

struct Entry {
    socket: TcpStream,
    busy: bool,
}

/// Tracks live connections and whether the server has been closed.
///
/// A connection is *busy* while a mail transaction is open on it; idle
/// connections may be cut by [`ConnectionTracker::drain`].
#[derive(Default)]
pub struct ConnectionTracker {
    closing: AtomicBool,
    next_id: Mutex<u64>,
    open: Mutex<HashMap<u64, Entry>>,
    changed: Condvar,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop admitting work. Idempotent.
    pub fn close(&self) {
        self.closing.store(true, Ordering::Release);
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        self.open.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a connection; `socket` is a clone used only to cut it.
    pub fn register(&self, socket: TcpStream) -> u64 {
        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(|p| p.into_inner());
            *next += 1;
            *next
        };
        self.lock().insert(id, Entry { socket, busy: false });
        id
    }

    pub fn set_busy(&self, id: u64, busy: bool) {
        if let Some(entry) = self.lock().get_mut(&id) {
            entry.busy = busy;
        }
        self.changed.notify_all();
    }

    pub fn unregister(&self, id: u64) {
        self.lock().remove(&id);
        self.changed.notify_all();
    }

    pub fn active(&self) -> usize {
        self.lock().len()
    }

    /// Close the server, cut idle connections, and wait for busy ones to
    /// finish. With a deadline, connections still open when it passes are cut
    /// and their count is returned as `Err`.
    pub fn drain(&self, deadline: Option<Duration>) -> Result<(), usize> {
        self.close();
        let until = deadline.map(|d| Instant::now() + d);
        let mut open = self.lock();

        loop {
            for entry in open.values().filter(|e| !e.busy) {
                // Unblocks the session's read; it ends on its own.
                let _ = entry.socket.shutdown(Shutdown::Read);
            }
            if open.is_empty() {
                return Ok(());
            }

            match until {
                None => {
                    open = self
                        .changed
                        .wait(open)
                        .unwrap_or_else(|p| p.into_inner());
                }
                Some(until) => {
                    let now = Instant::now();
                    if now >= until {
                        let remaining = open.len();
                        for entry in open.values() {
                            if let Err(e) = entry.socket.shutdown(Shutdown::Both) {
                                warn!(error = %e, "failed to cut connection");
                            }
                        }
                        return Err(remaining);
                    }
                    open = self
                        .changed
                        .wait_timeout(open, until - now)
                        .unwrap_or_else(|p| p.into_inner())
                        .0;
                }
            }
        }
    }
}
