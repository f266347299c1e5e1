//! Operator-initiated shutdown.
//!
//! An interrupt moves the process through
//! `Serving → ShutdownRequested → Closed → Terminated`. The signal side
//! closes the engine and the listener; the serving side, once the accept
//! loop returns, drains the remaining connections.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::smtp::{ListenerHandle, SmtpError, SmtpServer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownState {
    Serving = 0,
    ShutdownRequested = 1,
    Closed = 2,
    Terminated = 3,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ShutdownState::Serving,
            1 => ShutdownState::ShutdownRequested,
            2 => ShutdownState::Closed,
            _ => ShutdownState::Terminated,
        }
    }
}

/// Shared between the signal watcher and the thread running the accept loop
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: AtomicU8,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Serving as u8),
        }
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True once an interrupt has been handled
    pub fn shutdown_requested(&self) -> bool {
        self.state() != ShutdownState::Serving
    }

    /// Close the engine and the listener. Only the first call does anything;
    /// it returns `true`.
    pub fn request_shutdown(&self, server: &SmtpServer, listener: &ListenerHandle) -> bool {
        if self
            .state
            .compare_exchange(
                ShutdownState::Serving as u8,
                ShutdownState::ShutdownRequested as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        info!("Signal received: shutting down.");
        server.close();
        if let Err(e) = listener.close() {
            warn!(error = %e, "failed to close listener");
        }
        self.state
            .store(ShutdownState::Closed as u8, Ordering::Release);
        info!("server closed.");
        true
    }

    /// Settle the result of the accept loop.
    ///
    /// After a requested shutdown, waits up to `deadline` for open connections
    /// and returns `Ok`. Otherwise the accept loop stopped on its own and its
    /// error is returned.
    pub fn finish(
        &self,
        serve_result: Result<(), SmtpError>,
        server: &SmtpServer,
        deadline: Duration,
    ) -> Result<(), SmtpError> {
        if !self.shutdown_requested() {
            return match serve_result {
                Ok(()) => Err(SmtpError::ServerClosed),
                Err(e) => Err(e),
            };
        }

        if let Err(e) = server.shutdown(Some(deadline)) {
            warn!(error = %e, "graceful shutdown incomplete");
        }
        self.state
            .store(ShutdownState::Terminated as u8, Ordering::Release);
        info!("server shut down.");
        Ok(())
    }
}

/// Block the calling thread until SIGINT / Ctrl-C arrives.
pub fn wait_for_interrupt() -> io::Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(tokio::signal::ctrl_c())
}

/// Run the interrupt flow on a dedicated thread.
pub fn spawn_signal_watcher(
    coordinator: Arc<ShutdownCoordinator>,
    server: SmtpServer,
    listener: Arc<ListenerHandle>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("signal-watcher".into())
        .spawn(move || match wait_for_interrupt() {
            Ok(()) => {
                coordinator.request_shutdown(&server, &listener);
            }
            Err(e) => warn!(error = %e, "cannot listen for interrupts"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp::{HandlerError, ServerConfig, Transaction};
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;

    fn accept_all(_: &Transaction<'_>) -> Result<(), HandlerError> {
        Ok(())
    }

    fn start() -> (SmtpServer, Arc<ListenerHandle>, thread::JoinHandle<Result<(), SmtpError>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let handle = Arc::new(ListenerHandle::new(&listener).unwrap());
        let server = SmtpServer::new(ServerConfig::default(), Arc::new(accept_all));

        let serving = server.clone();
        let serve_handle = Arc::clone(&handle);
        let join = thread::spawn(move || serving.serve(listener, &serve_handle));
        (server, handle, join)
    }

    fn read_reply(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        // A cut connection reads as empty or reset.
        let _ = reader.read_line(&mut line);
        line
    }

    #[test]
    fn test_request_then_finish() {
        let (server, handle, join) = start();
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.state(), ShutdownState::Serving);

        assert!(coordinator.request_shutdown(&server, &handle));
        assert_eq!(coordinator.state(), ShutdownState::Closed);
        assert!(!coordinator.request_shutdown(&server, &handle));

        let result = join.join().unwrap();
        assert!(matches!(result, Err(SmtpError::ServerClosed)));
        coordinator
            .finish(result, &server, Duration::from_secs(5))
            .unwrap();
        assert_eq!(coordinator.state(), ShutdownState::Terminated);
    }

    #[test]
    fn test_unrequested_stop_is_an_error() {
        let server = SmtpServer::new(ServerConfig::default(), Arc::new(accept_all));
        let coordinator = ShutdownCoordinator::new();

        let err = coordinator
            .finish(
                Err(SmtpError::Io(io::Error::other("accept failed"))),
                &server,
                Duration::from_secs(1),
            )
            .unwrap_err();
        assert!(matches!(err, SmtpError::Io(_)));
        assert_eq!(coordinator.state(), ShutdownState::Serving);
    }

    #[test]
    fn test_in_flight_transaction_completes() {
        let (server, handle, join) = start();
        let coordinator = Arc::new(ShutdownCoordinator::new());

        let mut stream = TcpStream::connect(handle.local_addr()).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        assert!(read_reply(&mut reader).starts_with("220"));
        for (command, code) in [
            ("HELO client", "250"),
            ("MAIL FROM:<a@example.com>", "250"),
            ("RCPT TO:<b@example.com>", "250"),
            ("DATA", "354"),
        ] {
            write!(stream, "{command}\r\n").unwrap();
            assert!(read_reply(&mut reader).starts_with(code), "{command}");
        }

        assert!(coordinator.request_shutdown(&server, &handle));
        let result = join.join().unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let finishing = server.clone();
        let finisher = Arc::clone(&coordinator);
        thread::spawn(move || {
            let _ = done_tx.send(finisher.finish(result, &finishing, Duration::from_secs(5)));
        });

        write!(stream, "Subject: late\r\n\r\nbody\r\n.\r\n").unwrap();
        assert!(read_reply(&mut reader).starts_with("250"));
        // The session is idle again: it either answers 421 or is cut by the drain.
        let _ = write!(stream, "MAIL FROM:<a@example.com>\r\n");
        let reply = read_reply(&mut reader);
        assert!(reply.is_empty() || reply.starts_with("421"), "{reply}");

        let finished = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(finished.is_ok());
        assert_eq!(coordinator.state(), ShutdownState::Terminated);
    }
}
