//! SMTP server implementation

use crate::smtp::commands::{Next, SmtpCommandHandler};
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::listener::ListenerHandle;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::{Envelope, SmtpSession};
use crate::smtp::tls::Connection;
use crate::smtp::tracker::ConnectionTracker;
use crate::smtp::transaction::{MailHandler, Transaction, received_header};

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

/// Engine settings, fixed for the lifetime of the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Service name shown in the greeting and trace header
    pub appname: String,
    /// Host name announced to clients
    pub hostname: String,
    /// Socket read/write timeout; zero disables it
    pub timeout: Duration,
    /// TLS material; enables STARTTLS and implicit TLS
    pub tls: Option<Arc<rustls::ServerConfig>>,
    /// Handshake TLS immediately on accept (SMTPS)
    pub tls_listener: bool,
    /// Refuse MAIL/RCPT/DATA until STARTTLS succeeded
    pub tls_required: bool,
    /// Largest accepted message in bytes; zero means unlimited
    pub max_size: usize,
    /// Log every protocol line
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            appname: "smtpd".to_string(),
            hostname: "localhost".to_string(),
            timeout: Duration::from_secs(300),
            tls: None,
            tls_listener: false,
            tls_required: false,
            max_size: 0,
            debug: false,
        }
    }
}

/// Removes a connection from the tracker when its thread ends
struct Registration<'a> {
    tracker: &'a ConnectionTracker,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.tracker.unregister(self.id);
    }
}

/// SMTP server that hands every completed transaction to a [`MailHandler`]
#[derive(Clone)]
pub struct SmtpServer {
    config: Arc<ServerConfig>,
    handler: Arc<dyn MailHandler>,
    tracker: Arc<ConnectionTracker>,
}

impl SmtpServer {
    /// Create a new SMTP server
    pub fn new(config: ServerConfig, handler: Arc<dyn MailHandler>) -> Self {
        Self {
            config: Arc::new(config),
            handler,
            tracker: Arc::new(ConnectionTracker::new()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of client connections currently open
    pub fn active_connections(&self) -> usize {
        self.tracker.active()
    }

    /// Accept connections until the server or the listener is closed.
    ///
    /// Each client is served on its own thread. Always returns an error;
    /// [`SmtpError::ServerClosed`] means an orderly close.
    pub fn serve(&self, listener: TcpListener, handle: &ListenerHandle) -> Result<(), SmtpError> {
        info!(
            addr = %listener.local_addr().map_err(SmtpError::Io)?,
            tls = self.config.tls_listener && self.config.tls.is_some(),
            "SMTP server listening"
        );

        let mut backoff = Duration::ZERO;
        for stream in listener.incoming() {
            if handle.is_closed() || self.tracker.is_closing() {
                return Err(SmtpError::ServerClosed);
            }

            match stream {
                Ok(stream) => {
                    backoff = Duration::ZERO;
                    let server = self.clone();
                    thread::spawn(move || {
                        if let Err(e) = server.handle_client(stream) {
                            debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    backoff = (backoff * 2).clamp(Duration::from_millis(5), Duration::from_secs(1));
                    warn!(error = %e, retry_in = ?backoff, "error accepting connection");
                    thread::sleep(backoff);
                }
            }
        }

        Err(SmtpError::ServerClosed)
    }

    /// Stop accepting transactions. Transactions in flight run to completion;
    /// sessions answer further commands with 421.
    pub fn close(&self) {
        self.tracker.close();
    }

    /// Close the server and wait for open connections to finish.
    ///
    /// Idle connections are cut right away. With a deadline, connections
    /// still open when it expires are cut and reported as an error.
    pub fn shutdown(&self, deadline: Option<Duration>) -> Result<(), SmtpError> {
        self.tracker
            .drain(deadline)
            .map_err(|remaining| SmtpError::ShutdownTimeout { remaining })
    }

    /// Handle a client connection
    fn handle_client(&self, stream: TcpStream) -> Result<(), SmtpError> {
        let remote = stream.peer_addr()?;
        if !self.config.timeout.is_zero() {
            stream.set_read_timeout(Some(self.config.timeout))?;
            stream.set_write_timeout(Some(self.config.timeout))?;
        }

        let registration = Registration {
            tracker: &self.tracker,
            id: self.tracker.register(stream.try_clone()?),
        };
        let id = registration.id;

        let mut conn = Connection::Plain(stream);
        if self.config.tls_listener {
            if let Some(tls) = &self.config.tls {
                conn = conn.upgrade(Arc::clone(tls))?;
            }
        }

        let mut reader = BufReader::new(conn);
        if self.tracker.is_closing() {
            return self.send_response(
                reader.get_mut(),
                remote,
                &SmtpResponse::unavailable(&self.config.hostname),
            );
        }

        let command_handler = SmtpCommandHandler::new(&self.config);
        let mut session = SmtpSession::new(reader.get_ref().is_secure());

        self.send_response(
            reader.get_mut(),
            remote,
            &SmtpResponse::greeting(&self.config.hostname, &self.config.appname),
        )?;

        let mut line_buffer = Vec::new();
        loop {
            line_buffer.clear();
            if reader.read_until(b'\n', &mut line_buffer)? == 0 {
                break;
            }

            let line = String::from_utf8_lossy(&line_buffer);
            let command = line.trim();
            if self.config.debug {
                debug!(%remote, "RECV {command}");
            }
            if command.is_empty() {
                continue;
            }

            if self.tracker.is_closing() && !session.in_transaction() {
                self.send_response(
                    reader.get_mut(),
                    remote,
                    &SmtpResponse::unavailable(&self.config.hostname),
                )?;
                break;
            }

            match command_handler.process_command(command, &mut session) {
                Ok((response, next)) => {
                    self.send_response(reader.get_mut(), remote, &response)?;
                    match next {
                        Next::Continue => {}
                        Next::Quit => break,
                        Next::ReadData(envelope) => {
                            self.tracker.set_busy(id, true);
                            self.receive_data(&mut reader, &mut session, envelope, remote)?;
                        }
                        Next::StartTls => {
                            let tls = self.config.tls.clone().ok_or(SmtpError::TlsUnavailable)?;
                            // Anything pipelined before the handshake is dropped.
                            let conn = reader.into_inner().upgrade(tls)?;
                            session.upgrade_to_tls();
                            reader = BufReader::new(conn);
                        }
                    }
                }
                Err(e) => {
                    let response =
                        SmtpResponse::error(e.to_response_code(), &e.to_response_message());
                    self.send_response(reader.get_mut(), remote, &response)?;
                    if e.closes_session() {
                        break;
                    }
                }
            }

            self.tracker.set_busy(id, session.in_transaction());
        }

        Ok(())
    }

    /// Read the message body, then hand the transaction to the handler
    fn receive_data(
        &self,
        reader: &mut BufReader<Connection>,
        session: &mut SmtpSession,
        envelope: Envelope,
        remote: SocketAddr,
    ) -> Result<(), SmtpError> {
        let max_size = self.config.max_size;
        let mut data = Vec::new();
        let mut oversized = false;
        let mut line = Vec::new();

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                session.finish_data();
                return Err(SmtpError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed during DATA",
                )));
            }
            if line == b".\r\n" || line == b".\n" {
                break;
            }

            let content = line.strip_prefix(b".").unwrap_or(&line[..]);
            if max_size > 0 && data.len() + content.len() > max_size {
                // Keep reading to the terminating dot so the session stays in sync.
                oversized = true;
                continue;
            }
            data.extend_from_slice(content);
        }
        session.finish_data();

        if oversized {
            let err = SmtpError::TooMuchData { max: max_size };
            let response = SmtpResponse::error(err.to_response_code(), &err.to_response_message());
            return self.send_response(reader.get_mut(), remote, &response);
        }

        let first_recipient = envelope.to.first().map(String::as_str).unwrap_or_default();
        let mut message = received_header(
            &envelope.client_domain,
            remote,
            &self.config.hostname,
            &self.config.appname,
            first_recipient,
            chrono::Local::now(),
        );
        message.extend_from_slice(&data);

        let transaction = Transaction {
            remote,
            from: &envelope.from,
            to: &envelope.to,
            data: &message,
        };

        let response = match self.handler.handle(&transaction) {
            Ok(()) => SmtpResponse::new(250, "2.0.0 Ok: queued"),
            Err(e) => {
                let err = SmtpError::Rejected(e.to_string());
                SmtpResponse::error(err.to_response_code(), &err.to_response_message())
            }
        };
        self.send_response(reader.get_mut(), remote, &response)
    }

    /// Send a reply to the client
    fn send_response(
        &self,
        stream: &mut Connection,
        remote: SocketAddr,
        response: &SmtpResponse,
    ) -> Result<(), SmtpError> {
        let mut formatted = response.format();
        if response.multiline.is_none() && formatted.len() > SmtpLimits::REPLY_LINE_MAX_LENGTH {
            formatted = SmtpResponse::new(response.code, "Response too long (truncated)").format();
        }
        if self.config.debug {
            debug!(%remote, "SENT {}", formatted.trim_end());
        }
        stream.write_all(formatted.as_bytes())?;
        stream.flush()?;
        Ok(())
    }
}
