//! # mailsink
//!
//! mailsink is an SMTP sink for development and testing. It accepts every
//! message, optionally writes it to a file named from a template, and logs a
//! one-line summary per transaction.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::TcpListener;
//! use std::sync::Arc;
//!
//! use mailsink::config::{SinkConfig, Verbosity};
//! use mailsink::sink::MailSink;
//! use mailsink::smtp::{ListenerHandle, ServerConfig, SmtpServer};
//!
//! let sink = MailSink::new(SinkConfig::new("/tmp/mail-%s-%h.eml", Verbosity::default()));
//! let server = SmtpServer::new(ServerConfig::default(), Arc::new(sink));
//!
//! let listener = TcpListener::bind("127.0.0.1:2525").unwrap();
//! let handle = ListenerHandle::new(&listener).unwrap();
//! let _ = server.serve(listener, &handle);
//! ```
//!
//! ## Filename template
//!
//! | token | value                                              |
//! |-------|----------------------------------------------------|
//! | `%h`  | SHA-256 of the message after the `Received:` header |
//! | `%H`  | SHA-256 of the whole message                       |
//! | `%s`  | seconds since the Unix epoch                       |
//! | `%N`  | nanoseconds of the reception time, 9 digits        |
//! | `%%`  | a literal `%`                                      |
//!
//! An empty template disables persistence.
//!
//! ## Supported SMTP commands
//!
//! `HELO`, `EHLO`, `MAIL FROM`, `RCPT TO`, `DATA`, `RSET`, `NOOP`, `VRFY`,
//! `STARTTLS`, `QUIT`.
//!
//! ## Notes
//!
//! - SMTP authentication is not supported.
//! - Mail relay is not supported; every message is accepted locally.
//! - The `%h` digest assumes the three-line `Received:` header the server
//!   prepends to every message.

pub mod config;
pub mod error;
pub mod shutdown;
pub mod sink;
pub mod smtp;

pub use config::{SinkConfig, Verbosity};
pub use error::SinkError;
pub use shutdown::{ShutdownCoordinator, ShutdownState};
pub use sink::{MailSink, Outcome, Template};
pub use smtp::{
    HandlerError, ListenerHandle, MailHandler, ServerConfig, SmtpError, SmtpServer, Transaction,
};
