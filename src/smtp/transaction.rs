//! Completed mail transactions and the callback that consumes them

use std::net::SocketAddr;

use chrono::{DateTime, Local};

use crate::smtp::error::HandlerError;

/// One completed mail exchange, borrowed for the duration of the callback.
///
/// `data` starts with the three-line `Received:` trace header written by the
/// server, followed by the message exactly as the client sent it
/// (dot-unstuffed, line endings preserved).
#[derive(Debug, Clone, Copy)]
pub struct Transaction<'a> {
    /// Remote endpoint of the client
    pub remote: SocketAddr,
    /// Reverse-path; empty for the null sender `<>`
    pub from: &'a str,
    /// Forward-paths in the order they were given
    pub to: &'a [String],
    /// Raw message data including the trace header
    pub data: &'a [u8],
}

/// Callback invoked once per completed transaction.
///
/// Implementations are shared between connection threads and must not keep
/// per-call mutable state.
pub trait MailHandler: Send + Sync {
    /// Consume a transaction. `Err` is reported to the client as `554`.
    fn handle(&self, transaction: &Transaction<'_>) -> Result<(), HandlerError>;
}

impl<F> MailHandler for F
where
    F: Fn(&Transaction<'_>) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, transaction: &Transaction<'_>) -> Result<(), HandlerError> {
        self(transaction)
    }
}

/// Build the three-line trace header prepended to every message.
pub fn received_header(
    client_domain: &str,
    remote: SocketAddr,
    hostname: &str,
    appname: &str,
    first_recipient: &str,
    at: DateTime<Local>,
) -> Vec<u8> {
    format!(
        "Received: from {client_domain} ({ip})\r\n        by {hostname} ({appname}) with SMTP\r\n        for <{first_recipient}>; {date}\r\n",
        ip = remote.ip(),
        date = at.format("%a, %e %b %Y %H:%M:%S %z"),
    )
    .into_bytes()
}
