//! SMTP engine: accepts connections, speaks the protocol, and hands each
//! completed transaction to a [`MailHandler`]

pub mod commands;
pub mod error;
pub mod listener;
pub mod response;
pub mod server;
pub mod session;
pub mod tls;
pub mod tracker;
pub mod transaction;

pub use error::{HandlerError, SmtpError, SmtpLimits};
pub use listener::ListenerHandle;
pub use response::SmtpResponse;
pub use server::{ServerConfig, SmtpServer};
pub use session::{SmtpSession, SmtpState};
pub use tls::load_tls_config;
pub use transaction::{MailHandler, Transaction};
