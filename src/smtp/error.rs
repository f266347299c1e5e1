//! Error types for the SMTP engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid command")]
    InvalidCommand,

    #[error("Invalid state for command")]
    InvalidState(String),

    #[error("Invalid syntax")]
    InvalidSyntax(String),

    #[error("Line too long (max {max} characters)")]
    LineTooLong { max: usize },

    #[error("Path too long (max {max} characters)")]
    PathTooLong { max: usize },

    #[error("Too many recipients (max {max})")]
    TooManyRecipients { max: usize },

    #[error("Too much mail data (max {max} bytes)")]
    TooMuchData { max: usize },

    #[error("Must issue a STARTTLS command first")]
    TlsRequired,

    #[error("TLS not available")]
    TlsUnavailable,

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Server closed")]
    ServerClosed,

    #[error("Shutdown deadline exceeded with {remaining} connection(s) still open")]
    ShutdownTimeout { remaining: usize },

    #[error("Transaction rejected: {0}")]
    Rejected(String),
}

/// Failure reported by a [`MailHandler`](crate::smtp::MailHandler).
///
/// The message is relayed to the client in a `554` reply.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct HandlerError(pub String);

/// SMTP size limits
pub struct SmtpLimits;

impl SmtpLimits {
    /// Maximum length of a path (reverse-path or forward-path)
    pub const PATH_MAX_LENGTH: usize = 256;

    /// Maximum length of a command line including CRLF
    pub const COMMAND_LINE_MAX_LENGTH: usize = 512;

    /// Maximum length of a reply line including CRLF
    pub const REPLY_LINE_MAX_LENGTH: usize = 512;

    /// Maximum number of recipients per message
    pub const MAX_RECIPIENTS: usize = 100;
}

/// Maps SMTP errors to appropriate response codes
impl SmtpError {
    pub fn to_response_code(&self) -> u16 {
        match self {
            SmtpError::Io(_) => 421,
            SmtpError::InvalidCommand => 500,
            SmtpError::InvalidState(_) => 503,
            SmtpError::InvalidSyntax(_) => 501,
            SmtpError::LineTooLong { .. } => 500,
            SmtpError::PathTooLong { .. } => 501,
            SmtpError::TooManyRecipients { .. } => 452,
            SmtpError::TooMuchData { .. } => 552,
            SmtpError::TlsRequired => 530,
            SmtpError::TlsUnavailable => 454,
            SmtpError::TlsConfig(_) => 454,
            SmtpError::ServerClosed => 421,
            SmtpError::ShutdownTimeout { .. } => 421,
            SmtpError::Rejected(_) => 554,
        }
    }

    pub fn to_response_message(&self) -> String {
        match self {
            SmtpError::Io(_) => "Service not available".to_string(),
            SmtpError::InvalidCommand => "Syntax error, command unrecognized".to_string(),
            SmtpError::InvalidState(msg) => format!("Bad sequence of commands: {msg}"),
            SmtpError::InvalidSyntax(msg) => format!("Syntax error: {msg}"),
            SmtpError::LineTooLong { max } => format!("Line too long (max {max} characters)"),
            SmtpError::PathTooLong { max } => format!("Path too long (max {max} characters)"),
            SmtpError::TooManyRecipients { max } => format!("Too many recipients (max {max})"),
            SmtpError::TooMuchData { .. } => {
                "Requested mail action aborted: exceeded storage allocation".to_string()
            }
            SmtpError::TlsRequired => "5.7.0 Must issue a STARTTLS command first".to_string(),
            SmtpError::TlsUnavailable | SmtpError::TlsConfig(_) => {
                "TLS not available due to temporary reason".to_string()
            }
            SmtpError::ServerClosed | SmtpError::ShutdownTimeout { .. } => {
                "Service not available, closing transmission channel".to_string()
            }
            SmtpError::Rejected(msg) => format!("Transaction failed: {msg}"),
        }
    }

    /// Whether the session must end after replying with this error
    pub fn closes_session(&self) -> bool {
        matches!(
            self,
            SmtpError::Io(_) | SmtpError::ServerClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_error_maps_to_552() {
        let err = SmtpError::TooMuchData { max: 10 };
        assert_eq!(err.to_response_code(), 552);
        assert!(err.to_response_message().contains("exceeded storage allocation"));
    }

    #[test]
    fn test_tls_required_maps_to_530() {
        let err = SmtpError::TlsRequired;
        assert_eq!(err.to_response_code(), 530);
        assert_eq!(
            err.to_response_message(),
            "5.7.0 Must issue a STARTTLS command first"
        );
    }

    #[test]
    fn test_closed_server_ends_session() {
        assert!(SmtpError::ServerClosed.closes_session());
        assert!(!SmtpError::InvalidCommand.closes_session());
    }

    #[test]
    fn test_handler_error_is_relayed() {
        let err = SmtpError::Rejected(HandlerError("disk full".into()).to_string());
        assert_eq!(err.to_response_code(), 554);
        assert_eq!(err.to_response_message(), "Transaction failed: disk full");
    }
}
