//! SMTP reply handling

/// Represents an SMTP reply that can be sent to a client
#[derive(Debug, Clone, PartialEq)]
pub struct SmtpResponse {
    /// The SMTP reply code (e.g., 250, 354, 500)
    pub code: u16,
    /// The human-readable message
    pub message: String,
    /// Extra lines for multiline replies (EHLO capabilities)
    pub multiline: Option<Vec<String>>,
}

impl SmtpResponse {
    /// Create a new SMTP reply
    pub fn new(code: u16, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            multiline: None,
        }
    }

    /// Create a new multiline SMTP reply
    pub fn new_multiline(code: u16, message: &str, lines: Vec<String>) -> Self {
        Self {
            code,
            message: message.to_owned(),
            multiline: Some(lines),
        }
    }

    /// 250 OK
    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    /// 220 greeting carrying the server identity
    pub fn greeting(hostname: &str, appname: &str) -> Self {
        Self::new(220, &format!("{hostname} {appname} ESMTP Service ready"))
    }

    /// 250 reply to HELO
    pub fn helo(hostname: &str, client_domain: &str) -> Self {
        Self::new(250, &format!("{hostname} greets {client_domain}"))
    }

    /// 250 reply to EHLO listing the advertised extensions
    pub fn ehlo(hostname: &str, client_domain: &str, capabilities: Vec<String>) -> Self {
        Self::new_multiline(250, &format!("{hostname} greets {client_domain}"), capabilities)
    }

    /// 354 DATA intermediate reply
    pub fn data_start() -> Self {
        Self::new(354, "Start mail input; end with <CR><LF>.<CR><LF>")
    }

    /// 220 reply to STARTTLS, sent in clear before the handshake
    pub fn starttls_ready() -> Self {
        Self::new(220, "Ready to start TLS")
    }

    /// 252 reply to VRFY; the sink never verifies addresses
    pub fn cannot_verify() -> Self {
        Self::new(252, "Cannot VRFY user, but will accept message")
    }

    /// 221 reply to QUIT
    pub fn quit() -> Self {
        Self::new(221, "Bye")
    }

    /// 421 reply sent when the server refuses work because it is closing
    pub fn unavailable(hostname: &str) -> Self {
        Self::new(
            421,
            &format!("{hostname} Service not available, closing transmission channel"),
        )
    }

    /// Create an error reply
    pub fn error(code: u16, message: &str) -> Self {
        Self::new(code, message)
    }

    /// Format the reply for sending over the wire
    pub fn format(&self) -> String {
        match self.multiline {
            Some(ref lines) if !lines.is_empty() => {
                let mut result = format!("{}-{}\r\n", self.code, self.message);
                for (i, line) in lines.iter().enumerate() {
                    let sep = if i == lines.len() - 1 { ' ' } else { '-' };
                    result.push_str(&format!("{}{}{}\r\n", self.code, sep, line));
                }
                result
            }
            _ => format!("{} {}\r\n", self.code, self.message),
        }
    }

    /// Check if this is a success reply (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Check if this is an error reply (4xx or 5xx)
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }
}
