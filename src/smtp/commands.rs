//! Implementation of SMTP commands

use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::response::SmtpResponse;
use crate::smtp::server::ServerConfig;
use crate::smtp::session::{Envelope, SmtpSession, SmtpState};

/// What the connection loop has to do after sending the reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Read the next command
    Continue,
    /// Read the message body for this envelope
    ReadData(Envelope),
    /// Perform the TLS handshake, then start over
    StartTls,
    /// Close the connection
    Quit,
}

/// Handles SMTP commands and returns appropriate replies
#[derive(Debug)]
pub struct SmtpCommandHandler<'a> {
    config: &'a ServerConfig,
}

impl<'a> SmtpCommandHandler<'a> {
    /// Create a new command handler
    pub fn new(config: &'a ServerConfig) -> Self {
        Self { config }
    }

    /// Process a command line and return a reply plus the follow-up action
    pub fn process_command(
        &self,
        command_line: &str,
        session: &mut SmtpSession,
    ) -> Result<(SmtpResponse, Next), SmtpError> {
        if command_line.len() > SmtpLimits::COMMAND_LINE_MAX_LENGTH {
            return Err(SmtpError::LineTooLong {
                max: SmtpLimits::COMMAND_LINE_MAX_LENGTH,
            });
        }

        let (verb, args) = match command_line.split_once(' ') {
            Some((verb, args)) => (verb, args.trim()),
            None => (command_line, ""),
        };

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => self.handle_helo(args, session),
            "EHLO" => self.handle_ehlo(args, session),
            "MAIL" => self.handle_mail(args, session),
            "RCPT" => self.handle_rcpt(args, session),
            "DATA" => self.handle_data(args, session),
            "RSET" => {
                session.reset();
                Ok((SmtpResponse::ok(), Next::Continue))
            }
            "NOOP" => Ok((SmtpResponse::ok(), Next::Continue)),
            "VRFY" => Ok((SmtpResponse::cannot_verify(), Next::Continue)),
            "STARTTLS" => self.handle_starttls(args, session),
            "QUIT" => Ok((SmtpResponse::quit(), Next::Quit)),
            _ => Err(SmtpError::InvalidCommand),
        }
    }

    fn handle_helo(
        &self,
        args: &str,
        session: &mut SmtpSession,
    ) -> Result<(SmtpResponse, Next), SmtpError> {
        let domain = greeting_domain("HELO", args)?;
        session.set_client_domain(domain.clone());
        Ok((
            SmtpResponse::helo(&self.config.hostname, &domain),
            Next::Continue,
        ))
    }

    fn handle_ehlo(
        &self,
        args: &str,
        session: &mut SmtpSession,
    ) -> Result<(SmtpResponse, Next), SmtpError> {
        let domain = greeting_domain("EHLO", args)?;
        session.set_client_domain(domain.clone());
        Ok((
            SmtpResponse::ehlo(&self.config.hostname, &domain, self.capabilities(session)),
            Next::Continue,
        ))
    }

    /// ESMTP extensions advertised in the EHLO reply
    fn capabilities(&self, session: &SmtpSession) -> Vec<String> {
        let mut capabilities = vec!["8BITMIME".to_owned(), "PIPELINING".to_owned()];
        if self.config.max_size > 0 {
            capabilities.push(format!("SIZE {}", self.config.max_size));
        } else {
            capabilities.push("SIZE".to_owned());
        }
        if self.config.tls.is_some() && !session.secure {
            capabilities.push("STARTTLS".to_owned());
        }
        capabilities
    }

    fn handle_mail(
        &self,
        args: &str,
        session: &mut SmtpSession,
    ) -> Result<(SmtpResponse, Next), SmtpError> {
        self.require_tls(session)?;
        if session.state != SmtpState::GreetingReceived {
            return Err(SmtpError::InvalidState(
                "MAIL command requires HELO first and no open transaction".to_string(),
            ));
        }

        let (addr, params) = parse_path(args, "FROM:")?;

        let mut declared_size = None;
        for param in params.split_whitespace() {
            if let Some(value) = strip_prefix_ignore_case(param, "SIZE=") {
                let size: usize = value.parse().map_err(|_| {
                    SmtpError::InvalidSyntax("SIZE parameter must be a number".to_string())
                })?;
                if self.config.max_size > 0 && size > self.config.max_size {
                    return Err(SmtpError::TooMuchData {
                        max: self.config.max_size,
                    });
                }
                declared_size = Some(size);
            }
        }

        session.set_sender(addr, declared_size)?;
        Ok((SmtpResponse::ok(), Next::Continue))
    }

    fn handle_rcpt(
        &self,
        args: &str,
        session: &mut SmtpSession,
    ) -> Result<(SmtpResponse, Next), SmtpError> {
        self.require_tls(session)?;
        if !matches!(
            session.state,
            SmtpState::MailReceived | SmtpState::RecipientsReceived
        ) {
            return Err(SmtpError::InvalidState(
                "RCPT command requires MAIL first".to_string(),
            ));
        }

        let (addr, _params) = parse_path(args, "TO:")?;
        if addr.is_empty() {
            return Err(SmtpError::InvalidSyntax(
                "TO address cannot be empty".to_string(),
            ));
        }

        session.add_recipient(addr)?;
        Ok((SmtpResponse::ok(), Next::Continue))
    }

    fn handle_data(
        &self,
        args: &str,
        session: &mut SmtpSession,
    ) -> Result<(SmtpResponse, Next), SmtpError> {
        self.require_tls(session)?;
        if !args.is_empty() {
            return Err(SmtpError::InvalidSyntax(
                "DATA command takes no arguments".to_string(),
            ));
        }

        let envelope = session.start_data_mode()?;
        Ok((SmtpResponse::data_start(), Next::ReadData(envelope)))
    }

    fn handle_starttls(
        &self,
        args: &str,
        session: &mut SmtpSession,
    ) -> Result<(SmtpResponse, Next), SmtpError> {
        if !args.is_empty() {
            return Err(SmtpError::InvalidSyntax(
                "STARTTLS command takes no arguments".to_string(),
            ));
        }
        if session.secure {
            return Err(SmtpError::InvalidState(
                "Already running in TLS".to_string(),
            ));
        }
        if self.config.tls.is_none() {
            return Err(SmtpError::TlsUnavailable);
        }
        Ok((SmtpResponse::starttls_ready(), Next::StartTls))
    }

    fn require_tls(&self, session: &SmtpSession) -> Result<(), SmtpError> {
        if self.config.tls_required && !session.secure {
            return Err(SmtpError::TlsRequired);
        }
        Ok(())
    }
}

fn greeting_domain(verb: &str, args: &str) -> Result<String, SmtpError> {
    match args.split_whitespace().next() {
        Some(domain) => Ok(domain.to_string()),
        None => Err(SmtpError::InvalidSyntax(format!(
            "{verb} requires domain argument"
        ))),
    }
}

fn strip_prefix_ignore_case<'s>(s: &'s str, prefix: &str) -> Option<&'s str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Split `FROM:<path> PARAMS` / `TO:<path> PARAMS` into the bare address and
/// the parameter string.
fn parse_path<'s>(args: &'s str, keyword: &str) -> Result<(String, &'s str), SmtpError> {
    let rest = strip_prefix_ignore_case(args, keyword).ok_or_else(|| {
        SmtpError::InvalidSyntax(format!("expected '{keyword}<address>'"))
    })?;
    let rest = rest.trim_start();

    if !rest.starts_with('<') {
        return Err(SmtpError::InvalidSyntax(
            "address must be enclosed in angle brackets".to_string(),
        ));
    }
    let close = rest.find('>').ok_or_else(|| {
        SmtpError::InvalidSyntax("address must be enclosed in angle brackets".to_string())
    })?;

    let addr = rest[1..close].trim().to_string();
    if addr.len() > SmtpLimits::PATH_MAX_LENGTH {
        return Err(SmtpError::PathTooLong {
            max: SmtpLimits::PATH_MAX_LENGTH,
        });
    }
    Ok((addr, rest[close + 1..].trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig {
            hostname: "test.local".to_string(),
            ..ServerConfig::default()
        }
    }

    fn greeted(handler: &SmtpCommandHandler<'_>) -> SmtpSession {
        let mut session = SmtpSession::new(false);
        handler
            .process_command("HELO client.local", &mut session)
            .unwrap();
        session
    }

    #[test]
    fn test_helo_command() {
        let config = config();
        let handler = SmtpCommandHandler::new(&config);
        let mut session = SmtpSession::new(false);

        let (response, next) = handler
            .process_command("HELO client.local", &mut session)
            .unwrap();

        assert_eq!(response.code, 250);
        assert_eq!(response.message, "test.local greets client.local");
        assert_eq!(next, Next::Continue);
        assert_eq!(session.client_domain, Some("client.local".to_string()));
    }

    #[test]
    fn test_helo_missing_domain() {
        let config = config();
        let handler = SmtpCommandHandler::new(&config);
        let mut session = SmtpSession::new(false);

        assert!(handler.process_command("HELO", &mut session).is_err());
    }

    #[test]
    fn test_ehlo_advertises_size_and_no_starttls_without_tls() {
        let config = ServerConfig {
            max_size: 1024,
            ..config()
        };
        let handler = SmtpCommandHandler::new(&config);
        let mut session = SmtpSession::new(false);

        let (response, _) = handler
            .process_command("ehlo client.local", &mut session)
            .unwrap();
        let formatted = response.format();
        assert!(formatted.contains("250-8BITMIME\r\n"));
        assert!(formatted.contains("250 SIZE 1024\r\n"));
        assert!(!formatted.contains("STARTTLS"));
    }

    #[test]
    fn test_mail_command_with_parameters() {
        let config = config();
        let handler = SmtpCommandHandler::new(&config);
        let mut session = greeted(&handler);

        let (response, _) = handler
            .process_command("MAIL FROM:<sender@example.com> BODY=8BITMIME", &mut session)
            .unwrap();

        assert_eq!(response.code, 250);
        assert_eq!(session.from, Some("sender@example.com".to_string()));
    }

    #[test]
    fn test_mail_null_sender() {
        let config = config();
        let handler = SmtpCommandHandler::new(&config);
        let mut session = greeted(&handler);

        handler
            .process_command("MAIL FROM:<>", &mut session)
            .unwrap();
        assert_eq!(session.from, Some(String::new()));
    }

    #[test]
    fn test_mail_without_helo() {
        let config = config();
        let handler = SmtpCommandHandler::new(&config);
        let mut session = SmtpSession::new(false);

        let err = handler
            .process_command("MAIL FROM:<sender@example.com>", &mut session)
            .unwrap_err();
        assert_eq!(err.to_response_code(), 503);
    }

    #[test]
    fn test_mail_invalid_syntax() {
        let config = config();
        let handler = SmtpCommandHandler::new(&config);
        let mut session = greeted(&handler);

        let err = handler
            .process_command("MAIL sender@example.com", &mut session)
            .unwrap_err();
        assert_eq!(err.to_response_code(), 501);

        let err = handler
            .process_command("MAIL FROM:sender@example.com", &mut session)
            .unwrap_err();
        assert_eq!(err.to_response_code(), 501);
    }

    #[test]
    fn test_mail_declared_size_over_limit() {
        let config = ServerConfig {
            max_size: 100,
            ..config()
        };
        let handler = SmtpCommandHandler::new(&config);
        let mut session = greeted(&handler);

        let err = handler
            .process_command("MAIL FROM:<a@b> SIZE=101", &mut session)
            .unwrap_err();
        assert_eq!(err.to_response_code(), 552);

        handler
            .process_command("MAIL FROM:<a@b> SIZE=100", &mut session)
            .unwrap();
        assert_eq!(session.declared_size, Some(100));
    }

    #[test]
    fn test_rcpt_and_data() {
        let config = config();
        let handler = SmtpCommandHandler::new(&config);
        let mut session = greeted(&handler);

        let err = handler
            .process_command("RCPT TO:<recipient@example.com>", &mut session)
            .unwrap_err();
        assert_eq!(err.to_response_code(), 503);

        handler
            .process_command("MAIL FROM:<sender@example.com>", &mut session)
            .unwrap();
        handler
            .process_command("RCPT TO:<one@example.com>", &mut session)
            .unwrap();
        handler
            .process_command("rcpt to: <two@example.com>", &mut session)
            .unwrap();

        let (response, next) = handler.process_command("DATA", &mut session).unwrap();
        assert_eq!(response.code, 354);
        assert_eq!(
            next,
            Next::ReadData(Envelope {
                from: "sender@example.com".into(),
                to: vec!["one@example.com".into(), "two@example.com".into()],
                client_domain: "client.local".into(),
            })
        );
        assert_eq!(session.state, SmtpState::DataMode);
    }

    #[test]
    fn test_data_with_arguments() {
        let config = config();
        let handler = SmtpCommandHandler::new(&config);
        let mut session = greeted(&handler);
        handler
            .process_command("MAIL FROM:<a@b>", &mut session)
            .unwrap();
        handler.process_command("RCPT TO:<c@d>", &mut session).unwrap();

        let err = handler
            .process_command("DATA now", &mut session)
            .unwrap_err();
        assert_eq!(err.to_response_code(), 501);
    }

    #[test]
    fn test_tls_required_blocks_mail() {
        let config = ServerConfig {
            tls_required: true,
            ..config()
        };
        let handler = SmtpCommandHandler::new(&config);
        let mut session = greeted(&handler);

        let err = handler
            .process_command("MAIL FROM:<a@b>", &mut session)
            .unwrap_err();
        assert!(matches!(err, SmtpError::TlsRequired));

        session.secure = true;
        handler
            .process_command("MAIL FROM:<a@b>", &mut session)
            .unwrap();
    }

    #[test]
    fn test_starttls_without_tls_config() {
        let config = config();
        let handler = SmtpCommandHandler::new(&config);
        let mut session = greeted(&handler);

        let err = handler
            .process_command("STARTTLS", &mut session)
            .unwrap_err();
        assert_eq!(err.to_response_code(), 454);
    }

    #[test]
    fn test_rset_noop_vrfy_quit() {
        let config = config();
        let handler = SmtpCommandHandler::new(&config);
        let mut session = greeted(&handler);
        handler
            .process_command("MAIL FROM:<a@b>", &mut session)
            .unwrap();

        let (response, _) = handler.process_command("RSET", &mut session).unwrap();
        assert_eq!(response.code, 250);
        assert_eq!(session.state, SmtpState::GreetingReceived);
        assert!(session.from.is_none());

        let (response, _) = handler.process_command("NOOP", &mut session).unwrap();
        assert_eq!(response.code, 250);

        let (response, _) = handler
            .process_command("VRFY someone", &mut session)
            .unwrap();
        assert_eq!(response.code, 252);

        let (response, next) = handler.process_command("QUIT", &mut session).unwrap();
        assert_eq!(response.code, 221);
        assert_eq!(next, Next::Quit);
    }

    #[test]
    fn test_unknown_and_overlong_commands() {
        let config = config();
        let handler = SmtpCommandHandler::new(&config);
        let mut session = SmtpSession::new(false);

        assert!(matches!(
            handler.process_command("INVALID", &mut session),
            Err(SmtpError::InvalidCommand)
        ));

        let long = "HELO ".to_string() + &"a".repeat(SmtpLimits::COMMAND_LINE_MAX_LENGTH);
        assert!(matches!(
            handler.process_command(&long, &mut session),
            Err(SmtpError::LineTooLong { .. })
        ));
    }
}
