//! SMTP session state management

use crate::smtp::error::{SmtpError, SmtpLimits};

/// Represents the current state of an SMTP session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    /// Initial state - waiting for HELO/EHLO
    Initial,
    /// HELO received - ready for MAIL command
    GreetingReceived,
    /// MAIL FROM received - ready for RCPT commands
    MailReceived,
    /// At least one RCPT TO received - ready for DATA or more RCPT commands
    RecipientsReceived,
    /// DATA command accepted - the server is reading the message body
    DataMode,
}

/// Envelope handed back when a DATA phase starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: Vec<String>,
    pub client_domain: String,
}

/// Manages the state and envelope for a single SMTP session
#[derive(Debug)]
pub struct SmtpSession {
    /// Current state of the session
    pub state: SmtpState,
    /// Sender address from MAIL FROM command; empty for the null reverse-path
    pub from: Option<String>,
    /// List of recipients from RCPT TO commands
    pub to: Vec<String>,
    /// Client domain from HELO/EHLO command
    pub client_domain: Option<String>,
    /// Whether the connection is protected by TLS
    pub secure: bool,
    /// Declared SIZE parameter from MAIL FROM, if any
    pub declared_size: Option<usize>,
}

impl SmtpSession {
    /// Create a new SMTP session
    pub fn new(secure: bool) -> Self {
        Self {
            state: SmtpState::Initial,
            from: None,
            to: Vec::new(),
            client_domain: None,
            secure,
            declared_size: None,
        }
    }

    /// Reset the session to post-HELO state (clears transaction data)
    pub fn reset(&mut self) {
        if self.state != SmtpState::Initial {
            self.state = SmtpState::GreetingReceived;
        }
        self.from = None;
        self.to.clear();
        self.declared_size = None;
    }

    /// Forget everything learned before a STARTTLS upgrade
    pub fn upgrade_to_tls(&mut self) {
        self.state = SmtpState::Initial;
        self.from = None;
        self.to.clear();
        self.client_domain = None;
        self.declared_size = None;
        self.secure = true;
    }

    /// Set the client domain from HELO/EHLO command
    pub fn set_client_domain(&mut self, domain: String) {
        self.client_domain = Some(domain);
        self.state = SmtpState::GreetingReceived;
        self.reset();
    }

    /// Set the sender address
    pub fn set_sender(&mut self, sender: String, declared_size: Option<usize>) -> Result<(), SmtpError> {
        if sender.len() > SmtpLimits::PATH_MAX_LENGTH {
            return Err(SmtpError::PathTooLong {
                max: SmtpLimits::PATH_MAX_LENGTH,
            });
        }

        self.from = Some(sender);
        self.to.clear();
        self.declared_size = declared_size;
        self.state = SmtpState::MailReceived;
        Ok(())
    }

    /// Add a recipient address
    pub fn add_recipient(&mut self, recipient: String) -> Result<(), SmtpError> {
        if recipient.len() > SmtpLimits::PATH_MAX_LENGTH {
            return Err(SmtpError::PathTooLong {
                max: SmtpLimits::PATH_MAX_LENGTH,
            });
        }

        if self.to.len() >= SmtpLimits::MAX_RECIPIENTS {
            return Err(SmtpError::TooManyRecipients {
                max: SmtpLimits::MAX_RECIPIENTS,
            });
        }

        self.to.push(recipient);
        self.state = SmtpState::RecipientsReceived;
        Ok(())
    }

    /// Enter DATA mode and hand out the envelope collected so far
    pub fn start_data_mode(&mut self) -> Result<Envelope, SmtpError> {
        if self.state != SmtpState::RecipientsReceived {
            return Err(SmtpError::InvalidState(
                "DATA command requires RCPT first".to_string(),
            ));
        }

        let from = self
            .from
            .clone()
            .ok_or_else(|| SmtpError::InvalidState("No sender specified".to_string()))?;

        self.state = SmtpState::DataMode;
        Ok(Envelope {
            from,
            to: self.to.clone(),
            client_domain: self.client_domain.clone().unwrap_or_default(),
        })
    }

    /// Leave DATA mode; the transaction is over whatever its outcome was
    pub fn finish_data(&mut self) {
        self.state = SmtpState::GreetingReceived;
        self.from = None;
        self.to.clear();
        self.declared_size = None;
    }

    /// Whether a mail transaction is open (MAIL accepted, DATA not finished)
    pub fn in_transaction(&self) -> bool {
        matches!(
            self.state,
            SmtpState::MailReceived | SmtpState::RecipientsReceived | SmtpState::DataMode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greeted() -> SmtpSession {
        let mut session = SmtpSession::new(false);
        session.set_client_domain("client.local".to_string());
        session
    }

    #[test]
    fn test_new_session() {
        let session = SmtpSession::new(false);
        assert_eq!(session.state, SmtpState::Initial);
        assert!(session.from.is_none());
        assert!(session.to.is_empty());
        assert!(session.client_domain.is_none());
        assert!(!session.secure);
        assert!(!session.in_transaction());
    }

    #[test]
    fn test_set_client_domain() {
        let session = greeted();
        assert_eq!(session.state, SmtpState::GreetingReceived);
        assert_eq!(session.client_domain, Some("client.local".to_string()));
    }

    #[test]
    fn test_null_sender_is_accepted() {
        let mut session = greeted();
        session.set_sender(String::new(), None).unwrap();
        assert_eq!(session.from.as_deref(), Some(""));
        assert!(session.in_transaction());
    }

    #[test]
    fn test_path_too_long() {
        let mut session = greeted();
        let long = "a".repeat(SmtpLimits::PATH_MAX_LENGTH + 1);
        assert!(matches!(
            session.set_sender(long.clone(), None),
            Err(SmtpError::PathTooLong { .. })
        ));
        session.set_sender("a@b".into(), None).unwrap();
        assert!(matches!(
            session.add_recipient(long),
            Err(SmtpError::PathTooLong { .. })
        ));
    }

    #[test]
    fn test_recipient_limit() {
        let mut session = greeted();
        session.set_sender("a@b".into(), None).unwrap();
        for i in 0..SmtpLimits::MAX_RECIPIENTS {
            session.add_recipient(format!("r{i}@example.com")).unwrap();
        }
        assert!(matches!(
            session.add_recipient("late@example.com".into()),
            Err(SmtpError::TooManyRecipients { .. })
        ));
    }

    #[test]
    fn test_data_mode_requires_recipient() {
        let mut session = greeted();
        session.set_sender("a@b".into(), None).unwrap();
        assert!(session.start_data_mode().is_err());

        session.add_recipient("c@d".into()).unwrap();
        session.add_recipient("e@f".into()).unwrap();
        let envelope = session.start_data_mode().unwrap();
        assert_eq!(envelope.from, "a@b");
        assert_eq!(envelope.to, vec!["c@d", "e@f"]);
        assert_eq!(envelope.client_domain, "client.local");
        assert_eq!(session.state, SmtpState::DataMode);

        session.finish_data();
        assert_eq!(session.state, SmtpState::GreetingReceived);
        assert!(session.to.is_empty());
        assert!(!session.in_transaction());
    }

    #[test]
    fn test_reset_before_greeting_stays_initial() {
        let mut session = SmtpSession::new(false);
        session.reset();
        assert_eq!(session.state, SmtpState::Initial);
    }

    #[test]
    fn test_upgrade_to_tls_forgets_greeting() {
        let mut session = greeted();
        session.set_sender("a@b".into(), Some(10)).unwrap();
        session.upgrade_to_tls();
        assert!(session.secure);
        assert_eq!(session.state, SmtpState::Initial);
        assert!(session.client_domain.is_none());
        assert!(session.from.is_none());
        assert!(session.declared_size.is_none());
    }
}
