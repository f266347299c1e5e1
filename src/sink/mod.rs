//! The mail sink: persists each transaction to a templated path and logs a
//! one-line summary.

pub mod artifact;
pub mod digest;
pub mod summary;
pub mod template;

pub use artifact::write_artifact;
pub use digest::{BodyDigests, payload_offset};
pub use summary::format_summary;
pub use template::{Substitutions, Template, Token, TokenSet};

use std::path::PathBuf;
use std::time::SystemTime;

use tracing::{info, warn};

use crate::config::SinkConfig;
use crate::smtp::{HandlerError, MailHandler, Transaction};

/// What happened to one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Resolved path, `None` when persistence is disabled
    pub path: Option<PathBuf>,
    /// Summary line, `None` when verbosity suppresses it
    pub summary: Option<String>,
    /// Whether the message reached disk
    pub persisted: bool,
}

/// [`MailHandler`] that writes every message to disk and logs it.
///
/// Write failures are logged and the transaction is still accepted.
#[derive(Debug, Clone)]
pub struct MailSink {
    config: SinkConfig,
}

impl MailSink {
    pub fn new(config: SinkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Run the pipeline for one transaction received at `received_at`.
    pub fn process(&self, transaction: &Transaction<'_>, received_at: SystemTime) -> Outcome {
        let path = self.resolve_path(transaction, received_at);

        let persisted = match &path {
            Some(path) => match write_artifact(path, transaction.data) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, remote = %transaction.remote, "failed to save mail data");
                    false
                }
            },
            None => false,
        };

        let summary = format_summary(transaction, path.as_deref(), &self.config.verbosity);
        Outcome {
            path,
            summary,
            persisted,
        }
    }

    fn resolve_path(&self, transaction: &Transaction<'_>, received_at: SystemTime) -> Option<PathBuf> {
        let template = &self.config.template;
        if template.is_disabled() {
            return None;
        }

        let tokens = template.tokens();
        let digests = BodyDigests::new(transaction.data);
        let values = Substitutions {
            received_at: tokens
                .needs_time()
                .then(|| Substitutions::since_epoch(received_at)),
            payload_digest: tokens.needs_payload_digest().then(|| digests.payload_hex()),
            full_digest: tokens.needs_full_digest().then(|| digests.full_hex()),
        };
        Some(template.resolve(&values))
    }
}

impl MailHandler for MailSink {
    fn handle(&self, transaction: &Transaction<'_>) -> Result<(), HandlerError> {
        let outcome = self.process(transaction, SystemTime::now());
        if let Some(summary) = outcome.summary {
            info!("{summary}");
        }
        Ok(())
    }
}
