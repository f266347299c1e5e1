//! Pipeline configuration, captured once at startup.

use crate::sink::Template;

/// Log verbosity switches.
///
/// The switches are not exclusive. Precedence: `debug` overrides `quiet`,
/// and `quiet` beats `full` (a suppressed line carries no body either).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verbosity {
    /// Suppress transaction lines unless `debug` is set
    pub quiet: bool,
    /// Append the raw message to the transaction line
    pub full: bool,
    /// Engine debug logging; also forces transaction lines
    pub debug: bool,
    /// Marker written after the message when `full` is set
    pub data_end: String,
}

impl Verbosity {
    /// Whether a transaction line is emitted at all
    pub fn emits_line(&self) -> bool {
        !self.quiet || self.debug
    }

    /// Whether the emitted line carries the message
    pub fn includes_body(&self) -> bool {
        self.full && self.emits_line()
    }

    /// More than one of debug/quiet/full is set
    pub fn is_ambiguous(&self) -> bool {
        [self.debug, self.quiet, self.full]
            .iter()
            .filter(|&&set| set)
            .count()
            > 1
    }
}

/// Everything a [`MailSink`](crate::sink::MailSink) needs, immutable after
/// construction.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub template: Template,
    pub verbosity: Verbosity,
}

impl SinkConfig {
    pub fn new(template: &str, verbosity: Verbosity) -> Self {
        Self {
            template: Template::parse(template),
            verbosity,
        }
    }
}

/// Turn Go-style `:port` listen addresses into `0.0.0.0:port`.
pub fn normalize_listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}
