//! Filename templates with `%` placeholders.
//!
//! | token | value                                                   |
//! |-------|---------------------------------------------------------|
//! | `%h`  | SHA-256 of the message after the trace header           |
//! | `%H`  | SHA-256 of the whole message                            |
//! | `%s`  | reception time, seconds since the Unix epoch            |
//! | `%N`  | nanosecond part of the reception time, 9 digits         |
//! | `%%`  | a literal `%`                                           |
//!
//! Any other `%` is copied as is, including a trailing one.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    PayloadDigest,
    FullDigest,
    Seconds,
    Nanos,
}

impl Token {
    fn from_letter(c: char) -> Option<Self> {
        match c {
            'h' => Some(Token::PayloadDigest),
            'H' => Some(Token::FullDigest),
            's' => Some(Token::Seconds),
            'N' => Some(Token::Nanos),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(Token),
}

/// Which token kinds a template references
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenSet {
    pub payload_digest: bool,
    pub full_digest: bool,
    pub seconds: bool,
    pub nanos: bool,
}

impl TokenSet {
    pub fn needs_time(&self) -> bool {
        self.seconds || self.nanos
    }

    pub fn needs_payload_digest(&self) -> bool {
        self.payload_digest
    }

    pub fn needs_full_digest(&self) -> bool {
        self.full_digest
    }

    fn insert(&mut self, token: Token) {
        match token {
            Token::PayloadDigest => self.payload_digest = true,
            Token::FullDigest => self.full_digest = true,
            Token::Seconds => self.seconds = true,
            Token::Nanos => self.nanos = true,
        }
    }
}

/// Values substituted for the tokens of one transaction.
///
/// Only the values the template references need to be set.
#[derive(Debug, Default)]
pub struct Substitutions<'a> {
    pub received_at: Option<Duration>,
    pub payload_digest: Option<&'a str>,
    pub full_digest: Option<&'a str>,
}

impl Substitutions<'_> {
    /// Reception time as an offset from the Unix epoch; clamps pre-epoch
    /// clocks to zero.
    pub fn since_epoch(at: SystemTime) -> Duration {
        at.duration_since(UNIX_EPOCH).unwrap_or_default()
    }
}

/// A parsed filename template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
    tokens: TokenSet,
}

#[derive(Clone, Copy)]
enum Scan {
    Normal,
    Percent,
}

impl Template {
    /// Parse a template. Never fails: unknown `%x` sequences are literal.
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut tokens = TokenSet::default();
        let mut literal = String::new();
        let mut state = Scan::Normal;

        for c in source.chars() {
            state = match (state, c) {
                (Scan::Normal, '%') => Scan::Percent,
                (Scan::Normal, c) => {
                    literal.push(c);
                    Scan::Normal
                }
                (Scan::Percent, '%') => {
                    literal.push('%');
                    Scan::Normal
                }
                (Scan::Percent, c) => {
                    match Token::from_letter(c) {
                        Some(token) => {
                            if !literal.is_empty() {
                                segments.push(Segment::Literal(std::mem::take(&mut literal)));
                            }
                            segments.push(Segment::Token(token));
                            tokens.insert(token);
                        }
                        None => {
                            literal.push('%');
                            literal.push(c);
                        }
                    }
                    Scan::Normal
                }
            };
        }
        if let Scan::Percent = state {
            literal.push('%');
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            source: source.to_string(),
            segments,
            tokens,
        }
    }

    /// The operator's original string
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// An empty template turns persistence off.
    pub fn is_disabled(&self) -> bool {
        self.source.is_empty()
    }

    pub fn tokens(&self) -> TokenSet {
        self.tokens
    }

    /// Build the path for one transaction. A token whose value is missing
    /// resolves to an empty string.
    pub fn resolve(&self, values: &Substitutions<'_>) -> PathBuf {
        let mut out = String::with_capacity(self.source.len() + 64);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Token(Token::PayloadDigest) => {
                    out.push_str(values.payload_digest.unwrap_or_default())
                }
                Segment::Token(Token::FullDigest) => {
                    out.push_str(values.full_digest.unwrap_or_default())
                }
                Segment::Token(Token::Seconds) => {
                    if let Some(at) = values.received_at {
                        out.push_str(&at.as_secs().to_string());
                    }
                }
                Segment::Token(Token::Nanos) => {
                    if let Some(at) = values.received_at {
                        out.push_str(&format!("{:09}", at.subsec_nanos()));
                    }
                }
            }
        }
        PathBuf::from(out)
    }
}
