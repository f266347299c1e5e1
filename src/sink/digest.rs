//! SHA-256 digests over a message, computed on first use.

use std::cell::OnceCell;

use sha2::{Digest, Sha256};

/// Number of leading lines treated as the trace header.
///
/// This matches the three-line `Received:` header the engine prepends; a
/// message with a differently shaped header would be split in the wrong place.
pub const HEADER_LINES: usize = 3;

/// Offset of the payload: just past the third `\n`, or the end of `data` if
/// it has fewer than three.
pub fn payload_offset(data: &[u8]) -> usize {
    data.iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'\n')
        .nth(HEADER_LINES - 1)
        .map_or(data.len(), |(i, _)| i + 1)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Lazily computed digests for one transaction
pub struct BodyDigests<'a> {
    data: &'a [u8],
    payload: OnceCell<String>,
    full: OnceCell<String>,
}

impl<'a> BodyDigests<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            payload: OnceCell::new(),
            full: OnceCell::new(),
        }
    }

    /// Digest of everything after the trace header
    pub fn payload_hex(&self) -> &str {
        self.payload
            .get_or_init(|| sha256_hex(&self.data[payload_offset(self.data)..]))
    }

    /// Digest of the whole message
    pub fn full_hex(&self) -> &str {
        self.full.get_or_init(|| sha256_hex(self.data))
    }

    pub fn computed(&self) -> (bool, bool) {
        (self.payload.get().is_some(), self.full.get().is_some())
    }
}
