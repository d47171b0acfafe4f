//! Log record wire format.
//!
//! One datagram per request:
//!
//! ```text
//! METHOD SP PATH SP "(0x" HEX8 ")" LF
//! GET /health (0x1a2b3c4d)
//! ```
//!
//! The path is copied verbatim, without escaping. The checksum is the IEEE
//! CRC-32 of the raw path bytes and only serves as a correlation fingerprint.

use std::fmt;
use std::io::Write;

use serde::Serialize;
use thiserror::Error;

/// Terminator appended to every record.
pub const LINE_TERMINATOR: &[u8] = b"\n";

/// Length of the `" (0x"` + 8 hex digits + `")"` suffix.
const CHECKSUM_SUFFIX_LEN: usize = 13;

/// CRC-32 of the raw path bytes.
pub fn checksum(path: &[u8]) -> u32 {
    crc32fast::hash(path)
}

/// A single request log entry, borrowed from the request being logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord<'a> {
    method: &'a str,
    path: &'a [u8],
    checksum: u32,
}

impl<'a> LogRecord<'a> {
    pub fn new(method: &'a str, path: &'a [u8]) -> Self {
        Self {
            method,
            path,
            checksum: checksum(path),
        }
    }

    pub fn method(&self) -> &'a str {
        self.method
    }

    pub fn path(&self) -> &'a [u8] {
        self.path
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Exact number of bytes [`LogRecord::encode_into`] appends.
    pub fn encoded_len(&self) -> usize {
        self.method.len() + 1 + self.path.len() + CHECKSUM_SUFFIX_LEN + LINE_TERMINATOR.len()
    }

    /// Append the serialized record to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.reserve(self.encoded_len());
        buf.extend_from_slice(self.method.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.path);
        // Writing into a Vec cannot fail.
        let _ = write!(buf, " (0x{:08x})", self.checksum);
        buf.extend_from_slice(LINE_TERMINATOR);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }
}

/// Error returned when a datagram is not a well-formed record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordParseError {
    #[error("record is not terminated by a line feed")]
    MissingTerminator,
    #[error("record has no checksum suffix")]
    MissingChecksum,
    #[error("checksum is not 8 hex digits")]
    InvalidChecksum,
    #[error("record has no method")]
    MissingMethod,
    #[error("method is not valid UTF-8")]
    InvalidMethod,
}

/// A record decoded from a received datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedRecord {
    pub method: String,
    pub path: String,
    pub checksum: u32,
}

impl ParsedRecord {
    /// Decode a datagram produced by [`LogRecord::encode_into`].
    ///
    /// The path is split off from the right, so paths containing spaces
    /// survive. Non-UTF-8 path bytes are replaced lossily.
    pub fn parse(datagram: &[u8]) -> Result<Self, RecordParseError> {
        let body = datagram
            .strip_suffix(LINE_TERMINATOR)
            .ok_or(RecordParseError::MissingTerminator)?;

        if body.len() < CHECKSUM_SUFFIX_LEN {
            return Err(RecordParseError::MissingChecksum);
        }
        let (head, suffix) = body.split_at(body.len() - CHECKSUM_SUFFIX_LEN);
        let hex = suffix
            .strip_prefix(b" (0x")
            .and_then(|s| s.strip_suffix(b")"))
            .ok_or(RecordParseError::MissingChecksum)?;
        let checksum = std::str::from_utf8(hex)
            .ok()
            .filter(|s| s.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|s| u32::from_str_radix(s, 16).ok())
            .ok_or(RecordParseError::InvalidChecksum)?;

        let space = head
            .iter()
            .position(|&b| b == b' ')
            .ok_or(RecordParseError::MissingMethod)?;
        let (method, path) = (&head[..space], &head[space + 1..]);
        if method.is_empty() {
            return Err(RecordParseError::MissingMethod);
        }
        let method = std::str::from_utf8(method).map_err(|_| RecordParseError::InvalidMethod)?;

        Ok(Self {
            method: method.to_string(),
            path: String::from_utf8_lossy(path).into_owned(),
            checksum,
        })
    }

    /// Whether the carried checksum matches the carried path.
    ///
    /// Only meaningful for paths that were valid UTF-8 on the sending side.
    pub fn checksum_matches(&self) -> bool {
        checksum(self.path.as_bytes()) == self.checksum
    }
}

impl fmt::Display for ParsedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (0x{:08x})", self.method, self.path, self.checksum)
    }
}
