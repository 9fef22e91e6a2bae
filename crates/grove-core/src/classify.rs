//! Content classification.
//!
//! Deciding whether a file belongs in a text search index is a pure function
//! of its size and bytes, kept apart from any filesystem access so the policy
//! can be tested on plain buffers.
//!
//! A file is binary when the first `sniff_len` bytes contain a NUL byte, or
//! when the fraction of control bytes in that prefix exceeds
//! `max_non_text_ratio`. Tab, newline, carriage return, form feed, backspace
//! and escape count as text; bytes at or above 0x80 count as text so UTF-8
//! and legacy 8-bit encodings are accepted.

use crate::types::SkipReason;
use serde::{Deserialize, Serialize};

/// Thresholds used to accept or reject file content.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContentPolicy {
    /// Files larger than this many bytes are rejected
    pub max_file_size: u64,

    /// Number of leading bytes inspected by the binary heuristic
    pub sniff_len: usize,

    /// Maximum fraction of control bytes in the sniffed prefix
    pub max_non_text_ratio: f64,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        ContentPolicy {
            max_file_size: 1024 * 1024,
            sniff_len: 8000,
            max_non_text_ratio: 0.3,
        }
    }
}

/// Verdict of the content policy on one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Eligible for registration
    Text,
    /// Rejected by the binary heuristic
    Binary,
    /// Rejected by the size limit
    TooLarge { size: u64, limit: u64 },
}

impl Classification {
    /// The skip reason for a rejected file, `None` when eligible
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match *self {
            Classification::Text => None,
            Classification::Binary => Some(SkipReason::Binary),
            Classification::TooLarge { size, limit } => Some(SkipReason::TooLarge { size, limit }),
        }
    }

    pub fn is_eligible(&self) -> bool {
        matches!(self, Classification::Text)
    }
}

impl ContentPolicy {
    /// Check a size (typically from file metadata) against the limit
    pub fn check_size(&self, size: u64) -> Classification {
        if size > self.max_file_size {
            Classification::TooLarge {
                size,
                limit: self.max_file_size,
            }
        } else {
            Classification::Text
        }
    }

    /// Classify a full file content buffer.
    pub fn classify(&self, content: &[u8]) -> Classification {
        let by_size = self.check_size(content.len() as u64);
        if !by_size.is_eligible() {
            return by_size;
        }
        if looks_binary(content, self.sniff_len, self.max_non_text_ratio) {
            Classification::Binary
        } else {
            Classification::Text
        }
    }
}

/// Binary heuristic over the first `sniff_len` bytes of `content`.
pub fn looks_binary(content: &[u8], sniff_len: usize, max_non_text_ratio: f64) -> bool {
    let prefix = &content[..content.len().min(sniff_len)];
    if prefix.is_empty() {
        return false;
    }
    if memchr::memchr(0, prefix).is_some() {
        return true;
    }

    let control = prefix.iter().filter(|&&b| !is_text_byte(b)).count();
    (control as f64 / prefix.len() as f64) > max_non_text_ratio
}

/// Whether a byte is plausible inside a text file.
pub fn is_text_byte(b: u8) -> bool {
    match b {
        b'\t' | b'\n' | b'\r' | 0x08 | 0x0c | 0x1b => true,
        0x00..=0x1f | 0x7f => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ContentPolicy {
        ContentPolicy {
            max_file_size: 64,
            sniff_len: 16,
            max_non_text_ratio: 0.3,
        }
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(policy().classify(b"hello\nworld\n"), Classification::Text);
        assert_eq!(policy().classify(b""), Classification::Text);
        assert_eq!(
            policy().classify("héllo wörld".as_bytes()),
            Classification::Text
        );
    }

    #[test]
    fn test_nul_byte_is_binary() {
        assert_eq!(policy().classify(&[0x00, 0x01, 0x02]), Classification::Binary);
        assert_eq!(policy().classify(b"abc\0def"), Classification::Binary);
    }

    #[test]
    fn test_nul_beyond_prefix_is_ignored() {
        let mut content = vec![b'a'; 20];
        content.push(0);
        assert_eq!(policy().classify(&content), Classification::Text);
    }

    #[test]
    fn test_control_ratio() {
        // 4 of 10 bytes are control characters
        let content = b"ab\x01c\x02d\x03e\x04f";
        assert_eq!(policy().classify(content), Classification::Binary);

        // 1 of 10
        let content = b"abcd\x01efghi";
        assert_eq!(policy().classify(content), Classification::Text);
    }

    #[test]
    fn test_whitespace_controls_are_text() {
        let content = b"\t\t\r\n\r\n\x0c\x1b[0m";
        assert_eq!(policy().classify(content), Classification::Text);
    }

    #[test]
    fn test_too_large() {
        let content = vec![b'a'; 65];
        assert_eq!(
            policy().classify(&content),
            Classification::TooLarge {
                size: 65,
                limit: 64
            }
        );
        assert_eq!(policy().check_size(64), Classification::Text);
    }

    #[test]
    fn test_skip_reason() {
        assert_eq!(Classification::Text.skip_reason(), None);
        assert_eq!(Classification::Binary.skip_reason(), Some(SkipReason::Binary));
        assert!(Classification::Text.is_eligible());
        assert!(!Classification::Binary.is_eligible());
    }
}
