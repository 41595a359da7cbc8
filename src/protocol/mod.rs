//! Line protocol for code submission
//!
//! Clients send newline-delimited text. Every line is either a batch of
//! nine-digit codes or the literal control word `terminate`. Anything else
//! is a protocol violation and ends the connection without a reply.
//!
//! A single received line may still carry several logical lines when the
//! client coalesced writes with a foreign separator (for example a bare
//! `\r`), so each line is split into fragments before it is classified.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of decimal digits in a code
pub const CODE_LENGTH: usize = 9;

/// Control line that requests a server-wide shutdown
pub const TERMINATE_COMMAND: &str = "terminate";

// ============================================================================
// Errors
// ============================================================================

/// Reasons a received line is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fragment is not exactly nine characters long
    #[error("Invalid code length: expected {CODE_LENGTH}, got {0}")]
    InvalidLength(usize),

    /// Fragment contains something other than ASCII digits
    #[error("Code contains a non-digit character: {0:?}")]
    NonDigit(String),

    /// Line exceeded the configured maximum length
    #[error("Line exceeds {0} bytes")]
    LineTooLong(usize),

    /// Line was not valid UTF-8
    #[error("Line is not valid UTF-8")]
    InvalidEncoding,
}

// ============================================================================
// Code
// ============================================================================

/// A nine-digit decimal code, 000000000 through 999999999
///
/// Stored as an integer key; `Display` restores the zero-padded text, which
/// is byte-for-byte what the client sent since only exact nine-digit
/// strings are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Code(u32);

impl Code {
    /// Parse a fragment that must be exactly nine ASCII digits
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        if text.len() != CODE_LENGTH {
            return Err(ProtocolError::InvalidLength(text.chars().count()));
        }

        let mut value = 0u32;
        for byte in text.bytes() {
            if !byte.is_ascii_digit() {
                return Err(ProtocolError::NonDigit(text.to_string()));
            }
            value = value * 10 + u32::from(byte - b'0');
        }

        Ok(Self(value))
    }

    /// Integer value of the code
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl FromStr for Code {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:09}", self.0)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Classified content of one received line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    /// The line was exactly the terminate command
    Terminate,

    /// Candidate codes, not yet validated
    Batch(Vec<&'a str>),
}

impl<'a> Request<'a> {
    /// Classify a received line
    ///
    /// `terminate` is recognised only when it is the sole fragment, so a
    /// line such as `123456789\rterminate` is a batch and fails validation.
    pub fn classify(line: &'a str) -> Self {
        let fragments = split_fragments(line);
        if fragments.len() == 1 && fragments[0] == TERMINATE_COMMAND {
            Request::Terminate
        } else {
            Request::Batch(fragments)
        }
    }
}

/// Split a line on embedded line terminators, dropping empty fragments
pub fn split_fragments(line: &str) -> Vec<&str> {
    line.split(['\r', '\n'])
        .filter(|fragment| !fragment.is_empty())
        .collect()
}

/// Validate a whole batch, all or nothing
///
/// The first invalid fragment fails the batch; no codes are returned for
/// a partially valid one.
pub fn parse_batch<S: AsRef<str>>(fragments: &[S]) -> Result<Vec<Code>, ProtocolError> {
    fragments
        .iter()
        .map(|fragment| Code::parse(fragment.as_ref()))
        .collect()
}
