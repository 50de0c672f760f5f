//! Command replies.

use std::fmt;

/// Three-digit reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220, greeting.
    pub const SERVICE_READY: Self = Self(220);
    /// 221, answer to QUIT.
    pub const CLOSING: Self = Self(221);
    /// 250, command accepted.
    pub const OK: Self = Self(250);
    /// 354, go ahead with the message.
    pub const START_DATA: Self = Self(354);

    /// Wraps a numeric code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// A complete, possibly multi-line, reply.
///
/// Lines are stored without code and separator, so the LHLO reply
/// `250-localhost` / `250 DSPAMPROCESSMODE` holds `localhost` and
/// `DSPAMPROCESSMODE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Code of the reply.
    pub code: ReplyCode,
    /// Text of each line.
    pub lines: Vec<String>,
}

impl Reply {
    /// Creates a reply.
    #[must_use]
    pub const fn new(code: ReplyCode, lines: Vec<String>) -> Self {
        Self { code, lines }
    }
}

impl fmt::Display for Reply {
    /// Formats the reply the way it appeared on the wire, lines joined by
    /// CRLF.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.lines.len().saturating_sub(1);
        for (i, line) in self.lines.iter().enumerate() {
            if i == last {
                write!(f, "{} {line}", self.code)?;
            } else {
                write!(f, "{}-{line}\r\n", self.code)?;
            }
        }
        Ok(())
    }
}
