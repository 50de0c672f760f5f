//! Grammars for the response that follows end-of-data.
//!
//! Depending on server configuration and client arguments, DSPAM answers a
//! data submission in one of three ways:
//!
//! - Standard LMTP, once per recipient:
//!   `250 2.6.0 <bar> Message accepted for delivery`
//! - Summary (`--deliver=summary`), once per recipient, then a lone dot:
//!   `X-DSPAM-Result: bar; result="Spam"; class="Spam"; probability=1.0000;
//!   confidence=0.85; signature=50c50c0f315636261418125`
//! - Stdout (`--deliver=stdout`), once per recipient, a marker line followed
//!   by the complete rewritten message:
//!   `X-Daemon-Classification: INNOCENT`
//!
//! The functions here only recognise single lines. Driving them over a
//! connection and matching recipients is done by the session.

use crate::types::Summary;

/// Prefix of a standard LMTP per-recipient acknowledgement.
pub const DELIVERY_PREFIX: &str = "250";

/// Prefix of a summary line.
pub const SUMMARY_PREFIX: &str = "X-DSPAM-Result:";

/// Prefix of the marker line that opens a rewritten message.
pub const CLASSIFICATION_PREFIX: &str = "X-Daemon-Classification:";

/// Number of bytes needed to tell the three encodings apart.
pub const DETECT_LEN: usize = CLASSIFICATION_PREFIX.len();

/// Signature value the server reports when no signature was stored.
const NO_SIGNATURE: &str = "N/A";

/// Encoding of the response to a data submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Standard LMTP acknowledgements.
    Delivery,
    /// `X-DSPAM-Result` summary lines.
    Summary,
    /// Rewritten messages introduced by `X-Daemon-Classification`.
    RawMessage,
}

impl ResponseFormat {
    /// Determines the encoding from the first bytes of the response.
    ///
    /// Returns `None` if the bytes match none of the known prefixes.
    #[must_use]
    pub fn detect(head: &[u8]) -> Option<Self> {
        if head.starts_with(DELIVERY_PREFIX.as_bytes()) {
            Some(Self::Delivery)
        } else if head.starts_with(SUMMARY_PREFIX.as_bytes()) {
            Some(Self::Summary)
        } else if head.starts_with(CLASSIFICATION_PREFIX.as_bytes()) {
            Some(Self::RawMessage)
        } else {
            None
        }
    }
}

/// Small cursor over a line, used to walk fixed-layout fields.
struct Fields<'a> {
    rest: &'a str,
}

impl<'a> Fields<'a> {
    const fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    fn literal(&mut self, lit: &str) -> Option<()> {
        self.rest = self.rest.strip_prefix(lit)?;
        Some(())
    }

    /// Takes a non-empty run of characters matching `pred`.
    fn run(&mut self, pred: impl Fn(char) -> bool) -> Option<&'a str> {
        let end = self.rest.find(|c| !pred(c)).unwrap_or(self.rest.len());
        if end == 0 {
            return None;
        }
        let (taken, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(taken)
    }

    fn digit(&mut self) -> Option<()> {
        let mut chars = self.rest.chars();
        if !chars.next()?.is_ascii_digit() {
            return None;
        }
        self.rest = chars.as_str();
        Some(())
    }
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_number(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

fn is_signature(c: char) -> bool {
    is_word(c) || c == ',' || c == '/'
}

/// Parses `250 X.Y.Z <recipient> ...` and returns the recipient.
///
/// Anything after the closing bracket is ignored.
#[must_use]
pub fn parse_delivery_line(line: &str) -> Option<&str> {
    let mut f = Fields::new(line);
    f.literal(DELIVERY_PREFIX)?;
    f.literal(" ")?;
    f.digit()?;
    f.literal(".")?;
    f.digit()?;
    f.literal(".")?;
    f.digit()?;
    f.literal(" <")?;
    let recipient = f.run(|c| c != '>')?;
    f.literal(">")?;
    Some(recipient)
}

/// Parses an `X-DSPAM-Result` summary line.
///
/// A signature of `N/A` is dropped rather than stored. Returns `None` if the
/// line does not follow the summary layout.
#[must_use]
pub fn parse_summary_line(line: &str) -> Option<Summary> {
    let mut f = Fields::new(line);
    f.literal(SUMMARY_PREFIX)?;
    f.literal(" ")?;
    let user = f.run(|c| c != ';')?;
    f.literal("; result=\"")?;
    let result = f.run(is_word)?;
    f.literal("\"; class=\"")?;
    let class = f.run(is_word)?;
    f.literal("\"; probability=")?;
    let probability = f.run(is_number)?.parse().ok()?;
    f.literal("; confidence=")?;
    let confidence = f.run(is_number)?.parse().ok()?;
    f.literal("; signature=")?;
    let signature = f.run(is_signature)?;

    Some(Summary {
        user: user.to_string(),
        result: result.to_string(),
        class: class.to_string(),
        probability,
        confidence,
        signature: (signature != NO_SIGNATURE).then(|| signature.to_string()),
    })
}

/// Parses an `X-Daemon-Classification` marker and returns its value.
#[must_use]
pub fn parse_classification_marker(line: &str) -> Option<&str> {
    let value = line.strip_prefix(CLASSIFICATION_PREFIX)?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}
