//! Classification records returned after the data phase.

use serde::{Deserialize, Serialize};

/// Per-recipient outcome of a data submission.
///
/// Which shape is produced depends on how the server was asked (or
/// configured) to deliver its results, not on what the client expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassificationRecord {
    /// Plain LMTP acknowledgement, no classification data.
    Accepted,
    /// Inline classification summary (`--deliver=summary`).
    Summary(Summary),
    /// Full rewritten message (`--deliver=stdout`).
    RawMessage {
        /// Value of the classification marker line.
        result: String,
        /// Message body as returned by the server, lines joined with CRLF.
        message: String,
    },
}

impl ClassificationRecord {
    /// Returns the classification class, if the record carries one.
    #[must_use]
    pub fn class(&self) -> Option<&str> {
        match self {
            Self::Summary(summary) => Some(&summary.class),
            Self::Accepted | Self::RawMessage { .. } => None,
        }
    }

    /// Returns the classification result, if the record carries one.
    #[must_use]
    pub fn result(&self) -> Option<&str> {
        match self {
            Self::Summary(summary) => Some(&summary.result),
            Self::RawMessage { result, .. } => Some(result),
            Self::Accepted => None,
        }
    }

    /// Returns the summary, if this is a summary record.
    #[must_use]
    pub const fn as_summary(&self) -> Option<&Summary> {
        match self {
            Self::Summary(summary) => Some(summary),
            _ => None,
        }
    }
}

/// Structured classification result from an `X-DSPAM-Result` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// DSPAM user the message was processed for.
    pub user: String,
    /// Processing result (e.g. `Spam`, `Innocent`, `Whitelisted`).
    pub result: String,
    /// Classification class.
    pub class: String,
    /// Spam probability reported by the server.
    pub probability: f64,
    /// Confidence of the classification.
    pub confidence: f64,
    /// Signature id, absent when the server reports `N/A`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}
