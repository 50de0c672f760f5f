//! Outstanding recipient bookkeeping.

use std::collections::HashMap;

use super::ClassificationRecord;
use crate::error::{Error, Result};

/// Results of a data submission, keyed on the recipient name as returned by
/// the server.
pub type Results = HashMap<String, ClassificationRecord>;

/// Recipients accepted by the server that have not been answered yet.
///
/// Kept in submission order; lookups by name are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outstanding(Vec<String>);

impl Outstanding {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends an accepted recipient.
    pub fn push(&mut self, recipient: impl Into<String>) {
        self.0.push(recipient.into());
    }

    /// Removes and returns the first recipient equal to `name`, ignoring case.
    pub fn take_matching(&mut self, name: &str) -> Option<String> {
        let name = name.to_lowercase();
        let pos = self.0.iter().position(|r| r.to_lowercase() == name)?;
        Some(self.0.remove(pos))
    }

    /// Removes and returns the earliest submitted recipient.
    pub fn take_first(&mut self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.remove(0))
        }
    }

    /// Returns the number of outstanding recipients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if every recipient has been answered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Forgets all outstanding recipients.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Iterates over outstanding recipients in submission order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Matches a server-reported recipient and stores its record.
    ///
    /// The record is keyed on the name the server reported, which may differ
    /// in case from the one submitted.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if `reported` matches no outstanding
    /// recipient.
    pub fn reconcile(
        &mut self,
        results: &mut Results,
        reported: &str,
        record: ClassificationRecord,
    ) -> Result<()> {
        if self.take_matching(reported).is_none() {
            return Err(Error::Protocol(format!(
                "Message was accepted for unknown recipient {reported}"
            )));
        }
        results.insert(reported.to_string(), record);
        Ok(())
    }
}
