//! LMTP capability types.

/// Keyword announcing the enhanced (DLMTP) mode.
pub const DSPAM_PROCESS_MODE: &str = "DSPAMPROCESSMODE";

/// Capabilities advertised in the LHLO response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// DSPAMPROCESSMODE - enhanced mode, client arguments accepted at MAIL FROM
    DspamProcessMode,
    /// PIPELINING - Command pipelining
    Pipelining,
    /// ENHANCEDSTATUSCODES - Dotted status codes in replies
    EnhancedStatusCodes,
    /// 8BITMIME - 8-bit MIME transport
    EightBitMime,
    /// SIZE - Maximum message size
    Size(Option<usize>),
    /// Unknown capability (the server's hostname line ends up here too)
    Unknown(String),
}

impl Capability {
    /// Parses a capability line from the LHLO response.
    ///
    /// The line is expected without its reply code and separator.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            return Self::Unknown(line.to_string());
        };

        match keyword.to_uppercase().as_str() {
            DSPAM_PROCESS_MODE => Self::DspamProcessMode,
            "PIPELINING" => Self::Pipelining,
            "ENHANCEDSTATUSCODES" => Self::EnhancedStatusCodes,
            "8BITMIME" => Self::EightBitMime,
            "SIZE" => Self::Size(parts.next().and_then(|s| s.parse().ok())),
            _ => Self::Unknown(line.to_string()),
        }
    }

    /// Returns true if this capability enables the enhanced mode.
    #[must_use]
    pub const fn is_enhanced_mode(&self) -> bool {
        matches!(self, Self::DspamProcessMode)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn parse_dspam_process_mode() {
        assert_eq!(
            Capability::parse("DSPAMPROCESSMODE"),
            Capability::DspamProcessMode
        );
        assert!(Capability::parse("dspamprocessmode").is_enhanced_mode());
    }

    #[test]
    fn parse_standard_keywords() {
        assert_eq!(Capability::parse("PIPELINING"), Capability::Pipelining);
        assert_eq!(
            Capability::parse("ENHANCEDSTATUSCODES"),
            Capability::EnhancedStatusCodes
        );
        assert_eq!(Capability::parse("8BITMIME"), Capability::EightBitMime);
    }

    #[test]
    fn parse_size() {
        assert_eq!(
            Capability::parse("SIZE 52428800"),
            Capability::Size(Some(52_428_800))
        );
        assert_eq!(Capability::parse("SIZE"), Capability::Size(None));
    }

    #[test]
    fn parse_hostname_is_unknown() {
        let cap = Capability::parse("localhost.localdomain");
        assert_eq!(
            cap,
            Capability::Unknown("localhost.localdomain".to_string())
        );
        assert!(!cap.is_enhanced_mode());
    }

    #[test]
    fn parse_empty() {
        assert!(matches!(Capability::parse(""), Capability::Unknown(_)));
    }
}
