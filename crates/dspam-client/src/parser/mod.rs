//! LMTP reply and DSPAM result parsers.
//!
//! Command replies follow the usual SMTP shape (`250 OK`,
//! `250-PIPELINING`). What follows the end of a data submission does not:
//! see [`response`] for the three result encodings.

pub mod response;

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Parses an LMTP reply from response lines.
///
/// Replies can be single-line or multi-line:
/// - Single: `250 OK`
/// - Multi: `250-localhost\r\n250-DSPAMPROCESSMODE\r\n250 SIZE`
///
/// Only the code of the first line is used; LHLO blocks never mix codes.
///
/// # Errors
///
/// Returns an error if the reply is malformed.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::Protocol("Empty reply".into()));
    };

    let code = parse_code(first)?;

    let mut message = Vec::new();
    for line in lines {
        if line.len() < 3 {
            return Err(Error::Protocol(format!("Malformed reply line: {line}")));
        }
        // Skip code and separator (e.g., "250-" or "250 ")
        message.push(line.get(4..).unwrap_or_default().to_string());
    }

    Ok(Reply::new(code, message))
}

/// Parses the reply code at the start of a line.
///
/// # Errors
///
/// Returns an error if the line does not start with three digits.
pub fn parse_code(line: &str) -> Result<ReplyCode> {
    let code_str = line
        .get(0..3)
        .ok_or_else(|| Error::Protocol(format!("Reply too short: {line}")))?;

    if !code_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Protocol(format!("Invalid reply code: {code_str}")));
    }

    code_str
        .parse::<u16>()
        .map(ReplyCode::new)
        .map_err(|_| Error::Protocol(format!("Invalid reply code: {code_str}")))
}

/// Returns true if the line starts with the given reply code.
#[must_use]
pub fn has_code(line: &str, code: ReplyCode) -> bool {
    parse_code(line).is_ok_and(|c| c == code)
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Multi-line replies use `-` after the code for continuation and ` ` for
/// the last line. A bare code also ends the reply.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    match line.as_bytes().get(3) {
        Some(&b) => b != b'-',
        None => true,
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
    fn test_parse_single_line_reply() {
        let lines = vec!["250 OK".to_string()];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.lines, vec!["OK"]);
    }

    #[test]
    fn test_parse_lhlo_block() {
        let lines = vec![
            "250-localhost.localdomain".to_string(),
            "250-DSPAMPROCESSMODE".to_string(),
            "250 SIZE".to_string(),
        ];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(
            reply.lines,
            vec!["localhost.localdomain", "DSPAMPROCESSMODE", "SIZE"]
        );
    }

    #[test]
    fn test_parse_greeting() {
        let lines = vec!["220 DSPAM DLMTP 3.10.2 Authentication Required".to_string()];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code, ReplyCode::SERVICE_READY);
    }

    #[test]
    fn test_has_code() {
        assert!(has_code("221 2.0.0 OK", ReplyCode::CLOSING));
        assert!(has_code("354", ReplyCode::START_DATA));
        assert!(!has_code("250 OK", ReplyCode::START_DATA));
        assert!(!has_code("foo", ReplyCode::OK));
        assert!(!has_code("", ReplyCode::OK));
    }

    #[test]
    fn test_is_last_reply_line() {
        assert!(is_last_reply_line("250 SIZE"));
        assert!(!is_last_reply_line("250-8BITMIME"));
        assert!(is_last_reply_line("250"));
    }

    #[test]
    fn test_parse_error_empty() {
        assert!(parse_reply(&[]).is_err());
    }

    #[test]
    fn test_parse_error_too_short() {
        let lines = vec!["25".to_string()];
        assert!(parse_reply(&lines).is_err());
    }

    #[test]
    fn test_parse_error_invalid_code() {
        let lines = vec!["ABC OK".to_string()];
        assert!(parse_reply(&lines).is_err());
        assert!(parse_code("+25 OK").is_err());
    }
}
