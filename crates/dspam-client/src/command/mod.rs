//! LMTP command builder.

use crate::types::DSPAM_PROCESS_MODE;

/// LMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// LHLO - LMTP greeting
    Lhlo {
        /// Client hostname, or the DLMTP identity
        hostname: String,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Envelope sender, possibly empty
        sender: String,
        /// DSPAMPROCESSMODE client arguments
        args: Option<String>,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient (DSPAM user)
        recipient: String,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::Lhlo { hostname } => {
                buf.extend_from_slice(b"LHLO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::MailFrom { sender, args } => {
                buf.extend_from_slice(b"MAIL FROM:<");
                buf.extend_from_slice(sender.as_bytes());
                buf.push(b'>');
                if let Some(args) = args {
                    buf.push(b' ');
                    buf.extend_from_slice(DSPAM_PROCESS_MODE.as_bytes());
                    buf.extend_from_slice(b"=\"");
                    buf.extend_from_slice(args.as_bytes());
                    buf.push(b'"');
                }
            }
            Self::RcptTo { recipient } => {
                buf.extend_from_slice(b"RCPT TO:<");
                buf.extend_from_slice(recipient.as_bytes());
                buf.push(b'>');
            }
            Self::Data => {
                buf.extend_from_slice(b"DATA");
            }
            Self::Rset => {
                buf.extend_from_slice(b"RSET");
            }
            Self::Quit => {
                buf.extend_from_slice(b"QUIT");
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns the command verb, used to name the protocol step in errors.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Lhlo { .. } => "LHLO",
            Self::MailFrom { .. } => "MAIL FROM",
            Self::RcptTo { .. } => "RCPT TO",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Quit => "QUIT",
        }
    }
}
