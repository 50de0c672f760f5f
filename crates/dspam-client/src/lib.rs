//! # dspam-client
//!
//! An async client for the DSPAM LMTP/DLMTP classification protocol.
//!
//! ## Features
//!
//! - **LMTP and DLMTP**: plain LMTP delivery through DSPAM, and the enhanced
//!   `DSPAMPROCESSMODE` extension for classification and training
//! - **Three response formats**: standard acknowledgements, `X-DSPAM-Result`
//!   summaries, and rewritten messages (`--deliver=stdout`)
//! - **TCP and UNIX sockets**: `inet:24@localhost`, `inet6:24@::1`,
//!   `unix:/var/run/dspam/dspam.sock`
//! - **Generic streams**: the session runs over any `AsyncRead + AsyncWrite`
//!
//! ## Quick Start
//!
//! ```ignore
//! use dspam_client::{ClientConfig, Session};
//!
//! #[tokio::main]
//! async fn main() -> dspam_client::Result<()> {
//!     let config = ClientConfig::builder()
//!         .socket("inet:2424@localhost")
//!         .credentials("client", "secret")
//!         .build();
//!
//!     let mut session = Session::new(config);
//!     let record = session.classify(b"Subject: hi\r\n\r\nhello\r\n", "user").await?;
//!     println!("{:?}", record.class());
//!
//!     session.quit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Session States
//!
//! ```text
//! Disconnected ─ connect() ─→ Connected ─ greet() ─→ Greeted
//!                                                       │
//!        ┌──────────────── reset() ─────────────────────┤
//!        │                                              │
//!        │                                         set_sender()
//!        │                                              ↓
//!    DataSent ←─ submit_data() ── RecipientsSet ←─ SenderSet
//!                                       set_recipients()
//!
//! any state ─ quit() ─→ Closed ─ connect() ─→ Connected
//! ```
//!
//! ## Modules
//!
//! - [`command`]: LMTP command builders
//! - [`connection`]: Sockets, transport and the session state machine
//! - [`parser`]: Reply and response-line parsers
//! - [`types`]: Replies, capabilities, client arguments and records

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
mod operations;
pub mod parser;
pub mod types;

pub use connection::{
    ClientConfig, ClientConfigBuilder, DEFAULT_SOCKET, ServerInfo, Session, SessionState,
    SocketSpec,
};
pub use error::{Error, Result};
pub use types::{
    Class, ClassificationRecord, ClientArgs, Delivery, Reply, ReplyCode, Results, Source,
    Summary,
};
