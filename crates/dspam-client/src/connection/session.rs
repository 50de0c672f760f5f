//! LMTP/DLMTP session state machine.

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use super::results::read_response;
use super::{ClientConfig, ServerInfo, SocketStream, Transport, stream};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{has_code, is_last_reply_line, parse_reply};
use crate::types::{Capability, Outstanding, ReplyCode, Results};

/// Protocol step a session is at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No transport.
    Disconnected,
    /// Greeting received, LHLO not yet sent.
    Connected,
    /// LHLO accepted; ready for a sender. Also the state after a reset.
    Greeted,
    /// Envelope sender accepted.
    SenderSet,
    /// At least one recipient accepted.
    RecipientsSet,
    /// Message submitted and the response read.
    DataSent,
    /// QUIT sent and the transport closed.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Greeted => "greeted",
            Self::SenderSet => "sender set",
            Self::RecipientsSet => "recipients set",
            Self::DataSent => "data sent",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A client session with a DSPAM server.
///
/// The session owns at most one transport and drives it through the LMTP
/// steps in order. Results of the last data submission are kept, keyed by
/// recipient, until the next reset.
///
/// A session is not meant to be shared; run one session per task.
#[derive(Debug)]
pub struct Session<S = SocketStream> {
    config: ClientConfig,
    transport: Option<Transport<S>>,
    state: SessionState,
    server_info: ServerInfo,
    outstanding: Outstanding,
    results: Results,
}

impl<S> Session<S> {
    /// Creates a disconnected session.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            state: SessionState::Disconnected,
            server_info: ServerInfo::default(),
            outstanding: Outstanding::new(),
            results: Results::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the current protocol step.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Checks if a transport is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Checks if the server announced the DLMTP extension.
    #[must_use]
    pub fn enhanced_mode(&self) -> bool {
        self.server_info.enhanced_mode()
    }

    /// Returns what the server told us during connect and LHLO.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns the records of the last data submission.
    #[must_use]
    pub const fn results(&self) -> &Results {
        &self.results
    }

    /// Takes the records of the last data submission, leaving none behind.
    pub fn take_results(&mut self) -> Results {
        std::mem::take(&mut self.results)
    }

    /// Returns recipients accepted but not yet answered.
    #[must_use]
    pub const fn outstanding(&self) -> &Outstanding {
        &self.outstanding
    }

    fn require_disconnected(&self) -> Result<()> {
        if self.transport.is_some() {
            return Err(Error::Usage(format!(
                "Already connected to DSPAM server ({})",
                self.state
            )));
        }
        Ok(())
    }

    fn require_state(&self, allowed: &[SessionState], step: &str) -> Result<()> {
        if self.transport.is_none() {
            return Err(Error::Usage(format!(
                "Not connected to DSPAM server, cannot send {step}"
            )));
        }
        if !allowed.contains(&self.state) {
            return Err(Error::Usage(format!(
                "Cannot send {step} when session is {}",
                self.state
            )));
        }
        Ok(())
    }

    fn clear_transaction(&mut self) {
        self.outstanding.clear();
        self.results.clear();
    }
}

impl Session<SocketStream> {
    /// Connects, greets and returns a session ready for a sender.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket specification is invalid, the
    /// connection fails, or the server rejects the greeting.
    pub async fn open(config: ClientConfig) -> Result<Self> {
        let mut session = Self::new(config);
        session.connect().await?;
        session.greet(None).await?;
        Ok(session)
    }

    /// Opens the configured socket and reads the server greeting.
    ///
    /// Valid from [`SessionState::Disconnected`] and [`SessionState::Closed`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed socket specification,
    /// a connection error if the socket cannot be opened, or a protocol error
    /// if the greeting is not `220`.
    pub async fn connect(&mut self) -> Result<()> {
        self.require_disconnected()?;
        let spec = self.config.socket_spec()?;
        let stream = stream::open(&spec).await?;
        self.attach(stream).await
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Adopts an already-open stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns a usage error if a transport is already open, or a protocol
    /// error if the greeting is missing or not `220`.
    pub async fn attach(&mut self, stream: S) -> Result<()> {
        self.require_disconnected()?;

        let mut transport = Transport::new(stream);
        let line = transport
            .read_line()
            .await?
            .ok_or_else(|| Error::Protocol("Connection closed by server at connect".into()))?;
        if !has_code(&line, ReplyCode::SERVICE_READY) {
            return Err(Error::unexpected("connect", &line));
        }

        self.server_info = ServerInfo {
            greeting: line.get(4..).unwrap_or_default().to_string(),
            ..ServerInfo::default()
        };
        self.clear_transaction();
        self.transport = Some(transport);
        self.state = SessionState::Connected;
        tracing::debug!(greeting = %self.server_info.greeting, "Connected to DSPAM server");
        Ok(())
    }

    /// Sends LHLO and records the announced capabilities.
    ///
    /// Announces `identity` if given, else the configured identity, else the
    /// local host name.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if any line of the reply is not `250`.
    pub async fn greet(&mut self, identity: Option<&str>) -> Result<()> {
        self.require_state(&[SessionState::Connected], "LHLO")?;

        let hostname = identity.map_or_else(|| self.config.lhlo_name(), str::to_string);
        self.send(&Command::Lhlo { hostname }).await?;

        let mut lines = Vec::new();
        loop {
            let line = self.expect_line("LHLO").await?;
            if !has_code(&line, ReplyCode::OK) {
                return Err(Error::unexpected("LHLO", &line));
            }
            let last = is_last_reply_line(&line);
            lines.push(line);
            if last {
                break;
            }
        }

        let reply = parse_reply(&lines)?;
        for text in &reply.lines {
            let capability = Capability::parse(text);
            if capability.is_enhanced_mode() {
                tracing::debug!("Detected DLMTP extension in LHLO response");
            }
            self.server_info.capabilities.insert(capability);
        }

        self.state = SessionState::Greeted;
        Ok(())
    }

    /// Sends MAIL FROM.
    ///
    /// Takes either an explicit `sender` or DLMTP client `args` (see
    /// [`ClientArgs`](crate::types::ClientArgs)), never both. Without an
    /// explicit sender the configured credentials are sent as
    /// `<password@ident>` when present. Empty strings count as absent.
    ///
    /// # Errors
    ///
    /// Returns a usage error if both are given or if `args` is given without
    /// enhanced mode, and a protocol error if the server rejects the sender.
    pub async fn set_sender(&mut self, sender: Option<&str>, args: Option<&str>) -> Result<()> {
        self.require_state(&[SessionState::Greeted], "MAIL FROM")?;

        let sender = sender.filter(|s| !s.is_empty());
        let args = args.filter(|a| !a.is_empty());
        if sender.is_some() && args.is_some() {
            return Err(Error::Usage(
                "Arguments are mutually exclusive: sender and client args".into(),
            ));
        }
        if args.is_some() && !self.enhanced_mode() {
            return Err(Error::Usage(
                "Cannot send client args, server does not support DLMTP".into(),
            ));
        }

        let sender = sender
            .map(str::to_string)
            .or_else(|| self.config.dlmtp_sender())
            .unwrap_or_default();
        let command = Command::MailFrom {
            sender,
            args: args.map(str::to_string),
        };
        let line = self.exchange(&command).await?;
        if !has_code(&line, ReplyCode::OK) {
            return Err(Error::unexpected("MAIL FROM", &line));
        }

        self.state = SessionState::SenderSet;
        Ok(())
    }

    /// Sends RCPT TO for each recipient, in order.
    ///
    /// Accepted recipients become outstanding until the data response
    /// answers them.
    ///
    /// # Errors
    ///
    /// Returns a usage error for an empty list, and a protocol error naming
    /// the first recipient the server rejects.
    pub async fn set_recipients<R: AsRef<str>>(&mut self, recipients: &[R]) -> Result<()> {
        self.require_state(
            &[SessionState::SenderSet, SessionState::RecipientsSet],
            "RCPT TO",
        )?;
        if recipients.is_empty() {
            return Err(Error::Usage("No recipients given".into()));
        }

        for recipient in recipients {
            let recipient = recipient.as_ref();
            let command = Command::RcptTo {
                recipient: recipient.to_string(),
            };
            let line = self.exchange(&command).await?;
            if !has_code(&line, ReplyCode::OK) {
                return Err(Error::Protocol(format!(
                    "Unexpected server response at RCPT TO for recipient {recipient}: {line}"
                )));
            }
            self.outstanding.push(recipient);
            self.state = SessionState::RecipientsSet;
        }
        Ok(())
    }

    /// Sends DATA, the message and the terminator, then reads the result for
    /// every outstanding recipient.
    ///
    /// Lines are split on LF; a trailing CR on each line is dropped and CRLF
    /// is sent instead. Every line starting with a dot is dot-stuffed, so
    /// `.foo` goes out as `..foo` as well as a lone `.` going out as `..`.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if DATA is not answered with `354` or the
    /// response cannot be matched to the outstanding recipients.
    pub async fn submit_data(&mut self, payload: impl AsRef<[u8]>) -> Result<()> {
        self.require_state(&[SessionState::RecipientsSet], "DATA")?;

        let line = self.exchange(&Command::Data).await?;
        if !has_code(&line, ReplyCode::START_DATA) {
            return Err(Error::unexpected("DATA", &line));
        }

        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| Error::Usage("Not connected to DSPAM server".into()))?;
        for line in payload_lines(payload.as_ref()) {
            if line.starts_with(b".") {
                let mut stuffed = Vec::with_capacity(line.len() + 1);
                stuffed.push(b'.');
                stuffed.extend_from_slice(line);
                transport.queue_line(&stuffed);
            } else {
                transport.queue_line(line);
            }
        }
        transport.queue_line(b".");
        transport.flush().await?;

        read_response(transport, &mut self.outstanding, &mut self.results).await?;
        self.state = SessionState::DataSent;
        Ok(())
    }

    /// Sends RSET and forgets outstanding recipients and results.
    ///
    /// A reply other than `250` is only logged, since nothing can be done
    /// about it from here.
    ///
    /// # Errors
    ///
    /// Returns a usage error if not connected, or an I/O error from the
    /// exchange. Local state is cleared either way.
    pub async fn reset(&mut self) -> Result<()> {
        if self.transport.is_none() {
            return Err(Error::Usage(
                "Not connected to DSPAM server, cannot send RSET".into(),
            ));
        }

        let outcome = self.exchange(&Command::Rset).await;
        self.clear_transaction();
        if self.state != SessionState::Connected {
            self.state = SessionState::Greeted;
        }

        match outcome? {
            line if has_code(&line, ReplyCode::OK) => {}
            line => tracing::warn!(response = %line, "Unexpected server response at RSET"),
        }
        Ok(())
    }

    /// Sends QUIT and closes the transport.
    ///
    /// The transport is closed even if the exchange fails. Quitting a
    /// session that is not connected only marks it closed.
    ///
    /// # Errors
    ///
    /// Returns the error of a failed exchange, after cleaning up.
    pub async fn quit(&mut self) -> Result<()> {
        if self.transport.is_none() {
            self.state = SessionState::Closed;
            return Ok(());
        }

        let outcome = self.exchange(&Command::Quit).await;
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.shutdown().await {
                tracing::debug!(error = %e, "Failed to shut down DSPAM connection");
            }
        }
        self.clear_transaction();
        self.state = SessionState::Closed;

        match outcome? {
            line if has_code(&line, ReplyCode::CLOSING) => {}
            line => tracing::warn!(response = %line, "Unexpected server response at QUIT"),
        }
        Ok(())
    }

    fn transport_mut(&mut self) -> Result<&mut Transport<S>> {
        self.transport
            .as_mut()
            .ok_or_else(|| Error::Usage("Not connected to DSPAM server".into()))
    }

    async fn send(&mut self, command: &Command) -> Result<()> {
        self.transport_mut()?.send_line(&command.serialize()).await
    }

    async fn expect_line(&mut self, step: &str) -> Result<String> {
        self.transport_mut()?
            .read_line()
            .await?
            .ok_or_else(|| Error::Protocol(format!("Connection closed by server at {step}")))
    }

    /// Sends a command and reads its one-line reply.
    async fn exchange(&mut self, command: &Command) -> Result<String> {
        self.send(command).await?;
        self.expect_line(command.verb()).await
    }
}

/// Splits a payload into lines without their terminators.
///
/// A final LF does not start another line.
fn payload_lines(payload: &[u8]) -> impl Iterator<Item = &[u8]> {
    let body = payload.strip_suffix(b"\n").unwrap_or(payload);
    body.split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
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
    use crate::types::ClassificationRecord;
    use tokio_test::io::{Builder, Mock};

    const GREETING: &[u8] = b"220 DSPAM LMTP 3.10.2 Ready\r\n";

    fn config() -> ClientConfig {
        ClientConfig::builder().helo_name("localhost").build()
    }

    async fn attached(mock: Mock) -> Session<Mock> {
        let mut session = Session::new(config());
        session.attach(mock).await.unwrap();
        session
    }

    #[test]
    fn test_payload_lines() {
        let lines: Vec<&[u8]> = payload_lines(b"foo\r\nbar\nbaz").collect();
        assert_eq!(lines, vec![&b"foo"[..], b"bar", b"baz"]);

        let lines: Vec<&[u8]> = payload_lines(b"foo\n").collect();
        assert_eq!(lines, vec![&b"foo"[..]]);

        let lines: Vec<&[u8]> = payload_lines(b"").collect();
        assert_eq!(lines, vec![&b""[..]]);

        let lines: Vec<&[u8]> = payload_lines(b"a\n\nb\n").collect();
        assert_eq!(lines, vec![&b"a"[..], b"", b"b"]);
    }

    #[tokio::test]
    async fn test_attach_reads_greeting() {
        let session = attached(Builder::new().read(GREETING).build()).await;
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.is_connected());
        assert_eq!(session.server_info().greeting, "DSPAM LMTP 3.10.2 Ready");
    }

    #[tokio::test]
    async fn test_attach_rejects_bad_greeting() {
        let mock = Builder::new().read(b"421 Service not available\r\n").build();
        let mut session: Session<Mock> = Session::new(config());
        let err = session.attach(mock).await.unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("at connect: 421"));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_attach_twice() {
        let mut session = attached(Builder::new().read(GREETING).build()).await;
        let err = session.attach(Builder::new().build()).await.unwrap_err();
        assert!(err.is_usage());
    }

    #[tokio::test]
    async fn test_greet_detects_enhanced_mode_on_any_line() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"LHLO localhost\r\n")
            .read(b"250-localhost.localdomain\r\n250-PIPELINING\r\n")
            .read(b"250-ENHANCEDSTATUSCODES\r\n250-DSPAMPROCESSMODE\r\n250 SIZE\r\n")
            .build();
        let mut session = attached(mock).await;
        session.greet(None).await.unwrap();

        assert_eq!(session.state(), SessionState::Greeted);
        assert!(session.enhanced_mode());
        assert!(session.server_info().supports(&Capability::Pipelining));
        assert!(session.server_info().supports(&Capability::Size(None)));
    }

    #[tokio::test]
    async fn test_greet_without_enhanced_mode() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"LHLO foo\r\n")
            .read(b"250-localhost.localdomain\r\n250 PIPELINING\r\n")
            .build();
        let mut session = attached(mock).await;
        session.greet(Some("foo")).await.unwrap();
        assert!(!session.enhanced_mode());
    }

    #[tokio::test]
    async fn test_greet_uses_identity() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"LHLO bar\r\n")
            .read(b"250 localhost\r\n")
            .build();
        let mut session: Session<Mock> =
            Session::new(ClientConfig::builder().credentials("bar", "baz").build());
        session.attach(mock).await.unwrap();
        session.greet(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_greet_rejects_non_success_line() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"LHLO localhost\r\n")
            .read(b"250-localhost\r\n503 5.5.1 Error\r\n")
            .build();
        let mut session = attached(mock).await;
        let err = session.greet(None).await.unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("LHLO: 503 5.5.1 Error"));
    }

    #[tokio::test]
    async fn test_greet_requires_connection() {
        let mut session: Session<Mock> = Session::new(config());
        assert!(session.greet(None).await.unwrap_err().is_usage());
    }

    fn greeted(enhanced: bool) -> Builder {
        let mut builder = Builder::new();
        builder.read(GREETING).write(b"LHLO localhost\r\n");
        if enhanced {
            builder.read(b"250-localhost\r\n250 DSPAMPROCESSMODE\r\n");
        } else {
            builder.read(b"250 localhost\r\n");
        }
        builder
    }

    async fn greeted_session(builder: &mut Builder) -> Session<Mock> {
        let mut session = attached(builder.build()).await;
        session.greet(None).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_set_sender_empty() {
        let mut builder = greeted(false);
        builder.write(b"MAIL FROM:<>\r\n").read(b"250 2.1.0 OK\r\n");
        let mut session = greeted_session(&mut builder).await;
        session.set_sender(None, None).await.unwrap();
        assert_eq!(session.state(), SessionState::SenderSet);
    }

    #[tokio::test]
    async fn test_set_sender_explicit() {
        let mut builder = greeted(false);
        builder
            .write(b"MAIL FROM:<foo@example.org>\r\n")
            .read(b"250 2.1.0 OK\r\n");
        let mut session = greeted_session(&mut builder).await;
        session
            .set_sender(Some("foo@example.org"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_sender_with_args() {
        let mut builder = greeted(true);
        builder
            .write(b"MAIL FROM:<> DSPAMPROCESSMODE=\"--classify\"\r\n")
            .read(b"250 2.1.0 OK\r\n");
        let mut session = greeted_session(&mut builder).await;
        session.set_sender(None, Some("--classify")).await.unwrap();
    }

    #[tokio::test]
    async fn test_set_sender_both_is_usage_error() {
        let mut session = greeted_session(&mut greeted(true)).await;
        let err = session
            .set_sender(Some("foo"), Some("--classify"))
            .await
            .unwrap_err();
        assert!(err.is_usage());
        assert_eq!(session.state(), SessionState::Greeted);
    }

    #[tokio::test]
    async fn test_set_sender_args_need_enhanced_mode() {
        // Nothing may be written: the mock fails on unexpected writes.
        let mut session = greeted_session(&mut greeted(false)).await;
        let err = session.set_sender(None, Some("--classify")).await.unwrap_err();
        assert!(err.is_usage());
        assert!(err.to_string().contains("DLMTP"));
    }

    #[tokio::test]
    async fn test_set_sender_rejected() {
        let mut builder = greeted(false);
        builder
            .write(b"MAIL FROM:<>\r\n")
            .read(b"530 5.7.0 Authentication required\r\n");
        let mut session = greeted_session(&mut builder).await;
        let err = session.set_sender(None, None).await.unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("MAIL FROM: 530"));
    }

    #[tokio::test]
    async fn test_set_sender_requires_greeting() {
        let mut session = attached(Builder::new().read(GREETING).build()).await;
        let err = session.set_sender(None, None).await.unwrap_err();
        assert!(err.is_usage());
    }

    #[tokio::test]
    async fn test_set_recipients() {
        let mut builder = greeted(false);
        builder
            .write(b"MAIL FROM:<>\r\n")
            .read(b"250 2.1.0 OK\r\n")
            .write(b"RCPT TO:<foo>\r\n")
            .read(b"250 2.1.5 <foo> OK\r\n")
            .write(b"RCPT TO:<bar>\r\n")
            .read(b"250 2.1.5 <bar> OK\r\n");
        let mut session = greeted_session(&mut builder).await;
        session.set_sender(None, None).await.unwrap();
        session.set_recipients(&["foo", "bar"]).await.unwrap();

        assert_eq!(session.state(), SessionState::RecipientsSet);
        assert_eq!(
            session.outstanding().iter().collect::<Vec<_>>(),
            vec!["foo", "bar"]
        );
    }

    #[tokio::test]
    async fn test_set_recipients_rejected() {
        let mut builder = greeted(false);
        builder
            .write(b"MAIL FROM:<>\r\n")
            .read(b"250 2.1.0 OK\r\n")
            .write(b"RCPT TO:<foo>\r\n")
            .read(b"250 2.1.5 <foo> OK\r\n")
            .write(b"RCPT TO:<bar>\r\n")
            .read(b"550 5.1.1 <bar>: Recipient address rejected\r\n");
        let mut session = greeted_session(&mut builder).await;
        session.set_sender(None, None).await.unwrap();
        let err = session.set_recipients(&["foo", "bar"]).await.unwrap_err();

        assert!(err.is_protocol());
        assert!(err.to_string().contains("for recipient bar"));
        assert_eq!(session.outstanding().len(), 1);
    }

    #[tokio::test]
    async fn test_set_recipients_empty() {
        let mut builder = greeted(false);
        builder.write(b"MAIL FROM:<>\r\n").read(b"250 2.1.0 OK\r\n");
        let mut session = greeted_session(&mut builder).await;
        session.set_sender(None, None).await.unwrap();
        let none: [&str; 0] = [];
        assert!(session.set_recipients(&none).await.unwrap_err().is_usage());
    }

    fn with_recipient(builder: &mut Builder) {
        builder
            .write(b"MAIL FROM:<>\r\n")
            .read(b"250 2.1.0 OK\r\n")
            .write(b"RCPT TO:<foo>\r\n")
            .read(b"250 2.1.5 <foo> OK\r\n");
    }

    async fn ready_for_data(builder: &mut Builder) -> Session<Mock> {
        let mut session = greeted_session(builder).await;
        session.set_sender(None, None).await.unwrap();
        session.set_recipients(&["foo"]).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_submit_data() {
        let mut builder = greeted(false);
        with_recipient(&mut builder);
        builder
            .write(b"DATA\r\n")
            .read(b"354 Enter mail, end with \".\" on a line by itself\r\n")
            .write(b"Subject: test\r\n\r\n..\r\n..hidden\r\nend\r\n.\r\n")
            .read(b"250 2.6.0 <foo> Message accepted for delivery\r\n");
        let mut session = ready_for_data(&mut builder).await;
        session
            .submit_data("Subject: test\r\n\r\n.\n.hidden\nend\n")
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::DataSent);
        assert!(session.outstanding().is_empty());
        assert_eq!(
            session.results().get("foo"),
            Some(&ClassificationRecord::Accepted)
        );
    }

    #[tokio::test]
    async fn test_submit_data_rejected() {
        let mut builder = greeted(false);
        with_recipient(&mut builder);
        builder
            .write(b"DATA\r\n")
            .read(b"503 5.5.1 No recipients\r\n");
        let mut session = ready_for_data(&mut builder).await;
        let err = session.submit_data("foo").await.unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("DATA: 503"));
    }

    #[tokio::test]
    async fn test_submit_data_requires_recipients() {
        let mut session = greeted_session(&mut greeted(false)).await;
        assert!(session.submit_data("foo").await.unwrap_err().is_usage());
    }

    #[tokio::test]
    async fn test_reset_clears_transaction() {
        let mut builder = greeted(false);
        with_recipient(&mut builder);
        builder.write(b"RSET\r\n").read(b"250 2.0.0 OK\r\n");
        let mut session = ready_for_data(&mut builder).await;
        session.reset().await.unwrap();

        assert_eq!(session.state(), SessionState::Greeted);
        assert!(session.outstanding().is_empty());
        assert!(session.results().is_empty());
    }

    #[tokio::test]
    async fn test_reset_tolerates_failure_reply() {
        let mut builder = greeted(false);
        with_recipient(&mut builder);
        builder.write(b"RSET\r\n").read(b"451 4.3.0 Error\r\n");
        let mut session = ready_for_data(&mut builder).await;
        session.reset().await.unwrap();
        assert_eq!(session.state(), SessionState::Greeted);
        assert!(session.outstanding().is_empty());
    }

    #[tokio::test]
    async fn test_reset_requires_connection() {
        let mut session: Session<Mock> = Session::new(config());
        assert!(session.reset().await.unwrap_err().is_usage());
    }

    #[tokio::test]
    async fn test_quit() {
        let mut builder = greeted(false);
        builder.write(b"QUIT\r\n").read(b"221 2.0.0 Bye\r\n");
        let mut session = greeted_session(&mut builder).await;
        session.quit().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_quit_tolerates_failure_reply() {
        let mut builder = greeted(false);
        builder.write(b"QUIT\r\n").read(b"500 5.5.1 Error\r\n");
        let mut session = greeted_session(&mut builder).await;
        session.quit().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_quit_closes_on_eof() {
        let mut builder = greeted(false);
        builder.write(b"QUIT\r\n");
        let mut session = greeted_session(&mut builder).await;
        assert!(session.quit().await.unwrap_err().is_protocol());
        assert!(!session.is_connected());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_quit_when_disconnected() {
        let mut session: Session<Mock> = Session::new(config());
        session.quit().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::RecipientsSet.to_string(), "recipients set");
    }
}
