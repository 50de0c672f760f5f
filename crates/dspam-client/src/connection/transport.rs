//! Line-oriented transport for the LMTP dialogue.
//!
//! Lines are written with CRLF endings whatever the caller passes in, and
//! read up to LF with every CR dropped. Reads go through an internal buffer
//! so that the session can look ahead ([`Transport::peek`]) or check for
//! pending bytes ([`Transport::probe_available`]) without losing data.

use std::borrow::Cow;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::Poll;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::error::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Buffered line transport over any async byte stream.
#[derive(Debug)]
pub struct Transport<S> {
    stream: S,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Queues a line for sending, repairing its line ending.
    pub fn queue_line(&mut self, line: &[u8]) {
        let line = normalize_line(line);
        tracing::trace!("C: {}", String::from_utf8_lossy(line.trim_ascii_end()));
        self.write_buffer.extend_from_slice(&line);
    }

    /// Writes all queued lines to the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn flush(&mut self) -> Result<()> {
        self.stream.write_all(&self.write_buffer).await?;
        self.stream.flush().await?;
        self.write_buffer.clear();
        Ok(())
    }

    /// Sends a single line, terminated by CRLF.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn send_line(&mut self, line: &[u8]) -> Result<()> {
        self.queue_line(line);
        self.flush().await
    }

    /// Reads a single line, without its terminator.
    ///
    /// Carriage returns are dropped wherever they occur; the line ends at
    /// the first LF. Returns `None` if the peer closed the connection before
    /// sending anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the line exceeds the length
    /// limit.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let mut scanned = 0;
        loop {
            if let Some(found) = self.read_buffer[scanned..].iter().position(|&b| b == b'\n') {
                let pos = scanned + found;
                let raw = self.read_buffer.split_to(pos + 1);
                let line = decode_line(&raw[..pos]);
                tracing::trace!("S: {line}");
                return Ok(Some(line));
            }

            if self.read_buffer.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
            scanned = self.read_buffer.len();

            if self.fill().await? == 0 {
                if self.read_buffer.is_empty() {
                    return Ok(None);
                }
                let raw = self.read_buffer.split();
                let line = decode_line(&raw);
                tracing::trace!("S: {line}");
                return Ok(Some(line));
            }
        }
    }

    /// Looks at up to `n` upcoming bytes without consuming them.
    ///
    /// Reads until `n` bytes are buffered, a line ending is buffered, or the
    /// peer closes the connection, whichever comes first. Only use this when
    /// the server is known to be sending.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn peek(&mut self, n: usize) -> Result<&[u8]> {
        while self.read_buffer.len() < n && !self.read_buffer.contains(&b'\n') {
            if self.fill().await? == 0 {
                break;
            }
        }
        let len = n.min(self.read_buffer.len());
        tracing::trace!(
            "S (peek): {}",
            String::from_utf8_lossy(&self.read_buffer[..len]).trim_end()
        );
        Ok(&self.read_buffer[..len])
    }

    /// Checks, without waiting, whether more bytes are available.
    ///
    /// Yields to the runtime once so socket readiness is current, then polls
    /// the stream exactly once. Bytes obtained by the poll stay in the read
    /// buffer for the next read. A closed connection counts as no bytes
    /// available.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream reports a failure other than
    /// `WouldBlock`.
    pub async fn probe_available(&mut self) -> Result<bool> {
        if !self.read_buffer.is_empty() {
            return Ok(true);
        }

        // Readiness is cached after a short read until the I/O driver runs.
        tokio::task::yield_now().await;

        let mut chunk = [0u8; DEFAULT_BUFFER_SIZE];
        let stream = &mut self.stream;
        let polled = poll_fn(|cx| {
            let mut buf = ReadBuf::new(&mut chunk);
            let outcome = match Pin::new(&mut *stream).poll_read(cx, &mut buf) {
                Poll::Ready(Ok(())) => Ok(buf.filled().len()),
                Poll::Ready(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
                Poll::Ready(Err(e)) => Err(e),
                Poll::Pending => Ok(0),
            };
            Poll::Ready(outcome)
        })
        .await?;

        self.read_buffer.extend_from_slice(&chunk[..polled]);
        Ok(polled > 0)
    }

    /// Shuts down the write side of the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Reads more bytes into the buffer. Returns 0 at end of stream.
    async fn fill(&mut self) -> Result<usize> {
        self.read_buffer.reserve(DEFAULT_BUFFER_SIZE);
        let n = self.stream.read_buf(&mut self.read_buffer).await?;
        Ok(n)
    }
}

/// Repairs the line ending of an outgoing line.
///
/// A line already ending in CRLF is left alone, a bare trailing LF becomes
/// CRLF and anything else gets CRLF appended. Interior bytes are untouched.
#[must_use]
pub fn normalize_line(line: &[u8]) -> Cow<'_, [u8]> {
    if line.ends_with(b"\r\n") {
        return Cow::Borrowed(line);
    }

    let mut fixed = Vec::with_capacity(line.len() + 2);
    if let Some(body) = line.strip_suffix(b"\n") {
        tracing::trace!("Fixing bare LF before sending data to socket");
        fixed.extend_from_slice(body);
    } else {
        tracing::trace!("Fixing missing CRLF before sending data to socket");
        fixed.extend_from_slice(line);
    }
    fixed.extend_from_slice(b"\r\n");
    Cow::Owned(fixed)
}

/// Decodes a raw line with all CR bytes removed.
fn decode_line(raw: &[u8]) -> String {
    let stripped: Vec<u8> = raw.iter().copied().filter(|&b| b != b'\r').collect();
    String::from_utf8_lossy(&stripped).into_owned()
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
    use proptest::prelude::*;
    use std::time::Duration;
    use tokio_test::io::Builder;

    #[test]
    fn test_normalize_line() {
        assert_eq!(normalize_line(b"foo\r\n").as_ref(), b"foo\r\n");
        assert_eq!(normalize_line(b"foo\n").as_ref(), b"foo\r\n");
        assert_eq!(normalize_line(b"foo").as_ref(), b"foo\r\n");
        assert_eq!(normalize_line(b"foo\r").as_ref(), b"foo\r\r\n");
        assert_eq!(normalize_line(b"").as_ref(), b"\r\n");
    }

    proptest! {
        #[test]
        fn prop_normalize_appends_single_crlf(body in "[^\r\n]*", ending in prop::sample::select(vec!["", "\n", "\r\n"])) {
            let input = format!("{body}{ending}");
            let output = normalize_line(input.as_bytes());
            let expected = format!("{body}\r\n");
            prop_assert_eq!(output.as_ref(), expected.as_bytes());
        }

        #[test]
        fn prop_normalize_keeps_interior(body in "[a-z\r\n]{0,40}") {
            let output = normalize_line(body.as_bytes()).into_owned();
            prop_assert!(output.ends_with(b"\r\n"));
            let keep = body.strip_suffix("\r\n").or_else(|| body.strip_suffix('\n')).unwrap_or(&body);
            prop_assert_eq!(&output[..output.len() - 2], keep.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_send_line() {
        let mock = Builder::new().write(b"foo\r\n").write(b"bar\r\n").build();
        let mut transport = Transport::new(mock);
        transport.send_line(b"foo\n").await.unwrap();
        transport.send_line(b"bar").await.unwrap();
    }

    #[tokio::test]
    async fn test_queue_and_flush() {
        let mock = Builder::new().write(b"a\r\n..\r\n.\r\n").build();
        let mut transport = Transport::new(mock);
        transport.queue_line(b"a");
        transport.queue_line(b"..");
        transport.queue_line(b".\r\n");
        transport.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_line() {
        let mock = Builder::new()
            .read(b"f")
            .read(b"oo\r")
            .read(b"\nbar\nba\rz\r\n")
            .build();
        let mut transport = Transport::new(mock);
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("foo"));
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("bar"));
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("baz"));
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_line_empty_line_is_not_eof() {
        let mock = Builder::new().read(b"\r\n").build();
        let mut transport = Transport::new(mock);
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_line_unterminated_tail() {
        let mock = Builder::new().read(b"qux").build();
        let mut transport = Transport::new(mock);
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("qux"));
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let mock = Builder::new()
            .read(b"X-DSPAM")
            .read(b"-Result: foo; result=\"Spam\"\r\n")
            .build();
        let mut transport = Transport::new(mock);

        let head = transport.peek(24).await.unwrap();
        assert_eq!(head, b"X-DSPAM-Result: foo; res");
        assert_eq!(
            transport.read_line().await.unwrap().as_deref(),
            Some("X-DSPAM-Result: foo; result=\"Spam\"")
        );
    }

    #[tokio::test]
    async fn test_peek_stops_at_line_end() {
        let mock = Builder::new().read(b"250 OK\r\n").build();
        let mut transport = Transport::new(mock);
        assert_eq!(transport.peek(24).await.unwrap(), b"250 OK\r\n");
    }

    #[tokio::test]
    async fn test_probe_buffered_bytes() {
        let mock = Builder::new().read(b".\r\nmore\r\n").build();
        let mut transport = Transport::new(mock);
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("."));
        assert!(transport.probe_available().await.unwrap());
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("more"));
    }

    #[tokio::test]
    async fn test_probe_end_of_stream() {
        let mock = Builder::new().read(b".\r\n").build();
        let mut transport = Transport::new(mock);
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("."));
        assert!(!transport.probe_available().await.unwrap());
    }

    #[tokio::test]
    async fn test_probe_pending_keeps_later_bytes() {
        let mock = Builder::new()
            .read(b".\r\n")
            .wait(Duration::from_millis(50))
            .read(b"QUIT reply\r\n")
            .build();
        let mut transport = Transport::new(mock);
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("."));
        assert!(!transport.probe_available().await.unwrap());
        assert_eq!(
            transport.read_line().await.unwrap().as_deref(),
            Some("QUIT reply")
        );
    }

    #[tokio::test]
    async fn test_probe_sees_bytes_that_arrived_after_a_short_read() {
        use std::io::Write;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            socket
                .write_all(b"X-Daemon-Classification: SPAM\r\nline one\r\n.\r\n")
                .unwrap();
            std::thread::sleep(Duration::from_millis(30));
            socket.write_all(b"line two\r\n.\r\n").unwrap();
            std::thread::sleep(Duration::from_millis(500));
        });

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut transport = Transport::new(stream);
        for expected in ["X-Daemon-Classification: SPAM", "line one", "."] {
            assert_eq!(transport.read_line().await.unwrap().as_deref(), Some(expected));
        }

        // Let the second write land in the socket without running the driver.
        std::thread::sleep(Duration::from_millis(200));
        assert!(transport.probe_available().await.unwrap());
        assert_eq!(
            transport.read_line().await.unwrap().as_deref(),
            Some("line two")
        );
        server.join().unwrap();
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut transport = Transport::new(mock);

        let result = transport.read_line().await;
        assert!(result.unwrap_err().to_string().contains("line too long"));
    }
}
