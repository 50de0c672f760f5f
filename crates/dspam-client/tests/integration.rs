//! Integration tests for the DSPAM client.
//!
//! Complete sessions run against a small in-process DSPAM stand-in that
//! listens on a loopback TCP port or a UNIX socket. Exact wire bytes are
//! checked with a capturing mock stream.

#![allow(clippy::unwrap_used, clippy::float_cmp)]

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpListener;

use dspam_client::{
    Class, ClassificationRecord, ClientArgs, ClientConfig, Delivery, Session, SessionState, Source,
};

const SIGNATURE: &str = "4b11e2a6117416164219472";

/// Shows client logs for failing tests, filtered by `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// How the stand-in server behaves.
#[derive(Debug, Clone, Copy, Default)]
struct Behaviour {
    /// Announce `DSPAMPROCESSMODE` in the LHLO reply.
    enhanced: bool,
    /// Fixed reply to end-of-data instead of one derived from the request.
    data_response: Option<&'static str>,
}

type Transcript = Arc<Mutex<Vec<String>>>;

/// DSPAM stand-in accepting any number of connections.
struct FakeServer {
    socket: String,
    transcript: Transcript,
}

impl FakeServer {
    async fn tcp(behaviour: Behaviour) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let transcript = Transcript::default();

        let log = Arc::clone(&transcript);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let _ = serve(stream, behaviour, log).await;
                });
            }
        });

        Self {
            socket: format!("inet:{port}@127.0.0.1"),
            transcript,
        }
    }

    #[cfg(unix)]
    async fn unix(behaviour: Behaviour) -> Self {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        init_tracing();
        let path = std::env::temp_dir().join(format!(
            "dspam-client-test-{}-{}.sock",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_file(&path);
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        let transcript = Transcript::default();

        let log = Arc::clone(&transcript);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let _ = serve(stream, behaviour, log).await;
                });
            }
        });

        Self {
            socket: format!("unix:{}", path.display()),
            transcript,
        }
    }

    fn config(&self) -> ClientConfig {
        ClientConfig::builder()
            .socket(&self.socket)
            .credentials("bar", "baz")
            .build()
    }

    fn transcript(&self) -> Vec<String> {
        self.transcript.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.transcript()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }
}

async fn serve<S>(stream: S, behaviour: Behaviour, transcript: Transcript) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();
    writer.write_all(b"220 DSPAM LMTP 3.10.2 Ready\r\n").await?;

    let mut args = String::new();
    let mut recipients: Vec<String> = Vec::new();
    let mut body: Vec<String> = Vec::new();
    let mut in_data = false;

    while let Some(line) = lines.next_line().await? {
        transcript.lock().unwrap().push(line.clone());

        if in_data {
            if line == "." {
                in_data = false;
                let response = data_response(behaviour, &args, &recipients, &body);
                writer.write_all(response.as_bytes()).await?;
                body.clear();
            } else {
                body.push(line.strip_prefix('.').unwrap_or(&line).to_string());
            }
            continue;
        }

        let reply = if line.starts_with("LHLO ") {
            if behaviour.enhanced {
                "250-localhost.localdomain\r\n250-PIPELINING\r\n250-ENHANCEDSTATUSCODES\r\n\
                 250-DSPAMPROCESSMODE\r\n250 SIZE\r\n"
            } else {
                "250-localhost.localdomain\r\n250-PIPELINING\r\n250-ENHANCEDSTATUSCODES\r\n\
                 250 SIZE\r\n"
            }
        } else if let Some(rest) = line.strip_prefix("MAIL FROM:") {
            args = rest
                .split_once("DSPAMPROCESSMODE=\"")
                .map(|(_, a)| a.trim_end_matches('"').to_string())
                .unwrap_or_default();
            "250 2.1.0 OK\r\n"
        } else if let Some(rest) = line.strip_prefix("RCPT TO:<") {
            recipients.push(rest.trim_end_matches('>').to_string());
            "250 2.1.5 OK\r\n"
        } else if line == "DATA" {
            in_data = true;
            "354 Enter mail, end with \".\" on a line by itself\r\n"
        } else if line == "RSET" {
            args.clear();
            recipients.clear();
            "250 2.0.0 OK\r\n"
        } else if line == "QUIT" {
            writer.write_all(b"221 2.0.0 OK\r\n").await?;
            break;
        } else {
            "500 5.5.1 Command unrecognized\r\n"
        };
        writer.write_all(reply.as_bytes()).await?;
    }
    Ok(())
}

fn data_response(behaviour: Behaviour, args: &str, recipients: &[String], body: &[String]) -> String {
    if let Some(fixed) = behaviour.data_response {
        return fixed.to_string();
    }

    let mut out = String::new();
    if args.contains("--deliver=summary") {
        let class = if args.contains("--class=innocent") {
            "Innocent"
        } else {
            "Spam"
        };
        let signature = if args.contains("--classify") {
            "N/A"
        } else {
            SIGNATURE
        };
        for rcpt in recipients {
            out.push_str(&format!(
                "X-DSPAM-Result: {rcpt}; result=\"{class}\"; class=\"{class}\"; \
                 probability=1.0000; confidence=0.85; signature={signature}\r\n"
            ));
        }
        out.push_str(".\r\n");
    } else if args.contains("--deliver=stdout") {
        for _ in recipients {
            out.push_str("X-Daemon-Classification: SPAM\r\n");
            for line in body {
                out.push_str(line);
                out.push_str("\r\n");
            }
            out.push_str("\r\n");
        }
        out.push_str(".\r\n");
    } else {
        for rcpt in recipients {
            out.push_str(&format!(
                "250 2.6.0 <{rcpt}> Message accepted for delivery\r\n"
            ));
        }
    }
    out
}

const MESSAGE: &str = "From: foo@example.org\r\nSubject: test\r\n\r\nHello\r\n";

#[tokio::test]
async fn test_classify_over_tcp() {
    let server = FakeServer::tcp(Behaviour {
        enhanced: true,
        ..Behaviour::default()
    })
    .await;
    let mut session = Session::new(server.config());

    let record = session.classify(MESSAGE, "foo").await.unwrap();
    let summary = record.as_summary().unwrap();
    assert_eq!(summary.user, "foo");
    assert_eq!(summary.class, "Spam");
    assert_eq!(summary.probability, 1.0);
    assert_eq!(summary.signature, None);
    assert_eq!(session.state(), SessionState::DataSent);

    let transcript = server.transcript();
    assert_eq!(transcript[0], "LHLO bar");
    assert_eq!(
        transcript[1],
        "MAIL FROM:<baz@bar> DSPAMPROCESSMODE=\"--classify --deliver=summary\""
    );
    assert_eq!(transcript[2], "RCPT TO:<foo>");
    assert_eq!(transcript[3], "DATA");

    session.quit().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_over_unix_socket() {
    let server = FakeServer::unix(Behaviour {
        enhanced: true,
        ..Behaviour::default()
    })
    .await;
    let mut session = Session::new(server.config());

    let record = session.process(MESSAGE, "foo").await.unwrap();
    assert_eq!(record.class(), Some("Spam"));
    assert_eq!(
        record.as_summary().unwrap().signature.as_deref(),
        Some(SIGNATURE)
    );
    assert_eq!(server.count("MAIL FROM:<baz@bar> DSPAMPROCESSMODE=\"--process"), 1);

    session.quit().await.unwrap();
}

#[tokio::test]
async fn test_second_operation_resets() {
    let server = FakeServer::tcp(Behaviour {
        enhanced: true,
        ..Behaviour::default()
    })
    .await;
    let mut session = Session::new(server.config());

    session.classify(MESSAGE, "foo").await.unwrap();
    session.process(MESSAGE, "foo").await.unwrap();
    session.quit().await.unwrap();

    assert_eq!(server.count("LHLO"), 1);
    assert_eq!(server.count("RSET"), 1);
    assert_eq!(server.count("MAIL FROM"), 2);
    assert_eq!(server.count("QUIT"), 1);
}

#[tokio::test]
async fn test_classify_without_enhanced_mode() {
    let server = FakeServer::tcp(Behaviour::default()).await;
    let mut session = Session::new(server.config());

    let err = session.classify(MESSAGE, "foo").await.unwrap_err();
    assert!(err.is_usage());
    assert!(!session.enhanced_mode());
    assert_eq!(server.count("MAIL FROM"), 0);

    session.quit().await.unwrap();
}

#[tokio::test]
async fn test_train_and_retrain() {
    let server = FakeServer::tcp(Behaviour {
        enhanced: true,
        ..Behaviour::default()
    })
    .await;
    let mut session = Session::new(server.config());

    let record = session.train(MESSAGE, "foo", Class::Spam).await.unwrap();
    assert_eq!(record.class(), Some("Spam"));

    let record = session
        .retrain_message(MESSAGE, "foo", Class::Innocent, Source::Error)
        .await
        .unwrap();
    assert_eq!(record.class(), Some("Innocent"));

    let record = session
        .retrain_signature(SIGNATURE, "foo", Class::Innocent, Source::Error)
        .await
        .unwrap();
    assert_eq!(record.class(), Some("Innocent"));
    session.quit().await.unwrap();

    assert_eq!(
        server.count(
            "MAIL FROM:<baz@bar> DSPAMPROCESSMODE=\"--process --class=spam --source=corpus \
             --deliver=summary\""
        ),
        1
    );
    assert_eq!(
        server.count(&format!(
            "MAIL FROM:<baz@bar> DSPAMPROCESSMODE=\"--process --class=innocent --source=error \
             --signature={SIGNATURE} --deliver=summary\""
        )),
        1
    );
}

#[tokio::test]
async fn test_unknown_recipient() {
    let server = FakeServer::tcp(Behaviour {
        enhanced: false,
        data_response: Some(
            "250 2.6.0 <foo> Message accepted for delivery\r\n\
             250 2.6.0 <BAR> Message accepted for delivery\r\n\
             250 2.6.0 <BAZ> Message accepted for delivery\r\n",
        ),
    })
    .await;
    let mut session = Session::open(server.config()).await.unwrap();

    session.set_sender(None, None).await.unwrap();
    session.set_recipients(&["foo", "bar"]).await.unwrap();
    let err = session.submit_data(MESSAGE).await.unwrap_err();
    assert!(err.is_protocol());
    assert!(err.to_string().contains("unknown recipient BAZ"));
}

#[tokio::test]
async fn test_recipient_matching_ignores_case() {
    let server = FakeServer::tcp(Behaviour {
        enhanced: false,
        data_response: Some("250 2.6.0 <foo> Message accepted for delivery\r\n"),
    })
    .await;
    let mut session = Session::open(server.config()).await.unwrap();

    session.set_sender(None, None).await.unwrap();
    session.set_recipients(&["FOO"]).await.unwrap();
    session.submit_data(MESSAGE).await.unwrap();

    assert!(session.outstanding().is_empty());
    let results = session.take_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results.get("foo"), Some(&ClassificationRecord::Accepted));
    session.quit().await.unwrap();
}

#[tokio::test]
async fn test_plain_lmtp_delivery() {
    let server = FakeServer::tcp(Behaviour::default()).await;
    let mut session = Session::open(server.config()).await.unwrap();

    session.set_sender(Some("sender@example.org"), None).await.unwrap();
    session.set_recipients(&["foo", "bar"]).await.unwrap();
    session.submit_data(MESSAGE).await.unwrap();

    assert_eq!(session.results().len(), 2);
    assert_eq!(server.count("MAIL FROM:<sender@example.org>"), 1);
    session.quit().await.unwrap();
}

#[tokio::test]
async fn test_lone_dot_round_trip() {
    let server = FakeServer::tcp(Behaviour {
        enhanced: true,
        ..Behaviour::default()
    })
    .await;
    let mut session = Session::open(server.config()).await.unwrap();

    let args = ClientArgs::process().deliver(Delivery::Stdout).to_string();
    session.set_sender(None, Some(&args)).await.unwrap();
    session.set_recipients(&["foo"]).await.unwrap();
    session
        .submit_data("Subject: dots\r\n\r\n.\r\nafter\r\n")
        .await
        .unwrap();

    assert_eq!(server.count(".."), 1);
    assert_eq!(
        session.results().get("foo"),
        Some(&ClassificationRecord::RawMessage {
            result: "SPAM".to_string(),
            message: "Subject: dots\r\n\r\n.\r\nafter".to_string(),
        })
    );
    session.quit().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_after_quit() {
    let server = FakeServer::tcp(Behaviour {
        enhanced: true,
        ..Behaviour::default()
    })
    .await;
    let mut session = Session::new(server.config());

    session.classify(MESSAGE, "foo").await.unwrap();
    session.quit().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);

    session.classify(MESSAGE, "foo").await.unwrap();
    session.quit().await.unwrap();
    assert_eq!(server.count("LHLO"), 2);
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ClientConfig::new(format!("inet:{port}@127.0.0.1"));
    let mut session = Session::new(config);
    let err = session.classify(MESSAGE, "foo").await.unwrap_err();
    assert!(err.is_connection());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_invalid_socket_spec() {
    let mut session = Session::new(ClientConfig::new("foo:bar"));
    let err = session.connect().await.unwrap_err();
    assert!(err.is_configuration());
}

/// Mock stream that replays a scripted server side and captures writes.
struct MockStream {
    responses: Cursor<Vec<u8>>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    fn new(responses: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stream = Self {
            responses: Cursor::new(responses.to_vec()),
            sent: Arc::clone(&sent),
        };
        (stream, sent)
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = self.responses.position() as usize;

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn test_enhanced_mode_on_non_final_line() {
    let (stream, sent) = MockStream::new(
        b"220 OK\r\n\
          250-localhost\r\n250-DSPAMPROCESSMODE\r\n250 SIZE\r\n",
    );
    let config = ClientConfig::builder()
        .socket("unix:/tmp/x.sock")
        .helo_name("client.example.org")
        .build();
    let mut session = Session::new(config);
    session.attach(stream).await.unwrap();
    session.greet(None).await.unwrap();

    assert!(session.enhanced_mode());
    assert_eq!(
        sent.lock().unwrap().as_slice(),
        b"LHLO client.example.org\r\n"
    );
}

#[tokio::test]
async fn test_wire_bytes_of_a_classification() {
    let (stream, sent) = MockStream::new(
        b"220 DSPAM LMTP 3.10.2 Ready\r\n\
          250-localhost\r\n250-DSPAMPROCESSMODE\r\n250 SIZE\r\n\
          250 2.1.0 OK\r\n\
          250 2.1.5 OK\r\n\
          354 Enter mail\r\n\
          X-DSPAM-Result: foo; result=\"Innocent\"; class=\"Innocent\"; \
          probability=0.0023; confidence=1.00; signature=N/A\r\n\
          .\r\n",
    );
    let config = ClientConfig::builder().credentials("bar", "baz").build();
    let mut session = Session::new(config);
    session.attach(stream).await.unwrap();
    session.greet(None).await.unwrap();

    let record = session
        .run_single(
            &ClientArgs::classify(),
            b"Subject: x\n\n.\n.leading\nlast line\r",
            "foo",
        )
        .await
        .unwrap();
    assert_eq!(record.class(), Some("Innocent"));
    assert_eq!(record.as_summary().unwrap().signature, None);

    let sent = sent.lock().unwrap().clone();
    assert_eq!(
        String::from_utf8(sent).unwrap(),
        "LHLO bar\r\n\
         MAIL FROM:<baz@bar> DSPAMPROCESSMODE=\"--classify --deliver=summary\"\r\n\
         RCPT TO:<foo>\r\n\
         DATA\r\n\
         Subject: x\r\n\r\n..\r\n..leading\r\nlast line\r\n.\r\n"
    );
}
