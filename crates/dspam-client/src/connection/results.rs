//! Reading the response to a data submission.
//!
//! The first bytes after end-of-data decide which of the three grammars in
//! [`crate::parser::response`] applies. Every grammar must drain exactly one
//! record per outstanding recipient.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Transport;
use crate::error::{Error, Result};
use crate::parser::response::{
    DETECT_LEN, ResponseFormat, parse_classification_marker, parse_delivery_line,
    parse_summary_line,
};
use crate::types::{ClassificationRecord, Outstanding, Results};

const STEP: &str = "END-OF-DATA";

/// Reads the per-recipient records that follow end-of-data.
///
/// # Errors
///
/// Returns a protocol error if the response matches none of the known
/// encodings, names an unknown recipient, or ends before every outstanding
/// recipient was answered.
pub(crate) async fn read_response<S>(
    transport: &mut Transport<S>,
    outstanding: &mut Outstanding,
    results: &mut Results,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = transport.peek(DETECT_LEN).await?;
    let Some(format) = ResponseFormat::detect(head) else {
        let line = transport.read_line().await?.unwrap_or_default();
        return Err(Error::unexpected(STEP, &line));
    };
    tracing::debug!(?format, "Detected response format");

    match format {
        ResponseFormat::Delivery => {
            read_reconciled(transport, outstanding, results, delivery_record).await?;
            // Records already waiting after every recipient was answered name
            // recipients we never submitted.
            while transport.probe_available().await? {
                let line = next_line(transport).await?;
                reconcile_line(outstanding, results, &line, delivery_record)?;
            }
            Ok(())
        }
        ResponseFormat::Summary => {
            read_reconciled(transport, outstanding, results, summary_record).await?;
            let line = next_line(transport).await?;
            if line != "." {
                reconcile_line(outstanding, results, &line, summary_record)?;
                return Err(Error::unexpected(STEP, &line));
            }
            Ok(())
        }
        ResponseFormat::RawMessage => read_raw_messages(transport, outstanding, results).await,
    }
}

fn delivery_record(line: &str) -> Option<(String, ClassificationRecord)> {
    let recipient = parse_delivery_line(line)?;
    tracing::debug!(recipient, "Message accepted in LMTP mode");
    Some((recipient.to_string(), ClassificationRecord::Accepted))
}

fn summary_record(line: &str) -> Option<(String, ClassificationRecord)> {
    let summary = parse_summary_line(line)?;
    tracing::debug!(
        user = %summary.user,
        class = %summary.class,
        "Message handled in summary mode"
    );
    Some((summary.user.clone(), ClassificationRecord::Summary(summary)))
}

/// Reads one line per outstanding recipient, matching each by the name the
/// server reports.
///
/// `record` turns a line into the reported recipient and its record, or
/// `None` if the line does not fit the grammar.
async fn read_reconciled<S, F>(
    transport: &mut Transport<S>,
    outstanding: &mut Outstanding,
    results: &mut Results,
    record: F,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Fn(&str) -> Option<(String, ClassificationRecord)>,
{
    while !outstanding.is_empty() {
        let line = next_line(transport).await?;
        reconcile_line(outstanding, results, &line, &record)?;
    }
    Ok(())
}

fn reconcile_line<F>(
    outstanding: &mut Outstanding,
    results: &mut Results,
    line: &str,
    record: F,
) -> Result<()>
where
    F: Fn(&str) -> Option<(String, ClassificationRecord)>,
{
    let (reported, parsed) = record(line).ok_or_else(|| Error::unexpected(STEP, line))?;
    outstanding.reconcile(results, &reported, parsed)
}

/// Reads rewritten messages, assigning them to recipients in submission
/// order.
///
/// A lone dot only ends the response when nothing else is waiting on the
/// connection. Otherwise it belongs to the message body.
async fn read_raw_messages<S>(
    transport: &mut Transport<S>,
    outstanding: &mut Outstanding,
    results: &mut Results,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut current: Option<String> = None;
    let mut body: Vec<String> = Vec::new();

    loop {
        let line = next_line(transport).await?;

        if let Some(result) = parse_classification_marker(&line) {
            if let Some(previous) = current.take() {
                store_message(outstanding, results, previous, std::mem::take(&mut body))?;
            }
            current = Some(result.to_string());
        } else if line == "." {
            if transport.probe_available().await? {
                body.push(line);
            } else {
                break;
            }
        } else {
            body.push(line);
        }
    }

    if let Some(result) = current {
        store_message(outstanding, results, result, body)?;
    }

    if !outstanding.is_empty() {
        return Err(Error::Protocol(format!(
            "Response ended before all recipients were answered, {} left",
            outstanding.len()
        )));
    }
    Ok(())
}

fn store_message(
    outstanding: &mut Outstanding,
    results: &mut Results,
    result: String,
    mut body: Vec<String>,
) -> Result<()> {
    let recipient = outstanding.take_first().ok_or_else(|| {
        Error::Protocol("Server returned more messages than recipients were submitted".into())
    })?;

    // One trailing empty line is the separator, not content.
    if body.last().is_some_and(String::is_empty) {
        body.pop();
    }

    tracing::debug!(%recipient, %result, "Message returned in stdout mode");
    results.insert(
        recipient,
        ClassificationRecord::RawMessage {
            result,
            message: body.join("\r\n"),
        },
    );
    Ok(())
}

async fn next_line<S>(transport: &mut Transport<S>) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    transport.read_line().await?.ok_or_else(|| {
        Error::Protocol(format!("Connection closed by server at {STEP}"))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::io::Builder;

    fn outstanding(names: &[&str]) -> Outstanding {
        let mut set = Outstanding::new();
        for name in names {
            set.push(*name);
        }
        set
    }

    async fn run(mock: tokio_test::io::Mock, names: &[&str]) -> (Result<()>, Outstanding, Results) {
        let mut transport = Transport::new(mock);
        let mut pending = outstanding(names);
        let mut results = Results::new();
        let outcome = read_response(&mut transport, &mut pending, &mut results).await;
        (outcome, pending, results)
    }

    #[tokio::test]
    async fn test_delivery_matches_case_insensitively() {
        let mock = Builder::new()
            .read(b"250 2.6.0 <BAR> Message accepted for delivery\r\n")
            .read(b"250 2.6.0 <foo> Message accepted for delivery\r\n")
            .build();
        let (outcome, pending, results) = run(mock, &["foo", "bar"]).await;
        outcome.unwrap();
        assert!(pending.is_empty());
        assert_eq!(results.get("BAR"), Some(&ClassificationRecord::Accepted));
        assert_eq!(results.get("foo"), Some(&ClassificationRecord::Accepted));
    }

    #[tokio::test]
    async fn test_delivery_unknown_recipient() {
        let mock = Builder::new()
            .read(b"250 2.6.0 <foo> Message accepted for delivery\r\n")
            .read(b"250 2.6.0 <BAZ> Message accepted for delivery\r\n")
            .build();
        let (outcome, _, _) = run(mock, &["foo", "BAR"]).await;
        let err = outcome.unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("unknown recipient BAZ"));
    }

    #[tokio::test]
    async fn test_delivery_surplus_recipient() {
        let mock = Builder::new()
            .read(
                b"250 2.6.0 <foo> Message accepted for delivery\r\n\
                  250 2.6.0 <BAR> Message accepted for delivery\r\n\
                  250 2.6.0 <BAZ> Message accepted for delivery\r\n",
            )
            .build();
        let (outcome, pending, results) = run(mock, &["foo", "bar"]).await;
        let err = outcome.unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("unknown recipient BAZ"));
        assert!(pending.is_empty());
        assert!(results.contains_key("foo"));
        assert!(results.contains_key("BAR"));
    }

    #[tokio::test]
    async fn test_delivery_failure_line() {
        let mock = Builder::new()
            .read(b"250 2.6.0 <foo> Message accepted for delivery\r\n")
            .read(b"550 5.1.1 <bar> Unknown user\r\n")
            .build();
        let (outcome, _, results) = run(mock, &["foo", "bar"]).await;
        assert!(outcome.unwrap_err().is_protocol());
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_format() {
        let mock = Builder::new().read(b"451 4.3.0 Error\r\n").build();
        let (outcome, _, _) = run(mock, &["foo"]).await;
        let err = outcome.unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("END-OF-DATA: 451 4.3.0 Error"));
    }

    #[tokio::test]
    async fn test_connection_closed_mid_response() {
        let mock = Builder::new()
            .read(b"250 2.6.0 <foo> Message accepted for delivery\r\n")
            .build();
        let (outcome, pending, _) = run(mock, &["foo", "bar"]).await;
        assert!(outcome.unwrap_err().is_protocol());
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_summary() {
        let mock = Builder::new()
            .read(
                b"X-DSPAM-Result: bar; result=\"Spam\"; class=\"Spam\"; \
                  probability=1.0000; confidence=0.85; signature=N/A\r\n",
            )
            .read(
                b"X-DSPAM-Result: foo; result=\"Innocent\"; class=\"Innocent\"; \
                  probability=0.0023; confidence=1.00; signature=4b11e2a6117416164219472\r\n",
            )
            .read(b".\r\n")
            .build();
        let (outcome, _, results) = run(mock, &["foo", "bar"]).await;
        outcome.unwrap();

        let bar = results["bar"].as_summary().unwrap();
        assert_eq!(bar.class, "Spam");
        assert_eq!(bar.probability, 1.0);
        assert_eq!(bar.signature, None);

        let foo = results["foo"].as_summary().unwrap();
        assert_eq!(foo.result, "Innocent");
        assert_eq!(foo.signature.as_deref(), Some("4b11e2a6117416164219472"));
    }

    #[tokio::test]
    async fn test_summary_requires_terminator() {
        let mock = Builder::new()
            .read(
                b"X-DSPAM-Result: foo; result=\"Spam\"; class=\"Spam\"; \
                  probability=1.0000; confidence=0.85; signature=N/A\r\n",
            )
            .read(b"250 2.6.0 <foo> Message accepted for delivery\r\n")
            .build();
        let (outcome, _, results) = run(mock, &["foo"]).await;
        assert!(outcome.unwrap_err().is_protocol());
        assert!(results.contains_key("foo"));
    }

    #[tokio::test]
    async fn test_raw_message() {
        let mock = Builder::new()
            .read(b"X-Daemon-Classification: INNOCENT\r\n")
            .read(b"From: bar@example.org\r\nSubject: test\r\n\r\nbody\r\n\r\n")
            .read(b".\r\n")
            .build();
        let (outcome, pending, results) = run(mock, &["foo"]).await;
        outcome.unwrap();
        assert!(pending.is_empty());
        assert_eq!(
            results["foo"],
            ClassificationRecord::RawMessage {
                result: "INNOCENT".to_string(),
                message: "From: bar@example.org\r\nSubject: test\r\n\r\nbody".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_raw_message_keeps_in_band_dot() {
        // The dot arrives together with the line after it, so more data is
        // buffered when the probe runs.
        let mock = Builder::new()
            .read(b"X-Daemon-Classification: SPAM\r\nline one\r\n")
            .read(b".\r\nline two\r\n")
            .read(b".\r\n")
            .build();
        let (outcome, _, results) = run(mock, &["foo"]).await;
        outcome.unwrap();
        assert_eq!(results["foo"].result(), Some("SPAM"));
        let ClassificationRecord::RawMessage { message, .. } = &results["foo"] else {
            panic!("expected a raw message");
        };
        assert_eq!(message, "line one\r\n.\r\nline two");
    }

    #[tokio::test]
    async fn test_raw_message_dot_ends_when_nothing_waits() {
        let mock = Builder::new()
            .read(b"X-Daemon-Classification: SPAM\r\nline one\r\n.\r\n")
            .wait(Duration::from_millis(10))
            .build();
        let (outcome, _, results) = run(mock, &["foo"]).await;
        outcome.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_raw_messages_in_submission_order() {
        let mock = Builder::new()
            .read(b"X-Daemon-Classification: SPAM\r\nfirst\r\n")
            .read(b"X-Daemon-Classification: INNOCENT\r\nsecond\r\n")
            .read(b".\r\n")
            .build();
        let (outcome, _, results) = run(mock, &["foo", "bar"]).await;
        outcome.unwrap();
        assert_eq!(results["foo"].result(), Some("SPAM"));
        assert_eq!(results["bar"].result(), Some("INNOCENT"));
    }

    #[tokio::test]
    async fn test_raw_messages_drop_one_separator_line_per_block() {
        let mock = Builder::new()
            .read(b"X-Daemon-Classification: SPAM\r\nfirst\r\n\r\n\r\n")
            .read(b"X-Daemon-Classification: INNOCENT\r\nsecond\r\n\r\n")
            .read(b".\r\n")
            .build();
        let (outcome, _, results) = run(mock, &["foo", "bar"]).await;
        outcome.unwrap();
        assert_eq!(
            results["foo"],
            ClassificationRecord::RawMessage {
                result: "SPAM".to_string(),
                message: "first\r\n".to_string(),
            }
        );
        assert_eq!(
            results["bar"],
            ClassificationRecord::RawMessage {
                result: "INNOCENT".to_string(),
                message: "second".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_raw_messages_too_few() {
        let mock = Builder::new()
            .read(b"X-Daemon-Classification: SPAM\r\nfirst\r\n.\r\n")
            .build();
        let (outcome, pending, _) = run(mock, &["foo", "bar"]).await;
        assert!(outcome.unwrap_err().is_protocol());
        assert_eq!(pending.iter().collect::<Vec<_>>(), vec!["bar"]);
    }

    #[tokio::test]
    async fn test_raw_messages_too_many() {
        let mock = Builder::new()
            .read(b"X-Daemon-Classification: SPAM\r\nfirst\r\n")
            .read(b"X-Daemon-Classification: SPAM\r\nsecond\r\n.\r\n")
            .build();
        let (outcome, _, _) = run(mock, &["foo"]).await;
        assert!(outcome.unwrap_err().is_protocol());
    }
}
