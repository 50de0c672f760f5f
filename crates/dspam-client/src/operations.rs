//! Single-recipient DLMTP operations.
//!
//! Each operation runs the same exchange: connect and greet on first use
//! (reset afterwards), send the client arguments with MAIL FROM, one
//! recipient, the message, and return that recipient's record.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::{Session, SessionState, SocketStream};
use crate::error::{Error, Result};
use crate::types::{Class, ClassificationRecord, ClientArgs, Source};

impl Session<SocketStream> {
    /// Classifies a message for `user` without training.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the server does not support DLMTP, or any
    /// error of the underlying exchange.
    pub async fn classify(
        &mut self,
        message: impl AsRef<[u8]>,
        user: &str,
    ) -> Result<ClassificationRecord> {
        self.run_fresh(&ClientArgs::classify(), message.as_ref(), user)
            .await
    }

    /// Classifies a message for `user` and trains on the result.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the server does not support DLMTP, or any
    /// error of the underlying exchange.
    pub async fn process(
        &mut self,
        message: impl AsRef<[u8]>,
        user: &str,
    ) -> Result<ClassificationRecord> {
        self.run_fresh(&ClientArgs::process(), message.as_ref(), user)
            .await
    }

    /// Trains a message of known class from a corpus.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the server does not support DLMTP, or any
    /// error of the underlying exchange.
    pub async fn train(
        &mut self,
        message: impl AsRef<[u8]>,
        user: &str,
        class: Class,
    ) -> Result<ClassificationRecord> {
        let args = ClientArgs::process().class(class).source(Source::Corpus);
        self.run_fresh(&args, message.as_ref(), user).await
    }

    /// Corrects the classification of a message, resubmitting it in full.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the server does not support DLMTP, or any
    /// error of the underlying exchange.
    pub async fn retrain_message(
        &mut self,
        message: impl AsRef<[u8]>,
        user: &str,
        class: Class,
        source: Source,
    ) -> Result<ClassificationRecord> {
        let args = ClientArgs::process().class(class).source(source);
        self.run_fresh(&args, message.as_ref(), user).await
    }

    /// Corrects the classification of a message by its stored signature.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the server does not support DLMTP, or any
    /// error of the underlying exchange.
    pub async fn retrain_signature(
        &mut self,
        signature: &str,
        user: &str,
        class: Class,
        source: Source,
    ) -> Result<ClassificationRecord> {
        let args = ClientArgs::process()
            .class(class)
            .source(source)
            .signature(signature);
        self.run_fresh(&args, b"", user).await
    }

    /// Connects on first use, resets otherwise, then runs the exchange.
    async fn run_fresh(
        &mut self,
        args: &ClientArgs,
        message: &[u8],
        user: &str,
    ) -> Result<ClassificationRecord> {
        if self.is_connected() {
            self.reset().await?;
        } else {
            self.connect().await?;
        }
        if self.state() == SessionState::Connected {
            self.greet(None).await?;
        }
        self.run_single(args, message, user).await
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Submits one message for one user with the given client arguments.
    ///
    /// The session must be greeted. The returned record must carry a class;
    /// anything else means the server ignored the requested summary output.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the server does not support DLMTP, a
    /// protocol error if the response has no class for `user`, or any error
    /// of the underlying exchange.
    pub async fn run_single(
        &mut self,
        args: &ClientArgs,
        message: &[u8],
        user: &str,
    ) -> Result<ClassificationRecord> {
        if !self.enhanced_mode() {
            return Err(Error::Usage(format!(
                "Cannot run {}, server does not support DLMTP",
                args.operation()
            )));
        }

        let args = args.to_string();
        self.set_sender(None, Some(&args)).await?;
        self.set_recipients(&[user]).await?;
        self.submit_data(message).await?;

        let results = self.results();
        let record = results
            .get(user)
            .or_else(|| {
                let wanted = user.to_lowercase();
                results
                    .iter()
                    .find(|(name, _)| name.to_lowercase() == wanted)
                    .map(|(_, record)| record)
            })
            .filter(|record| record.class().is_some())
            .ok_or_else(|| {
                Error::Protocol(
                    "Unexpected response format from server at END-OF-DATA, an error occurred"
                        .into(),
                )
            })?;
        Ok(record.clone())
    }
}
