//! Client arguments passed to the server in enhanced mode.
//!
//! In DLMTP mode the `MAIL FROM` command may carry a `DSPAMPROCESSMODE`
//! parameter holding arguments in the form accepted by the command-line
//! `dspam` program (see dspam(1)).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Top-level operation requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Classify and learn (`--process`).
    #[default]
    Process,
    /// Classify without learning (`--classify`).
    Classify,
}

impl Operation {
    /// Returns the operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Classify => "classify",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the server should deliver its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// One `X-DSPAM-Result` line per recipient.
    #[default]
    Summary,
    /// The full rewritten message per recipient.
    Stdout,
}

/// Message class used for training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Class {
    /// Spam.
    Spam,
    /// Legitimate mail.
    Innocent,
}

impl Class {
    /// Returns the class name as understood by the server.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spam => "spam",
            Self::Innocent => "innocent",
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Class {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spam" => Ok(Self::Spam),
            "innocent" => Ok(Self::Innocent),
            _ => Err(Error::Usage(format!("Unknown class: {s}"))),
        }
    }
}

/// Source of a training request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Correction of a classification error.
    #[default]
    Error,
    /// Corpus-fed training.
    Corpus,
    /// Inoculation from another user.
    Inoculation,
}

impl Source {
    /// Returns the source name as understood by the server.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Corpus => "corpus",
            Self::Inoculation => "inoculation",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "corpus" => Ok(Self::Corpus),
            "inoculation" => Ok(Self::Inoculation),
            _ => Err(Error::Usage(format!("Unknown source: {s}"))),
        }
    }
}

/// Argument string for the `DSPAMPROCESSMODE` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientArgs {
    operation: Operation,
    delivery: Delivery,
    class: Option<Class>,
    source: Option<Source>,
    signature: Option<String>,
}

impl ClientArgs {
    /// `--process --deliver=summary`.
    #[must_use]
    pub fn process() -> Self {
        Self::default()
    }

    /// `--classify --deliver=summary`.
    #[must_use]
    pub fn classify() -> Self {
        Self {
            operation: Operation::Classify,
            ..Self::default()
        }
    }

    /// Returns the requested operation.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Sets the delivery mode.
    #[must_use]
    pub const fn deliver(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Sets the training class.
    #[must_use]
    pub const fn class(mut self, class: Class) -> Self {
        self.class = Some(class);
        self
    }

    /// Sets the training source.
    #[must_use]
    pub const fn source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the signature to retrain.
    #[must_use]
    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }
}

impl fmt::Display for ClientArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "--{}", self.operation)?;
        if let Some(class) = self.class {
            write!(f, " --class={class}")?;
        }
        if let Some(source) = self.source {
            write!(f, " --source={source}")?;
        }
        if let Some(signature) = &self.signature {
            write!(f, " --signature={signature}")?;
        }
        match self.delivery {
            Delivery::Summary => f.write_str(" --deliver=summary"),
            Delivery::Stdout => f.write_str(" --deliver=stdout"),
        }
    }
}
