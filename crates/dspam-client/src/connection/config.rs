//! Client configuration types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Socket DSPAM listens on by default for LMTP (dspam.conf: `ServerPort`).
pub const DEFAULT_SOCKET: &str = "inet:24@localhost";

/// Host used when an inet socket specification names none.
pub const DEFAULT_HOST: &str = "localhost";

/// Parsed socket specification.
///
/// Written as `unix:<path>` or `inet[6]:<port>[@<host>]`, e.g.
/// `unix:/var/run/dspam/dspam.sock` or `inet:24@localhost`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketSpec {
    /// UNIX domain socket.
    Unix(PathBuf),
    /// TCP over IPv4.
    Inet {
        /// Server host.
        host: String,
        /// Server port.
        port: u16,
    },
    /// TCP over IPv6.
    Inet6 {
        /// Server host.
        host: String,
        /// Server port.
        port: u16,
    },
}

impl FromStr for SocketSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (proto, spec) = s.split_once(':').ok_or_else(|| {
            Error::Configuration(format!(
                "Failed to parse DSPAM socket specification, no proto found: {s}"
            ))
        })?;

        match proto {
            "unix" => {
                if spec.is_empty() {
                    return Err(Error::Configuration(format!(
                        "Failed to parse DSPAM socket specification, empty path: {s}"
                    )));
                }
                Ok(Self::Unix(PathBuf::from(spec)))
            }
            "inet" | "inet6" => {
                let (port, host) = spec.split_once('@').unwrap_or((spec, ""));
                let port = port.parse::<u16>().map_err(|_| {
                    Error::Configuration(format!(
                        "Failed to parse DSPAM socket specification, invalid port: {s}"
                    ))
                })?;
                let host = if host.is_empty() {
                    DEFAULT_HOST.to_string()
                } else {
                    host.to_string()
                };
                if proto == "inet" {
                    Ok(Self::Inet { host, port })
                } else {
                    Ok(Self::Inet6 { host, port })
                }
            }
            _ => Err(Error::Configuration(format!(
                "Failed to parse DSPAM socket specification, unknown proto {proto}"
            ))),
        }
    }
}

impl fmt::Display for SocketSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Inet { host, port } => write!(f, "inet:{port}@{host}"),
            Self::Inet6 { host, port } => write!(f, "inet6:{port}@{host}"),
        }
    }
}

/// DSPAM client configuration.
///
/// Immutable once handed to a [`Session`](super::Session).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Socket specification, see [`SocketSpec`].
    pub socket: String,
    /// DLMTP authentication identity (dspam.conf: `ServerPass.<ident>`).
    pub ident: Option<String>,
    /// DLMTP authentication password.
    pub password: Option<String>,
    /// Name announced in LHLO when no identity is configured.
    pub helo_name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket: DEFAULT_SOCKET.to_string(),
            ident: None,
            password: None,
            helo_name: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("socket", &self.socket)
            .field("ident", &self.ident)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("helo_name", &self.helo_name)
            .finish()
    }
}

impl ClientConfig {
    /// Creates a configuration for the given socket without credentials.
    #[must_use]
    pub fn new(socket: impl Into<String>) -> Self {
        Self {
            socket: socket.into(),
            ..Self::default()
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Parses the socket specification.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the specification is malformed.
    pub fn socket_spec(&self) -> Result<SocketSpec> {
        self.socket.parse()
    }

    /// Returns the envelope sender used to authenticate in DLMTP mode.
    ///
    /// Only available when both identity and password are configured.
    #[must_use]
    pub fn dlmtp_sender(&self) -> Option<String> {
        match (&self.ident, &self.password) {
            (Some(ident), Some(password)) if !ident.is_empty() && !password.is_empty() => {
                Some(format!("{password}@{ident}"))
            }
            _ => None,
        }
    }

    /// Returns the name to announce in LHLO.
    ///
    /// The identity takes precedence; without one the configured or local
    /// host name is used.
    #[must_use]
    pub fn lhlo_name(&self) -> String {
        if let Some(ident) = &self.ident {
            return ident.clone();
        }
        self.helo_name.clone().unwrap_or_else(local_hostname)
    }
}

/// Builder for client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Sets the socket specification.
    #[must_use]
    pub fn socket(mut self, socket: impl Into<String>) -> Self {
        self.config.socket = socket.into();
        self
    }

    /// Sets the DLMTP identity and password.
    #[must_use]
    pub fn credentials(mut self, ident: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.ident = Some(ident.into());
        self.config.password = Some(password.into());
        self
    }

    /// Sets the DLMTP identity only.
    #[must_use]
    pub fn ident(mut self, ident: impl Into<String>) -> Self {
        self.config.ident = Some(ident.into());
        self
    }

    /// Sets the name announced in LHLO when no identity is configured.
    #[must_use]
    pub fn helo_name(mut self, name: impl Into<String>) -> Self {
        self.config.helo_name = Some(name.into());
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Host name reported by the operating system, or `localhost`.
fn local_hostname() -> String {
    gethostname::gethostname()
        .to_str()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_HOST)
        .to_string()
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
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.socket, "inet:24@localhost");
        assert_eq!(config.ident, None);
        assert_eq!(config.password, None);
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::builder()
            .socket("unix:/tmp/dspam.sock")
            .credentials("bar", "baz")
            .build();
        assert_eq!(config.socket, "unix:/tmp/dspam.sock");
        assert_eq!(config.ident.as_deref(), Some("bar"));
        assert_eq!(config.password.as_deref(), Some("baz"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ClientConfig::builder().credentials("test", "leey2Pah").build();
        let debug = format!("{config:?}");
        assert!(!debug.contains("leey2Pah"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_dlmtp_sender_needs_both_credentials() {
        let config = ClientConfig::builder().credentials("foo", "bar").build();
        assert_eq!(config.dlmtp_sender().as_deref(), Some("bar@foo"));

        let config = ClientConfig::builder().ident("foo").build();
        assert_eq!(config.dlmtp_sender(), None);

        let config = ClientConfig {
            password: Some("bar".to_string()),
            ..ClientConfig::default()
        };
        assert_eq!(config.dlmtp_sender(), None);
    }

    #[test]
    fn test_lhlo_name() {
        let config = ClientConfig::builder()
            .ident("foo")
            .helo_name("mx.example.org")
            .build();
        assert_eq!(config.lhlo_name(), "foo");

        let config = ClientConfig::builder().helo_name("mx.example.org").build();
        assert_eq!(config.lhlo_name(), "mx.example.org");

        assert!(!ClientConfig::default().lhlo_name().is_empty());
    }

    #[test]
    fn test_lhlo_name_uses_system_hostname() {
        let system = gethostname::gethostname();
        let expected = system
            .to_str()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_HOST);
        assert_eq!(ClientConfig::default().lhlo_name(), expected);
    }

    #[test]
    fn test_parse_unix() {
        let spec: SocketSpec = "unix:/var/run/dspam/dspam.sock".parse().unwrap();
        assert_eq!(
            spec,
            SocketSpec::Unix(PathBuf::from("/var/run/dspam/dspam.sock"))
        );
        assert_eq!(spec.to_string(), "unix:/var/run/dspam/dspam.sock");
    }

    #[test]
    fn test_parse_inet() {
        let spec: SocketSpec = "inet:2424@mail.example.org".parse().unwrap();
        assert_eq!(
            spec,
            SocketSpec::Inet {
                host: "mail.example.org".to_string(),
                port: 2424
            }
        );
    }

    #[test]
    fn test_parse_inet_default_host() {
        for raw in ["inet:24", "inet:24@"] {
            let spec: SocketSpec = raw.parse().unwrap();
            assert_eq!(
                spec,
                SocketSpec::Inet {
                    host: "localhost".to_string(),
                    port: 24
                }
            );
        }
    }

    #[test]
    fn test_parse_inet6() {
        let spec: SocketSpec = "inet6:24@::1".parse().unwrap();
        assert_eq!(
            spec,
            SocketSpec::Inet6 {
                host: "::1".to_string(),
                port: 24
            }
        );
        assert_eq!(spec.to_string(), "inet6:24@::1");
    }

    #[test]
    fn test_parse_invalid() {
        for raw in ["foo", "foo:bar", "inet:abc", "inet:99999", "unix:", ""] {
            let err = raw.parse::<SocketSpec>().unwrap_err();
            assert!(err.is_configuration(), "{raw} gave {err}");
        }
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"ident": "test", "password": "secret"}"#).unwrap();
        assert_eq!(config.socket, DEFAULT_SOCKET);
        assert_eq!(config.dlmtp_sender().as_deref(), Some("secret@test"));
    }
}
