//! Connection management and the LMTP session state machine.

mod config;
mod results;
mod session;
mod stream;
mod transport;

pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_HOST, DEFAULT_SOCKET, SocketSpec};
pub use session::{Session, SessionState};
pub use stream::{SocketStream, open};
pub use transport::{Transport, normalize_line};

use crate::types::Capability;
use std::collections::HashSet;

/// Server information gathered during connect and LHLO.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Greeting text, without the reply code.
    pub greeting: String,
    /// Capabilities announced in the LHLO response.
    pub capabilities: HashSet<Capability>,
}

impl ServerInfo {
    /// Checks if the server announced a capability.
    #[must_use]
    pub fn supports(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Checks if the enhanced (DLMTP) mode is available.
    #[must_use]
    pub fn enhanced_mode(&self) -> bool {
        self.supports(&Capability::DspamProcessMode)
    }
}
