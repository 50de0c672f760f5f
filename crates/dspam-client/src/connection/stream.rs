//! Socket streams to a DSPAM server.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use super::SocketSpec;
use crate::error::{Error, Result};

/// DSPAM stream (TCP or UNIX domain socket).
#[derive(Debug)]
pub enum SocketStream {
    /// TCP connection.
    Tcp(TcpStream),
    /// UNIX domain socket connection.
    #[cfg(unix)]
    Unix(UnixStream),
}

/// Connects to the socket described by `spec`.
///
/// # Errors
///
/// Returns a connection error naming the address if the connect attempt
/// fails, or a configuration error for socket kinds the platform lacks.
pub async fn open(spec: &SocketSpec) -> Result<SocketStream> {
    match spec {
        #[cfg(unix)]
        SocketSpec::Unix(path) => {
            let stream = UnixStream::connect(path)
                .await
                .map_err(|e| Error::connection(format!("socket {}", path.display()), e))?;
            tracing::debug!(path = %path.display(), "Connected to DSPAM server");
            Ok(SocketStream::Unix(stream))
        }
        #[cfg(not(unix))]
        SocketSpec::Unix(_) => Err(Error::Configuration(
            "UNIX domain sockets are not supported on this platform".into(),
        )),
        SocketSpec::Inet { host, port } => connect_tcp(host, *port, false).await,
        SocketSpec::Inet6 { host, port } => connect_tcp(host, *port, true).await,
    }
}

/// Connects to the first resolved address of the requested family.
async fn connect_tcp(host: &str, port: u16, ipv6: bool) -> Result<SocketStream> {
    let address = format!("host {host} port {port}");
    let candidates: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::connection(address.clone(), e))?
        .filter(|addr| addr.is_ipv6() == ipv6)
        .collect();

    let mut last_error = io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        if ipv6 {
            "no IPv6 address found"
        } else {
            "no IPv4 address found"
        },
    );
    for addr in candidates {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                tracing::debug!(%host, port, %addr, "Connected to DSPAM server");
                return Ok(SocketStream::Tcp(stream));
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "Connection attempt failed");
                last_error = e;
            }
        }
    }

    Err(Error::connection(address, last_error))
}

impl AsyncRead for SocketStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SocketStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
