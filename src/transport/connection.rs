//! Connection to a job server over TCP or a Unix domain socket.
//!
//! # Example
//!
//! ```ignore
//! use gearman_client::transport::{connect, Network};
//!
//! let conn = connect(Network::Tcp, "127.0.0.1:4730").await?;
//! ```

use std::io;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::error::{GearmanError, Result};

/// Default job server port.
pub const DEFAULT_PORT: u16 = 4730;

/// Network kind accepted by [`connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    #[cfg(unix)]
    Unix,
}

impl FromStr for Network {
    type Err = GearmanError;

    /// Parses `tcp`, `tcp4`, `tcp6` and (on Unix) `unix`.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" | "tcp4" | "tcp6" => Ok(Network::Tcp),
            #[cfg(unix)]
            "unix" => Ok(Network::Unix),
            other => Err(GearmanError::InvalidNetwork(other.to_string())),
        }
    }
}

/// A connected duplex byte stream.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

/// Connect to a job server.
///
/// For TCP, an address without a port gets [`DEFAULT_PORT`].
pub async fn connect(network: Network, addr: &str) -> Result<Connection> {
    match network {
        Network::Tcp => {
            let stream = TcpStream::connect(with_default_port(addr)).await?;
            stream.set_nodelay(true)?;
            Ok(Connection::Tcp(stream))
        }
        #[cfg(unix)]
        Network::Unix => {
            let stream = tokio::net::UnixStream::connect(addr).await?;
            Ok(Connection::Unix(stream))
        }
    }
}

fn with_default_port(addr: &str) -> String {
    if let Some(rest) = addr.strip_prefix('[') {
        // "[::1]" or "[::1]:99"
        return if rest.ends_with(']') {
            format!("{}:{}", addr, DEFAULT_PORT)
        } else {
            addr.to_string()
        };
    }
    match addr.matches(':').count() {
        0 => format!("{}:{}", addr, DEFAULT_PORT),
        1 => addr.to_string(),
        // Bare IPv6 literal: "::1"
        _ => format!("[{}]:{}", addr, DEFAULT_PORT),
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_write_vectored(cx, bufs),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            Connection::Tcp(s) => s.is_write_vectored(),
            #[cfg(unix)]
            Connection::Unix(s) => s.is_write_vectored(),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_network() {
        assert_eq!("tcp".parse::<Network>().unwrap(), Network::Tcp);
        assert_eq!("tcp6".parse::<Network>().unwrap(), Network::Tcp);
        assert!(matches!(
            "udp".parse::<Network>(),
            Err(GearmanError::InvalidNetwork(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_unix_network() {
        assert_eq!("unix".parse::<Network>().unwrap(), Network::Unix);
    }

    #[test]
    fn test_default_port() {
        assert_eq!(with_default_port("localhost"), "localhost:4730");
        assert_eq!(with_default_port("localhost:7003"), "localhost:7003");
        assert_eq!(with_default_port("127.0.0.1:1"), "127.0.0.1:1");
        assert_eq!(with_default_port("[::1]"), "[::1]:4730");
        assert_eq!(with_default_port("[::1]:99"), "[::1]:99");
        assert_eq!(with_default_port("::1"), "[::1]:4730");
        assert_eq!(with_default_port("fe80::1:2"), "[fe80::1:2]:4730");
    }

    #[tokio::test]
    async fn test_tcp_connection_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let mut conn = connect(Network::Tcp, &addr).await.unwrap();
        conn.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();

        assert_eq!(&buf, b"ping");
        server.await.unwrap();
    }
}
