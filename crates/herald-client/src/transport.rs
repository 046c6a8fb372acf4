//! Byte-stream transport used to reach the server.
//!
//! The protocol engine only needs connect, write, read and close. Write, read
//! and close come from tokio's I/O traits on the returned stream; connect is
//! the [`Transport`] trait, which is dyn-compatible so a client can hold an
//! `Arc<dyn Transport>` and tests can substitute an in-memory one.

use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

/// A boxed connection as returned by [`Transport::connect`].
pub type BoxedConnection = Box<dyn Connection>;

/// Opens connections to `host:port`.
pub trait Transport: Send + Sync {
    fn connect<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = io::Result<BoxedConnection>> + Send + 'a>>;
}

/// Plain TCP transport. TLS is not performed, even for `https` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    fn connect<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = io::Result<BoxedConnection>> + Send + 'a>> {
        Box::pin(async move {
            let stream = tokio::net::TcpStream::connect((host, port)).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream) as BoxedConnection)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn transport_is_dyn_compatible() {
        fn _accept(_t: &dyn Transport) {}
        fn _assert_send_sync<T: Send + Sync>() {}
        _assert_send_sync::<Arc<dyn Transport>>();
    }

    #[tokio::test]
    async fn tcp_transport_roundtrip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let mut conn = TcpTransport.connect("127.0.0.1", port).await.unwrap();
        conn.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn tcp_transport_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(TcpTransport.connect("127.0.0.1", port).await.is_err());
    }
}
