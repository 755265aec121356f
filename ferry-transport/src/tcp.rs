//! Transports over plain TCP.

use crate::traits::{BoxTransport, Listener, Transport, TransportFactory, TransportId};
use crate::Result;
use ferry_socksproto::Address;

use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener as TokioTcpListener, TcpSocket, TcpStream as TokioTcpStream};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt as _};
use tracing::debug;

use std::io::Result as IoResult;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Backlog used for listener sockets.
const BACKLOG: u32 = 1024;

/// A transport over a plain TCP socket.
pub(crate) struct TcpTransport {
    /// Underlying tokio stream, wrapped for the futures-io traits.
    s: Compat<TokioTcpStream>,
    /// This transport's identifier.
    id: TransportId,
}

impl From<TokioTcpStream> for TcpTransport {
    fn from(s: TokioTcpStream) -> TcpTransport {
        TcpTransport {
            s: s.compat(),
            id: TransportId::next(),
        }
    }
}

impl AsyncRead for TcpTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<IoResult<usize>> {
        Pin::new(&mut self.s).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<IoResult<usize>> {
        Pin::new(&mut self.s).poll_write(cx, buf)
    }
    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        Pin::new(&mut self.s).poll_flush(cx)
    }
    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        Pin::new(&mut self.s).poll_close(cx)
    }
}

impl Transport for TcpTransport {
    fn id(&self) -> TransportId {
        self.id
    }
    fn local_address(&self) -> IoResult<Address> {
        Ok(self.s.get_ref().local_addr()?.into())
    }
}

/// A factory that creates plain-TCP transports.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct TcpTransportFactory;

impl TcpTransportFactory {
    /// Construct a new TcpTransportFactory.
    pub fn new() -> Self {
        TcpTransportFactory
    }
}

/// Bind a TCP listener socket on `addr`, with `SO_REUSEADDR` set.
pub(crate) fn bind_listener(addr: &SocketAddr) -> IoResult<TokioTcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(*addr)?;
    socket.listen(BACKLOG)
}

#[async_trait]
impl TransportFactory for TcpTransportFactory {
    async fn listen(&self, addr: &SocketAddr) -> Result<Box<dyn Listener>> {
        let lis = bind_listener(addr)?;
        debug!(local = %lis.local_addr()?, "listening for tcp connections");
        Ok(Box::new(TcpListener { lis }))
    }

    async fn connect(&self, addr: &SocketAddr) -> Result<BoxTransport> {
        let s = TokioTcpStream::connect(addr).await?;
        s.set_nodelay(true)?;
        let t = TcpTransport::from(s);
        debug!(id = %t.id(), peer = %addr, "tcp connection established");
        Ok(Box::new(t))
    }
}

/// Listener returned by [`TcpTransportFactory::listen`].
pub(crate) struct TcpListener {
    /// The underlying tokio listener.
    lis: TokioTcpListener,
}

#[async_trait]
impl Listener for TcpListener {
    async fn accept(&self) -> Result<(BoxTransport, SocketAddr)> {
        let (s, peer) = self.lis.accept().await?;
        s.set_nodelay(true)?;
        let t = TcpTransport::from(s);
        debug!(id = %t.id(), peer = %peer, "accepted tcp connection");
        Ok((Box::new(t), peer))
    }

    fn local_addr(&self) -> IoResult<SocketAddr> {
        self.lis.local_addr()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn connect_and_accept() {
        let factory = TcpTransportFactory::new();
        let lis = factory
            .listen(&"127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = lis.local_addr().unwrap();

        let (client, server) =
            tokio::join!(factory.connect(&addr), async { lis.accept().await });
        let mut client = client.unwrap();
        let (mut server, peer) = server.unwrap();

        // Each side sees a process-unique id and a real local address.
        assert_ne!(client.id(), server.id());
        assert_eq!(
            client.local_address().unwrap().to_socket_addr().unwrap(),
            peer
        );

        client.write_all(b"through the wire").await.unwrap();
        client.close().await.unwrap();
        let mut got = Vec::new();
        server.read_to_end(&mut got).await.unwrap();
        assert_eq!(&got[..], b"through the wire");
    }

    #[tokio::test]
    async fn incoming_yields_connections() {
        use futures::stream::StreamExt;

        let factory = TcpTransportFactory::new();
        let lis = factory
            .listen(&"127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = lis.local_addr().unwrap();
        let mut incoming = lis.incoming();

        let (one, _c1) = tokio::join!(incoming.next(), factory.connect(&addr));
        let (two, _c2) = tokio::join!(incoming.next(), factory.connect(&addr));
        let (one, _) = one.unwrap().unwrap();
        let (two, _) = two.unwrap().unwrap();
        assert_ne!(one.id(), two.id());
    }

    #[tokio::test]
    async fn connect_any_walks_the_list() {
        let factory = TcpTransportFactory::new();

        // Find a port that is (very probably) not listening.
        let dead = {
            let l = bind_listener(&"127.0.0.1:0".parse().unwrap()).unwrap();
            l.local_addr().unwrap()
        };

        let lis = factory
            .listen(&"127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let live = lis.local_addr().unwrap();

        let (winner, _t) = factory.connect_any(&[dead, live]).await.unwrap();
        assert_eq!(winner, live);

        // An empty list is an error, not a hang.
        assert!(factory.connect_any(&[]).await.is_err());

        // A list with only dead entries reports the last failure.
        assert!(factory.connect_any(&[dead]).await.is_err());
    }
}
