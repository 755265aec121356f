//! A transport wrapper that overrides the reported local address.

use crate::traits::{BoxTransport, Transport, TransportId};
use ferry_socksproto::Address;

use futures::io::{AsyncRead, AsyncWrite};
use std::io::Result as IoResult;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A transport that forwards everything to an inner transport, but
/// reports a fixed local address.
///
/// When a connection is relayed through an upstream SOCKS server, the
/// endpoint that the rest of the world sees is the one the server
/// bound on our behalf and told us about, not the local endpoint of
/// our TCP socket to the server.  Wrapping the transport in this type
/// makes `local_address()` say so.
pub struct LocalAddrOverride {
    /// The transport all I/O is forwarded to.
    inner: BoxTransport,
    /// The address `local_address()` reports.
    local: Address,
}

impl LocalAddrOverride {
    /// Wrap `inner`, overriding its local address with `local`.
    pub fn new(inner: BoxTransport, local: Address) -> Self {
        LocalAddrOverride { inner, local }
    }
}

impl AsyncRead for LocalAddrOverride {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<IoResult<usize>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for LocalAddrOverride {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<IoResult<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }
    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }
    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        Pin::new(&mut self.inner).poll_close(cx)
    }
}

impl Transport for LocalAddrOverride {
    fn id(&self) -> TransportId {
        self.inner.id()
    }
    fn local_address(&self) -> IoResult<Address> {
        Ok(self.local.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tcp::TcpTransportFactory;
    use crate::traits::TransportFactory;
    use futures::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn override_reports_given_address() {
        let factory = TcpTransportFactory::new();
        let lis = factory
            .listen(&"127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = lis.local_addr().unwrap();

        let (client, server) =
            tokio::join!(factory.connect(&addr), async { lis.accept().await });
        let client = client.unwrap();
        let (mut server, _) = server.unwrap();

        let reported = Address::from_parts("reported.example", 4444).unwrap();
        let inner_id = client.id();
        let mut wrapped = LocalAddrOverride::new(client, reported.clone());

        // The identity and the byte stream are the inner transport's;
        // only the local address changes.
        assert_eq!(wrapped.id(), inner_id);
        assert_eq!(wrapped.local_address().unwrap(), reported);

        wrapped.write_all(b"pass through").await.unwrap();
        wrapped.close().await.unwrap();
        let mut got = Vec::new();
        server.read_to_end(&mut got).await.unwrap();
        assert_eq!(&got[..], b"pass through");
    }
}
