//! Declarations for the transport traits and their identifiers.

use crate::{Error, Result};
use ferry_socksproto::Address;

use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};
use futures::stream::{BoxStream, StreamExt};
use std::fmt;
use std::io::Result as IoResult;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// A process-unique identifier for one transport.
///
/// Identifiers are handed out from a global counter at construction
/// time and never reused; they exist so that the log lines belonging
/// to one connection can be told apart.  They render as hex, the way
/// they appear in the logs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransportId(u64);

/// The next transport identifier to hand out.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl TransportId {
    /// Return a fresh, never-before-used identifier.
    pub(crate) fn next() -> TransportId {
        TransportId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// An established, bidirectional byte stream to one peer.
///
/// Reads and writes go through the [`futures::io`] traits: `read()`
/// returns as soon as any bytes are available, `read_exact()` fills
/// its buffer or fails, and `write_all()` always completes fully on
/// success.  Closing is `AsyncWrite::close()`; on TLS transports this
/// drives the TLS shutdown before the socket can be destroyed.
/// Dropping a transport closes the underlying socket.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {
    /// Return the process-unique identifier of this transport.
    fn id(&self) -> TransportId;

    /// Return the local address this transport is bound to.
    ///
    /// For wrapped transports this may be an address someone else
    /// reported for us, and so may name a host rather than an IP.
    fn local_address(&self) -> IoResult<Address>;
}

/// Alias for the transport trait objects handed around by factories.
pub type BoxTransport = Box<dyn Transport + 'static>;

/// A local socket that accepts inbound connections and turns them
/// into transports.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Wait for one inbound connection; return the resulting
    /// transport along with the peer's address.
    ///
    /// For TLS listeners this includes the server-side handshake, so a
    /// misbehaving client surfaces here as [`Error::Tls`]; such
    /// per-connection failures should not stop the caller from
    /// accepting again.  An error from the accept call itself is
    /// grounds to stop.
    async fn accept(&self) -> Result<(BoxTransport, SocketAddr)>;

    /// Return the local address this listener is bound to.
    fn local_addr(&self) -> IoResult<SocketAddr>;

    /// Wrap this listener into a stream that accepts forever.
    ///
    /// Per-connection failures come through as `Err` items; the
    /// stream itself never ends.
    fn incoming(self: Box<Self>) -> BoxStream<'static, Result<(BoxTransport, SocketAddr)>> {
        futures::stream::unfold(self, |listener| async move {
            let accepted = listener.accept().await;
            Some((accepted, listener))
        })
        .boxed()
    }
}

/// An object that creates transports, either by accepting inbound
/// connections or by connecting outbound.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Bind a listener on `addr`.
    ///
    /// The listener socket has `SO_REUSEADDR` set; sockets it accepts
    /// get `TCP_NODELAY`.
    async fn listen(&self, addr: &SocketAddr) -> Result<Box<dyn Listener>>;

    /// Open one outbound connection to `addr`.
    ///
    /// The connected socket gets `TCP_NODELAY`; TLS factories also run
    /// the client-side handshake before returning.
    async fn connect(&self, addr: &SocketAddr) -> Result<BoxTransport>;

    /// Walk a list of resolver results, returning the first address
    /// that accepts a connection together with the transport.
    ///
    /// Later callers that cached the winning address can call
    /// [`TransportFactory::connect`] with it directly.
    async fn connect_any(&self, addrs: &[SocketAddr]) -> Result<(SocketAddr, BoxTransport)> {
        let mut last_err = None;
        for addr in addrs {
            match self.connect(addr).await {
                Ok(t) => return Ok((*addr, t)),
                Err(e) => {
                    debug!(peer = %addr, err = %e, "candidate address failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| Error::UnusableTarget("no addresses to connect to".to_string())))
    }
}
