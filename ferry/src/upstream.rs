//! Upstream connectors: given a target address, obtain a transport
//! that delivers bytes to it.
//!
//! Two kinds exist: [`DirectUpstream`] connects straight to the
//! target, resolving hostnames through the OS resolver;
//! [`SocksUpstream`] relays every request through another SOCKS5
//! server, resolving *that* server's address once and caching the
//! winning endpoint.

use ferry_socksproto::{Address, ClientHandshake, Error as SocksError, HostAddr, SocksStatus};
use ferry_transport::{
    BoxTransport, Error as TransportError, LocalAddrOverride, TransportFactory,
};

use async_trait::async_trait;
use futures::io::{AsyncReadExt, AsyncWriteExt};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// An error from an upstream connector.
#[derive(Debug, Error)]
pub(crate) enum UpstreamError {
    /// An OS-level socket error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The target (or upstream server) hostname would not resolve.
    #[error("could not resolve {host}: {source}")]
    Resolve {
        /// The hostname that failed to resolve.
        host: String,
        /// The resolver's error.
        #[source]
        source: io::Error,
    },

    /// The transport to the target (or upstream server) could not be
    /// created.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The SOCKS exchange with the upstream server failed.
    #[error("upstream SOCKS error: {0}")]
    Socks(#[from] SocksError),
}

impl UpstreamError {
    /// Map this error onto the SOCKS status code that the downstream
    /// client should be told.
    pub(crate) fn status(&self) -> SocksStatus {
        match self {
            UpstreamError::Resolve { .. } => SocksStatus::HOST_UNREACHABLE,
            UpstreamError::Socks(SocksError::RequestRefused(s)) => *s,
            _ => SocksStatus::GENERAL_FAILURE,
        }
    }
}

/// An object that can turn a target address into an established
/// transport, by whatever route it implements.
#[async_trait]
pub(crate) trait UpstreamConnector: Send + Sync {
    /// Establish a connection to `target`.
    ///
    /// On failure the connector has already closed anything it opened;
    /// the error surfaces exactly once, here.
    async fn request(&self, target: &Address) -> Result<BoxTransport, UpstreamError>;
}

/// An upstream that connects directly to the requested target.
pub(crate) struct DirectUpstream {
    /// Factory used for the outbound connections.
    factory: Arc<dyn TransportFactory>,
}

impl DirectUpstream {
    /// Construct a new DirectUpstream using `factory` for its
    /// connections.
    pub(crate) fn new(factory: Arc<dyn TransportFactory>) -> Self {
        DirectUpstream { factory }
    }
}

#[async_trait]
impl UpstreamConnector for DirectUpstream {
    async fn request(&self, target: &Address) -> Result<BoxTransport, UpstreamError> {
        info!("direct connection to {}", target);
        match target.host() {
            HostAddr::Ip(ip) => {
                let addr = SocketAddr::new(*ip, target.port());
                Ok(self.factory.connect(&addr).await?)
            }
            HostAddr::Hostname(h) => {
                let host = h.as_ref();
                let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, target.port()))
                    .await
                    .map_err(|e| UpstreamError::Resolve {
                        host: host.to_string(),
                        source: e,
                    })?
                    .collect();
                debug!(host = %host, results = addrs.len(), "resolved target");
                let (_addr, transport) = self.factory.connect_any(&addrs).await?;
                Ok(transport)
            }
        }
    }
}

/// An upstream that relays every request through another SOCKS5
/// server.
///
/// The upstream server's own address is resolved on the first request
/// and the winning endpoint cached; concurrent first requests share
/// that one resolution.  The transport the first request opens while
/// probing is kept and used for its own handshake, so no connection
/// is wasted.
pub(crate) struct SocksUpstream {
    /// Hostname (or textual IP) of the upstream server.
    host: String,
    /// Port of the upstream server.
    port: u16,
    /// Factory used for connections to the upstream server.
    factory: Arc<dyn TransportFactory>,
    /// The resolved-and-probed endpoint of the upstream server.
    endpoint: OnceCell<SocketAddr>,
}

impl SocksUpstream {
    /// Construct a new SocksUpstream relaying through `host:port`.
    pub(crate) fn new(host: String, port: u16, factory: Arc<dyn TransportFactory>) -> Self {
        SocksUpstream {
            host,
            port,
            factory,
            endpoint: OnceCell::new(),
        }
    }

    /// Drive the client-side SOCKS handshake for `target` over
    /// `transport`.
    ///
    /// Any failure closes the transport before the error is returned.
    async fn handshake(
        &self,
        target: &Address,
        mut transport: BoxTransport,
    ) -> Result<BoxTransport, UpstreamError> {
        let id = transport.id();
        let mut hs = ClientHandshake::new(target.clone());

        debug!(id = %id, "sending SOCKS auth request");
        let opening = hs.start()?;
        if let Err(e) = transport.write_all(&opening).await {
            let _ = transport.close().await;
            return Err(e.into());
        }

        let mut inbuf = [0_u8; 1024];
        let mut n_read = 0;
        let bound = loop {
            let n = match transport.read(&mut inbuf[n_read..]).await {
                Ok(0) => {
                    let _ = transport.close().await;
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "upstream closed during SOCKS handshake",
                    )
                    .into());
                }
                Ok(n) => n,
                Err(e) => {
                    let _ = transport.close().await;
                    return Err(e.into());
                }
            };
            n_read += n;

            let action = match hs.handshake(&inbuf[..n_read]) {
                Err(SocksError::Truncated) => continue,
                Err(e) => {
                    let _ = transport.close().await;
                    return Err(e.into());
                }
                Ok(action) => action,
            };

            if action.drain > 0 {
                inbuf.copy_within(action.drain..n_read, 0);
                n_read -= action.drain;
            }
            if !action.reply.is_empty() {
                debug!(id = %id, "sending SOCKS request");
                if let Err(e) = transport.write_all(&action.reply).await {
                    let _ = transport.close().await;
                    return Err(e.into());
                }
            }
            if action.finished {
                break hs.into_bound_addr();
            }
        };

        // A finished, successful client handshake always has a bound
        // address.
        let bound = match bound {
            Some(b) => b,
            None => {
                let _ = transport.close().await;
                return Err(SocksError::Internal.into());
            }
        };

        info!(id = %id, bound = %bound, "connection to {} established via upstream", target);
        // The endpoint the world sees is the one the server bound for
        // us, not our TCP socket's.
        Ok(Box::new(LocalAddrOverride::new(transport, bound)))
    }
}

#[async_trait]
impl UpstreamConnector for SocksUpstream {
    async fn request(&self, target: &Address) -> Result<BoxTransport, UpstreamError> {
        info!(
            "requesting {} via upstream {}:{}",
            target, self.host, self.port
        );

        // The first request through resolves the upstream and probes
        // the results; everyone waiting on the cell shares that work.
        let mut first: Option<BoxTransport> = None;
        let endpoint = self
            .endpoint
            .get_or_try_init(|| async {
                debug!(host = %self.host, port = self.port, "resolving upstream address");
                let addrs: Vec<SocketAddr> =
                    tokio::net::lookup_host((self.host.as_str(), self.port))
                        .await
                        .map_err(|e| UpstreamError::Resolve {
                            host: self.host.clone(),
                            source: e,
                        })?
                        .collect();
                let (addr, transport) = self.factory.connect_any(&addrs).await?;
                debug!(endpoint = %addr, "upstream endpoint cached");
                first = Some(transport);
                Ok::<SocketAddr, UpstreamError>(addr)
            })
            .await?;

        // The initializing request reuses the connection it just
        // opened; everyone else connects to the cached endpoint.
        let transport = match first {
            Some(t) => t,
            None => self.factory.connect(endpoint).await?,
        };

        self.handshake(target, transport).await
    }
}
