//! Transports over TLS-on-TCP, built with OpenSSL.
//!
//! A [`TlsTransportFactory`] accepts and connects like the plain TCP
//! factory, but runs the appropriate TLS handshake as soon as the TCP
//! connection is up.  Its trust and identity settings come from a
//! single-shot [`TlsFactoryBuilder`].

use crate::tcp::bind_listener;
use crate::traits::{BoxTransport, Listener, Transport, TransportFactory, TransportId};
use crate::{Error, Result};
use ferry_socksproto::Address;

use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};
use openssl::dh::Dh;
use openssl::ssl::{
    Ssl, SslContext, SslContextBuilder, SslFiletype, SslMethod, SslOptions, SslVerifyMode,
};
use openssl::x509::store::X509Lookup;
use tokio::net::{TcpListener as TokioTcpListener, TcpStream as TokioTcpStream};
use tokio_openssl::SslStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt as _};
use tracing::debug;

use std::io::Result as IoResult;
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A transport over TLS on TCP.
///
/// The TLS shutdown is driven by `close()`: OpenSSL insists that the
/// shutdown completes before the stream object is destroyed, and the
/// tokio-openssl stream we hold does exactly that from its
/// `poll_shutdown`.
pub(crate) struct TlsTransport {
    /// Underlying TLS stream, wrapped for the futures-io traits.
    s: Compat<SslStream<TokioTcpStream>>,
    /// This transport's identifier.
    id: TransportId,
}

impl AsyncRead for TlsTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<IoResult<usize>> {
        Pin::new(&mut self.s).poll_read(cx, buf)
    }
}

impl AsyncWrite for TlsTransport {
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

impl Transport for TlsTransport {
    fn id(&self) -> TransportId {
        self.id
    }
    fn local_address(&self) -> IoResult<Address> {
        Ok(self.s.get_ref().get_ref().local_addr()?.into())
    }
}

/// A builder for [`TlsTransportFactory`].
///
/// Every option is applied at most once, before [`TlsFactoryBuilder::build`];
/// `build()` consumes the builder, so it cannot be reused.
///
/// The protocol floor is set at construction: SSLv2, SSLv3 and TLSv1.0
/// are disabled, single-use DH keys and OpenSSL's default bug
/// workarounds are enabled.  Verification is off until
/// [`TlsFactoryBuilder::set_verify_peer`] turns it on.
pub struct TlsFactoryBuilder {
    /// The OpenSSL context being configured.
    ctx: SslContextBuilder,
    /// Hostname to verify (and name in SNI) on outbound handshakes.
    verify_host: Option<String>,
}

impl TlsFactoryBuilder {
    /// Construct a new builder with the protocol floor applied.
    pub fn new() -> Result<Self> {
        let mut ctx = SslContextBuilder::new(SslMethod::tls())?;
        ctx.set_options(
            SslOptions::ALL
                | SslOptions::NO_SSLV2
                | SslOptions::NO_SSLV3
                | SslOptions::NO_TLSV1
                | SslOptions::SINGLE_DH_USE,
        );
        Ok(TlsFactoryBuilder {
            ctx,
            verify_host: None,
        })
    }

    /// Add a directory of trusted CA certificates, laid out with
    /// OpenSSL's hashed-name scheme.
    pub fn add_ca_path(&mut self, dir: &str) -> Result<&mut Self> {
        let lookup = self.ctx.cert_store_mut().add_lookup(X509Lookup::hash_dir())?;
        lookup.add_dir(dir, SslFiletype::PEM)?;
        Ok(self)
    }

    /// Add a PEM file of trusted CA certificates.
    pub fn load_ca_file<P: AsRef<Path>>(&mut self, pem_file: P) -> Result<&mut Self> {
        self.ctx.set_ca_file(pem_file)?;
        Ok(self)
    }

    /// Load this side's certificate from a PEM file.
    pub fn load_cert<P: AsRef<Path>>(&mut self, pem_file: P) -> Result<&mut Self> {
        self.ctx.set_certificate_file(pem_file, SslFiletype::PEM)?;
        Ok(self)
    }

    /// Load this side's certificate chain from a PEM file.
    pub fn load_cert_chain<P: AsRef<Path>>(&mut self, pem_file: P) -> Result<&mut Self> {
        self.ctx.set_certificate_chain_file(pem_file)?;
        Ok(self)
    }

    /// Load this side's private key from a PEM file.
    pub fn load_private_key<P: AsRef<Path>>(&mut self, pem_file: P) -> Result<&mut Self> {
        self.ctx.set_private_key_file(pem_file, SslFiletype::PEM)?;
        Ok(self)
    }

    /// Load Diffie-Hellman parameters for forward secrecy from a PEM
    /// file.
    pub fn load_dh_params<P: AsRef<Path>>(&mut self, file: P) -> Result<&mut Self> {
        let pem = std::fs::read(file)?;
        let dh = Dh::params_from_pem(&pem)?;
        self.ctx.set_tmp_dh(&dh)?;
        Ok(self)
    }

    /// Limit how deep a peer's certificate chain may be.
    pub fn set_verify_depth(&mut self, depth: u32) -> &mut Self {
        self.ctx.set_verify_depth(depth);
        self
    }

    /// Turn peer verification on or off.
    ///
    /// When on, the peer must present a certificate and it must
    /// verify, once per connection (no re-verification on
    /// renegotiation); when off, no verification happens at all.
    pub fn set_verify_peer(&mut self, verify: bool) -> &mut Self {
        if verify {
            self.ctx.set_verify(
                SslVerifyMode::PEER
                    | SslVerifyMode::FAIL_IF_NO_PEER_CERT
                    | SslVerifyMode::CLIENT_ONCE,
            );
        } else {
            self.ctx.set_verify(SslVerifyMode::NONE);
        }
        self
    }

    /// On outbound handshakes, require that the peer's certificate
    /// matches `host` under the RFC 2818 rules.  The name is also used
    /// for SNI.
    pub fn set_verify_host(&mut self, host: &str) -> &mut Self {
        self.verify_host = Some(host.to_string());
        self
    }

    /// Consume this builder and produce a factory.
    pub fn build(self) -> TlsTransportFactory {
        TlsTransportFactory {
            ctx: self.ctx.build(),
            verify_host: self.verify_host,
        }
    }
}

/// A factory that creates TLS-over-TCP transports.
#[derive(Clone)]
pub struct TlsTransportFactory {
    /// The configured OpenSSL context, shared by every connection.
    ctx: SslContext,
    /// Hostname to verify (and name in SNI) on outbound handshakes.
    verify_host: Option<String>,
}

impl TlsTransportFactory {
    /// Run the client-side handshake over a connected TCP stream.
    async fn client_handshake(&self, tcp: TokioTcpStream) -> Result<TlsTransport> {
        let mut ssl = Ssl::new(&self.ctx)?;
        if let Some(host) = &self.verify_host {
            ssl.set_hostname(host)?;
            ssl.param_mut().set_host(host)?;
        }
        let mut stream = SslStream::new(ssl, tcp)?;
        // A failed handshake drops the stream, closing the socket.
        Pin::new(&mut stream).connect().await.map_err(Error::Tls)?;
        Ok(TlsTransport {
            s: stream.compat(),
            id: TransportId::next(),
        })
    }
}

#[async_trait]
impl TransportFactory for TlsTransportFactory {
    async fn listen(&self, addr: &SocketAddr) -> Result<Box<dyn Listener>> {
        let lis = bind_listener(addr)?;
        debug!(local = %lis.local_addr()?, "listening for tls connections");
        Ok(Box::new(TlsListener {
            lis,
            ctx: self.ctx.clone(),
        }))
    }

    async fn connect(&self, addr: &SocketAddr) -> Result<BoxTransport> {
        let s = TokioTcpStream::connect(addr).await?;
        s.set_nodelay(true)?;
        let t = self.client_handshake(s).await?;
        debug!(id = %t.id(), peer = %addr, "tls connection established");
        Ok(Box::new(t))
    }
}

/// Listener returned by [`TlsTransportFactory::listen`].
pub(crate) struct TlsListener {
    /// The underlying tokio listener.
    lis: TokioTcpListener,
    /// The OpenSSL context used for server-side handshakes.
    ctx: SslContext,
}

#[async_trait]
impl Listener for TlsListener {
    async fn accept(&self) -> Result<(BoxTransport, SocketAddr)> {
        let (s, peer) = self.lis.accept().await?;
        s.set_nodelay(true)?;

        let ssl = Ssl::new(&self.ctx)?;
        let mut stream = SslStream::new(ssl, s)?;
        let handshake = Pin::new(&mut stream).accept().await;
        let t = match handshake {
            Ok(()) => TlsTransport {
                s: stream.compat(),
                id: TransportId::next(),
            },
            Err(e) => {
                // The handshake failed; dropping the stream closes the
                // socket.
                debug!(peer = %peer, err = %e, "tls handshake failed");
                return Err(Error::Tls(e));
            }
        };
        debug!(id = %t.id(), peer = %peer, "accepted tls connection");
        Ok((Box::new(t), peer))
    }

    fn local_addr(&self) -> IoResult<SocketAddr> {
        self.lis.local_addr()
    }
}
