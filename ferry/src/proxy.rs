//! Implement the downstream side: accept SOCKS connections and relay
//! each one to the configured upstream.
//!
//! A proxy is launched with [`run_socks_proxy()`], which listens for
//! new connections and then drives one [`handle_socks_conn()`] task
//! per connection.

use crate::relay::relay;
use crate::upstream::UpstreamConnector;
use ferry_socksproto::{Error as SocksError, ServerHandshake, SocksCmd, SocksStatus};
use ferry_transport::{BoxTransport, Error as TransportError, Listener, TransportFactory};

use anyhow::{anyhow, Context, Result};
use futures::io::{AsyncReadExt, AsyncWriteExt};
use futures::stream::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Format a raw SOCKS5 failure reply carrying the all-zeros IPv4
/// address, for the cases where we have no parsed request to answer
/// through.
fn raw_error_reply(status: SocksStatus) -> [u8; 10] {
    [5, status.into(), 0, 1, 0, 0, 0, 0, 0, 0]
}

/// Launch a SOCKS proxy listening on `addr`, and run indefinitely.
pub(crate) async fn run_socks_proxy(
    factory: Arc<dyn TransportFactory>,
    upstream: Arc<dyn UpstreamConnector>,
    addr: SocketAddr,
) -> Result<()> {
    let listener = factory
        .listen(&addr)
        .await
        .context("Can't bind SOCKS listener")?;
    info!(local = %listener.local_addr()?, "listening for SOCKS connections");
    serve(listener, upstream).await
}

/// Accept connections from `listener` forever, spawning one task per
/// connection.
///
/// A failed TLS handshake on the listening side only costs us that
/// one connection; an error from the accept call itself ends the
/// loop.
async fn serve(listener: Box<dyn Listener>, upstream: Arc<dyn UpstreamConnector>) -> Result<()> {
    let mut incoming = listener.incoming();
    while let Some(accepted) = incoming.next().await {
        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(TransportError::Tls(e)) => {
                warn!(err = %e, "failed TLS handshake on SOCKS port");
                continue;
            }
            Err(e) => return Err(e).context("Failed to accept on SOCKS port"),
        };
        let upstream = Arc::clone(&upstream);
        tokio::spawn(async move {
            if let Err(e) = handle_socks_conn(stream, upstream).await {
                warn!(peer = %peer, err = %e, "connection exited with error");
            }
        });
    }
    Ok(())
}

/// Given a just-accepted transport on the SOCKS port, handle the
/// SOCKS handshake, obtain a matching upstream transport, and relay
/// bytes between the two until both sides are done.
async fn handle_socks_conn(
    mut stream: BoxTransport,
    upstream: Arc<dyn UpstreamConnector>,
) -> Result<()> {
    let id = stream.id();

    // Part 1: Perform the SOCKS handshake, to learn where we are
    // being asked to connect.  The handshake takes multiple round
    // trips, so this part runs in a loop.
    let mut handshake = ServerHandshake::new();
    let mut inbuf = [0_u8; 1024];
    let mut n_read = 0;
    let request = loop {
        // Read some more stuff.
        let n = stream
            .read(&mut inbuf[n_read..])
            .await
            .context("Error while reading SOCKS handshake")?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-handshake"));
        }
        n_read += n;

        // Try to advance the handshake to the next state.
        let action = match handshake.handshake(&inbuf[..n_read]) {
            Err(SocksError::Truncated) => continue,
            Err(e) => {
                // Say "no" in whatever way the protocol allows at the
                // point where things went wrong.
                match &e {
                    SocksError::BadProtocol(_) => {
                        let _ = stream.write_all(&[5, 0xff]).await;
                    }
                    SocksError::Syntax | SocksError::NoSupport => {
                        let _ = stream
                            .write_all(&raw_error_reply(SocksStatus::GENERAL_FAILURE))
                            .await;
                    }
                    _ => {}
                }
                return Err(e.into());
            }
            Ok(action) => action,
        };

        // Consume what was parsed, and reply if needed.
        if action.drain > 0 {
            inbuf.copy_within(action.drain..n_read, 0);
            n_read -= action.drain;
        }
        if !action.reply.is_empty() {
            stream
                .write_all(&action.reply)
                .await
                .context("Error while writing reply to SOCKS handshake")?;
        }
        if action.finished {
            break handshake.into_request();
        }
    };
    let request = match request {
        Some(r) => r,
        None => {
            // The no-acceptable-method reply has already been sent.
            info!(id = %id, "client offered no acceptable auth method");
            return Ok(());
        }
    };

    info!(id = %id, "got a socks request: {} {}", request.command(), request.dest());

    // Part 2: Only CONNECT is supported; everything else gets a
    // polite refusal and a close.
    if request.command() != SocksCmd::CONNECT {
        warn!(id = %id, cmd = %request.command(), "rejecting unsupported SOCKS command");
        let reply = request.reply(SocksStatus::COMMAND_NOT_SUPPORTED, None);
        stream
            .write_all(&reply)
            .await
            .context("Couldn't write SOCKS reply")?;
        return Ok(());
    }

    // Part 3: Ask the upstream for a transport to the target.  This
    // happens at most once per session.
    let target = match upstream.request(request.dest()).await {
        Ok(t) => t,
        Err(e) => {
            let reply = request.reply(e.status(), None);
            stream
                .write_all(&reply)
                .await
                .context("Couldn't write SOCKS reply")?;
            return Err(e.into());
        }
    };

    // Part 4: Tell the client where the upstream bound us, and start
    // pumping bytes.
    let bound = target
        .local_address()
        .context("Can't get bound address of upstream transport")?;
    info!(id = %id, upstream_id = %target.id(), bound = %bound, "session established");
    let reply = request.reply(SocksStatus::SUCCEEDED, Some(&bound));
    stream
        .write_all(&reply)
        .await
        .context("Couldn't write SOCKS reply")?;

    relay(stream, target).await;
    info!(id = %id, "session finished");
    Ok(())
}
