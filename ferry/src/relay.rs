//! Shuttle bytes between the two sides of an established session.

use ferry_transport::BoxTransport;

use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use std::io::Result as IoResult;
use tracing::debug;

/// Size of the copy buffer each direction allocates for itself.
const BUF_LEN: usize = 8 * 1024;

/// Pump bytes between `a` and `b` until both directions are finished.
///
/// The two directions are independent: when one side's reader reaches
/// EOF or fails, the opposite writer is closed (a half-close, so the
/// other direction keeps flowing), and when both directions have
/// settled the transports are dropped, which closes them for good.
pub(crate) async fn relay(a: BoxTransport, b: BoxTransport) {
    let (a_id, b_id) = (a.id(), b.id());
    let (a_read, a_write) = a.split();
    let (b_read, b_write) = b.split();

    let (ab, ba) = futures::join!(pump(a_read, b_write), pump(b_read, a_write));

    match ab {
        Ok(n) => debug!(from = %a_id, to = %b_id, bytes = n, "relay direction finished"),
        Err(e) => debug!(from = %a_id, to = %b_id, err = %e, "relay direction failed"),
    }
    match ba {
        Ok(n) => debug!(from = %b_id, to = %a_id, bytes = n, "relay direction finished"),
        Err(e) => debug!(from = %b_id, to = %a_id, err = %e, "relay direction failed"),
    }
}

/// Copy bytes from `src` into `dst` until EOF or an error, returning
/// how many bytes went through.
///
/// This is proxy traffic, so latency matters, but flushing after
/// every chunk would defeat whatever buffering the writer has (TLS
/// records, most notably).  The compromise: keep copying for as long
/// as the reader has bytes queued up, and flush only at the moment
/// the next read is about to block.
async fn pump<R, W>(mut src: R, mut dst: W) -> IoResult<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    use futures::{poll, task::Poll};

    let mut chunk = [0_u8; BUF_LEN];
    let mut copied: u64 = 0;

    let outcome = loop {
        let mut pending_read = src.read(&mut chunk);
        let got = match poll!(&mut pending_read) {
            // Bytes were already queued; take them without flushing.
            Poll::Ready(got) => got,
            // The reader has gone quiet: push out everything we have
            // buffered, then settle in to wait for it.
            Poll::Pending => {
                dst.flush().await?;
                pending_read.await
            }
        };
        match got {
            Ok(0) => break Ok(()),
            Ok(n) => {
                dst.write_all(&chunk[..n]).await?;
                copied += n as u64;
            }
            Err(e) => break Err(e),
        }
    };

    match outcome {
        Ok(()) => {
            // A clean EOF becomes a half-close of the peer, so it can
            // finish sending in the other direction.
            dst.close().await?;
            Ok(copied)
        }
        Err(e) => {
            // After a read error there is nothing orderly left to do;
            // try to push out what was buffered and report.
            let _ = dst.flush().await;
            Err(e)
        }
    }
}
