//! Declare an error type for ferry_socksproto

use crate::msg::{AuthMethod, SocksStatus};
use thiserror::Error;

/// An error that occurs while negotiating a SOCKS handshake.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Tried to handle a message that wasn't complete: try again.
    #[error("Message truncated; need to wait for more")]
    Truncated,

    /// The peer didn't implement SOCKS correctly.
    ///
    /// (Or, more likely, we didn't account for its behavior.)
    #[error("SOCKS protocol syntax violation")]
    Syntax,

    /// The peer declared a SOCKS version number that isn't
    /// one we support.
    ///
    /// In all likelihood, this is somebody trying to speak some
    /// protocol other than SOCKS5 at us.
    #[error("Unrecognized SOCKS protocol version {0}")]
    BadProtocol(u8),

    /// The peer tried to use a SOCKS feature that we don't support
    /// at all.
    #[error("SOCKS feature not supported")]
    NoSupport,

    /// The upstream SOCKS server selected an authentication method
    /// that we never offered.
    #[error("Upstream selected unsupported SOCKS auth method {0}")]
    BadAuthMethod(AuthMethod),

    /// The upstream SOCKS server refused our request.  Carries the
    /// reply code it sent.
    #[error("Upstream refused SOCKS request: {0}")]
    RequestRefused(SocksStatus),

    /// Tried to progress the SOCKS handshake when it was already
    /// finished.  This is a programming error.
    #[error("SOCKS handshake was finished; no need to call this again")]
    AlreadyFinished,

    /// Something went wrong with the programming of this module.
    #[error("Internal programming error while handling SOCKS handshake")]
    Internal,
}

impl From<ferry_bytes::Error> for Error {
    fn from(e: ferry_bytes::Error) -> Error {
        use ferry_bytes::Error as E;
        match e {
            E::Truncated => Error::Truncated,
            _ => Error::Syntax,
        }
    }
}
