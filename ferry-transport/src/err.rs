//! Declare error types for ferry_transport.

use thiserror::Error;

/// An error returned while creating or using a transport.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred on the underlying socket.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A TLS handshake or shutdown failed.
    #[error("TLS error: {0}")]
    Tls(#[from] openssl::ssl::Error),

    /// The TLS context could not be configured as requested.
    #[error("TLS configuration error: {0}")]
    TlsSetup(#[from] openssl::error::ErrorStack),

    /// A target we were given cannot be used.
    #[error("unusable target: {0}")]
    UnusableTarget(String),
}
