//! Async byte-stream transports for ferry.
//!
//! A [`Transport`] is an established, bidirectional connection to one
//! peer.  We express I/O with the [`futures::io::AsyncRead`] and
//! [`futures::io::AsyncWrite`] traits, bridging from the underlying
//! tokio types with `tokio-util`'s compatibility layer, so that
//! everything above this crate can stay runtime-neutral in vocabulary.
//!
//! Transports are created by a [`TransportFactory`], which either
//! accepts inbound connections through a [`Listener`] or connects
//! outbound.  Two factories are provided: plain TCP
//! ([`TcpTransportFactory`]) and TLS-over-TCP
//! ([`TlsTransportFactory`], configured through
//! [`TlsFactoryBuilder`]).
//!
//! Every transport carries a process-unique [`TransportId`], which
//! appears in log lines so that one connection's records can be
//! correlated.

#![deny(missing_docs)]
#![deny(unreachable_pub)]
#![deny(clippy::await_holding_lock)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::cognitive_complexity)]
#![deny(clippy::debug_assert_with_mut_call)]
#![deny(clippy::exhaustive_enums)]
#![deny(clippy::exhaustive_structs)]
#![deny(clippy::fallible_impl_from)]
#![warn(clippy::manual_ok_or)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::option_option)]
#![deny(clippy::ref_option_ref)]
#![warn(clippy::unseparated_literal_suffix)]

mod err;
mod tcp;
mod tls;
mod traits;
mod wrap;

pub use err::Error;
pub use tcp::TcpTransportFactory;
pub use tls::{TlsFactoryBuilder, TlsTransportFactory};
pub use traits::{BoxTransport, Listener, Transport, TransportFactory, TransportId};
pub use wrap::LocalAddrOverride;

/// A Result type for the ferry_transport crate.
pub type Result<T> = std::result::Result<T, Error>;
