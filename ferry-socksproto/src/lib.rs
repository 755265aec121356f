//! Implements the subset of SOCKS5 spoken by ferry.
//!
//! SOCKS is an old and somewhat janky protocol for telling a TCP
//! proxy where to connect.  This crate implements the SOCKS5 flavor
//! described in [RFC 1928](https://tools.ietf.org/html/rfc1928),
//! restricted to the "no authentication" method and the CONNECT
//! command.
//!
//! Nothing here does I/O: the handshake types are stateful machines
//! that consume buffers of bytes received from a peer and tell the
//! caller what to send back, so the same code drives both sides of
//! the protocol:
//!
//!   * [`ServerHandshake`] speaks to a downstream SOCKS client and
//!     eventually yields a [`SocksRequest`].
//!   * [`ClientHandshake`] speaks to an upstream SOCKS server and
//!     eventually yields the bound [`Address`] the server reported.

#![deny(missing_docs)]
#![deny(unreachable_pub)]
#![deny(clippy::await_holding_lock)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::cognitive_complexity)]
#![deny(clippy::debug_assert_with_mut_call)]
#![deny(clippy::exhaustive_enums)]
#![deny(clippy::exhaustive_structs)]
#![deny(clippy::expl_impl_clone_on_copy)]
#![deny(clippy::fallible_impl_from)]
#![deny(clippy::large_stack_arrays)]
#![warn(clippy::manual_ok_or)]
#![deny(clippy::missing_docs_in_private_items)]
#![warn(clippy::option_option)]
#![warn(clippy::rc_buffer)]
#![deny(clippy::ref_option_ref)]
#![warn(clippy::trait_duplication_in_bounds)]
#![warn(clippy::unseparated_literal_suffix)]

mod addr;
mod err;
mod handshake;
mod msg;

pub use addr::{Address, HostAddr, Hostname};
pub use err::Error;
pub use handshake::{Action, ClientHandshake, ServerHandshake};
pub use msg::{
    AuthMethod, AuthReply, AuthRequest, ConnectReply, ConnectRequest, SocksCmd, SocksRequest,
    SocksStatus,
};

/// A Result type for the ferry_socksproto crate.
pub type Result<T> = std::result::Result<T, Error>;
