//! A SOCKS5 forwarding proxy with pluggable upstreams.
//!
//! `ferry` accepts SOCKS5 connections on a local endpoint and
//! forwards each session's bytes to a chosen *upstream*: either
//! straight to the requested target, or relayed through another
//! SOCKS5 server.  Both the listening side and the upstream side can
//! run over plain TCP or over TLS.
//!
//! Only the `CONNECT` command and the no-authentication method are
//! supported; there is no UDP relay, no `BIND`, and no SOCKS4.
//!
//! # Command-line arguments
//!
//! `-f <filename>` adds a configuration file to the list that gets
//! loaded and merged.  You can use this multiple times.
//!
//! `-c <key>=<value>` sets a single configuration option, applied
//! after all configuration files are loaded.
//!
//! # Configuration
//!
//! The configuration is TOML; the defaults live in
//! [`ferry_defaults.toml`](./ferry_defaults.toml) and document every
//! option.

#![warn(missing_docs)]
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
#![deny(clippy::unwrap_used)]

mod exit;
mod proxy;
mod relay;
mod upstream;

use crate::upstream::{DirectUpstream, SocksUpstream, UpstreamConnector};
use ferry_transport::{TcpTransportFactory, TlsFactoryBuilder, TlsTransportFactory, TransportFactory};

use anyhow::Result;
use argh::FromArgs;
use futures::FutureExt;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::info;

#[derive(FromArgs, Debug, Clone)]
/// Accept SOCKS5 connections and forward them to a configured
/// upstream.
struct Args {
    /// override the default location(s) for the configuration file
    #[argh(option, short = 'f')]
    rc: Vec<String>,
    /// override a configuration option (key=value)
    #[argh(option, short = 'c')]
    cfg: Vec<String>,
}

/// Default options to use for our configuration.
const FERRY_DEFAULTS: &str = include_str!("./ferry_defaults.toml");

/// Structure to hold our configuration options, whether from a
/// configuration file or the command line.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct FerryConfig {
    /// Endpoint to listen on for incoming SOCKS connections.
    listen_addr: SocketAddr,
    /// Whether to log at trace level.
    trace: bool,

    /// If present, terminate TLS on the listening side with these
    /// settings.
    downstream_tls: Option<TlsConfig>,

    /// If present, relay through this upstream SOCKS server instead
    /// of connecting directly.
    upstream: Option<UpstreamConfig>,
}

/// Configuration for one TLS context, downstream or upstream.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    /// PEM file holding this side's certificate.
    cert: Option<String>,
    /// PEM file holding this side's certificate chain.
    cert_chain: Option<String>,
    /// PEM file holding this side's private key.
    private_key: Option<String>,
    /// PEM file of Diffie-Hellman parameters, for forward secrecy.
    dh_params: Option<String>,
    /// PEM file of trusted CA certificates.
    ca_file: Option<String>,
    /// Directory of trusted CA certificates, with hashed-name lookup.
    ca_path: Option<String>,
    /// Whether to verify the peer's certificate (and require one).
    #[serde(default)]
    verify_peer: bool,
    /// Maximum certificate chain depth accepted when verifying.
    verify_depth: Option<u32>,
    /// Require the peer certificate to match this hostname.
    verify_host: Option<String>,
}

/// Configuration for relaying through an upstream SOCKS server.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Hostname (or textual IP) of the upstream server.
    host: String,
    /// Port of the upstream server.
    port: u16,
    /// If present, speak TLS to the upstream with these settings.
    tls: Option<TlsConfig>,
}

/// Build a TLS transport factory from one [`TlsConfig`] section.
fn build_tls_factory(cfg: &TlsConfig) -> Result<TlsTransportFactory> {
    let mut b = TlsFactoryBuilder::new()?;
    if let Some(path) = &cfg.ca_path {
        b.add_ca_path(path)?;
    }
    if let Some(file) = &cfg.ca_file {
        b.load_ca_file(file)?;
    }
    if let Some(file) = &cfg.cert {
        b.load_cert(file)?;
    }
    if let Some(file) = &cfg.cert_chain {
        b.load_cert_chain(file)?;
    }
    if let Some(file) = &cfg.private_key {
        b.load_private_key(file)?;
    }
    if let Some(file) = &cfg.dh_params {
        b.load_dh_params(file)?;
    }
    if let Some(depth) = cfg.verify_depth {
        b.set_verify_depth(depth);
    }
    b.set_verify_peer(cfg.verify_peer);
    if let Some(host) = &cfg.verify_host {
        b.set_verify_host(host);
    }
    Ok(b.build())
}

/// Build the transport factory for one side of the proxy.
fn build_factory(tls: &Option<TlsConfig>) -> Result<Arc<dyn TransportFactory>> {
    Ok(match tls {
        Some(cfg) => Arc::new(build_tls_factory(cfg)?),
        None => Arc::new(TcpTransportFactory::new()),
    })
}

/// Run the main loop of the proxy.
async fn run(config: FerryConfig) -> Result<()> {
    let downstream = build_factory(&config.downstream_tls)?;

    let upstream: Arc<dyn UpstreamConnector> = match &config.upstream {
        Some(cfg) => {
            info!("relaying through upstream {}:{}", cfg.host, cfg.port);
            let factory = build_factory(&cfg.tls)?;
            Arc::new(SocksUpstream::new(cfg.host.clone(), cfg.port, factory))
        }
        None => {
            let factory = build_factory(&None)?;
            Arc::new(DirectUpstream::new(factory))
        }
    };

    futures::select!(
        r = exit::wait_for_ctrl_c().fuse() => r,
        r = proxy::run_socks_proxy(downstream, upstream, config.listen_addr).fuse() => r,
    )
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();

    let mut cfg = config::Config::new();
    cfg.merge(config::File::from_str(
        FERRY_DEFAULTS,
        config::FileFormat::Toml,
    ))?;
    for fname in &args.rc {
        cfg.merge(config::File::with_name(fname))?;
    }
    for pair in &args.cfg {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("invalid -c override (want key=value): {}", pair))?;
        cfg.set(key, value.to_string())?;
    }
    let config: FerryConfig = cfg.try_into()?;

    let filt = if config.trace {
        LevelFilter::TRACE
    } else {
        LevelFilter::DEBUG
    };
    tracing_subscriber::fmt().with_max_level(filt).init();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(config))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn load_default_config() -> Result<()> {
        let mut cfg = config::Config::new();
        cfg.merge(config::File::from_str(
            FERRY_DEFAULTS,
            config::FileFormat::Toml,
        ))?;

        let parsed: FerryConfig = cfg.try_into()?;
        assert_eq!(parsed.listen_addr.port(), 1080);
        assert!(parsed.downstream_tls.is_none());
        assert!(parsed.upstream.is_none());
        Ok(())
    }

    #[test]
    fn overrides_win() -> Result<()> {
        let mut cfg = config::Config::new();
        cfg.merge(config::File::from_str(
            FERRY_DEFAULTS,
            config::FileFormat::Toml,
        ))?;
        cfg.set("listen_addr", "127.0.0.1:9099".to_string())?;
        cfg.set("upstream.host", "hop.example".to_string())?;
        cfg.set("upstream.port", 1080_i64)?;

        let parsed: FerryConfig = cfg.try_into()?;
        assert_eq!(parsed.listen_addr.port(), 9099);
        let upstream = parsed.upstream.expect("upstream section missing");
        assert_eq!(upstream.host, "hop.example");
        Ok(())
    }
}
