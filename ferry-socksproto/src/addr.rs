//! The address model shared by every SOCKS message.

use crate::{Error, Result};
use ferry_bytes::{Error as BytesError, Readable, Reader, Result as BytesResult, Writeable, Writer};

use std::convert::TryFrom;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// SOCKS5 address-type octet for an IPv4 address.
const ATYP_IPV4: u8 = 0x01;
/// SOCKS5 address-type octet for a hostname.
const ATYP_HOSTNAME: u8 = 0x03;
/// SOCKS5 address-type octet for an IPv6 address.
const ATYP_IPV6: u8 = 0x04;

/// A host as sent or received in a SOCKS handshake: either an IP
/// address, or a hostname that somebody else will resolve.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_enums)]
pub enum HostAddr {
    /// An IP address.
    Ip(IpAddr),
    /// A regular DNS hostname.
    Hostname(Hostname),
}

/// A hostname for use with SOCKS.  It is limited in length.
///
/// The protocol encodes hostnames with a one-byte length prefix, so
/// anything outside 1..=255 bytes is unrepresentable; this type makes
/// such values unconstructible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hostname(String);

/// A target or bound endpoint: a host plus a TCP port.
///
/// This is the `ATYP | ADDR | PORT` unit that appears in SOCKS
/// requests and replies.  The port is kept in host order in memory and
/// encoded big-endian on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    /// The host part of this endpoint.
    host: HostAddr,
    /// The TCP port of this endpoint.
    port: u16,
}

impl TryFrom<String> for Hostname {
    type Error = Error;
    fn try_from(s: String) -> Result<Hostname> {
        if s.is_empty() || s.len() > 255 {
            Err(Error::Syntax)
        } else {
            Ok(Hostname(s))
        }
    }
}

impl AsRef<str> for Hostname {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl From<Hostname> for String {
    fn from(h: Hostname) -> String {
        h.0
    }
}

impl Address {
    /// Construct a new Address from a host and a port.
    pub fn new(host: HostAddr, port: u16) -> Self {
        Address { host, port }
    }

    /// Construct an Address from textual `host` and a port.
    ///
    /// If `host` parses as an IP address it becomes an
    /// [`HostAddr::Ip`]; anything else is treated as a hostname.
    pub fn from_parts(host: &str, port: u16) -> Result<Self> {
        let host = match host.parse::<IpAddr>() {
            Ok(ip) => HostAddr::Ip(ip),
            Err(_) => HostAddr::Hostname(Hostname::try_from(host.to_string())?),
        };
        Ok(Address { host, port })
    }

    /// Return the host part of this address.
    pub fn host(&self) -> &HostAddr {
        &self.host
    }

    /// Return the TCP port of this address.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// If this address holds an IP address, return the corresponding
    /// `SocketAddr`.
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match self.host {
            HostAddr::Ip(ip) => Some(SocketAddr::new(ip, self.port)),
            HostAddr::Hostname(_) => None,
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(sa: SocketAddr) -> Address {
        Address {
            host: HostAddr::Ip(sa.ip()),
            port: sa.port(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            HostAddr::Ip(IpAddr::V4(ip)) => write!(f, "{}:{}", ip, self.port),
            HostAddr::Ip(IpAddr::V6(ip)) => write!(f, "[{}]:{}", ip, self.port),
            HostAddr::Hostname(h) => write!(f, "{}:{}", h.0, self.port),
        }
    }
}

impl Readable for Address {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Address> {
        let atype = r.take_u8()?;
        let host = match atype {
            ATYP_IPV4 => {
                let ip4 = std::net::Ipv4Addr::from(r.take_u32()?);
                HostAddr::Ip(ip4.into())
            }
            ATYP_HOSTNAME => {
                let hlen = r.take_u8()?;
                if hlen == 0 {
                    return Err(BytesError::BadMessage("zero-length hostname"));
                }
                let hostname = r.take(hlen as usize)?;
                let hostname = std::str::from_utf8(hostname)
                    .map_err(|_| BytesError::BadMessage("bad utf8 on hostname"))?
                    .to_string();
                // Length was checked above, so the only way this can
                // fail is if the hostname is empty, which it is not.
                let hostname =
                    Hostname::try_from(hostname).map_err(|_| BytesError::BadMessage("hostname"))?;
                HostAddr::Hostname(hostname)
            }
            ATYP_IPV6 => {
                let ip6 = std::net::Ipv6Addr::from(r.take_u128()?);
                HostAddr::Ip(ip6.into())
            }
            _ => return Err(BytesError::BadMessage("unrecognized address type")),
        };
        let port = r.take_u16()?;
        Ok(Address { host, port })
    }
}

impl Writeable for Address {
    fn write_onto<W: Writer + ?Sized>(&self, w: &mut W) {
        match &self.host {
            HostAddr::Ip(IpAddr::V4(ip)) => {
                w.write_u8(ATYP_IPV4);
                w.write_all(&ip.octets());
            }
            HostAddr::Ip(IpAddr::V6(ip)) => {
                w.write_u8(ATYP_IPV6);
                w.write_all(&ip.octets());
            }
            HostAddr::Hostname(h) => {
                // 1..=255 is enforced by the Hostname type.
                w.write_u8(ATYP_HOSTNAME);
                w.write_u8(h.0.len() as u8);
                w.write(h.0.as_bytes());
            }
        }
        w.write_u16(self.port);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Encode `a`, then decode the result again.
    fn round_trip(a: &Address) -> Address {
        let mut v: Vec<u8> = Vec::new();
        v.write(a);
        let mut r = Reader::from_slice(&v[..]);
        let b = r.extract().unwrap();
        r.should_be_exhausted().unwrap();
        b
    }

    #[test]
    fn display() {
        let a = Address::from_parts("127.0.0.1", 8080).unwrap();
        assert_eq!(a.to_string(), "127.0.0.1:8080");

        let a = Address::from_parts("f00::9999", 443).unwrap();
        assert_eq!(a.to_string(), "[f00::9999]:443");

        let a = Address::from_parts("www.example.com", 80).unwrap();
        assert_eq!(a.to_string(), "www.example.com:80");
    }

    #[test]
    fn encode_v4() {
        let a = Address::from_parts("127.0.0.1", 8080).unwrap();
        let mut v: Vec<u8> = Vec::new();
        v.write(&a);
        assert_eq!(&v[..], &[0x01, 127, 0, 0, 1, 0x1f, 0x90]);
        assert_eq!(round_trip(&a), a);
    }

    #[test]
    fn encode_v6() {
        let a = Address::from_parts("::1", 53).unwrap();
        let mut v: Vec<u8> = Vec::new();
        v.write(&a);
        assert_eq!(v.len(), 1 + 16 + 2);
        assert_eq!(v[0], 0x04);
        assert_eq!(round_trip(&a), a);
    }

    #[test]
    fn encode_hostname() {
        let a = Address::from_parts("example.com", 443).unwrap();
        let mut v: Vec<u8> = Vec::new();
        v.write(&a);
        let mut expect = vec![0x03, 11];
        expect.extend_from_slice(b"example.com");
        expect.extend_from_slice(&[0x01, 0xbb]);
        assert_eq!(v, expect);
        assert_eq!(round_trip(&a), a);
    }

    #[test]
    fn hostname_length_limits() {
        // 255 bytes round-trips fine.
        let long = "x".repeat(255);
        let a = Address::from_parts(&long, 1).unwrap();
        assert_eq!(round_trip(&a), a);

        // 256 bytes is not constructible.
        let too_long = "x".repeat(256);
        assert!(Address::from_parts(&too_long, 1).is_err());
        assert!(Hostname::try_from(String::new()).is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        // Unknown address type.
        let mut r = Reader::from_slice(&[0x02, 0, 0, 0, 0, 0, 0][..]);
        let a: ferry_bytes::Result<Address> = r.extract();
        assert!(matches!(a, Err(BytesError::BadMessage(_))));

        // Zero-length hostname.
        let mut r = Reader::from_slice(&[0x03, 0x00, 0x01, 0xbb][..]);
        let a: ferry_bytes::Result<Address> = r.extract();
        assert!(matches!(a, Err(BytesError::BadMessage(_))));

        // Truncated IPv4 body.
        let mut r = Reader::from_slice(&[0x01, 127, 0][..]);
        let a: ferry_bytes::Result<Address> = r.extract();
        assert!(matches!(a, Err(BytesError::Truncated)));
    }

    #[test]
    fn from_socket_addr() {
        let sa: SocketAddr = "192.0.2.1:9050".parse().unwrap();
        let a: Address = sa.into();
        assert_eq!(a.port(), 9050);
        assert_eq!(a.to_socket_addr(), Some(sa));

        let a = Address::from_parts("example.net", 80).unwrap();
        assert_eq!(a.to_socket_addr(), None);
    }
}
