//! Structures that represent SOCKS messages

use crate::addr::{Address, HostAddr};
use crate::{Error, Result};

use ferry_bytes::{Error as BytesError, Readable, Reader, Result as BytesResult, Writeable, Writer};

use caret::caret_int;
use std::net::{IpAddr, Ipv4Addr};

/// The single protocol version we speak.
pub(crate) const SOCKS_VERSION: u8 = 5;

/// The reserved octet that SOCKS5 requests and replies carry.
const RESERVED: u8 = 0;

caret_int! {
    /// Command from the socks client telling us what to do.
    pub struct SocksCmd(u8) {
        /// Connect to a remote TCP address:port.
        CONNECT = 1,
        /// Not supported by ferry.
        BIND = 2,
        /// Not supported by ferry.
        UDP_ASSOCIATE = 3,
    }
}

caret_int! {
    /// Possible reply status values from a SOCKS5 handshake.
    ///
    /// Note that the documentation for these values is kind of scant,
    /// and is limited to what the RFC says.
    pub struct SocksStatus(u8) {
        /// RFC 1928: "succeeded"
        SUCCEEDED = 0x00,
        /// RFC 1928: "general SOCKS server failure"
        GENERAL_FAILURE = 0x01,
        /// RFC 1928: "connection not allowable by ruleset"
        NOT_ALLOWED = 0x02,
        /// RFC 1928: "Network unreachable"
        NETWORK_UNREACHABLE = 0x03,
        /// RFC 1928: "Host unreachable"
        HOST_UNREACHABLE = 0x04,
        /// RFC 1928: "Connection refused"
        CONNECTION_REFUSED = 0x05,
        /// RFC 1928: "TTL expired"
        TTL_EXPIRED = 0x06,
        /// RFC 1929: "Command not supported"
        COMMAND_NOT_SUPPORTED = 0x07,
        /// RFC 1929: "Address type not supported"
        ADDRTYPE_NOT_SUPPORTED = 0x08,
    }
}

caret_int! {
    /// Authentication methods negotiated at the start of a SOCKS5
    /// session.
    pub struct AuthMethod(u8) {
        /// No authentication at all.  The only method ferry offers or
        /// accepts.
        NO_AUTH = 0x00,
        /// Sentinel sent by a server to say that nothing the client
        /// offered is acceptable.
        NO_ACCEPTABLE = 0xFF,
    }
}

/// The method-negotiation message that opens every SOCKS5 session:
/// the client lists every authentication method it is willing to
/// speak.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthRequest {
    /// The methods the client offered, in its preference order.
    methods: Vec<AuthMethod>,
}

impl AuthRequest {
    /// Construct an AuthRequest offering `methods`.
    pub fn new(methods: Vec<AuthMethod>) -> Self {
        AuthRequest { methods }
    }

    /// Return true if `method` is among the offered methods.
    pub fn offers(&self, method: AuthMethod) -> bool {
        self.methods.contains(&method)
    }
}

impl Readable for AuthRequest {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<AuthRequest> {
        let version = r.take_u8()?;
        if version != SOCKS_VERSION {
            return Err(BytesError::BadMessage("unsupported SOCKS version"));
        }
        let nmethods = r.take_u8()?;
        let methods = r
            .take(nmethods as usize)?
            .iter()
            .map(|m| AuthMethod::from(*m))
            .collect();
        Ok(AuthRequest { methods })
    }
}

impl Writeable for AuthRequest {
    fn write_onto<W: Writer + ?Sized>(&self, w: &mut W) {
        w.write_u8(SOCKS_VERSION);
        w.write_u8(self.methods.len() as u8);
        for m in &self.methods {
            w.write_u8((*m).into());
        }
    }
}

/// The server's answer to an [`AuthRequest`]: the single method the
/// session will use, or [`AuthMethod::NO_ACCEPTABLE`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthReply {
    /// The method the server selected.
    method: AuthMethod,
}

impl AuthReply {
    /// Construct an AuthReply selecting `method`.
    pub fn new(method: AuthMethod) -> Self {
        AuthReply { method }
    }

    /// Return the method the server selected.
    pub fn method(&self) -> AuthMethod {
        self.method
    }
}

impl Readable for AuthReply {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<AuthReply> {
        let version = r.take_u8()?;
        if version != SOCKS_VERSION {
            return Err(BytesError::BadMessage("unsupported SOCKS version"));
        }
        let method = AuthMethod::from(r.take_u8()?);
        Ok(AuthReply { method })
    }
}

impl Writeable for AuthReply {
    fn write_onto<W: Writer + ?Sized>(&self, w: &mut W) {
        w.write_u8(SOCKS_VERSION);
        w.write_u8(self.method.into());
    }
}

/// A SOCKS5 request proper: a command and the target address it
/// applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    /// What the client wants us to do.
    cmd: SocksCmd,
    /// Where it wants us to do it.
    dest: Address,
}

impl ConnectRequest {
    /// Construct a new ConnectRequest.
    pub fn new(cmd: SocksCmd, dest: Address) -> Self {
        ConnectRequest { cmd, dest }
    }

    /// Return the requested command.
    pub fn command(&self) -> SocksCmd {
        self.cmd
    }

    /// Return the requested target, consuming this message.
    pub fn into_dest(self) -> Address {
        self.dest
    }
}

impl Readable for ConnectRequest {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<ConnectRequest> {
        let version = r.take_u8()?;
        if version != SOCKS_VERSION {
            return Err(BytesError::BadMessage("unsupported SOCKS version"));
        }
        let cmd: SocksCmd = r.take_u8()?.into();
        let reserved = r.take_u8()?;
        if reserved != RESERVED {
            return Err(BytesError::BadMessage("bad reserved byte"));
        }
        // The address body is read only once the three header octets
        // above have been validated.
        let dest: Address = r.extract()?;
        Ok(ConnectRequest { cmd, dest })
    }
}

impl Writeable for ConnectRequest {
    fn write_onto<W: Writer + ?Sized>(&self, w: &mut W) {
        w.write_u8(SOCKS_VERSION);
        w.write_u8(self.cmd.into());
        w.write_u8(RESERVED);
        w.write(&self.dest);
    }
}

/// A SOCKS5 reply: a status code and the address the server bound for
/// this session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectReply {
    /// The outcome of the request.
    status: SocksStatus,
    /// The bound address the server reported.
    bound: Address,
}

impl ConnectReply {
    /// Construct a new ConnectReply.
    pub fn new(status: SocksStatus, bound: Address) -> Self {
        ConnectReply { status, bound }
    }

    /// Return the status code of this reply.
    pub fn status(&self) -> SocksStatus {
        self.status
    }

    /// Return the bound address of this reply, consuming it.
    pub fn into_bound(self) -> Address {
        self.bound
    }
}

impl Readable for ConnectReply {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<ConnectReply> {
        let version = r.take_u8()?;
        if version != SOCKS_VERSION {
            return Err(BytesError::BadMessage("unsupported SOCKS version"));
        }
        let status: SocksStatus = r.take_u8()?.into();
        let reserved = r.take_u8()?;
        if reserved != RESERVED {
            return Err(BytesError::BadMessage("bad reserved byte"));
        }
        let bound: Address = r.extract()?;
        Ok(ConnectReply { status, bound })
    }
}

impl Writeable for ConnectReply {
    fn write_onto<W: Writer + ?Sized>(&self, w: &mut W) {
        w.write_u8(SOCKS_VERSION);
        w.write_u8(self.status.into());
        w.write_u8(RESERVED);
        w.write(&self.bound);
    }
}

/// A completed SOCKS request, as negotiated on a SOCKS connection.
///
/// Once this request is done, we know where to connect.  Don't
/// discard this object immediately: use it to report success or
/// failure.
#[derive(Clone, Debug)]
pub struct SocksRequest {
    /// The command requested by the SOCKS client.
    cmd: SocksCmd,
    /// The target address.
    dest: Address,
}

impl SocksRequest {
    /// Create a SocksRequest with a given set of fields.
    ///
    /// Return an error if the inputs aren't supported or valid.
    pub(crate) fn new(cmd: SocksCmd, dest: Address) -> Result<Self> {
        if !cmd.is_recognized() {
            return Err(Error::NoSupport);
        }
        if dest.port() == 0 {
            return Err(Error::Syntax);
        }
        Ok(SocksRequest { cmd, dest })
    }

    /// Return the command that the client requested.
    pub fn command(&self) -> SocksCmd {
        self.cmd
    }

    /// Return the requested target address.
    pub fn dest(&self) -> &Address {
        &self.dest
    }

    /// Format a reply to this request, indicating success or failure.
    ///
    /// An address should be provided only on success; on failure we
    /// send the all-zeros IPv4 address, as the reply still has to
    /// carry an address body.
    pub fn reply(&self, status: SocksStatus, addr: Option<&Address>) -> Vec<u8> {
        let bound = match addr {
            Some(a) => a.clone(),
            None => Address::new(HostAddr::Ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED)), 0),
        };
        let mut w = Vec::new();
        w.write(&ConnectReply::new(status, bound));
        w
    }
}
