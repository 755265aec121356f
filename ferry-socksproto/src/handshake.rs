//! Types to implement the two sides of the SOCKS handshake.

use crate::addr::Address;
use crate::msg::{
    AuthMethod, AuthReply, AuthRequest, ConnectReply, ConnectRequest, SocksCmd, SocksRequest,
    SocksStatus, SOCKS_VERSION,
};
use crate::{Error, Result};

use ferry_bytes::{Reader, Writer};

/// An action to take in response to a SOCKS handshake message.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Action {
    /// If nonzero, this many bytes should be drained from the
    /// peer's inputs.
    pub drain: usize,
    /// If nonempty, this reply should be sent to the peer.
    pub reply: Vec<u8>,
    /// If true, then this handshake is over, either successfully or not.
    pub finished: bool,
}

/// An ongoing SOCKS5 handshake with a downstream client.
///
/// To perform a handshake, call the [`ServerHandshake::handshake`]
/// method repeatedly with new inputs, until the resulting [Action]
/// has `finished` set to true.  A finished handshake yields a
/// [`SocksRequest`] through [`ServerHandshake::into_request`]; if it
/// yields none, the negotiation failed and the connection should be
/// closed once the last reply has been flushed.
#[derive(Clone, Debug)]
pub struct ServerHandshake {
    /// Current state of the handshake. Each completed message
    /// advances the state.
    state: State,
    /// Completed SOCKS request.
    handshake: Option<SocksRequest>,
}

/// Possible states for a server-side SOCKS connection.
///
/// Each completed message advances the state.
#[derive(Clone, Debug, Copy, PartialEq)]
enum State {
    /// Starting state: no messages have been handled yet.
    Initial,
    /// We've selected the no-authentication method, and we're waiting
    /// for the actual request.
    WaitRequest,
    /// Ending (successful) state: the client has sent all its messages.
    ///
    /// (Note that we still need to send a reply.)
    Done,
    /// Ending (failed) state: we told the client that nothing it
    /// offered is acceptable.
    Rejected,
}

impl ServerHandshake {
    /// Construct a new ServerHandshake in its initial state
    pub fn new() -> Self {
        ServerHandshake {
            state: State::Initial,
            handshake: None,
        }
    }

    /// Try to advance the handshake, given some peer input in
    /// `input`.
    ///
    /// If there isn't enough input, gives [`Error::Truncated`].  Other
    /// errors indicate a failure.
    ///
    /// On success, return an Action describing what to tell the client,
    /// and how much of its input to consume.
    pub fn handshake(&mut self, input: &[u8]) -> Result<Action> {
        if input.is_empty() {
            return Err(Error::Truncated);
        }
        match (self.state, input[0]) {
            (State::Initial, SOCKS_VERSION) => self.negotiate_method(input),
            (State::Initial, v) => Err(Error::BadProtocol(v)),
            (State::WaitRequest, SOCKS_VERSION) => self.take_request(input),
            (State::Done, _) | (State::Rejected, _) => Err(Error::AlreadyFinished),
            (_, _) => Err(Error::Syntax),
        }
    }

    /// Initial step: negotiate the authentication method.
    ///
    /// We only speak "no authentication"; a client that does not offer
    /// it gets the NO_ACCEPTABLE sentinel and a finished, failed
    /// handshake.
    fn negotiate_method(&mut self, input: &[u8]) -> Result<Action> {
        let mut r = Reader::from_slice(input);
        let request: AuthRequest = r.extract()?;

        let (next, reply) = if request.offers(AuthMethod::NO_AUTH) {
            (State::WaitRequest, AuthReply::new(AuthMethod::NO_AUTH))
        } else {
            (State::Rejected, AuthReply::new(AuthMethod::NO_ACCEPTABLE))
        };

        self.state = next;
        let mut w = Vec::new();
        w.write(&reply);
        Ok(Action {
            drain: r.consumed(),
            reply: w,
            finished: self.state == State::Rejected,
        })
    }

    /// Final step: receive the client's request.
    fn take_request(&mut self, input: &[u8]) -> Result<Action> {
        let mut r = Reader::from_slice(input);
        let request: ConnectRequest = r.extract()?;

        let cmd = request.command();
        let request = SocksRequest::new(cmd, request.into_dest())?;

        self.state = State::Done;
        self.handshake = Some(request);

        Ok(Action {
            drain: r.consumed(),
            reply: Vec::new(),
            finished: true,
        })
    }

    /// Return true if this handshake is finished.
    pub fn finished(&self) -> bool {
        self.state == State::Done || self.state == State::Rejected
    }

    /// Consume this handshake's state; if it finished successfully,
    /// return a SocksRequest.
    pub fn into_request(self) -> Option<SocksRequest> {
        self.handshake
    }
}

impl Default for ServerHandshake {
    fn default() -> Self {
        Self::new()
    }
}

/// An ongoing SOCKS5 handshake with an upstream server.
///
/// Call [`ClientHandshake::start`] once to obtain the opening bytes,
/// then call [`ClientHandshake::handshake`] with server input until
/// the resulting [Action] has `finished` set.  A successful handshake
/// yields the bound address the server reported, through
/// [`ClientHandshake::into_bound_addr`].
#[derive(Clone, Debug)]
pub struct ClientHandshake {
    /// Current state of the handshake.
    state: CState,
    /// The target we will ask the server to connect to.
    dest: Address,
    /// The bound address reported by a successful handshake.
    bound: Option<Address>,
}

/// Possible states for a client-side SOCKS connection.
#[derive(Clone, Debug, Copy, PartialEq)]
enum CState {
    /// Starting state: nothing has been sent yet.
    Initial,
    /// We've sent our method list and are waiting for the server to
    /// pick one.
    WaitMethod,
    /// We've sent the CONNECT request and are waiting for the reply.
    WaitReply,
    /// Ending state.
    Done,
}

impl ClientHandshake {
    /// Construct a new ClientHandshake that will request a connection
    /// to `dest`.
    pub fn new(dest: Address) -> Self {
        ClientHandshake {
            state: CState::Initial,
            dest,
            bound: None,
        }
    }

    /// Return the bytes that open the handshake: our method list,
    /// offering only "no authentication".
    ///
    /// Gives [`Error::AlreadyFinished`] if called more than once.
    pub fn start(&mut self) -> Result<Vec<u8>> {
        if self.state != CState::Initial {
            return Err(Error::AlreadyFinished);
        }
        self.state = CState::WaitMethod;
        let mut w = Vec::new();
        w.write(&AuthRequest::new(vec![AuthMethod::NO_AUTH]));
        Ok(w)
    }

    /// Try to advance the handshake, given some server input in
    /// `input`.
    ///
    /// If there isn't enough input, gives [`Error::Truncated`]: read
    /// more and try again.  Other errors are fatal; the connection to
    /// the server should be closed and the error reported exactly once.
    pub fn handshake(&mut self, input: &[u8]) -> Result<Action> {
        if input.is_empty() {
            return Err(Error::Truncated);
        }
        match (self.state, input[0]) {
            (CState::Initial, _) => Err(Error::Internal),
            (CState::WaitMethod, SOCKS_VERSION) => self.take_method(input),
            (CState::WaitMethod, v) => Err(Error::BadProtocol(v)),
            (CState::WaitReply, SOCKS_VERSION) => self.take_reply(input),
            (CState::Done, _) => Err(Error::AlreadyFinished),
            (_, _) => Err(Error::Syntax),
        }
    }

    /// Handle the server's method selection; on success, emit the
    /// CONNECT request.
    fn take_method(&mut self, input: &[u8]) -> Result<Action> {
        let mut r = Reader::from_slice(input);
        let reply: AuthReply = r.extract()?;

        if reply.method() != AuthMethod::NO_AUTH {
            return Err(Error::BadAuthMethod(reply.method()));
        }

        self.state = CState::WaitReply;
        let mut w = Vec::new();
        w.write(&ConnectRequest::new(SocksCmd::CONNECT, self.dest.clone()));
        Ok(Action {
            drain: r.consumed(),
            reply: w,
            finished: false,
        })
    }

    /// Handle the server's final reply; on success, record the bound
    /// address it reported.
    fn take_reply(&mut self, input: &[u8]) -> Result<Action> {
        let mut r = Reader::from_slice(input);
        let reply: ConnectReply = r.extract()?;

        if reply.status() != SocksStatus::SUCCEEDED {
            return Err(Error::RequestRefused(reply.status()));
        }

        self.state = CState::Done;
        self.bound = Some(reply.into_bound());

        Ok(Action {
            drain: r.consumed(),
            reply: Vec::new(),
            finished: true,
        })
    }

    /// Return true if this handshake is finished.
    pub fn finished(&self) -> bool {
        self.state == CState::Done
    }

    /// Consume this handshake's state; if it finished successfully,
    /// return the bound address the server reported.
    pub fn into_bound_addr(self) -> Option<Address> {
        self.bound
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::addr::HostAddr;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn server_happy_path() {
        let mut h = ServerHandshake::new();

        // Nothing yet: wait for more.
        assert!(matches!(h.handshake(&[]), Err(Error::Truncated)));
        // Partial method list: wait for more.
        assert!(matches!(h.handshake(&[5]), Err(Error::Truncated)));

        // Full method list.
        let action = h.handshake(&[5, 1, 0]).unwrap();
        assert_eq!(action.drain, 3);
        assert_eq!(action.reply, vec![5, 0]);
        assert!(!action.finished);

        // CONNECT 127.0.0.1:8080.
        let action = h
            .handshake(&[5, 1, 0, 1, 127, 0, 0, 1, 0x1f, 0x90])
            .unwrap();
        assert_eq!(action.drain, 10);
        assert!(action.reply.is_empty());
        assert!(action.finished);
        assert!(h.finished());

        let req = h.into_request().unwrap();
        assert_eq!(req.command(), SocksCmd::CONNECT);
        assert_eq!(req.dest().to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn server_handles_incremental_input() {
        let mut h = ServerHandshake::new();
        let msg = [5, 2, 0, 1];
        // Feed the method list one byte at a time.
        for n in 1..msg.len() {
            assert!(matches!(h.handshake(&msg[..n]), Err(Error::Truncated)));
        }
        let action = h.handshake(&msg[..]).unwrap();
        assert_eq!(action.drain, 4);
        assert_eq!(action.reply, vec![5, 0]);
    }

    #[test]
    fn server_rejects_bad_version() {
        let mut h = ServerHandshake::new();
        let e = h.handshake(&[4, 1, 0]);
        assert!(matches!(e, Err(Error::BadProtocol(4))));
    }

    #[test]
    fn server_rejects_unknown_methods() {
        let mut h = ServerHandshake::new();
        // GSSAPI and username/password, but not no-auth.
        let action = h.handshake(&[5, 2, 1, 2]).unwrap();
        assert_eq!(action.reply, vec![5, 0xff]);
        assert!(action.finished);
        assert!(h.finished());
        assert!(h.into_request().is_none());
    }

    #[test]
    fn server_accepts_bind_request() {
        // BIND completes the handshake; the server layer is the one
        // that answers it with COMMAND_NOT_SUPPORTED.
        let mut h = ServerHandshake::new();
        h.handshake(&[5, 1, 0]).unwrap();
        let action = h
            .handshake(&[5, 2, 0, 1, 127, 0, 0, 1, 0x1f, 0x90])
            .unwrap();
        assert!(action.finished);
        let req = h.into_request().unwrap();
        assert_eq!(req.command(), SocksCmd::BIND);
    }

    #[test]
    fn server_finished_is_finished() {
        let mut h = ServerHandshake::new();
        h.handshake(&[5, 1, 0]).unwrap();
        h.handshake(&[5, 1, 0, 1, 127, 0, 0, 1, 0, 80]).unwrap();
        let e = h.handshake(&[5]);
        assert!(matches!(e, Err(Error::AlreadyFinished)));
    }

    #[test]
    fn client_happy_path() {
        let dest = Address::from_parts("example.com", 443).unwrap();
        let mut h = ClientHandshake::new(dest);

        let opening = h.start().unwrap();
        assert_eq!(opening, vec![5, 1, 0]);
        // Starting twice is an error.
        assert!(matches!(h.start(), Err(Error::AlreadyFinished)));

        // Server picks no-auth; we must emit the CONNECT request.
        let action = h.handshake(&[5, 0]).unwrap();
        assert_eq!(action.drain, 2);
        let mut expect = vec![5, 1, 0, 3, 11];
        expect.extend_from_slice(b"example.com");
        expect.extend_from_slice(&[0x01, 0xbb]);
        assert_eq!(action.reply, expect);
        assert!(!action.finished);

        // Server reports success, bound at 192.0.2.10:4040.
        let action = h
            .handshake(&[5, 0, 0, 1, 192, 0, 2, 10, 0x0f, 0xc8])
            .unwrap();
        assert!(action.finished);
        assert!(h.finished());

        let bound = h.into_bound_addr().unwrap();
        assert_eq!(
            bound,
            Address::new(HostAddr::Ip(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10))), 4040)
        );
    }

    #[test]
    fn client_rejects_bad_method() {
        let dest = Address::from_parts("example.com", 443).unwrap();
        let mut h = ClientHandshake::new(dest);
        h.start().unwrap();

        // Server picks username/password, which we never offered.
        let e = h.handshake(&[5, 2]);
        assert!(matches!(e, Err(Error::BadAuthMethod(m)) if m == AuthMethod::from(2)));
    }

    #[test]
    fn client_propagates_refusal() {
        let dest = Address::from_parts("example.com", 443).unwrap();
        let mut h = ClientHandshake::new(dest);
        h.start().unwrap();
        h.handshake(&[5, 0]).unwrap();

        // Host unreachable.
        let e = h.handshake(&[5, 4, 0, 1, 0, 0, 0, 0, 0, 0]);
        assert!(
            matches!(e, Err(Error::RequestRefused(s)) if s == SocksStatus::HOST_UNREACHABLE)
        );
    }

    #[test]
    fn client_waits_for_full_reply() {
        let dest = Address::from_parts("10.0.0.9", 22).unwrap();
        let mut h = ClientHandshake::new(dest);
        h.start().unwrap();
        h.handshake(&[5, 0]).unwrap();

        assert!(matches!(h.handshake(&[5, 0, 0, 1]), Err(Error::Truncated)));
        let action = h.handshake(&[5, 0, 0, 1, 10, 0, 0, 1, 0, 22]).unwrap();
        assert_eq!(action.drain, 10);
        assert!(action.finished);
    }

    #[test]
    fn client_requires_start_first() {
        let dest = Address::from_parts("10.0.0.9", 22).unwrap();
        let mut h = ClientHandshake::new(dest);
        assert!(matches!(h.handshake(&[5, 0]), Err(Error::Internal)));
    }
}
