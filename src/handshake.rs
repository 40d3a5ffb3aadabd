//! Client-side distribution handshake: EPMD lookup, name exchange, and challenge/response
//! authentication, promoting a freshly connected socket into a steady-state [`Connected`] peer.
//!
//! See [12.2 Distribution Handshake]
//! (http://erlang.org/doc/apps/erts/erl_dist_protocol.html#id104553) for the wire-level details.
use crate::epmd::{EpmdClient, EpmdError};
use crate::flags::DistributionFlags;
use crate::socket::Socket;
use crate::transport::{Address, Transport, TransportError};
use futures::io::{AsyncRead, AsyncWrite};
use std::time::Duration;

/// The distribution version this crate speaks during the name/challenge exchange.
pub const DISTRIBUTION_VERSION: u16 = 5;

const TAG_NAME: u8 = b'n';
const TAG_STATUS: u8 = b's';
const TAG_REPLY: u8 = b'r';
const TAG_ACK: u8 = b'a';

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can abort a handshake. Any of these corresponds to the state machine's `Failed`
/// state; the connecting socket is always closed by the time one of these is returned.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HandshakeError {
    /// A handshake step did not complete within its configured timeout.
    #[error("handshake step timed out")]
    Timeout,

    /// The EPMD request to resolve the peer's port failed outright.
    #[error(transparent)]
    Epmd(#[from] EpmdError),

    /// Connecting to EPMD or the peer itself failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The peer node is not currently registered with its EPMD.
    #[error("node {name:?} is not registered with epmd")]
    NodeNotRegistered { name: String },

    /// The peer's highest supported distribution version is too old to interoperate with.
    #[error("peer's distribution version {peer} is incompatible (must be greater than 4)")]
    IncompatibleDistVersion { peer: u16 },

    /// The peer rejected the connection at the status step (e.g. `"nok"`, `"alive"`).
    #[error("peer rejected the connection: {reason:?}")]
    Rejected { reason: String },

    /// The challenge ack digest did not match what this node computed from the shared cookie.
    #[error("authentication failed: cookie mismatch")]
    AuthenticationFailed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A successfully completed handshake: the peer's name and advertised flags, plus the raw,
/// still-unframed transport ready to be handed to [`crate::channel::channel`].
///
/// The transport is intentionally not wrapped in a [`crate::connection::Connection`] yet:
/// `channel` needs its own clone of the transport for the sender half and the receiver half, the
/// same way the handshake itself only ever dealt with one shared socket.
#[derive(Debug)]
pub struct Connected<T> {
    /// The peer node's full name (`alive@host`), as it reported it during the handshake.
    pub peer_name: String,

    /// The distribution flags the peer advertised during the handshake.
    pub peer_flags: DistributionFlags,

    /// The connected, post-handshake transport.
    pub transport: T,
}

/// Builds and runs the client side of a distribution handshake.
///
/// Mirrors the insertion-ordered, strictly linear state progression of
/// `Idle -> WaitResolve -> WaitEpmdConnect -> WaitEpmdWriteDone -> WaitEpmdReply -> WaitConnect
/// -> WaitWriteChallengeDone -> WaitStatus -> WaitChallenge -> WaitWriteChallengeReplyDone
/// -> WaitChallengeAck -> Connected`; any error below is equivalent to falling into `Failed`.
#[derive(Debug, Clone)]
pub struct Handshake {
    self_node_name: String,
    self_cookie: String,
    peer_cookie: String,
    flags: DistributionFlags,
    step_timeout: Duration,
}

impl Handshake {
    /// Makes a new `Handshake`. Both the self and peer cookie default to `cookie`; override the
    /// peer cookie with [`Self::peer_cookie`] if the two nodes don't share one.
    ///
    /// `self_node_name` must be of the form `"name@host"`.
    pub fn new(self_node_name: &str, cookie: &str) -> Self {
        Self {
            self_node_name: self_node_name.to_owned(),
            self_cookie: cookie.to_owned(),
            peer_cookie: cookie.to_owned(),
            flags: DistributionFlags::default(),
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Overrides the set of distribution flags this node advertises.
    pub fn flags(mut self, flags: DistributionFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Overrides the cookie used to authenticate the peer.
    pub fn peer_cookie(mut self, cookie: &str) -> Self {
        self.peer_cookie = cookie.to_owned();
        self
    }

    /// Overrides the per-step timeout (default 5 seconds).
    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Resolves `target` (`alive@host`, optionally `tcp://`-prefixed) via EPMD and runs the
    /// client-side handshake against it, returning the connected peer on success.
    pub async fn connect(&self, target: &str) -> Result<Connected<Transport>, HandshakeError> {
        let address: Address = target.parse().map_err(HandshakeError::Transport)?;
        let node_name = match &address {
            Address::Tcp(name) => name.clone(),
            Address::Uds(_) => {
                return Err(HandshakeError::Transport(TransportError::MissingNodeName))
            }
        };

        let epmd_port = std::env::var("ERL_EPMD_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(crate::epmd::DEFAULT_EPMD_PORT);

        // WaitResolve / WaitEpmdConnect
        let epmd_transport = with_timeout(
            self.step_timeout,
            Transport::connect_tcp(node_name.host(), epmd_port),
        )
        .await?;

        // WaitEpmdWriteDone / WaitEpmdReply
        let epmd = EpmdClient::new(epmd_transport);
        let info = with_timeout(self.step_timeout, epmd.get_node_info(node_name.name()))
            .await?
            .ok_or_else(|| HandshakeError::NodeNotRegistered {
                name: node_name.name().to_owned(),
            })?;

        let peer_version = info.highest_version as u16;
        if peer_version <= 4 {
            return Err(HandshakeError::IncompatibleDistVersion { peer: peer_version });
        }

        // WaitConnect: the EPMD socket above was already dropped; reconnect to the peer's port.
        let transport = with_timeout(
            self.step_timeout,
            Transport::connect_tcp(node_name.host(), info.port),
        )
        .await?;
        let mut socket = Socket::new(transport);

        // WaitWriteChallengeDone
        with_timeout(self.step_timeout, self.send_name(&mut socket)).await?;

        // WaitStatus
        let status = with_timeout(self.step_timeout, recv_status(&mut socket)).await?;
        if status != "ok" && status != "ok_simultaneous" {
            return Err(HandshakeError::Rejected { reason: status });
        }

        // WaitChallenge
        let (peer_flags, peer_challenge, peer_name) =
            with_timeout(self.step_timeout, recv_challenge(&mut socket)).await?;

        // WaitWriteChallengeReplyDone
        let self_challenge = rand::random::<u32>();
        let peer_digest = calc_digest(&self.peer_cookie, peer_challenge);
        with_timeout(
            self.step_timeout,
            send_challenge_reply(&mut socket, self_challenge, &peer_digest),
        )
        .await?;

        // WaitChallengeAck
        let self_digest = calc_digest(&self.self_cookie, self_challenge);
        with_timeout(
            self.step_timeout,
            recv_challenge_ack(&mut socket, &self_digest),
        )
        .await?;

        // Connected. Nagle/keepalive tuning for TCP already happened at connect time in
        // `Transport::connect_tcp`; nothing further is needed before handing off the socket.
        Ok(Connected {
            peer_name,
            peer_flags,
            transport: socket.into_inner(),
        })
    }

    async fn send_name<T>(&self, socket: &mut Socket<T>) -> Result<(), HandshakeError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut w = socket.message_writer();
        w.write_u8(TAG_NAME)?;
        w.write_u16(DISTRIBUTION_VERSION)?;
        w.write_u32(self.flags.bits() as u32)?;
        w.write_all(self.self_node_name.as_bytes())?;
        w.finish().await?;
        Ok(())
    }
}

async fn recv_status<T>(socket: &mut Socket<T>) -> Result<String, HandshakeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut r = socket.message_reader().await?;
    let tag = r.read_u8().await?;
    if tag != TAG_STATUS {
        return Err(HandshakeError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("expected status tag 's', got {tag}"),
        )));
    }
    r.read_string().await.map_err(HandshakeError::Io)
}

async fn recv_challenge<T>(
    socket: &mut Socket<T>,
) -> Result<(DistributionFlags, u32, String), HandshakeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut r = socket.message_reader().await?;
    let tag = r.read_u8().await?;
    if tag != TAG_NAME {
        return Err(HandshakeError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("expected challenge tag 'n', got {tag}"),
        )));
    }
    let _version = r.read_u16().await?;
    let flags = DistributionFlags::from_bits_truncate(u64::from(r.read_u32().await?));
    let challenge = r.read_u32().await?;
    let name = r.read_string().await?;
    Ok((flags, challenge, name))
}

async fn send_challenge_reply<T>(
    socket: &mut Socket<T>,
    self_challenge: u32,
    peer_digest: &[u8; 16],
) -> Result<(), HandshakeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut w = socket.message_writer();
    w.write_u8(TAG_REPLY)?;
    w.write_u32(self_challenge)?;
    w.write_all(peer_digest)?;
    w.finish().await?;
    Ok(())
}

async fn recv_challenge_ack<T>(
    socket: &mut Socket<T>,
    expected_digest: &[u8; 16],
) -> Result<(), HandshakeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut r = socket.message_reader().await?;
    let tag = r.read_u8().await?;
    if tag != TAG_ACK {
        return Err(HandshakeError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("expected ack tag 'a', got {tag}"),
        )));
    }
    let mut digest = [0u8; 16];
    r.read_exact(&mut digest).await?;
    if constant_time_eq(&digest, expected_digest) {
        Ok(())
    } else {
        Err(HandshakeError::AuthenticationFailed)
    }
}

fn calc_digest(cookie: &str, challenge: u32) -> [u8; 16] {
    md5::compute(format!("{cookie}{challenge}")).0
}

fn constant_time_eq(a: &[u8; 16], b: &[u8; 16]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

async fn with_timeout<F>(duration: Duration, fut: F) -> Result<F::Output, HandshakeError>
where
    F: std::future::Future,
{
    use futures::future::{select, Either};
    futures::pin_mut!(fut);
    match select(fut, smol::Timer::after(duration)).await {
        Either::Left((value, _)) => Ok(value),
        Either::Right(_) => Err(HandshakeError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_cookie_plus_decimal_challenge() {
        let digest = calc_digest("secret", 12345);
        assert_eq!(digest, md5::compute("secret12345").0);
    }

    #[test]
    fn constant_time_eq_detects_any_mismatch() {
        let a = [1u8; 16];
        let mut b = a;
        assert!(constant_time_eq(&a, &b));
        b[15] ^= 1;
        assert!(!constant_time_eq(&a, &b));
    }

    #[test]
    fn builder_overrides_are_distinct_from_defaults() {
        let h = Handshake::new("a@localhost", "cookie").peer_cookie("other");
        assert_eq!(h.self_cookie, "cookie");
        assert_eq!(h.peer_cookie, "other");
    }
}
