//! Client-side implementation of the Erlang/OTP distribution protocol.
//!
//! The distribution protocol is what lets Erlang/OTP nodes talk to each other: resolving a node
//! name via EPMD, performing the challenge/response handshake, and then exchanging distribution
//! messages (control tuples plus optional payload terms) framed over a byte stream.
//!
//! Reference: [12 Distribution Protocol](http://erlang.org/doc/apps/erts/erl_dist_protocol.html)
//!
//! ```text
//! atom table -> term algebra -> ETF codec -> framed connection -> handshake -> channel
//! ```
//!
//! [`atom`] and [`term`] give you the value types; [`codec`] turns them into and out of bytes on
//! the wire; [`connection`] frames those bytes; [`handshake`] establishes a connection to a named
//! peer node; [`channel`] is the high-level send/recv API built on top of all of it.
#![warn(missing_docs)]

pub mod atom;
pub mod channel;
pub mod codec;
pub mod connection;
pub mod epmd;
pub mod flags;
pub mod handshake;
pub mod message;
pub mod node;
pub mod pattern;
pub mod registry;
pub mod socket;
pub mod term;
pub mod transport;

pub use atom::Atom;
pub use channel::{channel, Receiver, Sender};
pub use flags::DistributionFlags;
pub use handshake::{Connected, Handshake, HandshakeError};
pub use message::Message;
pub use term::Term;

/// The generation number EPMD hands back when a node registers.
///
/// Distinguishes successive incarnations of the same node name so that stale references from a
/// prior incarnation aren't mistaken for the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Creation(u32);

impl Creation {
    /// Wraps a raw creation value as returned by EPMD.
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw creation value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Creation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The distribution protocol version a node advertises to EPMD.
///
/// This is distinct from [`handshake::DISTRIBUTION_VERSION`], the version number exchanged
/// directly between peers during the handshake's name/challenge messages; this one is what EPMD
/// reports as a registered node's supported range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum DistributionProtocolVersion {
    /// Version 5, the long-standing distribution protocol version.
    V5 = 5,
    /// Version 6, the new connection setup handshake introduced in OTP 23.
    V6 = 6,
}

impl TryFrom<u16> for DistributionProtocolVersion {
    type Error = epmd::EpmdError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(Self::V5),
            6 => Ok(Self::V6),
            _ => Err(epmd::EpmdError::UnknownVersion { value }),
        }
    }
}

/// The transport protocol a node is reachable over, as reported by EPMD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum TransportProtocol {
    /// TCP over IPv4; the only protocol EPMD and this crate's [`transport`] actually use.
    TcpIpV4 = 0,
}

impl TryFrom<u8> for TransportProtocol {
    type Error = epmd::EpmdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::TcpIpV4),
            _ => Err(epmd::EpmdError::UnknownProtocol { value }),
        }
    }
}
