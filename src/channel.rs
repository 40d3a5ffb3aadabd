#[cfg(doc)]
use crate::handshake;
use crate::codec::PASS_THROUGH;
use crate::connection::{Connection, ConnectionError};
use crate::message::{Message, MessageError};
use crate::DistributionFlags;
use futures::io::{AsyncRead, AsyncWrite};

/// Makes a channel to send/received messages to/from a connected node.
///
/// Please ensure that the [`handshake`] has been completed using the `transport` before creating
/// a channel; `transport` is the [`handshake::Connected::transport`] of a finished handshake.
///
/// `flags` should be an intersection of distribution flags of both nodes.
/// Note that the current implementation doesn't consider the distribution flags.
///
/// Note that, to keep the connection established, you need to send `Message::Tick` periodically.
/// Please see [the official `net_ticktime` doc](https://www.erlang.org/doc/man/kernel_app.html#net_ticktime) for more details.
pub fn channel<T>(transport: T, flags: DistributionFlags) -> (Sender<T>, Receiver<T>)
where
    T: AsyncRead + AsyncWrite + Unpin + Clone,
{
    let _ = flags;
    (Sender::new(transport.clone()), Receiver::new(transport))
}

/// Sender of a message channel.
#[derive(Debug)]
pub struct Sender<T> {
    connection: Connection<T>,
}

impl<T> Sender<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn new(transport: T) -> Self {
        Self {
            connection: Connection::new(transport),
        }
    }

    /// Sends a message.
    pub async fn send(&mut self, message: Message) -> Result<(), SendError> {
        if matches!(message, Message::Tick) {
            self.connection.send_tick().await?;
        } else {
            let mut buf = vec![PASS_THROUGH];
            message.write_into(&mut buf)?;
            self.connection.send(&buf).await?;
        }
        Ok(())
    }
}

/// Receiver of a message channel.
#[derive(Debug)]
pub struct Receiver<T> {
    connection: Connection<T>,
}

impl<T> Receiver<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn new(transport: T) -> Self {
        Self {
            connection: Connection::new(transport),
        }
    }

    /// Receives a message.
    ///
    /// TICKs are answered transparently by the underlying [`Connection`] and never surface here:
    /// a `recv()` call only ever returns once a real distribution message has arrived.
    pub async fn recv(&mut self) -> Result<Message, RecvError> {
        let frame = self.connection.read_frame().await.map_err(|e| match e {
            ConnectionError::NotConnected => RecvError::Closed,
            other => RecvError::Connection(other),
        })?;
        let (&tag, body) = frame
            .split_first()
            .ok_or(RecvError::UnexpectedTypeTag { tag: 0 })?;
        if tag != PASS_THROUGH {
            return Err(RecvError::UnexpectedTypeTag { tag });
        }
        Ok(Message::read_from(body)?)
    }

    /// Receives a message (owned version).
    pub async fn recv_owned(mut self) -> Result<(Message, Self), RecvError> {
        let msg = self.recv().await?;
        Ok((msg, self))
    }
}

/// Possible errors during sending messages.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SendError {
    /// Encoding the message into a distribution frame failed.
    #[error(transparent)]
    Message(#[from] MessageError),

    /// The underlying framed connection rejected or failed the send.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Possible errors during receiving messages.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RecvError {
    /// Connection was closed by the peer.
    #[error("connection was closed by the peer")]
    Closed,

    /// A frame arrived whose leading byte wasn't the pass-through tag (112).
    #[error("expected pass-through tag {}, got {tag}", PASS_THROUGH)]
    UnexpectedTypeTag { tag: u8 },

    /// Decoding the control tuple (and optional payload) failed.
    #[error(transparent)]
    Message(#[from] MessageError),

    /// The underlying framed connection failed the read.
    #[error(transparent)]
    Connection(ConnectionError),
}
