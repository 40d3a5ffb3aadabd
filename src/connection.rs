//! Length-prefixed framing over an async byte stream, with caller-driven write coalescing and
//! transparent TICK/TOCK keepalive handling.
//!
//! A reference connection implementation this module otherwise follows uses a double-buffered
//! submit/flip/drain outbound queue so that frames submitted by independent callers while a write
//! is already in flight can still ride out on the next flush. That design assumes a connection
//! that multiple producers can submit to concurrently. This connection's [`send`](Connection::send)
//! takes `&mut self` and fully awaits its own write before returning, so — unlike the reference
//! implementation's reactor-driven connection — no second call can ever be pending while a write
//! is in flight; coalescing here only happens when one caller batches several frames into a
//! single [`Connection::send_batch`] call before awaiting.
use futures::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};

/// Every outbound frame is prefixed with a 4-byte big-endian length.
pub const HEADER_SIZE: usize = 4;

/// Leading byte every outbound buffer carries, mirroring the allocation convention used to catch
/// double-free/corruption in the reference implementation this module is grounded on. In safe
/// Rust there is no literal double-free to catch, but the sentinel is still asserted on drop so a
/// stray `mem::forget`/unsafe corruption of the buffer is not silently ignored.
const MAGIC_SENTINEL: u8 = 132;

/// Controls optional diagnostic logging at connect/disconnect, read/write, and decoded-message
/// points. Purely a logging concern; has no effect on protocol semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verbosity {
    None,
    Trace,
    Wire,
    Message,
}

impl Default for Verbosity {
    fn default() -> Self {
        Self::None
    }
}

/// Errors raised by [`Connection`] read/write operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// A frame's declared length exceeded the connection's configured maximum.
    #[error("frame of {size} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// A cancelled operation is reported as a peer disconnect when it had transferred zero bytes,
    /// matching the reference implementation's `operation_aborted` remapping.
    #[error("not connected")]
    NotConnected,

    /// The connection was explicitly [`Connection::stop`]ped.
    #[error("operation aborted")]
    OperationAborted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
struct SentineledBuffer(Vec<u8>);

impl SentineledBuffer {
    fn allocate(payload: Vec<u8>) -> Self {
        let mut buf = Vec::with_capacity(1 + payload.len());
        buf.push(MAGIC_SENTINEL);
        buf.extend_from_slice(&payload);
        Self(buf)
    }

    fn payload(&self) -> &[u8] {
        &self.0[1..]
    }
}

impl Drop for SentineledBuffer {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.0.first().copied(),
            Some(MAGIC_SENTINEL),
            "outbound buffer sentinel corrupted (double free or stray write before the payload)"
        );
    }
}

/// Default ceiling on a single frame's declared length; override with
/// [`Connection::with_max_frame_size`].
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// A framed connection: length-prefixed read/write over any `AsyncRead + AsyncWrite` transport,
/// with TICK (zero-length frame) answered by an immediate TOCK and never surfaced to the caller.
#[derive(Debug)]
pub struct Connection<T> {
    inner: T,
    inbound: Vec<u8>,
    max_frame_size: usize,
    verbosity: Verbosity,
    aborted: bool,
    pub messages_in: u64,
    pub messages_out: u64,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(inner: T) -> Self {
        Self::with_max_frame_size(inner, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(inner: T, max_frame_size: usize) -> Self {
        Self {
            inner,
            inbound: Vec::new(),
            max_frame_size,
            verbosity: Verbosity::default(),
            aborted: false,
            messages_in: 0,
            messages_out: 0,
        }
    }

    pub fn set_verbosity(&mut self, verbosity: Verbosity) {
        self.verbosity = verbosity;
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Submits `payload` as one frame and writes it immediately.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), ConnectionError> {
        self.send_batch(std::iter::once(payload)).await
    }

    /// Sends a zero-length TICK (or, when answering one, TOCK) frame.
    pub async fn send_tick(&mut self) -> Result<(), ConnectionError> {
        self.send(&[]).await
    }

    /// Submits several frames as a single coalesced write: every payload is length-prefixed and
    /// gathered into one buffer before a single `write_all` call, so a caller that has several
    /// frames ready up front pays for one write instead of one per frame. This is the only
    /// coalescing this connection performs; see the module documentation for why.
    pub async fn send_batch<'a, I>(&mut self, payloads: I) -> Result<(), ConnectionError>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        if self.aborted {
            return Err(ConnectionError::OperationAborted);
        }
        let mut gathered = Vec::new();
        let mut sent = 0u64;
        for payload in payloads {
            if payload.len() > self.max_frame_size {
                return Err(ConnectionError::FrameTooLarge {
                    size: payload.len(),
                    max: self.max_frame_size,
                });
            }
            gathered.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            gathered.extend_from_slice(payload);
            if !payload.is_empty() {
                sent += 1;
            }
            if self.verbosity >= Verbosity::Wire {
                log::trace!("queued outbound frame of {} bytes", payload.len());
            }
        }
        if gathered.is_empty() {
            return Ok(());
        }
        let buf = SentineledBuffer::allocate(gathered);
        self.inner.write_all(buf.payload()).await?;
        self.inner.flush().await?;
        self.messages_out += sent;
        Ok(())
    }

    /// Reads the next complete, non-TICK frame, transparently answering any TICKs encountered
    /// along the way.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>, ConnectionError> {
        loop {
            if let Some(frame) = self.try_take_frame()? {
                if frame.is_empty() {
                    if self.verbosity >= Verbosity::Wire {
                        log::trace!("received TICK, replying TOCK");
                    }
                    self.send_tick().await?;
                    continue;
                }
                self.messages_in += 1;
                if self.verbosity >= Verbosity::Message {
                    log::trace!("received frame of {} bytes", frame.len());
                }
                return Ok(frame);
            }
            self.fill_from_transport().await?;
        }
    }

    fn try_take_frame(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        if self.inbound.len() < HEADER_SIZE {
            return Ok(None);
        }
        let size =
            u32::from_be_bytes(self.inbound[..HEADER_SIZE].try_into().expect("4 bytes")) as usize;
        if size > self.max_frame_size {
            return Err(ConnectionError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        if self.inbound.len() < HEADER_SIZE + size {
            return Ok(None);
        }
        let frame = self.inbound[HEADER_SIZE..HEADER_SIZE + size].to_vec();
        self.inbound.drain(0..HEADER_SIZE + size);
        Ok(Some(frame))
    }

    async fn fill_from_transport(&mut self) -> Result<(), ConnectionError> {
        let mut chunk = [0u8; 4096];
        let n = self.inner.read(&mut chunk).await?;
        if n == 0 {
            return Err(ConnectionError::NotConnected);
        }
        self.inbound.extend_from_slice(&chunk[..n]);
        Ok(())
    }

    /// Marks the connection aborted: further [`Self::send`]/[`Self::send_batch`] calls fail with
    /// [`ConnectionError::OperationAborted`] before any bytes are written.
    pub fn stop(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::io::Cursor;

    #[test]
    fn tick_frame_triggers_exactly_one_tock_and_no_message() {
        // A zero-length frame (TICK) followed by a real frame; read_frame must answer the TICK
        // with a TOCK and return only the real frame to the caller.
        let mut input = Vec::new();
        input.extend_from_slice(&0u32.to_be_bytes());
        input.extend_from_slice(&3u32.to_be_bytes());
        input.extend_from_slice(b"abc");

        let mut conn = Connection::new(Cursor::new(input));
        let frame = block_on(conn.read_frame()).unwrap();
        assert_eq!(frame, b"abc");
        assert_eq!(conn.messages_in, 1);

        let written = conn.into_inner().into_inner();
        assert_eq!(written, 0u32.to_be_bytes());
    }

    #[test]
    fn send_prefixes_a_4_byte_big_endian_length() {
        let mut conn = Connection::new(Cursor::new(Vec::new()));
        block_on(conn.send(b"hello")).unwrap();
        let written = conn.into_inner().into_inner();
        assert_eq!(&written[..4], &5u32.to_be_bytes());
        assert_eq!(&written[4..], b"hello");
    }

    #[test]
    fn oversized_frame_is_rejected_before_any_write() {
        let mut conn = Connection::with_max_frame_size(Cursor::new(Vec::new()), 4);
        let err = block_on(conn.send(b"toolong")).unwrap_err();
        assert!(matches!(err, ConnectionError::FrameTooLarge { .. }));
    }

    #[test]
    fn send_batch_coalesces_multiple_frames_into_one_write() {
        let mut conn = Connection::new(Cursor::new(Vec::new()));
        block_on(conn.send_batch([b"ab".as_slice(), b"c".as_slice()])).unwrap();
        let written = conn.into_inner().into_inner();
        let mut expected = Vec::new();
        expected.extend_from_slice(&2u32.to_be_bytes());
        expected.extend_from_slice(b"ab");
        expected.extend_from_slice(&1u32.to_be_bytes());
        expected.extend_from_slice(b"c");
        assert_eq!(written, expected);
    }

    #[test]
    fn send_after_stop_is_rejected() {
        let mut conn = Connection::new(Cursor::new(Vec::new()));
        conn.stop();
        let err = block_on(conn.send(b"x")).unwrap_err();
        assert!(matches!(err, ConnectionError::OperationAborted));
    }

    #[test]
    fn partial_frame_is_buffered_until_complete() {
        let mut full = Vec::new();
        full.extend_from_slice(&4u32.to_be_bytes());
        full.extend_from_slice(b"data");
        // Deliver the frame split across two reads by chaining cursors is awkward with Cursor
        // alone, so this test just confirms a fully-buffered frame round-trips.
        let mut conn = Connection::new(Cursor::new(full));
        let frame = block_on(conn.read_frame()).unwrap();
        assert_eq!(frame, b"data");
    }
}
