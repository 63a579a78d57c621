//! Message framing over the client byte stream.
//!
//! Two framings are supported. `short_read` treats any read shorter than
//! [`READ_CHUNK_SIZE`] as the end of a message, so a message whose length is
//! an exact multiple of the chunk size stays pending until more bytes arrive.
//! `length_prefixed` expects a 4-byte big-endian length header before every
//! payload and must be enabled on both peers.

use std::io::{self, Read, Write};
use std::mem;

use renderd_config::FramingMode;
use tracing::trace;

use super::{FramingError, TRANSPORT_TARGET};

/// Size of each bounded read from the socket.
pub const READ_CHUNK_SIZE: usize = 1024;

const LENGTH_HEADER_BYTES: usize = 4;

/// Outcome of one bounded read.
enum Chunk {
    Data(usize),
    Closed,
    Idle,
}

/// Remainder of a rejected message still arriving on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Discard {
    Nothing,
    /// Drop chunks until a short read ends the message.
    UntilShortRead,
    /// Drop this many payload bytes.
    Bytes(usize),
}

/// Reconstructs request messages from successive socket reads.
///
/// Bytes belonging to an incomplete message are retained between calls, so
/// an idle timeout in the middle of a message does not lose data.
#[derive(Debug)]
pub struct FramedReader {
    mode: FramingMode,
    max_message_bytes: Option<usize>,
    buffer: Vec<u8>,
    discard: Discard,
}

impl FramedReader {
    /// Creates a reader for `mode`, optionally bounding message size.
    #[must_use]
    pub const fn new(mode: FramingMode, max_message_bytes: Option<usize>) -> Self {
        Self {
            mode,
            max_message_bytes,
            buffer: Vec::new(),
            discard: Discard::Nothing,
        }
    }

    /// Framing mode in use.
    #[must_use]
    pub const fn mode(&self) -> FramingMode {
        self.mode
    }

    /// Number of buffered bytes not yet returned as a message.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Reads the next complete message.
    ///
    /// Returns `Ok(None)` when no message is available yet: the stream timed
    /// out while idle, or the peer has closed the stream with nothing
    /// buffered.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::TooLarge`] when the message exceeds the
    /// configured limit, [`FramingError::Truncated`] when a length-prefixed
    /// message is cut short, and [`FramingError::Io`] when the socket read
    /// fails. Buffered bytes are discarded in every case; the rest of an
    /// oversized message is skipped as it arrives so the next message starts
    /// cleanly.
    pub fn read_message<R: Read>(
        &mut self,
        stream: &mut R,
    ) -> Result<Option<Vec<u8>>, FramingError> {
        match self.mode {
            FramingMode::ShortRead => self.read_short(stream),
            FramingMode::LengthPrefixed => self.read_prefixed(stream),
        }
    }

    fn read_short<R: Read>(&mut self, stream: &mut R) -> Result<Option<Vec<u8>>, FramingError> {
        let mut chunk = [0_u8; READ_CHUNK_SIZE];
        loop {
            match self.read_chunk(stream, &mut chunk)? {
                Chunk::Idle => return Ok(None),
                Chunk::Closed if self.buffer.is_empty() => return Ok(None),
                Chunk::Closed => return Ok(Some(mem::take(&mut self.buffer))),
                Chunk::Data(read) if self.discard == Discard::UntilShortRead => {
                    if read < READ_CHUNK_SIZE {
                        self.discard = Discard::Nothing;
                    }
                }
                Chunk::Data(read) => {
                    self.buffer
                        .extend_from_slice(chunk.get(..read).unwrap_or_default());
                    if let Err(error) = self.enforce_limit(self.buffer.len()) {
                        if read == READ_CHUNK_SIZE {
                            self.discard = Discard::UntilShortRead;
                        }
                        return Err(error);
                    }
                    if read < READ_CHUNK_SIZE {
                        return Ok(Some(mem::take(&mut self.buffer)));
                    }
                    trace!(
                        target: TRANSPORT_TARGET,
                        buffered = self.buffer.len(),
                        "full chunk read, expecting more data"
                    );
                }
            }
        }
    }

    fn read_prefixed<R: Read>(
        &mut self,
        stream: &mut R,
    ) -> Result<Option<Vec<u8>>, FramingError> {
        let mut chunk = [0_u8; READ_CHUNK_SIZE];
        loop {
            if let Some(message) = self.split_prefixed()? {
                return Ok(Some(message));
            }
            match self.read_chunk(stream, &mut chunk)? {
                Chunk::Idle => return Ok(None),
                Chunk::Closed if self.buffer.is_empty() => return Ok(None),
                Chunk::Closed => {
                    let expected = self
                        .announced_length()
                        .map_or(LENGTH_HEADER_BYTES, |length| length + LENGTH_HEADER_BYTES);
                    let received = mem::take(&mut self.buffer).len();
                    return Err(FramingError::Truncated { expected, received });
                }
                Chunk::Data(read) => {
                    let data = chunk.get(..read).unwrap_or_default();
                    let skipped = match self.discard {
                        Discard::Bytes(remaining) => remaining.min(data.len()),
                        _ => 0,
                    };
                    self.discard = match self.discard {
                        Discard::Bytes(remaining) if remaining > skipped => {
                            Discard::Bytes(remaining - skipped)
                        }
                        _ => Discard::Nothing,
                    };
                    self.buffer
                        .extend_from_slice(data.get(skipped..).unwrap_or_default());
                }
            }
        }
    }

    #[expect(
        clippy::big_endian_bytes,
        reason = "the length header is big-endian on the wire"
    )]
    fn announced_length(&self) -> Option<usize> {
        let header: [u8; LENGTH_HEADER_BYTES] =
            self.buffer.get(..LENGTH_HEADER_BYTES)?.try_into().ok()?;
        usize::try_from(u32::from_be_bytes(header)).ok()
    }

    fn split_prefixed(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        let Some(length) = self.announced_length() else {
            return Ok(None);
        };
        let end = LENGTH_HEADER_BYTES + length;
        if let Some(limit) = self.max_message_bytes
            && length > limit
        {
            let buffered = self.buffer.len().min(end);
            self.buffer.drain(..buffered);
            self.discard = Discard::Bytes(end - buffered);
            return Err(FramingError::too_large(length, limit));
        }
        let Some(payload) = self.buffer.get(LENGTH_HEADER_BYTES..end) else {
            return Ok(None);
        };
        let message = payload.to_vec();
        self.buffer.drain(..end);
        Ok(Some(message))
    }

    fn read_chunk<R: Read>(
        &mut self,
        stream: &mut R,
        chunk: &mut [u8],
    ) -> Result<Chunk, FramingError> {
        loop {
            match stream.read(chunk) {
                Ok(0) => return Ok(Chunk::Closed),
                Ok(read) => return Ok(Chunk::Data(read)),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error)
                    if matches!(
                        error.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(Chunk::Idle);
                }
                Err(error) => {
                    self.buffer.clear();
                    return Err(FramingError::from(error));
                }
            }
        }
    }

    fn enforce_limit(&mut self, size: usize) -> Result<(), FramingError> {
        match self.max_message_bytes {
            Some(limit) if size > limit => {
                self.buffer.clear();
                Err(FramingError::too_large(size, limit))
            }
            _ => Ok(()),
        }
    }
}

/// Writes `payload` as one message in `mode`, looping over partial writes.
///
/// # Errors
///
/// Returns [`FramingError::TooLarge`] when a length-prefixed payload does not
/// fit the 4-byte header and [`FramingError::Io`] when the write fails.
#[expect(
    clippy::big_endian_bytes,
    reason = "the length header is big-endian on the wire"
)]
pub fn write_message<W: Write>(
    stream: &mut W,
    mode: FramingMode,
    payload: &[u8],
) -> Result<(), FramingError> {
    if mode == FramingMode::LengthPrefixed {
        let length = u32::try_from(payload.len()).map_err(|_| {
            FramingError::too_large(
                payload.len(),
                usize::try_from(u32::MAX).unwrap_or(usize::MAX),
            )
        })?;
        stream.write_all(&length.to_be_bytes())?;
    }
    stream.write_all(payload)?;
    stream.flush()?;
    Ok(())
}
