//! Stream framing for the wire protocol.
//!
//! The transport delivers bytes in chunks that have no relation to message
//! boundaries. [`FrameDecoder`] accumulates them and yields complete frames,
//! one header and its full payload at a time. When the bytes at the front of
//! the buffer do not start with the magic, the decoder scans forward one byte
//! at a time until the magic lines up again.

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::error::WireError;
use crate::header::{Header, DEFAULT_MAGIC, HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// Initial capacity of the accumulation buffer
const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// A header together with its complete payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message header
    pub header: Header,
    /// Exactly `header.payload_len` bytes
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, setting the header's payload length from `payload`
    pub fn new(mut header: Header, payload: Bytes) -> Result<Self, WireError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(WireError::Size(payload.len()));
        }
        header.payload_len = payload.len() as u16;
        Ok(Self { header, payload })
    }

    /// Get the total frame size when encoded
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode frame to a contiguous buffer
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        self.header.encode(&mut buf);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingHeader,
    AwaitingPayload { header: Header },
}

/// Counters kept by a [`FrameDecoder`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Complete frames produced
    pub frames: u64,
    /// Times the decoder lost alignment and had to scan for the magic
    pub resyncs: u64,
    /// Bytes thrown away while scanning
    pub discarded_bytes: u64,
}

/// Incremental frame decoder with magic-based resynchronization
#[derive(Debug)]
pub struct FrameDecoder {
    magic: u16,
    buffer: BytesMut,
    state: State,
    /// Bytes discarded in the current misalignment episode, if any
    scanning: Option<usize>,
    stats: DecoderStats,
}

impl FrameDecoder {
    /// Create a new frame decoder for the default magic
    pub fn new() -> Self {
        Self::with_magic(DEFAULT_MAGIC)
    }

    /// Create a frame decoder that aligns on `magic`
    pub fn with_magic(magic: u16) -> Self {
        Self {
            magic,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: State::AwaitingHeader,
            scanning: None,
            stats: DecoderStats::default(),
        }
    }

    /// Append a chunk and iterate over the frames it completes
    ///
    /// Frames are produced lazily; bytes that do not complete a frame stay
    /// buffered for the next call. Dropping the iterator early leaves the
    /// remaining frames in the buffer, to be returned by the next `feed`.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.buffer.extend_from_slice(chunk);
        Frames { decoder: self }
    }

    /// Decode the next complete frame from already buffered bytes
    pub fn decode_next(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                State::AwaitingHeader => {
                    if self.buffer.len() < HEADER_SIZE {
                        return None;
                    }

                    let header = Header::peek(&self.buffer).ok()?;
                    if header.validate(self.magic).is_err() {
                        if !self.resync() {
                            return None;
                        }
                        continue;
                    }

                    if let Some(discarded) = self.scanning.take() {
                        warn!(discarded, "stream resynchronized on header magic");
                    }

                    self.buffer.advance(HEADER_SIZE);
                    trace!(
                        message_type = ?header.message_type,
                        payload_len = header.payload_len,
                        "parsed header"
                    );
                    self.state = State::AwaitingPayload { header };
                }
                State::AwaitingPayload { header } => {
                    let len = header.payload_len as usize;
                    if self.buffer.len() < len {
                        return None;
                    }

                    let payload = self.buffer.split_to(len).freeze();
                    self.state = State::AwaitingHeader;
                    self.stats.frames += 1;
                    return Some(Frame { header, payload });
                }
            }
        }
    }

    /// Drop leading bytes until the buffer starts with the magic.
    ///
    /// Returns `true` when an aligned position was found.
    fn resync(&mut self) -> bool {
        if self.scanning.is_none() {
            self.stats.resyncs += 1;
            self.scanning = Some(0);
            debug!(magic = self.magic, "header magic mismatch, scanning");
        }

        let magic = self.magic.to_be_bytes();
        let found = self.buffer[1..]
            .windows(2)
            .position(|w| w == &magic[..])
            .map(|pos| pos + 1);

        // A trailing first magic byte may pair with the next chunk.
        let discard = match found {
            Some(pos) => pos,
            None if self.buffer.last() == Some(&magic[0]) => self.buffer.len() - 1,
            None => self.buffer.len(),
        };

        self.buffer.advance(discard);
        self.stats.discarded_bytes += discard as u64;
        if let Some(total) = self.scanning.as_mut() {
            *total += discard;
        }

        found.is_some()
    }

    /// The magic this decoder aligns on
    pub fn magic(&self) -> u16 {
        self.magic
    }

    /// Number of bytes buffered but not yet returned in a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Payload bytes still missing for the pending header, if one is pending
    pub fn pending_payload(&self) -> Option<usize> {
        match self.state {
            State::AwaitingHeader => None,
            State::AwaitingPayload { header } => {
                Some((header.payload_len as usize).saturating_sub(self.buffer.len()))
            }
        }
    }

    /// Decoder counters
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy iterator over frames completed by [`FrameDecoder::feed`]
#[derive(Debug)]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.decoder.decode_next()
    }
}
