//! Encoding of outbound frames.
//!
//! Requests are a header followed by an optional text payload. The header's
//! payload length is always taken from the bytes actually written, so the
//! receiving decoder consumes exactly what was sent.

use bytes::{BufMut, Bytes, BytesMut};

use crate::dispatch::Response;
use crate::error::WireError;
use crate::frame::Frame;
use crate::header::{Header, MessageType, StatusCode};
use crate::payload::{put_text, ServerTime};
use crate::stats::StatsRecord;

/// Frame builder for constructing wire frames
#[derive(Debug)]
pub struct FrameBuilder {
    header: Header,
    payload: BytesMut,
}

impl FrameBuilder {
    /// Create a new frame builder
    pub fn new(header: Header) -> Self {
        Self {
            header,
            payload: BytesMut::new(),
        }
    }

    /// Append a length-prefixed text value
    pub fn text(mut self, text: &str) -> Result<Self, WireError> {
        put_text(&mut self.payload, text)?;
        Ok(self)
    }

    /// Append a big-endian `u32`
    pub fn u32(mut self, value: u32) -> Self {
        self.payload.put_u32(value);
        self
    }

    /// Append a timestamp
    pub fn time(mut self, time: &ServerTime) -> Result<Self, WireError> {
        time.encode(&mut self.payload)?;
        Ok(self)
    }

    /// Append a statistics record
    pub fn stats(mut self, stats: &StatsRecord) -> Self {
        stats.encode(&mut self.payload);
        self
    }

    /// Append raw bytes
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.payload.extend_from_slice(bytes);
        self
    }

    /// Build the frame, fixing up the header's payload length
    pub fn build(self) -> Result<Bytes, WireError> {
        Ok(Frame::new(self.header, self.payload.freeze())?.encode())
    }
}

/// Encode a client request
///
/// The status is the neutral request value and the payload length is the
/// serialized size of `text`, or zero when there is none.
pub fn encode_request(
    magic: u16,
    message_type: MessageType,
    text: Option<&str>,
) -> Result<Bytes, WireError> {
    let builder = FrameBuilder::new(Header::request(message_type).with_magic(magic));
    match text {
        Some(text) => builder.text(text)?.build(),
        None => builder.build(),
    }
}

/// Encode a server response carrying `response`
pub fn encode_response(
    magic: u16,
    response: &Response,
    status: StatusCode,
) -> Result<Bytes, WireError> {
    let header = Header::request(response.message_type())
        .with_magic(magic)
        .with_status(status);
    let builder = FrameBuilder::new(header);

    let builder = match response {
        Response::Time(time) => builder.time(time)?,
        Response::FreeSpace(value) => builder.u32(*value),
        Response::Stats(stats) => builder.stats(stats),
        Response::Reply { text, .. } => builder.text(text)?,
    };
    builder.build()
}
