//! Typed decoding of complete frames.
//!
//! [`dispatch`] is a pure function of the frame: it reads the payload
//! according to the header's message type and yields one [`Response`] or a
//! [`ProtocolError`]. By the time a frame gets here its payload has already
//! been consumed from the stream, so neither outcome affects alignment.

use bytes::Buf;
use thiserror::Error;
use tracing::debug;

use crate::error::{need, WireError};
use crate::frame::Frame;
use crate::header::MessageType;
use crate::payload::{get_text, ServerTime};
use crate::stats::StatsRecord;

/// A decoded server response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Server time
    Time(ServerTime),
    /// Free storage in bytes
    FreeSpace(u32),
    /// Server statistics
    Stats(StatsRecord),
    /// Text reply to a data command
    Reply {
        /// `SetData` or `ClearData`
        message_type: MessageType,
        /// Reply text
        text: String,
    },
}

impl Response {
    /// Message type this response answers
    pub fn message_type(&self) -> MessageType {
        match self {
            Response::Time(_) => MessageType::GetTime,
            Response::FreeSpace(_) => MessageType::GetFreeSpace,
            Response::Stats(_) => MessageType::GetStats,
            Response::Reply { message_type, .. } => *message_type,
        }
    }
}

/// Non-fatal protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header carried a message type this client does not handle
    #[error("unknown message type {0}")]
    UnknownMessageType(u16),

    /// Payload could not be decoded for its message type
    #[error("malformed {message_type:?} payload: {source}")]
    MalformedPayload {
        /// Message type from the header
        message_type: MessageType,
        /// Underlying decode failure
        source: WireError,
    },
}

/// Decode a complete frame into a typed response
pub fn dispatch(frame: &Frame) -> Result<Response, ProtocolError> {
    let message_type = frame.header.message_type;
    let mut payload: &[u8] = &frame.payload;
    let malformed = |source| ProtocolError::MalformedPayload {
        message_type,
        source,
    };

    let response = match message_type {
        MessageType::GetTime => Response::Time(ServerTime::decode(&mut payload).map_err(malformed)?),
        MessageType::GetFreeSpace => {
            need(payload, 4).map_err(malformed)?;
            Response::FreeSpace(payload.get_u32())
        }
        MessageType::GetStats => {
            Response::Stats(StatsRecord::decode(&mut payload).map_err(malformed)?)
        }
        MessageType::SetData | MessageType::ClearData => {
            // Servers may acknowledge without a body
            let text = if payload.is_empty() {
                String::new()
            } else {
                get_text(&mut payload).map_err(malformed)?
            };
            Response::Reply { message_type, text }
        }
        MessageType::Unknown(raw) => return Err(ProtocolError::UnknownMessageType(raw)),
    };

    if !payload.is_empty() {
        debug!(
            ?message_type,
            trailing = payload.len(),
            "ignoring trailing payload bytes"
        );
    }

    Ok(response)
}
