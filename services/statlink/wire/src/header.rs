//! Fixed 8-byte message header.
//!
//! Every message on the stream starts with four big-endian `u16` fields:
//! magic, message type, status and payload length. The payload length is
//! always the exact number of bytes that follow the header.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{need, WireError};

/// Default header magic
pub const DEFAULT_MAGIC: u16 = 0xA55A;

/// Header size in bytes
pub const HEADER_SIZE: usize = 8;

/// Largest payload a header can describe
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Operation selected by a header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Current server time
    GetTime,
    /// Free storage on the server
    GetFreeSpace,
    /// Server operational statistics
    GetStats,
    /// Store text on the server
    SetData,
    /// Clear stored data
    ClearData,
    /// Any value this client does not know
    Unknown(u16),
}

impl MessageType {
    /// All request types a client may send
    pub const REQUESTS: [MessageType; 5] = [
        MessageType::GetTime,
        MessageType::GetFreeSpace,
        MessageType::GetStats,
        MessageType::SetData,
        MessageType::ClearData,
    ];

    /// Raw wire value
    pub fn code(self) -> u16 {
        match self {
            MessageType::GetTime => 1,
            MessageType::GetFreeSpace => 2,
            MessageType::GetStats => 3,
            MessageType::SetData => 4,
            MessageType::ClearData => 5,
            MessageType::Unknown(raw) => raw,
        }
    }
}

impl From<u16> for MessageType {
    fn from(value: u16) -> Self {
        match value {
            1 => MessageType::GetTime,
            2 => MessageType::GetFreeSpace,
            3 => MessageType::GetStats,
            4 => MessageType::SetData,
            5 => MessageType::ClearData,
            other => MessageType::Unknown(other),
        }
    }
}

impl From<MessageType> for u16 {
    fn from(value: MessageType) -> Self {
        value.code()
    }
}

/// Result codes carried in the header status field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    /// Request succeeded; also the neutral value for requests
    Success,
    /// Server has no room for the data
    NoFreeSpace,
    /// Server does not implement the requested function
    NoFunction,
    /// Connection to the server could not be established
    ConnectToHost,
    /// Unrecognized status value
    Other(u16),
}

impl StatusCode {
    /// Raw wire value
    pub fn code(self) -> u16 {
        match self {
            StatusCode::Success => 0,
            StatusCode::NoFreeSpace => 1,
            StatusCode::NoFunction => 2,
            StatusCode::ConnectToHost => 3,
            StatusCode::Other(raw) => raw,
        }
    }

    /// Whether this code reports success
    pub fn is_success(self) -> bool {
        self == StatusCode::Success
    }
}

impl From<u16> for StatusCode {
    fn from(value: u16) -> Self {
        match value {
            0 => StatusCode::Success,
            1 => StatusCode::NoFreeSpace,
            2 => StatusCode::NoFunction,
            3 => StatusCode::ConnectToHost,
            other => StatusCode::Other(other),
        }
    }
}

/// Message header (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Alignment sentinel
    pub magic: u16,
    /// Operation
    pub message_type: MessageType,
    /// Result code, meaningful on responses
    pub status: StatusCode,
    /// Exact length of the payload that follows
    pub payload_len: u16,
}

impl Header {
    /// Create a request header with the default magic and no payload
    pub fn request(message_type: MessageType) -> Self {
        Self {
            magic: DEFAULT_MAGIC,
            message_type,
            status: StatusCode::Success,
            payload_len: 0,
        }
    }

    /// Override the magic
    pub fn with_magic(mut self, magic: u16) -> Self {
        self.magic = magic;
        self
    }

    /// Override the status
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Encode the header to bytes (big-endian)
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.magic);
        buf.put_u16(self.message_type.code());
        buf.put_u16(self.status.code());
        buf.put_u16(self.payload_len);
    }

    /// Decode a header from the front of `buf` without validating the magic
    pub fn decode(buf: &mut impl Buf) -> Result<Self, WireError> {
        if buf.remaining() < HEADER_SIZE {
            return Err(WireError::Incomplete {
                needed: HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        Ok(Self {
            magic: buf.get_u16(),
            message_type: MessageType::from(buf.get_u16()),
            status: StatusCode::from(buf.get_u16()),
            payload_len: buf.get_u16(),
        })
    }

    /// Read a header from the first bytes of `buf` without consuming them
    pub fn peek(buf: &[u8]) -> Result<Self, WireError> {
        need(buf, HEADER_SIZE)?;
        let mut window = &buf[..HEADER_SIZE];
        Self::decode(&mut window)
    }

    /// Check the magic against the expected protocol constant
    pub fn validate(&self, magic: u16) -> Result<(), WireError> {
        if self.magic != magic {
            return Err(WireError::Magic(self.magic));
        }
        Ok(())
    }
}
