//! Wire protocol headers, stream framing and payload dispatch for statlink.
//!
//! This crate implements everything between raw TCP bytes and typed server
//! responses: the fixed message header, the incremental frame decoder that
//! survives arbitrary chunking and corrupted input, the dispatcher that turns
//! a complete frame into a [`Response`], and the request encoder.
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u16 magic            | alignment sentinel         |
//! +----------------------+----------------------------+
//! | u16 message_type     | GetTime .. ClearData       |
//! +----------------------+----------------------------+
//! | u16 status           | result code (0 = success)  |
//! +----------------------+----------------------------+
//! | u16 payload_len      | bytes that follow          |
//! +----------------------+----------------------------+
//! | payload              | variable (0..65535)        |
//! +----------------------+----------------------------+
//! ```
//!
//! All integers are big-endian.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod header;
pub mod payload;
pub mod stats;

// Re-export main types
pub use codec::{encode_request, encode_response, FrameBuilder};
pub use dispatch::{dispatch, ProtocolError, Response};
pub use error::WireError;
pub use frame::{DecoderStats, Frame, FrameDecoder, Frames};
pub use header::{
    Header, MessageType, StatusCode, DEFAULT_MAGIC, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use payload::{encoded_text_len, get_text, put_text, ServerTime, TimeSpec};
pub use stats::{StatsRecord, STATS_RECORD_SIZE};
