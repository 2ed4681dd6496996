//! Server statistics record.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{need, WireError};

/// Encoded size of a [`StatsRecord`]
pub const STATS_RECORD_SIZE: usize = 24;

/// Operational statistics reported by the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsRecord {
    /// Bytes received by the server
    pub bytes_received: u32,
    /// Bytes sent by the server
    pub bytes_sent: u32,
    /// Packets received by the server
    pub packets_received: u32,
    /// Packets sent by the server
    pub packets_sent: u32,
    /// Server uptime in seconds
    pub uptime_secs: u32,
    /// Number of connected clients
    pub clients: u32,
}

impl StatsRecord {
    /// Encode the record (six big-endian `u32`)
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.bytes_received);
        buf.put_u32(self.bytes_sent);
        buf.put_u32(self.packets_received);
        buf.put_u32(self.packets_sent);
        buf.put_u32(self.uptime_secs);
        buf.put_u32(self.clients);
    }

    /// Decode a record from the front of `buf`
    pub fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        need(buf, STATS_RECORD_SIZE)?;

        Ok(Self {
            bytes_received: buf.get_u32(),
            bytes_sent: buf.get_u32(),
            packets_received: buf.get_u32(),
            packets_sent: buf.get_u32(),
            uptime_secs: buf.get_u32(),
            clients: buf.get_u32(),
        })
    }
}
