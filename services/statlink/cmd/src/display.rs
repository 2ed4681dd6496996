//! Human-readable rendering of client events.

use statlink_session::ClientEvent;
use statlink_wire::StatsRecord;

/// Multi-line statistics report
pub fn format_stats(stats: &StatsRecord) -> String {
    format!(
        "Server statistics:\n  \
         Bytes received: {}\n  \
         Bytes sent: {}\n  \
         Packets received: {}\n  \
         Packets sent: {}\n  \
         Uptime: {} s\n  \
         Clients: {}",
        stats.bytes_received,
        stats.bytes_sent,
        stats.packets_received,
        stats.packets_sent,
        stats.uptime_secs,
        stats.clients
    )
}

/// Render a response event, or `None` for connection events
pub fn format_response(event: &ClientEvent) -> Option<String> {
    match event {
        ClientEvent::TimeReceived(time) => Some(format!("Server time: {}", time)),
        ClientEvent::FreeSpaceReceived(bytes) => Some(format!("Free space: {} bytes", bytes)),
        ClientEvent::StatsReceived(stats) => Some(format_stats(stats)),
        ClientEvent::ReplyReceived { message_type, text } => {
            Some(format!("Server reply to {:?}: {}", message_type, text))
        }
        ClientEvent::ConnectionEstablished { .. }
        | ClientEvent::ConnectionFailed { .. }
        | ClientEvent::Disconnected
        | ClientEvent::ErrorStatus { .. }
        | ClientEvent::ProtocolError(_) => None,
    }
}
