//! Basic usage example for the statlink wire protocol.

use statlink_wire::{
    dispatch, encode_request, encode_response, FrameDecoder, MessageType, Response, StatsRecord,
    StatusCode, DEFAULT_MAGIC,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Statlink Wire Protocol Example ===\n");

    // 1. Encode a request
    println!("1. Encoding a SET_DATA request...");
    let request = encode_request(DEFAULT_MAGIC, MessageType::SetData, Some("Hello, server!"))?;
    println!("   Encoded request: {} bytes", request.len());
    println!("   Header: {:02X?}", &request[..8]);

    // 2. Build a server reply and corrupt the stream in front of it
    println!("\n2. Building a stats reply behind 5 bytes of noise...");
    let stats = StatsRecord {
        bytes_received: 1000,
        bytes_sent: 2000,
        packets_received: 10,
        packets_sent: 20,
        uptime_secs: 3600,
        clients: 5,
    };
    let mut stream = vec![0x13, 0x37, 0x00, 0xA5, 0x01];
    stream.extend_from_slice(&encode_response(
        DEFAULT_MAGIC,
        &Response::Stats(stats),
        StatusCode::Success,
    )?);
    stream.extend_from_slice(&encode_response(
        DEFAULT_MAGIC,
        &Response::FreeSpace(1 << 20),
        StatusCode::Success,
    )?);

    // 3. Feed it one byte at a time
    println!("\n3. Decoding byte by byte...");
    let mut decoder = FrameDecoder::new();
    for byte in &stream {
        for frame in decoder.feed(std::slice::from_ref(byte)) {
            println!(
                "   Frame {:?} ({} payload bytes) -> {:?}",
                frame.header.message_type,
                frame.payload.len(),
                dispatch(&frame)
            );
        }
    }

    let decoder_stats = decoder.stats();
    println!(
        "\n   frames: {}, resyncs: {}, discarded bytes: {}",
        decoder_stats.frames, decoder_stats.resyncs, decoder_stats.discarded_bytes
    );

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
