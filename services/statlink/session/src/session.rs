//! Connection task for a statlink client.
//!
//! One task per connection owns the socket, the frame decoder and the
//! dispatch loop, so every feed and dispatch for a connection runs in order
//! on a single context. Commands arrive on an unbounded queue and events
//! leave through one bounded channel.

use bytes::{Bytes, BytesMut};
use statlink_wire::{
    dispatch, FrameDecoder, MessageType, ProtocolError, Response, ServerTime, StatsRecord,
    StatusCode, DEFAULT_MAGIC,
};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::transport::connect_tcp;

/// Configuration for a client connection
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Header magic used for requests and for stream alignment
    pub magic: u16,
    /// Capacity of the event channel
    pub event_buffer: usize,
    /// Initial capacity of the socket read buffer
    pub read_buffer: usize,
    /// Upper bound on a connection attempt
    pub connect_timeout: Option<Duration>,
    /// Close the connection if a started payload stays incomplete this long
    pub payload_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            magic: DEFAULT_MAGIC,
            event_buffer: 64,
            read_buffer: 16 * 1024,
            connect_timeout: None,
            payload_timeout: None,
        }
    }
}

/// Connection lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; initial state and end of every cycle
    Idle,
    /// Connection attempt in progress
    Connecting,
    /// Connected and exchanging frames
    Connected,
    /// Orderly close requested
    Disconnecting,
}

/// Events emitted to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Connection attempt succeeded
    ConnectionEstablished {
        /// Server socket address
        peer: SocketAddr,
    },
    /// Connection attempt failed
    ConnectionFailed {
        /// Always [`StatusCode::ConnectToHost`]
        code: StatusCode,
        /// Transport error description
        reason: String,
    },
    /// Connection closed by either side
    Disconnected,
    /// Server time
    TimeReceived(ServerTime),
    /// Free storage on the server in bytes
    FreeSpaceReceived(u32),
    /// Server statistics
    StatsReceived(StatsRecord),
    /// Text reply to `SetData` or `ClearData`
    ReplyReceived {
        /// Request the reply answers
        message_type: MessageType,
        /// Reply text
        text: String,
    },
    /// The server answered with a non-success status; the response itself
    /// follows as its own event
    ErrorStatus {
        /// Request the status answers
        message_type: MessageType,
        /// Status from the response header
        status: StatusCode,
    },
    /// A frame could not be handled; the connection stays up
    ProtocolError(ProtocolError),
}

impl From<Response> for ClientEvent {
    fn from(response: Response) -> Self {
        match response {
            Response::Time(time) => ClientEvent::TimeReceived(time),
            Response::FreeSpace(bytes) => ClientEvent::FreeSpaceReceived(bytes),
            Response::Stats(stats) => ClientEvent::StatsReceived(stats),
            Response::Reply { message_type, text } => {
                ClientEvent::ReplyReceived { message_type, text }
            }
        }
    }
}

impl From<Result<Response, ProtocolError>> for ClientEvent {
    fn from(result: Result<Response, ProtocolError>) -> Self {
        match result {
            Ok(response) => response.into(),
            Err(err) => ClientEvent::ProtocolError(err),
        }
    }
}

/// Traffic counters for one connection, logged when it closes
#[derive(Clone, Debug, Default)]
pub(crate) struct SessionStats {
    pub(crate) bytes_in: u64,
    pub(crate) bytes_out: u64,
    pub(crate) requests_sent: u64,
    pub(crate) responses: u64,
    pub(crate) protocol_errors: u64,
}

/// Commands from the [`Client`](crate::Client) handle to the connection task
#[derive(Debug)]
pub(crate) enum Command {
    /// Write an encoded request
    Write(Bytes),
    /// Close the connection
    Disconnect,
}

/// Main session implementation
pub(crate) struct Session {
    pub(crate) config: ClientConfig,
    pub(crate) state: Arc<watch::Sender<ConnectionState>>,
    pub(crate) events: mpsc::Sender<ClientEvent>,
}

impl Session {
    /// Connect and run until the connection closes
    pub(crate) async fn run(
        self,
        host: String,
        port: u16,
        commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let connect = connect_tcp(&host, port, self.config.connect_timeout);
        self.run_with(&format!("{}:{}", host, port), connect, commands)
            .await
    }

    /// Drive the connection produced by `connect` until it closes
    pub(crate) async fn run_with<F>(
        self,
        target: &str,
        connect: F,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) where
        F: Future<Output = io::Result<TcpStream>>,
    {
        let mut stream = match connect.await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to connect to {}: {}", target, e);
                self.state.send_replace(ConnectionState::Idle);
                self.emit(ClientEvent::ConnectionFailed {
                    code: StatusCode::ConnectToHost,
                    reason: e.to_string(),
                })
                .await;
                return;
            }
        };

        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                warn!("Connected socket has no peer address: {}", e);
                self.state.send_replace(ConnectionState::Idle);
                self.emit(ClientEvent::ConnectionFailed {
                    code: StatusCode::ConnectToHost,
                    reason: e.to_string(),
                })
                .await;
                return;
            }
        };

        info!("Connected to {}", peer);
        self.state.send_replace(ConnectionState::Connected);
        self.emit(ClientEvent::ConnectionEstablished { peer }).await;

        let mut decoder = FrameDecoder::with_magic(self.config.magic);
        let mut read_buffer = BytesMut::with_capacity(self.config.read_buffer);
        let mut stats = SessionStats::default();
        let mut payload_deadline: Option<Instant> = None;
        let (mut reader, mut writer) = stream.split();

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Write(bytes)) => {
                        if let Err(e) = writer.write_all(&bytes).await {
                            error!("Failed to write request to {}: {}", peer, e);
                            break;
                        }
                        stats.bytes_out += bytes.len() as u64;
                        stats.requests_sent += 1;
                    }
                    Some(Command::Disconnect) | None => {
                        debug!("Closing connection to {}", peer);
                        if let Err(e) = writer.shutdown().await {
                            debug!("Shutdown of {} failed: {}", peer, e);
                        }
                        break;
                    }
                },

                read = reader.read_buf(&mut read_buffer) => match read {
                    Ok(0) => {
                        info!("Connection closed by {}", peer);
                        break;
                    }
                    Ok(n) => {
                        stats.bytes_in += n as u64;
                        let frames_before = decoder.stats().frames;

                        for frame in decoder.feed(&read_buffer) {
                            if !frame.header.status.is_success() {
                                warn!(
                                    "Server reported status {:?} for {:?}",
                                    frame.header.status, frame.header.message_type
                                );
                                self.emit(ClientEvent::ErrorStatus {
                                    message_type: frame.header.message_type,
                                    status: frame.header.status,
                                })
                                .await;
                            }

                            let event = ClientEvent::from(dispatch(&frame));
                            match &event {
                                ClientEvent::ProtocolError(e) => {
                                    warn!("Protocol error from {}: {}", peer, e);
                                    stats.protocol_errors += 1;
                                }
                                _ => {
                                    debug!("Received {:?} response from {}", frame.header.message_type, peer);
                                    stats.responses += 1;
                                }
                            }
                            self.emit(event).await;
                        }
                        read_buffer.clear();

                        let completed = decoder.stats().frames != frames_before;
                        payload_deadline = match (self.config.payload_timeout, decoder.pending_payload()) {
                            (Some(limit), Some(_)) if completed || payload_deadline.is_none() => {
                                Some(Instant::now() + limit)
                            }
                            (Some(_), Some(_)) => payload_deadline,
                            _ => None,
                        };
                    }
                    Err(e) => {
                        warn!("Read from {} failed: {}", peer, e);
                        break;
                    }
                },

                _ = tokio::time::sleep_until(payload_deadline.unwrap_or_else(Instant::now)),
                    if payload_deadline.is_some() => {
                    warn!(
                        "Payload from {} incomplete after {:?}, closing",
                        peer, self.config.payload_timeout
                    );
                    break;
                }
            }
        }

        let decoder_stats = decoder.stats();
        info!(
            "Disconnected from {} (in: {} bytes, out: {} bytes, requests: {}, responses: {}, protocol errors: {}, resyncs: {}, discarded: {} bytes)",
            peer,
            stats.bytes_in,
            stats.bytes_out,
            stats.requests_sent,
            stats.responses,
            stats.protocol_errors,
            decoder_stats.resyncs,
            decoder_stats.discarded_bytes
        );

        self.state.send_replace(ConnectionState::Idle);
        self.emit(ClientEvent::Disconnected).await;
    }

    async fn emit(&self, event: ClientEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Event receiver dropped");
        }
    }
}
