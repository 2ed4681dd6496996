//! Client handle used by the presentation layer.

use statlink_wire::{encode_request, MessageType};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::session::{ClientConfig, ClientEvent, Command, ConnectionState, Session};

/// Handle for one client connection
///
/// All operations return immediately; outcomes arrive as [`ClientEvent`]s
/// on the receiver returned by [`Client::new`].
pub struct Client {
    config: ClientConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    events: mpsc::Sender<ClientEvent>,
    commands: Option<mpsc::UnboundedSender<Command>>,
}

impl Client {
    /// Create an idle client and the receiver for its events
    pub fn new(config: ClientConfig) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (events, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let (state, _) = watch::channel(ConnectionState::Idle);

        let client = Self {
            config,
            state: Arc::new(state),
            events,
            commands: None,
        };
        (client, event_rx)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Start connecting to `host:port`
    ///
    /// Must be called from within a tokio runtime. The outcome is reported as
    /// `ConnectionEstablished` or `ConnectionFailed`.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), SessionError> {
        let mut current = ConnectionState::Idle;
        let started = self.state.send_if_modified(|state| {
            current = *state;
            if *state == ConnectionState::Idle {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            warn!("Ignoring connect to {}:{} while {:?}", host, port, current);
            return Err(SessionError::AlreadyActive(current));
        }

        debug!("Connecting to {}:{}", host, port);
        let (commands, command_rx) = mpsc::unbounded_channel();
        self.commands = Some(commands);

        let session = Session {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
        };
        tokio::spawn(session.run(host.to_string(), port, command_rx));
        Ok(())
    }

    /// Close the connection if one is open; otherwise do nothing
    pub fn disconnect(&self) {
        let closing = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Disconnecting;
                true
            } else {
                false
            }
        });

        if closing {
            if let Some(commands) = &self.commands {
                // A closed queue means the task is already on its way out
                let _ = commands.send(Command::Disconnect);
            }
        }
    }

    /// Send a request without payload
    pub fn send_request(&self, message_type: MessageType) -> Result<(), SessionError> {
        self.send(message_type, None)
    }

    /// Send a request carrying `text`
    pub fn send_data(&self, message_type: MessageType, text: &str) -> Result<(), SessionError> {
        self.send(message_type, Some(text))
    }

    fn send(&self, message_type: MessageType, text: Option<&str>) -> Result<(), SessionError> {
        if self.state() != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }

        let bytes = encode_request(self.config.magic, message_type, text)?;
        debug!("Queueing {:?} request ({} bytes)", message_type, bytes.len());

        self.commands
            .as_ref()
            .ok_or(SessionError::NotConnected)?
            .send(Command::Write(bytes))
            .map_err(|_| SessionError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statlink_wire::WireError;

    #[tokio::test]
    async fn test_requests_need_connection() {
        let (client, _events) = Client::new(ClientConfig::default());

        assert_eq!(client.state(), ConnectionState::Idle);
        assert!(matches!(
            client.send_request(MessageType::GetTime),
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            client.send_data(MessageType::SetData, "x"),
            Err(SessionError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_noop() {
        let (client, _events) = Client::new(ClientConfig::default());
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_second_connect_rejected() {
        let (mut client, _events) = Client::new(ClientConfig::default());
        client.state.send_replace(ConnectionState::Connected);

        assert!(matches!(
            client.connect("127.0.0.1", 1),
            Err(SessionError::AlreadyActive(ConnectionState::Connected))
        ));
    }

    #[tokio::test]
    async fn test_oversized_request_is_wire_error() {
        let (mut client, _events) = Client::new(ClientConfig::default());
        let (commands, _command_rx) = mpsc::unbounded_channel();
        client.commands = Some(commands);
        client.state.send_replace(ConnectionState::Connected);

        let text = "z".repeat(40_000);
        assert!(matches!(
            client.send_data(MessageType::SetData, &text),
            Err(SessionError::Wire(WireError::Size(_)))
        ));
    }
}
