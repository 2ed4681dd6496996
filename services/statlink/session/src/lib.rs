//! TCP connection manager, read/write loop and client events for statlink.
//!
//! A [`Client`] starts one background task per connection. The task owns the
//! socket and the [`FrameDecoder`](statlink_wire::FrameDecoder), feeds every
//! chunk it reads into the decoder, dispatches each complete frame and emits
//! the result as a [`ClientEvent`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use statlink_session::{Client, ClientConfig, ClientEvent};
//! use statlink_wire::MessageType;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let (mut client, mut events) = Client::new(ClientConfig::default());
//! client.connect("127.0.0.1", 12345)?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ClientEvent::ConnectionEstablished { peer } => {
//!             println!("Connected to {}", peer);
//!             client.send_request(MessageType::GetStats)?;
//!         }
//!         ClientEvent::StatsReceived(stats) => {
//!             println!("Server up for {} s with {} clients", stats.uptime_secs, stats.clients);
//!             client.disconnect();
//!         }
//!         ClientEvent::Disconnected => break,
//!         other => println!("{:?}", other),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod session;
pub mod transport;

// Re-export main types
pub use client::Client;
pub use error::SessionError;
pub use session::{ClientConfig, ClientEvent, ConnectionState};
pub use transport::connect_tcp;
