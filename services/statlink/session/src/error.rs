//! Session error types.

use statlink_wire::WireError;
use thiserror::Error;

use crate::session::ConnectionState;

/// Errors returned by [`Client`](crate::Client) operations
#[derive(Error, Debug)]
pub enum SessionError {
    /// Operation needs an established connection
    #[error("not connected")]
    NotConnected,

    /// A connection is already being made or is open
    #[error("connection already active ({0:?})")]
    AlreadyActive(ConnectionState),

    /// Request could not be encoded
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}
