//! The signaling connection seam.

use async_trait::async_trait;
use mezzo_proto::Envelope;
use thiserror::Error;

/// A persistent duplex envelope pipe to the signaling peer.
///
/// A connection is born connected: constructing one (TCP dial, in-memory
/// link) is the "connect" lifecycle event. Orderly close is `recv()`
/// returning `Ok(None)`; abnormal loss is an `Err`. The RPC channel treats
/// both as connection loss and rejects everything still pending.
#[async_trait]
pub trait SignalingConnection: Send + 'static {
    /// Send one envelope.
    async fn send(&mut self, envelope: Envelope) -> Result<(), ConnectionError>;

    /// Receive the next envelope, in connection order. `Ok(None)` means the
    /// peer closed the connection.
    async fn recv(&mut self) -> Result<Option<Envelope>, ConnectionError>;

    /// Close the connection. Idempotent.
    async fn close(&mut self);
}

/// Signaling connection failure.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Underlying I/O failed.
    #[error("connection i/o error: {0}")]
    Io(String),

    /// A received message was not a valid envelope.
    #[error("connection codec error: {0}")]
    Codec(String),

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
}

impl From<std::io::Error> for ConnectionError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
