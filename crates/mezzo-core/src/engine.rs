//! The media engine seam.
//!
//! The engine is an opaque library that owns codecs, ICE, and DTLS. The
//! session core never drives those internals; it only creates transports
//! from remote-supplied parameters, answers the engine's negotiation
//! requests, and observes connection state.
//!
//! # Negotiation model
//!
//! Engines traditionally negotiate through callbacks (`connect` / `produce`
//! handlers invoked with resolve/reject continuations). Here that is turned
//! inside out: the engine *awaits* its [`TransportNegotiator`] when it
//! needs the remote side to act. The await resolves exactly once, which is
//! the exactly-once-resolution guarantee the callback style needed
//! bookkeeping for.

use std::sync::Arc;

use async_trait::async_trait;
use mezzo_proto::{
    ConsumerId, DtlsParameters, MediaKind, ProducerId, RtpCapabilities, RtpEncodingParameters,
    RtpParameters, TransportCreationParams, TransportId, payloads::ConsumeResponse,
};
use tokio::sync::watch;

use crate::{
    error::{EngineError, NegotiationError},
    media::MediaTrack,
};

/// Connection state of one directional transport, as reported by the
/// engine.
///
/// The session core observes these transitions; it never produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport object exists, no handshake attempted yet.
    New,
    /// DTLS/ICE negotiation in progress.
    Connecting,
    /// Media can flow.
    Connected,
    /// Unrecoverable failure; the transport is unusable.
    Failed,
    /// Explicitly closed.
    Closed,
}

impl ConnectionState {
    /// Whether this state is terminal (no further transitions).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// The engine's window onto the remote peer during transport negotiation.
///
/// Implemented by the session core; called by the engine exactly when it
/// needs a remote round trip. A returned error propagates into the engine
/// operation that triggered the request.
#[async_trait]
pub trait TransportNegotiator: Send + Sync {
    /// Deliver local DTLS parameters to the remote peer and wait for the
    /// handshake to be acknowledged.
    async fn connect_transport(
        &self,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), NegotiationError>;

    /// Announce an outbound unit with the given parameters and wait for the
    /// remote-assigned producer id.
    async fn register_producer(
        &self,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId, NegotiationError>;
}

/// Capability negotiation and transport instantiation.
#[async_trait]
pub trait MediaEngine: Send + Sync + 'static {
    /// Load the engine with the router's advertised capabilities, returning
    /// the negotiated device capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unsupported`] when the engine cannot satisfy
    /// the router's minimum requirements (e.g. no compatible codec).
    async fn load(
        &self,
        router_capabilities: &RtpCapabilities,
    ) -> Result<RtpCapabilities, EngineError>;

    /// Instantiate a send-direction transport from remote-supplied
    /// creation parameters.
    async fn create_send_transport(
        &self,
        params: TransportCreationParams,
        negotiator: Arc<dyn TransportNegotiator>,
    ) -> Result<Box<dyn SendTransportHandle>, EngineError>;

    /// Instantiate a receive-direction transport from remote-supplied
    /// creation parameters.
    async fn create_recv_transport(
        &self,
        params: TransportCreationParams,
        negotiator: Arc<dyn TransportNegotiator>,
    ) -> Result<Box<dyn RecvTransportHandle>, EngineError>;
}

/// Behaviour common to both transport directions.
pub trait TransportHandle: Send + Sync {
    /// Remote-assigned transport identifier.
    fn id(&self) -> &TransportId;

    /// Connection-state updates. The receiver always holds the latest
    /// state; awaiting `changed()` observes transitions.
    fn state(&self) -> watch::Receiver<ConnectionState>;

    /// Close the transport and release engine resources. Idempotent; the
    /// state watch moves to [`ConnectionState::Closed`] unless the
    /// transport already failed.
    fn close(&self);
}

/// A send-direction transport.
#[async_trait]
pub trait SendTransportHandle: TransportHandle {
    /// Bind a local track to this transport, negotiating DTLS and producer
    /// registration through the [`TransportNegotiator`] as needed.
    ///
    /// `encodings` is empty for a plain stream, or the ordered simulcast
    /// layer list (low-to-high quality).
    async fn produce(
        &self,
        track: MediaTrack,
        encodings: Vec<RtpEncodingParameters>,
    ) -> Result<Box<dyn ProducerHandle>, EngineError>;
}

/// A receive-direction transport.
#[async_trait]
pub trait RecvTransportHandle: TransportHandle {
    /// Materialize a receivable track for a remote unit the router agreed
    /// to forward, negotiating DTLS through the [`TransportNegotiator`] if
    /// this is the transport's first unit.
    async fn consume(&self, spec: ConsumerSpec) -> Result<Box<dyn ConsumerHandle>, EngineError>;
}

/// An outbound media unit held by the engine.
pub trait ProducerHandle: Send + Sync {
    /// Remote-assigned producer id.
    fn id(&self) -> &ProducerId;

    /// Kind of the produced track.
    fn kind(&self) -> MediaKind;

    /// Stop sending. Idempotent.
    fn close(&self);
}

/// An inbound media unit held by the engine.
pub trait ConsumerHandle: Send + Sync {
    /// Remote-assigned consumer id.
    fn id(&self) -> &ConsumerId;

    /// Kind of the consumed track.
    fn kind(&self) -> MediaKind;

    /// The receivable track this consumer materialized.
    fn track(&self) -> MediaTrack;

    /// Stop receiving. Idempotent.
    fn close(&self);
}

/// Everything the engine needs to materialize one consumer.
///
/// Field-for-field the `consume` RPC response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSpec {
    /// Remote-assigned consumer id.
    pub id: ConsumerId,
    /// The remote producer being consumed.
    pub producer_id: ProducerId,
    /// Kind of the consumed track.
    pub kind: MediaKind,
    /// Receive parameters selected by the router.
    pub rtp_parameters: RtpParameters,
}

impl From<ConsumeResponse> for ConsumerSpec {
    fn from(resp: ConsumeResponse) -> Self {
        Self {
            id: resp.id,
            producer_id: resp.producer_id,
            kind: resp.kind,
            rtp_parameters: resp.rtp_parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(ConnectionState::Failed.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::New.is_terminal());
        assert!(!ConnectionState::Connecting.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
    }

    #[test]
    fn state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }
}
