//! Client error types.
//!
//! The taxonomy follows who gets to see each failure: [`SignalingError`]
//! and [`MediaAcquisitionError`] surface to the caller of the operation
//! that triggered them; [`TransportFailure`] marks one direction failed
//! without touching the other direction or the signaling channel;
//! [`CapabilityError`] guards the load-once capability invariant.

use mezzo_core::{EngineError, MediaAcquisitionError, NegotiationError};
use mezzo_proto::Method;
use thiserror::Error;

use crate::transport::TransportDirection;

/// Failure of one RPC round trip.
#[derive(Debug, Clone, Error)]
pub enum SignalingError {
    /// The remote peer rejected the request.
    #[error("request rejected by peer: {message}")]
    Rejected {
        /// Remote-supplied failure message.
        message: String,
    },

    /// The signaling channel closed before the response arrived. Pending
    /// requests are rejected with this on connection loss; reconnection
    /// never retries them.
    #[error("signaling channel closed")]
    ChannelClosed,

    /// No response within the configured window.
    #[error("{method} request timed out")]
    Timeout {
        /// The method that timed out.
        method: Method,
    },

    /// A payload failed to encode or decode.
    #[error("payload codec error: {0}")]
    Codec(String),
}

/// Violations of the capability lifecycle.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    /// The engine cannot satisfy the router's capability requirements.
    #[error("engine cannot satisfy router capabilities: {reason}")]
    Unsupported {
        /// What was missing.
        reason: String,
    },

    /// An operation needed the capability set before it was negotiated.
    #[error("capabilities not negotiated yet")]
    NotLoaded,

    /// Capability negotiation ran twice on one connection.
    #[error("capabilities already negotiated")]
    AlreadyLoaded,
}

/// Terminal failure of one directional transport.
///
/// Surfaced to the session controller; the other direction keeps running.
#[derive(Debug, Clone, Error)]
#[error("{direction} transport failed: {reason}")]
pub struct TransportFailure {
    /// Which direction failed.
    pub direction: TransportDirection,
    /// Engine- or controller-supplied reason.
    pub reason: String,
}

/// Any failure a public session operation can resolve with.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An RPC round trip failed.
    #[error(transparent)]
    Signaling(#[from] SignalingError),

    /// Capability lifecycle violation.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// A directional transport failed terminally.
    #[error(transparent)]
    Transport(#[from] TransportFailure),

    /// Local media acquisition failed.
    #[error(transparent)]
    MediaAcquisition(#[from] MediaAcquisitionError),

    /// The engine failed outside any negotiation round trip.
    #[error("engine error: {0}")]
    Engine(EngineError),
}

impl SessionError {
    /// Fold an engine error back into the session taxonomy.
    ///
    /// Negotiation failures the engine is merely relaying come back out as
    /// the signaling errors they started as.
    pub(crate) fn from_engine(err: EngineError, direction: TransportDirection) -> Self {
        match err {
            EngineError::Unsupported { reason } => {
                Self::Capability(CapabilityError::Unsupported { reason })
            },
            EngineError::Negotiation(NegotiationError::Rejected { message }) => {
                Self::Signaling(SignalingError::Rejected { message })
            },
            EngineError::Negotiation(NegotiationError::ChannelClosed) => {
                Self::Signaling(SignalingError::ChannelClosed)
            },
            EngineError::TransportClosed => Self::Transport(TransportFailure {
                direction,
                reason: "transport closed during operation".to_string(),
            }),
            other => Self::Engine(other),
        }
    }

    /// Returns true if this error ends more than the operation that raised
    /// it.
    ///
    /// Fatal: the channel is gone or a transport direction died. Transient:
    /// the caller may retry the operation on the same session.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Signaling(SignalingError::ChannelClosed) => true,
            Self::Signaling(_) | Self::Capability(_) | Self::MediaAcquisition(_) => false,
            Self::Transport(_) | Self::Engine(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use mezzo_proto::MediaKind;

    use super::*;

    #[test]
    fn rejected_rpc_is_transient() {
        let err = SessionError::from(SignalingError::Rejected { message: "busy".to_string() });
        assert!(!err.is_fatal());
    }

    #[test]
    fn channel_loss_is_fatal() {
        let err = SessionError::from(SignalingError::ChannelClosed);
        assert!(err.is_fatal());
    }

    #[test]
    fn capture_denial_is_transient() {
        let err = SessionError::from(MediaAcquisitionError::Unsupported { kind: MediaKind::Video });
        assert!(!err.is_fatal());
    }

    #[test]
    fn transport_failure_is_fatal_and_names_direction() {
        let err = SessionError::from(TransportFailure {
            direction: TransportDirection::Send,
            reason: "dtls failure".to_string(),
        });
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "send transport failed: dtls failure");
    }

    #[test]
    fn engine_unsupported_maps_to_capability() {
        let err = SessionError::from_engine(
            EngineError::Unsupported { reason: "no compatible codec".to_string() },
            TransportDirection::Send,
        );
        assert!(matches!(err, SessionError::Capability(CapabilityError::Unsupported { .. })));
    }

    #[test]
    fn relayed_rejection_maps_back_to_signaling() {
        let err = SessionError::from_engine(
            EngineError::Negotiation(NegotiationError::Rejected { message: "nope".to_string() }),
            TransportDirection::Recv,
        );
        match err {
            SessionError::Signaling(SignalingError::Rejected { message }) => {
                assert_eq!(message, "nope");
            },
            other => panic!("expected signaling rejection, got {other:?}"),
        }
    }
}
