//! Errors of the collaborator seams.

use mezzo_proto::MediaKind;
use thiserror::Error;

/// Failure of a negotiation round trip the engine requested.
///
/// Produced by [`crate::TransportNegotiator`] implementations and
/// propagated back into the engine operation that needed the round trip.
#[derive(Debug, Clone, Error)]
pub enum NegotiationError {
    /// The remote peer rejected the request.
    #[error("negotiation rejected by peer: {message}")]
    Rejected {
        /// Remote-supplied failure message.
        message: String,
    },

    /// The signaling channel went away mid-negotiation.
    #[error("signaling channel closed during negotiation")]
    ChannelClosed,
}

/// Errors reported by the media engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine cannot satisfy the router's capability requirements.
    #[error("engine cannot satisfy capabilities: {reason}")]
    Unsupported {
        /// What was missing (e.g. "no compatible video codec").
        reason: String,
    },

    /// A negotiation round trip failed.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// The transport was closed or failed before the operation completed.
    #[error("transport is closed")]
    TransportClosed,

    /// Engine-internal failure.
    #[error("engine failure: {reason}")]
    Internal {
        /// Engine-supplied description.
        reason: String,
    },
}

/// Errors from local media acquisition.
#[derive(Debug, Clone, Error)]
pub enum MediaAcquisitionError {
    /// The capture layer denied access.
    #[error("media capture denied: {reason}")]
    Denied {
        /// Platform-supplied denial reason.
        reason: String,
    },

    /// The capture layer cannot provide this media kind at all.
    #[error("capture of {kind} media is not supported")]
    Unsupported {
        /// The unsupported kind.
        kind: MediaKind,
    },
}
