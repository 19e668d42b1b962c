//! Signaling wire types for the Mezzo SFU session protocol.
//!
//! Everything a client and an SFU signaling server exchange lives here:
//! the request/response/event envelope, RTP capability and parameter
//! descriptions, ICE/DTLS transport parameters, and the typed payloads of
//! each RPC method. The wire format is JSON; every struct uses camelCase
//! field names to match it.
//!
//! # Components
//!
//! - [`Envelope`]: the duplex wire envelope with request correlation ids
//! - [`Method`] / [`EventName`]: the RPC method and push-event vocabulary
//! - [`rtp`]: codec capabilities and parameters, simulcast encodings
//! - [`transport`]: ICE/DTLS creation parameters
//! - [`payloads`]: one struct per RPC request/response

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod ids;
pub mod payloads;
pub mod rtp;
pub mod transport;

pub use envelope::{Envelope, EnvelopeError, EventName, Method};
pub use ids::{ConsumerId, ProducerId, TransportId};
pub use rtp::{
    MediaKind, RtpCapabilities, RtpCodecCapability, RtpCodecParameters, RtpEncodingParameters,
    RtpHeaderExtension, RtpParameters,
};
pub use transport::{
    DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate, IceParameters,
    TransportCreationParams, TransportProtocol,
};
