//! Collaborator abstractions for the Mezzo session client.
//!
//! The session orchestration core talks to three external collaborators it
//! deliberately does not implement: the media engine (packet encode/decode,
//! ICE, DTLS), the capture layer (camera/screen acquisition), and the
//! signaling connection. Each is a trait here, so the orchestration logic
//! runs unchanged against the production implementations or the in-process
//! fakes in `mezzo-harness`.
//!
//! # Components
//!
//! - [`MediaEngine`] and the transport/producer/consumer handle traits
//! - [`TransportNegotiator`]: the engine's awaited negotiation requests
//! - [`MediaSource`]: raw track acquisition
//! - [`SignalingConnection`]: the duplex envelope pipe
//! - [`MediaTrack`] / [`MediaStream`]: opaque media handles

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod capture;
mod connection;
mod engine;
mod error;
mod media;

pub use capture::MediaSource;
pub use connection::{ConnectionError, SignalingConnection};
pub use engine::{
    ConnectionState, ConsumerHandle, ConsumerSpec, MediaEngine, ProducerHandle,
    RecvTransportHandle, SendTransportHandle, TransportHandle, TransportNegotiator,
};
pub use error::{EngineError, MediaAcquisitionError, NegotiationError};
pub use media::{MediaStream, MediaTrack};
