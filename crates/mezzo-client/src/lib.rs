//! Session orchestration client for Mezzo SFU deployments.
//!
//! Negotiates media capabilities with a remote SFU router, opens
//! directional transports for sending and receiving audio/video, and
//! tracks their lifecycle against state pushed by the signaling peer. The
//! hard part of the surrounding application lives here: sequencing
//! asynchronous, fallible, partially-ordered operations (capability load →
//! transport creation → connect → produce/consume) while reconciling RPC
//! responses with out-of-band server pushes.
//!
//! # Architecture
//!
//! - [`RpcChannel`]: request/response correlation plus the push-event
//!   stream, over one [`SignalingConnection`]
//! - [`CapabilitySet`]: the once-per-connection negotiated snapshot
//! - [`TransportController`]: one state machine per direction
//! - [`Producer`] / [`Consumer`]: media units bound to a transport
//! - [`Session`]: the top-level coordinator the application holds
//!
//! Everything is cooperatively scheduled on the caller's tokio runtime;
//! there is no blocking and no per-session thread.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod capabilities;
mod error;
mod media;
pub mod rpc;
mod session;
mod tcp;
mod transport;

pub use capabilities::CapabilitySet;
pub use error::{CapabilityError, SessionError, SignalingError, TransportFailure};
pub use media::{Consumer, Producer};
pub use mezzo_core::{
    ConnectionError, MediaEngine, MediaSource, MediaStream, MediaTrack, SignalingConnection,
};
pub use mezzo_proto::MediaKind;
pub use rpc::RpcChannel;
pub use session::{PublishOptions, Session, SessionConfig, SessionEvents, SessionStatus};
pub use tcp::TcpSignaling;
pub use transport::{CancelToken, TransportController, TransportDirection, TransportState};
