//! Capability negotiation.
//!
//! Runs once per connection, after the signaling channel is up and before
//! any transport exists: fetch the router's advertised capabilities, load
//! the engine with them, and freeze the result. The set is immutable for
//! the connection's lifetime; a reconnect discards it and negotiates from
//! scratch.

use mezzo_core::{EngineError, MediaEngine};
use mezzo_proto::{Method, RtpCapabilities, payloads::Ack};

use crate::{
    error::{CapabilityError, SessionError},
    rpc::RpcChannel,
};

/// Immutable snapshot of what the router and the local engine mutually
/// support.
///
/// Negotiation is deterministic: the same router capabilities against the
/// same engine always produce an equal set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    router: RtpCapabilities,
    device: RtpCapabilities,
}

impl CapabilitySet {
    /// Fetch router capabilities and load the engine.
    pub(crate) async fn negotiate<E: MediaEngine>(
        rpc: &RpcChannel,
        engine: &E,
    ) -> Result<Self, SessionError> {
        let router: RtpCapabilities =
            rpc.request(Method::GetRouterRtpCapabilities, &Ack {}).await?;

        let device = engine.load(&router).await.map_err(|err| match err {
            EngineError::Unsupported { reason } => {
                SessionError::Capability(CapabilityError::Unsupported { reason })
            },
            other => SessionError::Engine(other),
        })?;

        tracing::debug!(
            router_codecs = router.codecs.len(),
            device_codecs = device.codecs.len(),
            "capabilities negotiated"
        );

        Ok(Self { router, device })
    }

    /// The router's advertised capabilities.
    pub fn router(&self) -> &RtpCapabilities {
        &self.router
    }

    /// The negotiated device capabilities, used for transport creation and
    /// `consume` requests.
    pub fn device(&self) -> &RtpCapabilities {
        &self.device
    }
}
