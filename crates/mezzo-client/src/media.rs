//! Media units: producers and consumers.
//!
//! A unit is owned by the transport it is bound to and cannot outlive it:
//! the controller keeps the engine-side unit and closes it with the
//! transport. The [`Producer`] / [`Consumer`] values handed to the
//! application are handles sharing that unit; closing a handle stops the
//! one unit, closing the transport stops them all. Both are idempotent.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use mezzo_core::{ConsumerHandle, ConsumerSpec, MediaSource, MediaStream, ProducerHandle};
use mezzo_proto::{
    ConsumerId, MediaKind, Method, ProducerId, RtpEncodingParameters,
    payloads::{Ack, ConsumeRequest, ConsumeResponse},
};

use crate::{
    capabilities::CapabilitySet,
    error::SessionError,
    rpc::RpcChannel,
    session::PublishOptions,
    transport::TransportController,
};

/// Engine-side producer plus its close latch.
pub(crate) struct ProducerUnit {
    inner: Box<dyn ProducerHandle>,
    closed: AtomicBool,
}

impl ProducerUnit {
    pub(crate) fn new(inner: Box<dyn ProducerHandle>) -> Self {
        Self { inner, closed: AtomicBool::new(false) }
    }

    pub(crate) fn id(&self) -> &ProducerId {
        self.inner.id()
    }

    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inner.close();
        }
    }
}

/// Engine-side consumer plus its close latch.
pub(crate) struct ConsumerUnit {
    inner: Box<dyn ConsumerHandle>,
    closed: AtomicBool,
}

impl ConsumerUnit {
    pub(crate) fn new(inner: Box<dyn ConsumerHandle>) -> Self {
        Self { inner, closed: AtomicBool::new(false) }
    }

    pub(crate) fn track(&self) -> mezzo_core::MediaTrack {
        self.inner.track()
    }

    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inner.close();
        }
    }
}

/// Handle to an outbound media unit.
#[derive(Clone)]
pub struct Producer {
    id: ProducerId,
    kind: MediaKind,
    unit: Arc<ProducerUnit>,
}

impl Producer {
    pub(crate) fn new(kind: MediaKind, unit: Arc<ProducerUnit>) -> Self {
        Self { id: unit.id().clone(), kind, unit }
    }

    /// Remote-assigned producer id.
    pub fn id(&self) -> &ProducerId {
        &self.id
    }

    /// Kind of the published track.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Stop sending. Idempotent.
    pub fn close(&self) {
        self.unit.close();
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer").field("id", &self.id).field("kind", &self.kind).finish()
    }
}

/// Handle to an inbound media unit and its playable stream.
#[derive(Clone)]
pub struct Consumer {
    id: ConsumerId,
    producer_id: ProducerId,
    kind: MediaKind,
    stream: MediaStream,
    unit: Arc<ConsumerUnit>,
}

impl Consumer {
    pub(crate) fn from_unit(
        id: ConsumerId,
        producer_id: ProducerId,
        kind: MediaKind,
        unit: Arc<ConsumerUnit>,
    ) -> Self {
        let stream = MediaStream::single(unit.track());
        Self { id, producer_id, kind, stream, unit }
    }

    /// Remote-assigned consumer id.
    pub fn id(&self) -> &ConsumerId {
        &self.id
    }

    /// The remote producer this consumer receives.
    pub fn producer_id(&self) -> &ProducerId {
        &self.producer_id
    }

    /// Kind of the consumed track.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// The playable stream, composed of exactly the consumed track.
    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    /// Stop receiving. Idempotent.
    pub fn close(&self) {
        self.unit.close();
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.id)
            .field("producer_id", &self.producer_id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Bind a freshly captured track to a send transport.
pub(crate) async fn bind_producer<S: MediaSource>(
    source: &S,
    controller: &TransportController,
    kind: MediaKind,
    options: &PublishOptions,
) -> Result<Producer, SessionError> {
    let track = source.get_media(kind).await.map_err(SessionError::MediaAcquisition)?;

    let encodings = options
        .simulcast
        .as_deref()
        .map(RtpEncodingParameters::layers)
        .unwrap_or_default();

    controller.produce(track, encodings).await
}

/// Drive one consume flow on a receive transport.
///
/// The consumer is created paused by protocol convention; the single
/// `resume` call, issued only after the transport reports connected, is
/// what allows frames to flow.
pub(crate) async fn establish_consumer(
    rpc: &RpcChannel,
    controller: &TransportController,
    caps: &CapabilitySet,
) -> Result<Consumer, SessionError> {
    let response: ConsumeResponse = rpc
        .request(Method::Consume, &ConsumeRequest { rtp_capabilities: caps.device().clone() })
        .await?;

    let consumer = controller.consume(ConsumerSpec::from(response)).await?;

    controller.wait_connected().await?;
    rpc.request::<_, Ack>(Method::Resume, &Ack {}).await?;

    tracing::debug!(id = %consumer.id(), producer = %consumer.producer_id(), "consumer resumed");
    Ok(consumer)
}
