//! Loopback media engine and capture source.
//!
//! A full in-process implementation of the engine seam: capability
//! intersection on load, transports that drive the real negotiator paths
//! (DTLS on first unit, producer registration), a connection-state watch,
//! and test hooks for induced failure and capture denial. No packets move;
//! everything observable happens through the same interfaces the
//! production engine would use.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use mezzo_core::{
    ConnectionState, ConsumerHandle, ConsumerSpec, EngineError, MediaAcquisitionError,
    MediaEngine, MediaSource, MediaTrack, ProducerHandle, RecvTransportHandle,
    SendTransportHandle, TransportHandle, TransportNegotiator,
};
use mezzo_proto::{
    ConsumerId, DtlsFingerprint, DtlsParameters, DtlsRole, MediaKind, ProducerId,
    RtpCapabilities, RtpCodecCapability, RtpCodecParameters, RtpEncodingParameters,
    RtpParameters, TransportCreationParams, TransportId,
};
use tokio::sync::{Mutex, watch};

fn local_dtls() -> DtlsParameters {
    DtlsParameters {
        role: DtlsRole::Client,
        fingerprints: vec![DtlsFingerprint {
            algorithm: "sha-256".to_string(),
            value: "CA:FE:00:01".to_string(),
        }],
    }
}

struct EngineInner {
    supported: Vec<RtpCodecCapability>,
    loaded: Mutex<Option<RtpCapabilities>>,
    transports: Mutex<HashMap<TransportId, Arc<watch::Sender<ConnectionState>>>>,
}

impl EngineInner {
    async fn rtp_parameters_for(
        &self,
        kind: MediaKind,
        encodings: &[RtpEncodingParameters],
    ) -> Result<RtpParameters, EngineError> {
        let loaded = self.loaded.lock().await;
        let caps = loaded
            .as_ref()
            .ok_or_else(|| EngineError::Internal { reason: "engine not loaded".to_string() })?;

        let codec = caps.codecs.iter().find(|c| c.kind == kind).ok_or_else(|| {
            EngineError::Unsupported { reason: format!("no negotiated {kind} codec") }
        })?;

        Ok(RtpParameters {
            mid: None,
            codecs: vec![RtpCodecParameters {
                mime_type: codec.mime_type.clone(),
                payload_type: 96,
                clock_rate: codec.clock_rate,
                channels: codec.channels,
            }],
            encodings: encodings.to_vec(),
        })
    }
}

/// In-process [`MediaEngine`]. Cheap to clone; clones share state, so a
/// test can keep a handle while the session owns another.
#[derive(Clone)]
pub struct LoopbackEngine {
    inner: Arc<EngineInner>,
}

impl LoopbackEngine {
    /// Engine supporting VP8 video and Opus audio.
    pub fn new() -> Self {
        Self::with_codecs(vec![
            RtpCodecCapability {
                kind: MediaKind::Video,
                mime_type: "video/VP8".to_string(),
                clock_rate: 90_000,
                channels: None,
            },
            RtpCodecCapability {
                kind: MediaKind::Audio,
                mime_type: "audio/opus".to_string(),
                clock_rate: 48_000,
                channels: Some(2),
            },
        ])
    }

    /// Engine supporting an explicit codec list.
    pub fn with_codecs(supported: Vec<RtpCodecCapability>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                supported,
                loaded: Mutex::new(None),
                transports: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Force a transport into the failed state, as a real engine would on
    /// an unrecoverable ICE/DTLS error. Returns false when the transport
    /// is unknown.
    pub async fn fail_transport(&self, id: &TransportId) -> bool {
        match self.inner.transports.lock().await.get(id) {
            Some(state) => {
                let _ = state.send(ConnectionState::Failed);
                true
            },
            None => false,
        }
    }

    async fn transport_parts(
        &self,
        params: &TransportCreationParams,
    ) -> Result<Arc<watch::Sender<ConnectionState>>, EngineError> {
        if self.inner.loaded.lock().await.is_none() {
            return Err(EngineError::Internal { reason: "engine not loaded".to_string() });
        }

        let state = Arc::new(watch::channel(ConnectionState::New).0);
        self.inner.transports.lock().await.insert(params.id.clone(), Arc::clone(&state));
        Ok(state)
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LoopbackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackEngine").finish_non_exhaustive()
    }
}

#[async_trait]
impl MediaEngine for LoopbackEngine {
    async fn load(
        &self,
        router_capabilities: &RtpCapabilities,
    ) -> Result<RtpCapabilities, EngineError> {
        // Deterministic intersection: router codecs the engine also
        // supports, sorted by MIME type.
        let mut codecs: Vec<RtpCodecCapability> = router_capabilities
            .codecs
            .iter()
            .filter(|router_codec| {
                self.inner
                    .supported
                    .iter()
                    .any(|own| own.mime_type.eq_ignore_ascii_case(&router_codec.mime_type))
            })
            .cloned()
            .collect();
        codecs.sort_by(|a, b| a.mime_type.cmp(&b.mime_type));

        if codecs.is_empty() {
            return Err(EngineError::Unsupported { reason: "no compatible codec".to_string() });
        }

        let device = RtpCapabilities { codecs, header_extensions: vec![] };
        *self.inner.loaded.lock().await = Some(device.clone());
        Ok(device)
    }

    async fn create_send_transport(
        &self,
        params: TransportCreationParams,
        negotiator: Arc<dyn TransportNegotiator>,
    ) -> Result<Box<dyn SendTransportHandle>, EngineError> {
        let state = self.transport_parts(&params).await?;
        Ok(Box::new(LoopbackSendTransport {
            base: LoopbackTransport {
                id: params.id,
                negotiator,
                state,
                engine: Arc::clone(&self.inner),
                connect_lock: Mutex::new(()),
            },
        }))
    }

    async fn create_recv_transport(
        &self,
        params: TransportCreationParams,
        negotiator: Arc<dyn TransportNegotiator>,
    ) -> Result<Box<dyn RecvTransportHandle>, EngineError> {
        let state = self.transport_parts(&params).await?;
        Ok(Box::new(LoopbackRecvTransport {
            base: LoopbackTransport {
                id: params.id,
                negotiator,
                state,
                engine: Arc::clone(&self.inner),
                connect_lock: Mutex::new(()),
            },
        }))
    }
}

struct LoopbackTransport {
    id: TransportId,
    negotiator: Arc<dyn TransportNegotiator>,
    state: Arc<watch::Sender<ConnectionState>>,
    engine: Arc<EngineInner>,
    connect_lock: Mutex<()>,
}

impl LoopbackTransport {
    /// Run the DTLS handshake through the negotiator on the first unit;
    /// later units find the transport already connected.
    async fn ensure_connected(&self) -> Result<(), EngineError> {
        let _guard = self.connect_lock.lock().await;

        match *self.state.subscribe().borrow() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Failed | ConnectionState::Closed => {
                return Err(EngineError::TransportClosed);
            },
            ConnectionState::New | ConnectionState::Connecting => {},
        }

        let _ = self.state.send(ConnectionState::Connecting);
        match self.negotiator.connect_transport(local_dtls()).await {
            Ok(()) => {
                let _ = self.state.send(ConnectionState::Connected);
                Ok(())
            },
            Err(err) => {
                let _ = self.state.send(ConnectionState::Failed);
                Err(EngineError::Negotiation(err))
            },
        }
    }

    fn close(&self) {
        let _ = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = ConnectionState::Closed;
                true
            }
        });
    }
}

/// Send half of the loopback engine.
struct LoopbackSendTransport {
    base: LoopbackTransport,
}

impl TransportHandle for LoopbackSendTransport {
    fn id(&self) -> &TransportId {
        &self.base.id
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.base.state.subscribe()
    }

    fn close(&self) {
        self.base.close();
    }
}

#[async_trait]
impl SendTransportHandle for LoopbackSendTransport {
    async fn produce(
        &self,
        track: MediaTrack,
        encodings: Vec<RtpEncodingParameters>,
    ) -> Result<Box<dyn ProducerHandle>, EngineError> {
        self.base.ensure_connected().await?;

        let rtp_parameters = self.base.engine.rtp_parameters_for(track.kind, &encodings).await?;
        let id = self.base.negotiator.register_producer(track.kind, rtp_parameters).await?;

        Ok(Box::new(LoopbackProducer { id, kind: track.kind }))
    }
}

/// Receive half of the loopback engine.
struct LoopbackRecvTransport {
    base: LoopbackTransport,
}

impl TransportHandle for LoopbackRecvTransport {
    fn id(&self) -> &TransportId {
        &self.base.id
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.base.state.subscribe()
    }

    fn close(&self) {
        self.base.close();
    }
}

#[async_trait]
impl RecvTransportHandle for LoopbackRecvTransport {
    async fn consume(&self, spec: ConsumerSpec) -> Result<Box<dyn ConsumerHandle>, EngineError> {
        self.base.ensure_connected().await?;

        let track = MediaTrack::new(format!("remote-{}", spec.producer_id), spec.kind);
        Ok(Box::new(LoopbackConsumer { id: spec.id, kind: spec.kind, track }))
    }
}

struct LoopbackProducer {
    id: ProducerId,
    kind: MediaKind,
}

impl ProducerHandle for LoopbackProducer {
    fn id(&self) -> &ProducerId {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn close(&self) {}
}

struct LoopbackConsumer {
    id: ConsumerId,
    kind: MediaKind,
    track: MediaTrack,
}

impl ConsumerHandle for LoopbackConsumer {
    fn id(&self) -> &ConsumerId {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn track(&self) -> MediaTrack {
        self.track.clone()
    }

    fn close(&self) {}
}

struct SourceInner {
    denied: Mutex<HashSet<MediaKind>>,
    counter: AtomicU32,
}

/// In-process [`MediaSource`]. Clones share the denial list.
#[derive(Clone)]
pub struct LoopbackSource {
    inner: Arc<SourceInner>,
}

impl LoopbackSource {
    /// Source that grants every request.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SourceInner {
                denied: Mutex::new(HashSet::new()),
                counter: AtomicU32::new(0),
            }),
        }
    }

    /// Deny future requests for `kind`, as a user refusing the capture
    /// prompt would.
    pub async fn deny(&self, kind: MediaKind) {
        self.inner.denied.lock().await.insert(kind);
    }

    /// Grant `kind` again.
    pub async fn allow(&self, kind: MediaKind) {
        self.inner.denied.lock().await.remove(&kind);
    }
}

impl Default for LoopbackSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LoopbackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl MediaSource for LoopbackSource {
    async fn get_media(&self, kind: MediaKind) -> Result<MediaTrack, MediaAcquisitionError> {
        if self.inner.denied.lock().await.contains(&kind) {
            return Err(MediaAcquisitionError::Denied {
                reason: "capture permission denied".to_string(),
            });
        }

        let n = self.inner.counter.fetch_add(1, Ordering::SeqCst);
        Ok(MediaTrack::new(format!("capture-{kind}-{n}"), kind))
    }
}
