//! Transport controllers.
//!
//! One controller per direction, identical shape, differing only in the
//! request sequence that populates it. The controller drives the creation
//! phases itself; the connecting/connected transitions are the engine's,
//! observed through its state watch and mirrored here. Controllers are
//! independent state machines: one failing never aborts the other.
//!
//! # Cancellation
//!
//! There is no task abort. Each controller carries a [`CancelToken`] fired
//! on close or terminal failure; in-flight awaits check it before acting
//! on a result that arrived late.

use std::sync::Arc;

use async_trait::async_trait;
use mezzo_core::{
    ConnectionState, ConsumerSpec, EngineError, MediaEngine, MediaTrack, NegotiationError,
    TransportNegotiator,
};
use mezzo_proto::{
    DtlsParameters, MediaKind, Method, ProducerId, RtpEncodingParameters, RtpParameters,
    TransportCreationParams, TransportId,
    payloads::{
        Ack, ConnectTransportRequest, CreateConsumerTransportRequest,
        CreateProducerTransportRequest, ProduceRequest, ProduceResponse,
    },
};
use tokio::sync::{Mutex, mpsc, watch};

use crate::{
    capabilities::CapabilitySet,
    error::{SessionError, SignalingError, TransportFailure},
    media::{Consumer, ConsumerUnit, Producer, ProducerUnit},
    rpc::RpcChannel,
};

/// Direction of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportDirection {
    /// Local media out.
    Send,
    /// Remote media in.
    Recv,
}

impl std::fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send => f.write_str("send"),
            Self::Recv => f.write_str("recv"),
        }
    }
}

/// Lifecycle of one transport controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Creation parameters requested from the remote peer.
    Creating,
    /// Engine transport object instantiated.
    Created,
    /// DTLS/ICE negotiation in progress (engine-reported).
    Connecting,
    /// Media can flow (engine-reported).
    Connected,
    /// Terminal failure; resources released.
    Failed,
    /// Explicitly torn down.
    Closed,
}

impl TransportState {
    /// Whether no further transitions can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Cancellation signal of one controller.
///
/// Fired on explicit close and on terminal failure. In-flight operations
/// check it before trusting a result that raced with teardown.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Whether the controller has been canceled.
    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the controller is canceled. A dropped controller counts
    /// as canceled.
    pub async fn canceled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

enum TransportRole {
    Send(Box<dyn mezzo_core::SendTransportHandle>),
    Recv(Box<dyn mezzo_core::RecvTransportHandle>),
}

impl TransportRole {
    fn id(&self) -> &TransportId {
        match self {
            Self::Send(h) => h.id(),
            Self::Recv(h) => h.id(),
        }
    }

    fn engine_state(&self) -> watch::Receiver<ConnectionState> {
        match self {
            Self::Send(h) => h.state(),
            Self::Recv(h) => h.state(),
        }
    }

    fn close(&self) {
        match self {
            Self::Send(h) => h.close(),
            Self::Recv(h) => h.close(),
        }
    }
}

#[derive(Default)]
struct Units {
    producers: Vec<Arc<ProducerUnit>>,
    consumers: Vec<Arc<ConsumerUnit>>,
}

/// Owner of one directional transport, from creation to closure.
pub struct TransportController {
    direction: TransportDirection,
    id: TransportId,
    role: TransportRole,
    state_tx: watch::Sender<TransportState>,
    cancel_tx: watch::Sender<bool>,
    units: Mutex<Units>,
}

impl TransportController {
    /// Create a send-direction transport: fetch creation parameters
    /// (passing the negotiated device capabilities), then instantiate the
    /// engine transport.
    pub(crate) async fn create_send<E: MediaEngine>(
        rpc: &RpcChannel,
        engine: &E,
        caps: &CapabilitySet,
        force_tcp: bool,
        failures: mpsc::Sender<TransportFailure>,
    ) -> Result<Arc<Self>, SessionError> {
        let (state_tx, _) = watch::channel(TransportState::Creating);

        let params: TransportCreationParams = rpc
            .request(
                Method::CreateProducerTransport,
                &CreateProducerTransportRequest {
                    force_tcp,
                    rtp_capabilities: caps.device().clone(),
                },
            )
            .await?;

        let negotiator = Arc::new(RpcNegotiator {
            rpc: rpc.clone(),
            transport_id: params.id.clone(),
            direction: TransportDirection::Send,
        });

        let handle = engine
            .create_send_transport(params, negotiator)
            .await
            .map_err(|e| SessionError::from_engine(e, TransportDirection::Send))?;

        Ok(Self::finish(TransportDirection::Send, TransportRole::Send(handle), state_tx, failures))
    }

    /// Create a receive-direction transport.
    pub(crate) async fn create_recv<E: MediaEngine>(
        rpc: &RpcChannel,
        engine: &E,
        force_tcp: bool,
        failures: mpsc::Sender<TransportFailure>,
    ) -> Result<Arc<Self>, SessionError> {
        let (state_tx, _) = watch::channel(TransportState::Creating);

        let params: TransportCreationParams = rpc
            .request(
                Method::CreateConsumerTransport,
                &CreateConsumerTransportRequest { force_tcp },
            )
            .await?;

        let negotiator = Arc::new(RpcNegotiator {
            rpc: rpc.clone(),
            transport_id: params.id.clone(),
            direction: TransportDirection::Recv,
        });

        let handle = engine
            .create_recv_transport(params, negotiator)
            .await
            .map_err(|e| SessionError::from_engine(e, TransportDirection::Recv))?;

        Ok(Self::finish(TransportDirection::Recv, TransportRole::Recv(handle), state_tx, failures))
    }

    fn finish(
        direction: TransportDirection,
        role: TransportRole,
        state_tx: watch::Sender<TransportState>,
        failures: mpsc::Sender<TransportFailure>,
    ) -> Arc<Self> {
        let _ = state_tx.send(TransportState::Created);
        let (cancel_tx, _) = watch::channel(false);

        let controller = Arc::new(Self {
            direction,
            id: role.id().clone(),
            role,
            state_tx,
            cancel_tx,
            units: Mutex::new(Units::default()),
        });

        tracing::debug!(id = %controller.id, %direction, "transport created");
        Self::spawn_observer(&controller, failures);
        controller
    }

    /// Mirror the engine's connection state onto the controller state, and
    /// tear the transport down on terminal failure.
    fn spawn_observer(controller: &Arc<Self>, failures: mpsc::Sender<TransportFailure>) {
        let weak = Arc::downgrade(controller);
        let mut engine_state = controller.role.engine_state();
        let direction = controller.direction;
        let id = controller.id.clone();

        tokio::spawn(async move {
            loop {
                let state = *engine_state.borrow_and_update();
                match state {
                    ConnectionState::New => {},
                    ConnectionState::Connecting => {
                        if let Some(c) = weak.upgrade() {
                            let _ = c.state_tx.send(TransportState::Connecting);
                        }
                    },
                    ConnectionState::Connected => {
                        tracing::info!(%id, %direction, "transport connected");
                        if let Some(c) = weak.upgrade() {
                            let _ = c.state_tx.send(TransportState::Connected);
                        }
                    },
                    ConnectionState::Failed => {
                        tracing::warn!(%id, %direction, "transport failed");
                        let failure = TransportFailure {
                            direction,
                            reason: "engine reported failed connection state".to_string(),
                        };
                        if let Some(c) = weak.upgrade() {
                            c.cancel();
                            c.close_units().await;
                            c.role.close();
                            let _ = c.state_tx.send(TransportState::Failed);
                        }
                        let _ = failures.send(failure).await;
                        break;
                    },
                    ConnectionState::Closed => {
                        if let Some(c) = weak.upgrade() {
                            c.cancel();
                            let _ = c.state_tx.send_if_modified(|s| {
                                if s.is_terminal() {
                                    false
                                } else {
                                    *s = TransportState::Closed;
                                    true
                                }
                            });
                        }
                        break;
                    },
                }
                if engine_state.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    /// Remote-assigned transport id.
    pub fn id(&self) -> &TransportId {
        &self.id
    }

    /// Direction of this transport.
    pub fn direction(&self) -> TransportDirection {
        self.direction
    }

    /// State updates of this controller.
    pub fn state(&self) -> watch::Receiver<TransportState> {
        self.state_tx.subscribe()
    }

    /// The current state.
    pub fn current_state(&self) -> TransportState {
        *self.state_tx.subscribe().borrow()
    }

    /// This controller's cancellation token.
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken { rx: self.cancel_tx.subscribe() }
    }

    fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    fn transport_failure(&self, reason: &str) -> TransportFailure {
        TransportFailure { direction: self.direction, reason: reason.to_string() }
    }

    /// Bind a track to this (send) transport. A transport hosts any number
    /// of units, sequentially or concurrently.
    pub(crate) async fn produce(
        &self,
        track: MediaTrack,
        encodings: Vec<RtpEncodingParameters>,
    ) -> Result<Producer, SessionError> {
        let token = self.cancel_token();
        if token.is_canceled() {
            return Err(self.transport_failure("transport closed").into());
        }

        let TransportRole::Send(handle) = &self.role else {
            return Err(SessionError::Engine(EngineError::Internal {
                reason: "produce on a receive transport".to_string(),
            }));
        };

        let kind = track.kind;
        let unit = handle
            .produce(track, encodings)
            .await
            .map_err(|e| SessionError::from_engine(e, self.direction))?;

        if token.is_canceled() {
            // The transport died while the produce was in flight.
            unit.close();
            return Err(self.transport_failure("transport closed during produce").into());
        }

        let unit = Arc::new(ProducerUnit::new(unit));
        self.units.lock().await.producers.push(Arc::clone(&unit));

        tracing::info!(id = %unit.id(), %kind, transport = %self.id, "producer bound");
        Ok(Producer::new(kind, unit))
    }

    /// Materialize a consumer on this (receive) transport.
    pub(crate) async fn consume(&self, spec: ConsumerSpec) -> Result<Consumer, SessionError> {
        let token = self.cancel_token();
        if token.is_canceled() {
            return Err(self.transport_failure("transport closed").into());
        }

        let TransportRole::Recv(handle) = &self.role else {
            return Err(SessionError::Engine(EngineError::Internal {
                reason: "consume on a send transport".to_string(),
            }));
        };

        let (id, producer_id, kind) = (spec.id.clone(), spec.producer_id.clone(), spec.kind);
        let unit = handle
            .consume(spec)
            .await
            .map_err(|e| SessionError::from_engine(e, self.direction))?;

        if token.is_canceled() {
            unit.close();
            return Err(self.transport_failure("transport closed during consume").into());
        }

        let unit = Arc::new(ConsumerUnit::new(unit));
        self.units.lock().await.consumers.push(Arc::clone(&unit));

        tracing::info!(%id, %kind, transport = %self.id, "consumer bound");
        Ok(Consumer::from_unit(id, producer_id, kind, unit))
    }

    /// Wait until the engine reports this transport connected.
    pub(crate) async fn wait_connected(&self) -> Result<(), TransportFailure> {
        let mut rx = self.state_tx.subscribe();
        let mut token = self.cancel_token();

        loop {
            match *rx.borrow_and_update() {
                TransportState::Connected => return Ok(()),
                TransportState::Failed => return Err(self.transport_failure("connection failed")),
                TransportState::Closed => {
                    return Err(self.transport_failure("closed before connecting"));
                },
                _ => {},
            }

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(self.transport_failure("controller dropped"));
                    }
                },
                () = token.canceled() => {
                    return Err(self.transport_failure("canceled while connecting"));
                },
            }
        }
    }

    async fn close_units(&self) {
        let units = self.units.lock().await;
        for producer in &units.producers {
            producer.close();
        }
        for consumer in &units.consumers {
            consumer.close();
        }
    }

    /// Explicit teardown: cancel in-flight work, stop every unit, release
    /// the engine transport.
    pub(crate) async fn close(&self) {
        self.cancel();
        self.close_units().await;
        self.role.close();
        let _ = self.state_tx.send_if_modified(|s| {
            if s.is_terminal() {
                false
            } else {
                *s = TransportState::Closed;
                true
            }
        });
    }
}

impl std::fmt::Debug for TransportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportController")
            .field("direction", &self.direction)
            .field("id", &self.id)
            .field("state", &self.current_state())
            .finish_non_exhaustive()
    }
}

/// Relays the engine's negotiation requests over the RPC channel.
struct RpcNegotiator {
    rpc: RpcChannel,
    transport_id: TransportId,
    direction: TransportDirection,
}

fn to_negotiation(err: SignalingError) -> NegotiationError {
    match err {
        SignalingError::Rejected { message } => NegotiationError::Rejected { message },
        SignalingError::ChannelClosed | SignalingError::Timeout { .. } => {
            NegotiationError::ChannelClosed
        },
        SignalingError::Codec(message) => NegotiationError::Rejected { message },
    }
}

#[async_trait]
impl TransportNegotiator for RpcNegotiator {
    async fn connect_transport(
        &self,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), NegotiationError> {
        let method = match self.direction {
            TransportDirection::Send => Method::ConnectProducerTransport,
            TransportDirection::Recv => Method::ConnectConsumerTransport,
        };

        self.rpc
            .request::<_, Ack>(
                method,
                &ConnectTransportRequest {
                    transport_id: self.transport_id.clone(),
                    dtls_parameters,
                },
            )
            .await
            .map(|_| ())
            .map_err(to_negotiation)
    }

    async fn register_producer(
        &self,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId, NegotiationError> {
        let response: ProduceResponse = self
            .rpc
            .request(
                Method::Produce,
                &ProduceRequest { transport_id: self.transport_id.clone(), kind, rtp_parameters },
            )
            .await
            .map_err(to_negotiation)?;

        Ok(response.id)
    }
}
