//! The session controller.
//!
//! One [`Session`] per signaling connection: it owns the RPC channel and
//! the negotiated capability set, creates transport controllers on demand,
//! and reacts to server pushes. The session is one explicit value passed
//! around by handle; there are no ambient singletons.
//!
//! # Lifecycle
//!
//! [`Session::start`] spawns the channel driver and the push-event loop,
//! then [`Session::connect`] negotiates capabilities exactly once. After
//! that, [`Session::publish`] and [`Session::subscribe`] lazily create
//! their direction's transport. Every public operation resolves to a
//! distinct [`SessionStatus`], observable on a watch channel; failures of
//! one operation never tear the session down.

use std::sync::{Arc, Weak};

use mezzo_core::{MediaEngine, MediaSource, MediaStream, SignalingConnection};
use mezzo_proto::{EventName, MediaKind};
use tokio::{
    sync::{Mutex, mpsc, watch},
    time::Duration,
};

use crate::{
    capabilities::CapabilitySet,
    error::{CapabilityError, SessionError, TransportFailure},
    media::{self, Consumer, Producer},
    rpc::{self, PushEvent, RpcChannel},
    transport::{TransportController, TransportDirection, TransportState},
};

/// Session-wide configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Restrict ICE to TCP candidates when creating transports.
    pub force_tcp: bool,
    /// Subscribe automatically when the server announces a new remote
    /// producer. This is the only way the client learns about new remote
    /// media without polling.
    pub auto_subscribe: bool,
    /// Per-request response window; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            force_tcp: false,
            auto_subscribe: true,
            request_timeout: Some(Duration::from_secs(15)),
        }
    }
}

/// Options of one publish operation.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Simulcast bitrate ceilings, ordered low-to-high quality. `None`
    /// publishes a single encoding.
    pub simulcast: Option<Vec<u32>>,
}

/// Observable outcome of the most recent session operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Nothing attempted yet (or discarded by a reconnect).
    Idle,
    /// Capability negotiation in progress.
    Connecting,
    /// Capabilities loaded; ready to publish or subscribe.
    Ready,
    /// Publish flow in progress.
    Publishing,
    /// A producer is live.
    Published,
    /// Subscribe flow in progress.
    Subscribing,
    /// A consumer is live.
    Subscribed,
    /// The most recent operation failed, or a transport direction died.
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },
    /// The session was torn down.
    Closed,
}

/// Receiving ends handed to the embedding application.
#[derive(Debug)]
pub struct SessionEvents {
    /// Streams produced by subscribe flows (manual or push-triggered).
    pub streams: mpsc::Receiver<MediaStream>,
    /// Status of the most recent operation.
    pub status: watch::Receiver<SessionStatus>,
}

struct Inner<E, S> {
    engine: E,
    source: S,
    config: SessionConfig,
    rpc: Mutex<RpcChannel>,
    caps: Mutex<Option<CapabilitySet>>,
    send: Mutex<Option<Arc<TransportController>>>,
    recv: Mutex<Option<Arc<TransportController>>>,
    status: watch::Sender<SessionStatus>,
    streams: mpsc::Sender<MediaStream>,
    failures: mpsc::Sender<TransportFailure>,
}

/// Handle to one live session. Cheap to clone.
pub struct Session<E, S> {
    inner: Arc<Inner<E, S>>,
}

impl<E, S> Clone for Session<E, S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<E, S> std::fmt::Debug for Session<E, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl<E: MediaEngine, S: MediaSource> Session<E, S> {
    /// Stand the session up over an established signaling connection.
    ///
    /// Spawns the channel driver and the push-event loop; must run inside
    /// a tokio runtime. Capabilities are not negotiated yet - call
    /// [`Session::connect`] next.
    pub fn start<C: SignalingConnection>(
        conn: C,
        engine: E,
        source: S,
        config: SessionConfig,
    ) -> (Self, SessionEvents) {
        let (status_tx, status_rx) = watch::channel(SessionStatus::Idle);
        let (streams_tx, streams_rx) = mpsc::channel(16);
        let (failures_tx, failures_rx) = mpsc::channel(16);

        let (channel, push_events) = rpc::channel(conn, config.request_timeout);

        let inner = Arc::new(Inner {
            engine,
            source,
            config,
            rpc: Mutex::new(channel),
            caps: Mutex::new(None),
            send: Mutex::new(None),
            recv: Mutex::new(None),
            status: status_tx,
            streams: streams_tx,
            failures: failures_tx,
        });

        spawn_push_loop(Arc::downgrade(&inner), push_events);
        spawn_failure_loop(Arc::downgrade(&inner), failures_rx);

        (Self { inner }, SessionEvents { streams: streams_rx, status: status_rx })
    }

    /// Negotiate capabilities with the router. Must complete before any
    /// publish or subscribe, and runs at most once per connection.
    pub async fn connect(&self) -> Result<(), SessionError> {
        if self.inner.caps.lock().await.is_some() {
            return Err(CapabilityError::AlreadyLoaded.into());
        }

        self.set_status(SessionStatus::Connecting);
        let channel = self.channel().await;

        match CapabilitySet::negotiate(&channel, &self.inner.engine).await {
            Ok(set) => {
                let mut caps = self.inner.caps.lock().await;
                if caps.is_some() {
                    return Err(CapabilityError::AlreadyLoaded.into());
                }
                *caps = Some(set);
                drop(caps);

                self.set_status(SessionStatus::Ready);
                Ok(())
            },
            Err(err) => {
                self.set_status(SessionStatus::Failed { reason: err.to_string() });
                Err(err)
            },
        }
    }

    /// Capture a local track of `kind` and publish it.
    pub async fn publish(&self, kind: MediaKind) -> Result<Producer, SessionError> {
        self.publish_with(kind, PublishOptions::default()).await
    }

    /// Publish with explicit options (simulcast layers).
    pub async fn publish_with(
        &self,
        kind: MediaKind,
        options: PublishOptions,
    ) -> Result<Producer, SessionError> {
        let caps = self.capabilities().await?;
        self.set_status(SessionStatus::Publishing);

        match self.do_publish(kind, &options, &caps).await {
            Ok(producer) => {
                self.set_status(SessionStatus::Published);
                Ok(producer)
            },
            Err(err) => {
                self.set_status(SessionStatus::Failed { reason: err.to_string() });
                Err(err)
            },
        }
    }

    async fn do_publish(
        &self,
        kind: MediaKind,
        options: &PublishOptions,
        caps: &CapabilitySet,
    ) -> Result<Producer, SessionError> {
        let controller = self.send_controller(caps).await?;
        media::bind_producer(&self.inner.source, &controller, kind, options).await
    }

    /// Ask the router for a remote stream and start receiving it.
    ///
    /// Also runs automatically on `newProducer` pushes when
    /// [`SessionConfig::auto_subscribe`] is set.
    pub async fn subscribe(&self) -> Result<Consumer, SessionError> {
        let caps = self.capabilities().await?;
        self.set_status(SessionStatus::Subscribing);

        match self.do_subscribe(&caps).await {
            Ok(consumer) => {
                self.set_status(SessionStatus::Subscribed);
                if self.inner.streams.try_send(consumer.stream().clone()).is_err() {
                    tracing::debug!("no stream listener, dropping stream notification");
                }
                Ok(consumer)
            },
            Err(err) => {
                self.set_status(SessionStatus::Failed { reason: err.to_string() });
                Err(err)
            },
        }
    }

    async fn do_subscribe(&self, caps: &CapabilitySet) -> Result<Consumer, SessionError> {
        let controller = self.recv_controller().await?;
        let channel = self.channel().await;
        media::establish_consumer(&channel, &controller, caps).await
    }

    /// Discard all connection-scoped state and adopt a new connection.
    ///
    /// Transport and unit identifiers are not valid across connections, so
    /// both controllers are closed and the capability set is cleared; call
    /// [`Session::connect`] afterwards to renegotiate.
    pub async fn reconnect<C: SignalingConnection>(&self, conn: C) {
        tracing::info!("reconnecting, discarding transports and capability set");

        if let Some(controller) = self.inner.send.lock().await.take() {
            controller.close().await;
        }
        if let Some(controller) = self.inner.recv.lock().await.take() {
            controller.close().await;
        }
        *self.inner.caps.lock().await = None;

        let (channel, push_events) = rpc::channel(conn, self.inner.config.request_timeout);
        let old = {
            let mut slot = self.inner.rpc.lock().await;
            std::mem::replace(&mut *slot, channel)
        };
        old.close().await;

        spawn_push_loop(Arc::downgrade(&self.inner), push_events);
        self.set_status(SessionStatus::Idle);
    }

    /// Tear the session down: close both transports and the channel.
    pub async fn close(&self) {
        if let Some(controller) = self.inner.send.lock().await.take() {
            controller.close().await;
        }
        if let Some(controller) = self.inner.recv.lock().await.take() {
            controller.close().await;
        }
        self.channel().await.close().await;
        self.set_status(SessionStatus::Closed);
    }

    /// The negotiated capability set, if any.
    pub async fn capability_set(&self) -> Option<CapabilitySet> {
        self.inner.caps.lock().await.clone()
    }

    /// Status updates of the most recent operation.
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// State updates of one direction's transport, if it exists.
    pub async fn transport_state(
        &self,
        direction: TransportDirection,
    ) -> Option<watch::Receiver<TransportState>> {
        let slot = match direction {
            TransportDirection::Send => &self.inner.send,
            TransportDirection::Recv => &self.inner.recv,
        };
        slot.lock().await.as_ref().map(|controller| controller.state())
    }

    async fn capabilities(&self) -> Result<CapabilitySet, SessionError> {
        self.inner.caps.lock().await.clone().ok_or_else(|| CapabilityError::NotLoaded.into())
    }

    async fn channel(&self) -> RpcChannel {
        self.inner.rpc.lock().await.clone()
    }

    /// Lazily create the send transport. The slot lock serializes
    /// concurrent publishes, so one session gets exactly one send
    /// transport.
    async fn send_controller(
        &self,
        caps: &CapabilitySet,
    ) -> Result<Arc<TransportController>, SessionError> {
        let mut slot = self.inner.send.lock().await;
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }

        let channel = self.channel().await;
        let controller = TransportController::create_send(
            &channel,
            &self.inner.engine,
            caps,
            self.inner.config.force_tcp,
            self.inner.failures.clone(),
        )
        .await?;

        *slot = Some(Arc::clone(&controller));
        Ok(controller)
    }

    /// Lazily create the receive transport. A burst of `newProducer`
    /// pushes still creates exactly one.
    async fn recv_controller(&self) -> Result<Arc<TransportController>, SessionError> {
        let mut slot = self.inner.recv.lock().await;
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }

        let channel = self.channel().await;
        let controller = TransportController::create_recv(
            &channel,
            &self.inner.engine,
            self.inner.config.force_tcp,
            self.inner.failures.clone(),
        )
        .await?;

        *slot = Some(Arc::clone(&controller));
        Ok(controller)
    }

    fn set_status(&self, status: SessionStatus) {
        self.inner.status.send_replace(status);
    }
}

/// React to server pushes, one at a time, in connection order.
fn spawn_push_loop<E: MediaEngine, S: MediaSource>(
    weak: Weak<Inner<E, S>>,
    mut events: mpsc::Receiver<PushEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(inner) = weak.upgrade() else { break };
            let session = Session { inner };

            match event.name {
                EventName::NewProducer => {
                    tracing::info!("remote producer announced");
                    if session.inner.config.auto_subscribe {
                        if let Err(err) = session.subscribe().await {
                            tracing::warn!(%err, "push-triggered subscribe failed");
                        }
                    }
                },
            }
        }
    });
}

/// Surface transport failures without touching the healthy direction or
/// the signaling channel.
fn spawn_failure_loop<E: MediaEngine, S: MediaSource>(
    weak: Weak<Inner<E, S>>,
    mut failures: mpsc::Receiver<TransportFailure>,
) {
    tokio::spawn(async move {
        while let Some(failure) = failures.recv().await {
            let Some(inner) = weak.upgrade() else { break };
            tracing::warn!(
                direction = %failure.direction,
                reason = %failure.reason,
                "transport direction failed"
            );
            inner.status.send_replace(SessionStatus::Failed { reason: failure.to_string() });
        }
    });
}
