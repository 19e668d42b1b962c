//! End-to-end session flows against the scripted router and loopback
//! engine.
//!
//! These tests replay whole signaling conversations and assert on the
//! router's observable state: which methods were called, in what order,
//! and what the session reported while it happened.

use std::time::Duration;

use mezzo_client::{
    CapabilityError, MediaKind, PublishOptions, Session, SessionConfig, SessionError,
    SessionEvents, SessionStatus, SignalingError, TransportDirection, TransportState,
};
use mezzo_harness::{
    LoopbackEngine, LoopbackSource, SimRouter, SimServer, SimServerConfig, memory_link,
    shared_router,
};
use mezzo_proto::{Method, TransportId};

type LoopbackSession = Session<LoopbackEngine, LoopbackSource>;

struct Fixture {
    session: LoopbackSession,
    events: SessionEvents,
    server: SimServer,
    engine: LoopbackEngine,
    source: LoopbackSource,
}

fn fixture() -> Fixture {
    fixture_with(SimRouter::new(), SessionConfig::default())
}

fn fixture_with(router: SimRouter, config: SessionConfig) -> Fixture {
    let (client_end, server_end) = memory_link();
    let server = SimServer::spawn(server_end, shared_router(router), SimServerConfig::default());
    let engine = LoopbackEngine::new();
    let source = LoopbackSource::new();

    let (session, events) = Session::start(client_end, engine.clone(), source.clone(), config);
    Fixture { session, events, server, engine, source }
}

/// Poll the router until `predicate` holds or the window elapses.
async fn wait_for_router(server: &SimServer, predicate: impl Fn(&SimRouter) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if predicate(&*server.router().lock().await) {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "router never reached expected state");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn publish_flow_runs_the_full_request_sequence() {
    let fx = fixture();

    fx.session.connect().await.expect("capability negotiation");
    let producer = fx.session.publish(MediaKind::Video).await.expect("publish");

    assert_eq!(producer.id().as_str(), "p1");
    assert_eq!(*fx.session.status().borrow(), SessionStatus::Published);

    let router = fx.server.router();
    let log: Vec<Method> = router.lock().await.log().iter().map(|r| r.method).collect();
    assert_eq!(
        log,
        vec![
            Method::GetRouterRtpCapabilities,
            Method::CreateProducerTransport,
            Method::ConnectProducerTransport,
            Method::Produce,
        ]
    );

    let mut send_state = fx
        .session
        .transport_state(TransportDirection::Send)
        .await
        .expect("send transport exists");
    send_state
        .wait_for(|state| *state == TransportState::Connected)
        .await
        .expect("send transport connects");
}

#[tokio::test]
async fn publish_before_negotiation_fails_with_capability_error() {
    let fx = fixture();

    let err = fx.session.publish(MediaKind::Video).await.expect_err("must fail");
    assert!(matches!(
        err,
        SessionError::Capability(CapabilityError::NotLoaded)
    ));

    // Nothing reached the router.
    assert!(fx.server.router().lock().await.log().is_empty());
}

#[tokio::test]
async fn connect_twice_is_rejected() {
    let fx = fixture();

    fx.session.connect().await.expect("first negotiation");
    let err = fx.session.connect().await.expect_err("second must fail");
    assert!(matches!(err, SessionError::Capability(CapabilityError::AlreadyLoaded)));
}

#[tokio::test]
async fn subscribe_resumes_exactly_once_after_connect() {
    let fx = fixture();

    fx.session.connect().await.expect("negotiation");
    fx.session.publish(MediaKind::Video).await.expect("publish");
    let consumer = fx.session.subscribe().await.expect("subscribe");

    assert_eq!(consumer.id().as_str(), "c1");
    assert_eq!(consumer.producer_id().as_str(), "p1");
    assert_eq!(consumer.stream().tracks().len(), 1);

    let router = fx.server.router();
    let router = router.lock().await;
    assert_eq!(router.calls(Method::Resume), 1);
    assert_eq!(router.resumed_count(), 1);

    // The pause-by-default convention: the handshake and the consume both
    // complete before the single resume goes out.
    let log: Vec<Method> = router.log().iter().map(|r| r.method).collect();
    let consume_at = log.iter().position(|m| *m == Method::Consume).expect("consume logged");
    let connect_at = log
        .iter()
        .position(|m| *m == Method::ConnectConsumerTransport)
        .expect("connect logged");
    let resume_at = log.iter().position(|m| *m == Method::Resume).expect("resume logged");
    assert!(consume_at < resume_at);
    assert!(connect_at < resume_at);
}

#[tokio::test]
async fn subscribed_stream_is_delivered_on_the_events_channel() {
    let mut fx = fixture();

    fx.session.connect().await.expect("negotiation");
    fx.session.publish(MediaKind::Video).await.expect("publish");
    let consumer = fx.session.subscribe().await.expect("subscribe");

    let stream = fx.events.streams.recv().await.expect("stream delivered");
    assert_eq!(&stream, consumer.stream());
}

#[tokio::test]
async fn send_failure_leaves_connected_recv_transport_alone() {
    let fx = fixture();

    fx.session.connect().await.expect("negotiation");
    fx.session.publish(MediaKind::Video).await.expect("publish");
    fx.session.subscribe().await.expect("subscribe");

    // The send transport was created first, so the router named it t1.
    assert!(fx.engine.fail_transport(&TransportId::new("t1")).await);

    let mut send_state = fx
        .session
        .transport_state(TransportDirection::Send)
        .await
        .expect("send transport exists");
    send_state
        .wait_for(|state| *state == TransportState::Failed)
        .await
        .expect("send transport fails");

    let recv_state = fx
        .session
        .transport_state(TransportDirection::Recv)
        .await
        .expect("recv transport exists");
    assert_eq!(*recv_state.borrow(), TransportState::Connected);

    // The signaling channel survives: another subscribe still works.
    fx.session.subscribe().await.expect("subscribe after send failure");
}

#[tokio::test]
async fn new_producer_push_creates_exactly_one_recv_transport() {
    let fx = fixture();

    fx.session.connect().await.expect("negotiation");
    fx.session.publish(MediaKind::Video).await.expect("publish");

    fx.server.push_new_producer().await;
    wait_for_router(&fx.server, |router| router.resumed_count() == 1).await;

    fx.server.push_new_producer().await;
    wait_for_router(&fx.server, |router| router.resumed_count() == 2).await;

    let router = fx.server.router();
    let router = router.lock().await;
    assert_eq!(router.calls(Method::Consume), 2);
    assert_eq!(router.calls(Method::CreateConsumerTransport), 1);
    assert_eq!(router.calls(Method::ConnectConsumerTransport), 1);
}

#[tokio::test]
async fn produce_rejection_fails_the_publish_but_not_the_session() {
    let fx = fixture();
    fx.server.router().lock().await.reject(Method::Produce);

    fx.session.connect().await.expect("negotiation");

    let err = fx.session.publish(MediaKind::Video).await.expect_err("publish must fail");
    assert!(matches!(err, SessionError::Signaling(SignalingError::Rejected { .. })));
    assert!(!err.is_fatal());
    assert!(matches!(*fx.session.status().borrow(), SessionStatus::Failed { .. }));

    // The transport connected before the rejection and stays usable.
    fx.server.router().lock().await.allow(Method::Produce);
    fx.session.publish(MediaKind::Video).await.expect("publish after rejection");

    let router = fx.server.router();
    let router = router.lock().await;
    assert_eq!(router.calls(Method::CreateProducerTransport), 1);
    assert_eq!(router.calls(Method::ConnectProducerTransport), 1);
}

#[tokio::test]
async fn capture_denial_surfaces_to_the_publish_caller() {
    let fx = fixture();
    fx.source.deny(MediaKind::Video).await;

    fx.session.connect().await.expect("negotiation");

    let err = fx.session.publish(MediaKind::Video).await.expect_err("publish must fail");
    assert!(matches!(err, SessionError::MediaAcquisition(_)));
    assert!(!err.is_fatal());

    fx.source.allow(MediaKind::Video).await;
    fx.session.publish(MediaKind::Video).await.expect("publish after re-grant");
}

#[tokio::test]
async fn second_publish_reuses_the_send_transport() {
    let fx = fixture();

    fx.session.connect().await.expect("negotiation");
    let first = fx.session.publish(MediaKind::Video).await.expect("first publish");
    let second = fx.session.publish(MediaKind::Audio).await.expect("second publish");

    assert_eq!(first.id().as_str(), "p1");
    assert_eq!(second.id().as_str(), "p2");

    let router = fx.server.router();
    let router = router.lock().await;
    assert_eq!(router.calls(Method::CreateProducerTransport), 1);
    assert_eq!(router.calls(Method::ConnectProducerTransport), 1);
}

#[tokio::test]
async fn simulcast_layers_travel_in_the_produce_request() {
    let fx = fixture();

    fx.session.connect().await.expect("negotiation");
    fx.session
        .publish_with(
            MediaKind::Video,
            PublishOptions { simulcast: Some(vec![100_000, 300_000, 900_000]) },
        )
        .await
        .expect("simulcast publish");

    let router = fx.server.router();
    let router = router.lock().await;
    let produce = router
        .log()
        .iter()
        .find(|r| r.method == Method::Produce)
        .expect("produce logged");

    let encodings = produce.data["rtpParameters"]["encodings"]
        .as_array()
        .expect("encodings present");
    assert_eq!(encodings.len(), 3);
    assert_eq!(encodings[0]["maxBitrate"], 100_000);
    assert_eq!(encodings[2]["maxBitrate"], 900_000);
}

#[tokio::test]
async fn reconnect_discards_connection_scoped_state() {
    let fx = fixture();

    fx.session.connect().await.expect("negotiation");
    fx.session.publish(MediaKind::Video).await.expect("publish");

    let mut old_send_state = fx
        .session
        .transport_state(TransportDirection::Send)
        .await
        .expect("send transport exists");

    // New connection to a fresh router; ids from the old one are void.
    let (client_end, server_end) = memory_link();
    let new_server =
        SimServer::spawn(server_end, shared_router(SimRouter::new()), SimServerConfig::default());

    fx.session.reconnect(client_end).await;

    old_send_state
        .wait_for(|state| *state == TransportState::Closed)
        .await
        .expect("old transport closed");
    assert!(fx.session.capability_set().await.is_none());
    assert!(fx.session.transport_state(TransportDirection::Send).await.is_none());

    fx.session.connect().await.expect("renegotiation");
    let producer = fx.session.publish(MediaKind::Video).await.expect("publish after reconnect");
    assert_eq!(producer.id().as_str(), "p1", "fresh router assigns fresh ids");

    assert_eq!(new_server.router().lock().await.calls(Method::CreateProducerTransport), 1);
}

#[tokio::test]
async fn close_is_terminal_and_observable() {
    let fx = fixture();

    fx.session.connect().await.expect("negotiation");
    fx.session.publish(MediaKind::Video).await.expect("publish");

    fx.session.close().await;
    assert_eq!(*fx.session.status().borrow(), SessionStatus::Closed);

    let err = fx.session.publish(MediaKind::Audio).await.expect_err("channel is gone");
    assert!(err.is_fatal());
}
