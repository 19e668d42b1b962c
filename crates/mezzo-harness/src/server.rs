//! Serve loop for the scripted router.
//!
//! [`SimServer::spawn`] drives one signaling connection against a shared
//! [`SimRouter`]. Responses normally go out immediately; individual
//! methods can be given an artificial delay so tests can force responses
//! to arrive out of request order. Push events are injected through the
//! same ordered outbound path the responses use.

use std::{collections::HashMap, sync::Arc, time::Duration};

use mezzo_client::TcpSignaling;
use mezzo_core::SignalingConnection;
use mezzo_proto::{Envelope, EventName, Method};
use serde_json::json;
use tokio::{
    net::TcpListener,
    sync::{Mutex, mpsc},
};

use crate::router::SimRouter;

/// Router state shared between the serve loop and the test body.
pub type SharedRouter = Arc<Mutex<SimRouter>>;

/// Wrap a router for sharing.
pub fn shared_router(router: SimRouter) -> SharedRouter {
    Arc::new(Mutex::new(router))
}

/// Behaviour knobs of one serve loop.
#[derive(Debug, Default)]
pub struct SimServerConfig {
    delays: HashMap<Method, Duration>,
}

impl SimServerConfig {
    /// Delay every response to `method` by `delay`, letting later requests
    /// overtake it.
    #[must_use]
    pub fn delay(mut self, method: Method, delay: Duration) -> Self {
        self.delays.insert(method, delay);
        self
    }
}

/// Handle to a spawned serve loop.
#[derive(Debug, Clone)]
pub struct SimServer {
    outbound: mpsc::Sender<Envelope>,
    router: SharedRouter,
}

impl SimServer {
    /// Serve `conn` against `router` until the connection closes.
    pub fn spawn<C: SignalingConnection>(
        conn: C,
        router: SharedRouter,
        config: SimServerConfig,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let server = Self { outbound: outbound_tx.clone(), router: Arc::clone(&router) };

        tokio::spawn(serve(conn, router, outbound_tx, outbound_rx, config.delays));
        server
    }

    /// The shared router, for assertions and scripted rejections.
    pub fn router(&self) -> SharedRouter {
        Arc::clone(&self.router)
    }

    /// Announce a new remote producer to the client.
    pub async fn push_new_producer(&self) {
        let _ = self.outbound.send(Envelope::event(EventName::NewProducer, json!({}))).await;
    }
}

async fn serve<C: SignalingConnection>(
    mut conn: C,
    router: SharedRouter,
    outbound_tx: mpsc::Sender<Envelope>,
    mut outbound_rx: mpsc::Receiver<Envelope>,
    delays: HashMap<Method, Duration>,
) {
    loop {
        tokio::select! {
            queued = outbound_rx.recv() => match queued {
                Some(envelope) => {
                    if conn.send(envelope).await.is_err() {
                        break;
                    }
                },
                None => break,
            },
            incoming = conn.recv() => match incoming {
                Ok(Some(Envelope::Request { id, method, data })) => {
                    let outcome = router.lock().await.handle(method, &data);
                    let envelope = match outcome {
                        Ok(data) => Envelope::success(id, data),
                        Err(message) => {
                            tracing::debug!(%method, %message, "rejecting request");
                            Envelope::failure(id, message)
                        },
                    };

                    if let Some(delay) = delays.get(&method).copied() {
                        let queue = outbound_tx.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = queue.send(envelope).await;
                        });
                    } else if conn.send(envelope).await.is_err() {
                        break;
                    }
                },
                Ok(Some(other)) => {
                    tracing::warn!(?other, "client sent a non-request envelope");
                },
                Ok(None) | Err(_) => break,
            },
        }
    }

    conn.close().await;
}

/// Accept loop: serve every TCP connection against the shared router.
///
/// Speaks the same newline-delimited JSON the client's `TcpSignaling`
/// speaks.
pub async fn serve_tcp(listener: TcpListener, router: SharedRouter) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "signaling connection accepted");

        SimServer::spawn(
            TcpSignaling::from_stream(stream),
            Arc::clone(&router),
            SimServerConfig::default(),
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::link::memory_link;

    use super::*;

    #[tokio::test]
    async fn serves_capabilities_over_memory_link() {
        let (client_end, server_end) = memory_link();
        let _server =
            SimServer::spawn(server_end, shared_router(SimRouter::new()), SimServerConfig::default());

        let mut conn = client_end;
        conn.send(Envelope::request(1, Method::GetRouterRtpCapabilities, json!({})))
            .await
            .unwrap();

        let Some(Envelope::Response { id, error, data }) = conn.recv().await.unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(id, 1);
        assert!(error.is_none());
        assert!(data["codecs"].as_array().is_some_and(|codecs| !codecs.is_empty()));
    }

    #[tokio::test]
    async fn delayed_response_arrives_after_later_request() {
        let (client_end, server_end) = memory_link();
        let _server = SimServer::spawn(
            server_end,
            shared_router(SimRouter::new()),
            SimServerConfig::default()
                .delay(Method::GetRouterRtpCapabilities, Duration::from_millis(30)),
        );

        let mut conn = client_end;
        conn.send(Envelope::request(1, Method::GetRouterRtpCapabilities, json!({})))
            .await
            .unwrap();
        conn.send(Envelope::request(2, Method::Resume, json!({}))).await.unwrap();

        let Some(Envelope::Response { id: first, .. }) = conn.recv().await.unwrap() else {
            panic!("expected a response");
        };
        let Some(Envelope::Response { id: second, .. }) = conn.recv().await.unwrap() else {
            panic!("expected a response");
        };

        assert_eq!((first, second), (2, 1), "delayed response must arrive last");
    }
}
