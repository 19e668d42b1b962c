//! The RPC channel.
//!
//! Correlates outbound requests with inbound responses over one persistent
//! duplex connection, and forwards unsolicited server pushes.
//!
//! # Ownership model
//!
//! [`RpcChannel`] is a cheap cloneable handle over a command queue. A
//! single [`ChannelDriver`] task owns the connection, the correlation
//! table, and the id counter; exclusive ownership by one task is what
//! serializes access to the table. Requests are independent: each resolves
//! with exactly the response carrying its own id, and callers must not
//! assume response order matches request order.
//!
//! # Failure semantics
//!
//! Connection loss rejects every pending request with
//! [`SignalingError::ChannelClosed`]; nothing is retried. An optional
//! per-request timeout bounds the wait when the peer never answers.

use std::collections::HashMap;

use mezzo_core::SignalingConnection;
use mezzo_proto::{Envelope, EventName, Method};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot},
    time::Duration,
};

use crate::error::SignalingError;

/// Queue depth of the command and push-event queues.
const QUEUE_DEPTH: usize = 64;

/// An unsolicited server push, delivered in connection order.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    /// Event name.
    pub name: EventName,
    /// Event payload, if any.
    pub data: Value,
}

enum Command {
    Request {
        method: Method,
        data: Value,
        reply: oneshot::Sender<Result<Value, SignalingError>>,
    },
    Shutdown,
}

/// Cloneable handle to the channel driver.
#[derive(Clone)]
pub struct RpcChannel {
    commands: mpsc::Sender<Command>,
    request_timeout: Option<Duration>,
}

/// Spawn a channel driver over `conn`.
///
/// Returns the request handle and the push-event stream. The driver runs
/// until the connection closes, [`RpcChannel::close`] is called, or every
/// handle is dropped.
pub fn channel<C: SignalingConnection>(
    conn: C,
    request_timeout: Option<Duration>,
) -> (RpcChannel, mpsc::Receiver<PushEvent>) {
    let (command_tx, command_rx) = mpsc::channel(QUEUE_DEPTH);
    let (event_tx, event_rx) = mpsc::channel(QUEUE_DEPTH);

    let driver = ChannelDriver {
        conn,
        commands: command_rx,
        events: event_tx,
        pending: HashMap::new(),
        next_id: 0,
    };
    tokio::spawn(driver.run());

    (RpcChannel { commands: command_tx, request_timeout }, event_rx)
}

impl RpcChannel {
    /// Issue one request and wait for its correlated response.
    ///
    /// # Errors
    ///
    /// [`SignalingError::Rejected`] when the peer answers with an error,
    /// [`SignalingError::ChannelClosed`] when the connection is gone, and
    /// [`SignalingError::Timeout`] when the configured window elapses.
    pub async fn request<Req, Resp>(&self, method: Method, payload: &Req) -> Result<Resp, SignalingError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let data =
            serde_json::to_value(payload).map_err(|e| SignalingError::Codec(e.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Request { method, data, reply: reply_tx })
            .await
            .map_err(|_| SignalingError::ChannelClosed)?;

        let outcome = match self.request_timeout {
            Some(window) => tokio::time::timeout(window, reply_rx)
                .await
                .map_err(|_| SignalingError::Timeout { method })?,
            None => reply_rx.await,
        };
        let value = outcome.map_err(|_| SignalingError::ChannelClosed)??;

        serde_json::from_value(value).map_err(|e| SignalingError::Codec(e.to_string()))
    }

    /// Shut the channel down, rejecting everything still pending.
    pub async fn close(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

impl std::fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// The task owning the connection and the correlation table.
struct ChannelDriver<C> {
    conn: C,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<PushEvent>,
    pending: HashMap<u64, oneshot::Sender<Result<Value, SignalingError>>>,
    next_id: u64,
}

impl<C: SignalingConnection> ChannelDriver<C> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Request { method, data, reply }) => {
                        self.dispatch_request(method, data, reply).await;
                    },
                    Some(Command::Shutdown) | None => break,
                },
                incoming = self.conn.recv() => match incoming {
                    Ok(Some(envelope)) => self.dispatch_incoming(envelope).await,
                    Ok(None) => {
                        tracing::debug!("signaling connection closed by peer");
                        break;
                    },
                    Err(err) => {
                        tracing::warn!(%err, "signaling connection lost");
                        break;
                    },
                },
            }
        }

        self.conn.close().await;

        // Reject everything still in flight; reconnection never retries.
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(SignalingError::ChannelClosed));
        }
    }

    async fn dispatch_request(
        &mut self,
        method: Method,
        data: Value,
        reply: oneshot::Sender<Result<Value, SignalingError>>,
    ) {
        let id = self.next_id;
        self.next_id += 1;

        match self.conn.send(Envelope::request(id, method, data)).await {
            Ok(()) => {
                self.pending.insert(id, reply);
            },
            Err(err) => {
                tracing::warn!(%err, %method, "failed to send request");
                let _ = reply.send(Err(SignalingError::ChannelClosed));
            },
        }
    }

    async fn dispatch_incoming(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Response { id, error, data } => match self.pending.remove(&id) {
                Some(reply) => {
                    let outcome = match error {
                        Some(message) => Err(SignalingError::Rejected { message }),
                        None => Ok(data),
                    };
                    // The requester may have timed out and gone away.
                    let _ = reply.send(outcome);
                },
                None => {
                    tracing::debug!(id, "response for unknown or expired request");
                },
            },
            Envelope::Event { name, data } => {
                if self.events.send(PushEvent { name, data }).await.is_err() {
                    tracing::debug!(?name, "push event dropped, no listener");
                }
            },
            Envelope::Request { method, .. } => {
                tracing::warn!(%method, "peer sent a request to a client, ignoring");
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use mezzo_core::ConnectionError;
    use serde_json::json;

    use super::*;

    /// In-file connection double: scripted peer behind mpsc queues.
    struct TestLink {
        outbound: mpsc::Sender<Envelope>,
        inbound: mpsc::Receiver<Envelope>,
    }

    fn link() -> (TestLink, mpsc::Receiver<Envelope>, mpsc::Sender<Envelope>) {
        let (out_tx, out_rx) = mpsc::channel(16);
        let (in_tx, in_rx) = mpsc::channel(16);
        (TestLink { outbound: out_tx, inbound: in_rx }, out_rx, in_tx)
    }

    #[async_trait]
    impl SignalingConnection for TestLink {
        async fn send(&mut self, envelope: Envelope) -> Result<(), ConnectionError> {
            self.outbound.send(envelope).await.map_err(|_| ConnectionError::Closed)
        }

        async fn recv(&mut self) -> Result<Option<Envelope>, ConnectionError> {
            Ok(self.inbound.recv().await)
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn request_resolves_with_matching_response() {
        let (conn, mut seen, respond) = link();
        let (rpc, _events) = channel(conn, None);

        let pending = tokio::spawn({
            let rpc = rpc.clone();
            async move { rpc.request::<_, Value>(Method::Resume, &json!({})).await }
        });

        let sent = seen.recv().await.unwrap();
        let Envelope::Request { id, method, .. } = sent else {
            panic!("expected request, got {sent:?}");
        };
        assert_eq!(method, Method::Resume);

        respond.send(Envelope::success(id, json!({"ok": true}))).await.unwrap();

        let value = pending.await.unwrap().unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn responses_correlate_by_id_not_order() {
        let (conn, mut seen, respond) = link();
        let (rpc, _events) = channel(conn, None);

        let first = tokio::spawn({
            let rpc = rpc.clone();
            async move { rpc.request::<_, Value>(Method::Consume, &json!({})).await }
        });
        let Envelope::Request { id: first_id, .. } = seen.recv().await.unwrap() else {
            panic!("expected request");
        };

        let second = tokio::spawn({
            let rpc = rpc.clone();
            async move { rpc.request::<_, Value>(Method::Produce, &json!({})).await }
        });
        let Envelope::Request { id: second_id, .. } = seen.recv().await.unwrap() else {
            panic!("expected request");
        };

        // Answer the second request first.
        respond.send(Envelope::success(second_id, json!({"for": "second"}))).await.unwrap();
        respond.send(Envelope::success(first_id, json!({"for": "first"}))).await.unwrap();

        assert_eq!(first.await.unwrap().unwrap()["for"], "first");
        assert_eq!(second.await.unwrap().unwrap()["for"], "second");
    }

    #[tokio::test]
    async fn rejection_carries_remote_message() {
        let (conn, mut seen, respond) = link();
        let (rpc, _events) = channel(conn, None);

        let pending = tokio::spawn({
            let rpc = rpc.clone();
            async move { rpc.request::<_, Value>(Method::Consume, &json!({})).await }
        });

        let Envelope::Request { id, .. } = seen.recv().await.unwrap() else {
            panic!("expected request");
        };
        respond.send(Envelope::failure(id, "no producer to consume")).await.unwrap();

        match pending.await.unwrap() {
            Err(SignalingError::Rejected { message }) => {
                assert_eq!(message, "no producer to consume");
            },
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_loss_rejects_pending() {
        let (conn, mut seen, respond) = link();
        let (rpc, _events) = channel(conn, None);

        let pending = tokio::spawn({
            let rpc = rpc.clone();
            async move { rpc.request::<_, Value>(Method::Produce, &json!({})).await }
        });
        let _ = seen.recv().await.unwrap();

        drop(respond); // peer goes away

        match pending.await.unwrap() {
            Err(SignalingError::ChannelClosed) => {},
            other => panic!("expected channel closed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn push_events_arrive_in_connection_order() {
        let (conn, _seen, respond) = link();
        let (_rpc, mut events) = channel(conn, None);

        respond.send(Envelope::event(EventName::NewProducer, json!({"seq": 1}))).await.unwrap();
        respond.send(Envelope::event(EventName::NewProducer, json!({"seq": 2}))).await.unwrap();

        assert_eq!(events.recv().await.unwrap().data["seq"], 1);
        assert_eq!(events.recv().await.unwrap().data["seq"], 2);
    }

    #[tokio::test]
    async fn request_times_out_without_response() {
        let (conn, mut seen, _respond) = link();
        let (rpc, _events) = channel(conn, Some(Duration::from_millis(20)));

        let pending = tokio::spawn({
            let rpc = rpc.clone();
            async move { rpc.request::<_, Value>(Method::Resume, &json!({})).await }
        });
        let _ = seen.recv().await.unwrap();

        match pending.await.unwrap() {
            Err(SignalingError::Timeout { method }) => assert_eq!(method, Method::Resume),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
