//! In-memory signaling link.

use async_trait::async_trait;
use mezzo_core::{ConnectionError, SignalingConnection};
use mezzo_proto::Envelope;
use tokio::sync::mpsc;

/// Queue depth of each direction of the link.
const LINK_DEPTH: usize = 64;

/// One end of an in-memory duplex envelope pipe.
///
/// Envelopes arrive in send order; dropping or closing either end reads as
/// connection loss on the other.
#[derive(Debug)]
pub struct MemoryConnection {
    tx: mpsc::Sender<Envelope>,
    rx: mpsc::Receiver<Envelope>,
}

/// Create a connected pair of in-memory ends.
pub fn memory_link() -> (MemoryConnection, MemoryConnection) {
    let (a_tx, a_rx) = mpsc::channel(LINK_DEPTH);
    let (b_tx, b_rx) = mpsc::channel(LINK_DEPTH);

    (MemoryConnection { tx: a_tx, rx: b_rx }, MemoryConnection { tx: b_tx, rx: a_rx })
}

#[async_trait]
impl SignalingConnection for MemoryConnection {
    async fn send(&mut self, envelope: Envelope) -> Result<(), ConnectionError> {
        self.tx.send(envelope).await.map_err(|_| ConnectionError::Closed)
    }

    async fn recv(&mut self) -> Result<Option<Envelope>, ConnectionError> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mezzo_proto::Method;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn envelopes_cross_the_link_in_order() {
        let (mut a, mut b) = memory_link();

        a.send(Envelope::request(1, Method::Resume, json!({}))).await.unwrap();
        a.send(Envelope::request(2, Method::Resume, json!({}))).await.unwrap();

        assert!(matches!(b.recv().await.unwrap(), Some(Envelope::Request { id: 1, .. })));
        assert!(matches!(b.recv().await.unwrap(), Some(Envelope::Request { id: 2, .. })));
    }

    #[tokio::test]
    async fn dropped_peer_reads_as_eof() {
        let (mut a, b) = memory_link();
        drop(b);

        assert!(a.recv().await.unwrap().is_none());
        assert!(a.send(Envelope::request(1, Method::Resume, json!({}))).await.is_err());
    }
}
