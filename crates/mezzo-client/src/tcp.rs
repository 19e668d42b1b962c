//! TCP signaling connection.
//!
//! Production [`SignalingConnection`]: one JSON envelope per line over a
//! plain TCP stream. Framing is newline-delimited so a partial read lost
//! to cancellation never corrupts the stream: the read buffer persists in
//! the connection and is drained line by line.

use async_trait::async_trait;
use mezzo_core::{ConnectionError, SignalingConnection};
use mezzo_proto::Envelope;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

/// Newline-delimited JSON envelopes over TCP.
pub struct TcpSignaling {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    line: String,
}

impl TcpSignaling {
    /// Dial the signaling server.
    pub async fn connect(addr: impl ToSocketAddrs + Send) -> Result<Self, ConnectionError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established stream (e.g. an accepted one).
    pub fn from_stream(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self { reader: BufReader::new(read), writer: write, line: String::new() }
    }
}

#[async_trait]
impl SignalingConnection for TcpSignaling {
    async fn send(&mut self, envelope: Envelope) -> Result<(), ConnectionError> {
        let mut line =
            envelope.encode().map_err(|e| ConnectionError::Codec(e.to_string()))?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Envelope>, ConnectionError> {
        loop {
            // Drain a complete line from the persistent buffer first; a
            // canceled read may have left one (or part of one) behind.
            if let Some(pos) = self.line.find('\n') {
                let raw: String = self.line.drain(..=pos).collect();
                let trimmed = raw.trim_end();
                if trimmed.is_empty() {
                    continue;
                }
                return Envelope::decode(trimmed)
                    .map(Some)
                    .map_err(|e| ConnectionError::Codec(e.to_string()));
            }

            let n = self.reader.read_line(&mut self.line).await?;
            if n == 0 {
                return if self.line.trim_end().is_empty() {
                    Ok(None)
                } else {
                    Err(ConnectionError::Codec("connection closed mid-message".to_string()))
                };
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}

impl std::fmt::Debug for TcpSignaling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSignaling").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mezzo_proto::{EventName, Method};
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn envelopes_travel_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = TcpSignaling::from_stream(stream);

            let incoming = conn.recv().await.unwrap().unwrap();
            let Envelope::Request { id, method, .. } = incoming else {
                panic!("expected request, got {incoming:?}");
            };
            assert_eq!(method, Method::GetRouterRtpCapabilities);

            conn.send(Envelope::success(id, json!({"codecs": []}))).await.unwrap();
            conn.send(Envelope::event(EventName::NewProducer, json!({}))).await.unwrap();
        });

        let mut client = TcpSignaling::connect(addr).await.unwrap();
        client
            .send(Envelope::request(1, Method::GetRouterRtpCapabilities, json!({})))
            .await
            .unwrap();

        let response = client.recv().await.unwrap().unwrap();
        assert!(matches!(response, Envelope::Response { id: 1, error: None, .. }));

        let event = client.recv().await.unwrap().unwrap();
        assert!(matches!(event, Envelope::Event { name: EventName::NewProducer, .. }));

        server.await.unwrap();
        assert!(client.recv().await.unwrap().is_none(), "peer shutdown reads as EOF");
    }
}
