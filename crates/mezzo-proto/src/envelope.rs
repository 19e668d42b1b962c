//! The duplex wire envelope.
//!
//! Every message on the signaling connection is one [`Envelope`], serialized
//! as a single JSON object. Requests carry a caller-chosen correlation id;
//! the peer answers each request exactly once with a [`Envelope::Response`]
//! carrying the same id and either an error string or a success payload.
//! [`Envelope::Event`] messages are unsolicited server pushes and carry no
//! id; they are delivered in connection order.
//!
//! The envelope itself guarantees nothing about response ordering across
//! concurrent requests; correlation is strictly by id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// RPC methods understood by the SFU signaling peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    /// Fetch the router's advertised RTP capabilities.
    GetRouterRtpCapabilities,
    /// Allocate a send-direction transport.
    CreateProducerTransport,
    /// Complete the DTLS handshake of a send transport.
    ConnectProducerTransport,
    /// Register an outbound media unit on a send transport.
    Produce,
    /// Allocate a receive-direction transport.
    CreateConsumerTransport,
    /// Complete the DTLS handshake of a receive transport.
    ConnectConsumerTransport,
    /// Ask the router for an inbound media unit.
    Consume,
    /// Unpause a consumer so the router starts forwarding frames.
    Resume,
}

impl Method {
    /// Wire name of the method.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetRouterRtpCapabilities => "getRouterRtpCapabilities",
            Self::CreateProducerTransport => "createProducerTransport",
            Self::ConnectProducerTransport => "connectProducerTransport",
            Self::Produce => "produce",
            Self::CreateConsumerTransport => "createConsumerTransport",
            Self::ConnectConsumerTransport => "connectConsumerTransport",
            Self::Consume => "consume",
            Self::Resume => "resume",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-initiated push events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    /// A new remote media source became available; the client should start
    /// a subscribe flow.
    NewProducer,
}

/// One message on the signaling wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Envelope {
    /// A request awaiting exactly one response with the same `id`.
    Request {
        /// Correlation id, unique per outstanding request.
        id: u64,
        /// Requested method.
        method: Method,
        /// Method-specific payload.
        #[serde(default)]
        data: Value,
    },

    /// The single response to a request.
    Response {
        /// Correlation id of the request being answered.
        id: u64,
        /// Remote-supplied failure message; `None` means success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Success payload; ignored when `error` is set.
        #[serde(default)]
        data: Value,
    },

    /// An unsolicited server push.
    Event {
        /// Event name.
        name: EventName,
        /// Event payload, if any.
        #[serde(default)]
        data: Value,
    },
}

impl Envelope {
    /// Build a request envelope.
    pub fn request(id: u64, method: Method, data: Value) -> Self {
        Self::Request { id, method, data }
    }

    /// Build a success response.
    pub fn success(id: u64, data: Value) -> Self {
        Self::Response { id, error: None, data }
    }

    /// Build a failure response carrying the remote error message.
    pub fn failure(id: u64, message: impl Into<String>) -> Self {
        Self::Response { id, error: Some(message.into()), data: Value::Null }
    }

    /// Build a push event.
    pub fn event(name: EventName, data: Value) -> Self {
        Self::Event { name, data }
    }

    /// Serialize to one JSON line (without trailing newline).
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one JSON message.
    pub fn decode(raw: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Envelope encode/decode failure.
#[derive(Debug, thiserror::Error)]
#[error("envelope codec error: {0}")]
pub struct EnvelopeError(#[from] serde_json::Error);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_roundtrip() {
        let env = Envelope::request(7, Method::Produce, json!({"kind": "video"}));
        let line = env.encode().unwrap();
        assert!(line.contains("\"type\":\"request\""));
        assert!(line.contains("\"method\":\"produce\""));

        assert_eq!(Envelope::decode(&line).unwrap(), env);
    }

    #[test]
    fn method_names_match_wire() {
        assert_eq!(Method::GetRouterRtpCapabilities.to_string(), "getRouterRtpCapabilities");
        assert_eq!(
            serde_json::to_string(&Method::ConnectConsumerTransport).unwrap(),
            "\"connectConsumerTransport\""
        );
    }

    #[test]
    fn success_response_omits_error() {
        let line = Envelope::success(3, json!({"id": "p1"})).encode().unwrap();
        assert!(!line.contains("error"));

        match Envelope::decode(&line).unwrap() {
            Envelope::Response { id, error, data } => {
                assert_eq!(id, 3);
                assert!(error.is_none());
                assert_eq!(data["id"], "p1");
            },
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn failure_response_carries_message() {
        let env = Envelope::failure(9, "no producer to consume");
        let back = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn event_decodes_without_data() {
        let env = Envelope::decode(r#"{"type":"event","name":"newProducer"}"#).unwrap();
        assert_eq!(env, Envelope::event(EventName::NewProducer, Value::Null));
    }

    #[test]
    fn unknown_method_is_rejected() {
        let res = Envelope::decode(r#"{"type":"request","id":1,"method":"selfDestruct"}"#);
        assert!(res.is_err());
    }
}
