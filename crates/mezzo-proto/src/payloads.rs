//! Typed payloads of the RPC methods.
//!
//! One struct per request/response body. `getRouterRtpCapabilities` returns
//! [`crate::RtpCapabilities`] and `create*Transport` return
//! [`crate::TransportCreationParams`] directly, so only the remaining
//! methods need dedicated types here.

use serde::{Deserialize, Serialize};

use crate::{
    ids::{ConsumerId, ProducerId, TransportId},
    rtp::{MediaKind, RtpCapabilities, RtpParameters},
    transport::DtlsParameters,
};

/// Body of `createProducerTransport`.
///
/// Send transports carry the negotiated device capabilities so the router
/// can pick compatible codecs for later `produce` calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProducerTransportRequest {
    /// Restrict ICE to TCP candidates.
    #[serde(default)]
    pub force_tcp: bool,
    /// Negotiated device capabilities.
    pub rtp_capabilities: RtpCapabilities,
}

/// Body of `createConsumerTransport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConsumerTransportRequest {
    /// Restrict ICE to TCP candidates.
    #[serde(default)]
    pub force_tcp: bool,
}

/// Body of `connectProducerTransport` and `connectConsumerTransport`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransportRequest {
    /// Transport completing its handshake.
    pub transport_id: TransportId,
    /// Local DTLS handshake parameters.
    pub dtls_parameters: DtlsParameters,
}

/// Body of `produce`.
///
/// `transport_id` is always present: it is the canonical payload shape, and
/// the router needs it once a session publishes from more than one send
/// transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProduceRequest {
    /// Send transport hosting the new unit.
    pub transport_id: TransportId,
    /// Kind of the produced track.
    pub kind: MediaKind,
    /// Send parameters of the unit.
    pub rtp_parameters: RtpParameters,
}

/// Response to `produce`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceResponse {
    /// Router-assigned producer id.
    pub id: ProducerId,
}

/// Body of `consume`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    /// Negotiated device capabilities, driving codec selection.
    pub rtp_capabilities: RtpCapabilities,
}

/// Response to `consume`.
///
/// The consumer starts paused by protocol convention; the router forwards
/// no frames until a `resume` call completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeResponse {
    /// Remote producer being consumed.
    pub producer_id: ProducerId,
    /// Router-assigned consumer id.
    pub id: ConsumerId,
    /// Kind of the consumed track.
    pub kind: MediaKind,
    /// Receive parameters for the engine.
    pub rtp_parameters: RtpParameters,
}

/// Empty request/response body (`connect*Transport`, `resume`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::rtp::RtpCodecParameters;

    use super::*;

    #[test]
    fn produce_request_includes_transport_id() {
        let req = ProduceRequest {
            transport_id: TransportId::new("t1"),
            kind: MediaKind::Video,
            rtp_parameters: RtpParameters {
                mid: None,
                codecs: vec![RtpCodecParameters {
                    mime_type: "video/VP8".to_string(),
                    payload_type: 96,
                    clock_rate: 90_000,
                    channels: None,
                }],
                encodings: vec![],
            },
        };

        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"transportId\":\"t1\""));
        assert!(json.contains("\"kind\":\"video\""));

        let back: ProduceRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn consume_response_roundtrip() {
        let json = r#"{
            "producerId": "p1",
            "id": "c1",
            "kind": "video",
            "rtpParameters": {"codecs": []}
        }"#;

        let resp: ConsumeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.producer_id, ProducerId::new("p1"));
        assert_eq!(resp.id, ConsumerId::new("c1"));
        assert_eq!(resp.kind, MediaKind::Video);
    }

    #[test]
    fn ack_is_empty_object() {
        assert_eq!(serde_json::to_string(&Ack {}).unwrap(), "{}");
        let _: Ack = serde_json::from_str("{}").unwrap();
    }
}
