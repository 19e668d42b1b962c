//! ICE/DTLS transport parameters.
//!
//! A transport is created in two phases: the SFU hands out
//! [`TransportCreationParams`] over signaling, the local engine instantiates
//! a transport object from them, and the DTLS handshake parameters travel
//! back via the `connect*Transport` calls.

use serde::{Deserialize, Serialize};

use crate::ids::TransportId;

/// Transport-layer protocol of an ICE candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    /// UDP candidate.
    Udp,
    /// TCP candidate (used when `forceTcp` is requested).
    Tcp,
}

/// ICE credentials for one transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceParameters {
    /// ICE username fragment.
    pub username_fragment: String,
    /// ICE password.
    pub password: String,
}

/// One ICE candidate advertised by the SFU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate foundation.
    pub foundation: String,
    /// Candidate priority.
    pub priority: u32,
    /// IP address or hostname.
    pub address: String,
    /// Port number.
    pub port: u16,
    /// Candidate protocol.
    pub protocol: TransportProtocol,
}

/// DTLS role of one side of the handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtlsRole {
    /// Role decided during negotiation.
    #[default]
    Auto,
    /// Active side of the handshake.
    Client,
    /// Passive side of the handshake.
    Server,
}

/// Certificate fingerprint carried in DTLS parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtlsFingerprint {
    /// Hash algorithm, e.g. `sha-256`.
    pub algorithm: String,
    /// Fingerprint value in colon-separated hex.
    pub value: String,
}

/// DTLS handshake parameters of one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtlsParameters {
    /// Handshake role.
    #[serde(default)]
    pub role: DtlsRole,
    /// Certificate fingerprints.
    pub fingerprints: Vec<DtlsFingerprint>,
}

/// Everything the local engine needs to instantiate a transport object.
///
/// Returned by `createProducerTransport` / `createConsumerTransport`; the
/// `id` is the SFU-assigned identifier used in every later call that
/// references this transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportCreationParams {
    /// SFU-assigned transport identifier.
    pub id: TransportId,
    /// ICE credentials of the SFU side.
    pub ice_parameters: IceParameters,
    /// ICE candidates of the SFU side.
    #[serde(default)]
    pub ice_candidates: Vec<IceCandidate>,
    /// DTLS parameters of the SFU side.
    pub dtls_parameters: DtlsParameters,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn params() -> TransportCreationParams {
        TransportCreationParams {
            id: TransportId::new("t1"),
            ice_parameters: IceParameters {
                username_fragment: "ufrag".to_string(),
                password: "pwd".to_string(),
            },
            ice_candidates: vec![IceCandidate {
                foundation: "udpcandidate".to_string(),
                priority: 1_076_302_079,
                address: "198.51.100.4".to_string(),
                port: 44_444,
                protocol: TransportProtocol::Udp,
            }],
            dtls_parameters: DtlsParameters {
                role: DtlsRole::Auto,
                fingerprints: vec![DtlsFingerprint {
                    algorithm: "sha-256".to_string(),
                    value: "AB:CD".to_string(),
                }],
            },
        }
    }

    #[test]
    fn creation_params_roundtrip() {
        let p = params();
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"iceParameters\""));
        assert!(json.contains("\"usernameFragment\":\"ufrag\""));

        let back: TransportCreationParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn creation_params_decode_without_candidates() {
        // Some routers hand out candidates lazily; the field is optional.
        let json = r#"{
            "id": "t9",
            "iceParameters": {"usernameFragment": "u", "password": "p"},
            "dtlsParameters": {"fingerprints": []}
        }"#;

        let p: TransportCreationParams = serde_json::from_str(json).unwrap();
        assert_eq!(p.id, TransportId::new("t9"));
        assert!(p.ice_candidates.is_empty());
        assert_eq!(p.dtls_parameters.role, DtlsRole::Auto);
    }
}
