//! RTP capability and parameter descriptions.
//!
//! Capabilities describe what a router or a local engine *can* route or
//! encode; parameters describe what one concrete media unit *does* send or
//! receive. Capability negotiation intersects the two capability sets once
//! per session; the result drives every later `consume` request.

use serde::{Deserialize, Serialize};

/// Kind of a media track or unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// An audio track.
    Audio,
    /// A video track.
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Codecs and header extensions a router or engine supports.
///
/// Immutable once negotiated; see the capability set in the client crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilities {
    /// Supported codecs, in preference order.
    pub codecs: Vec<RtpCodecCapability>,
    /// Supported RTP header extensions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub header_extensions: Vec<RtpHeaderExtension>,
}

/// One codec a router or engine can handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    /// Kind of media this codec carries.
    pub kind: MediaKind,
    /// Codec MIME type, e.g. `video/VP8` or `audio/opus`.
    pub mime_type: String,
    /// RTP clock rate in Hz.
    pub clock_rate: u32,
    /// Channel count for audio codecs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
}

/// A supported RTP header extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpHeaderExtension {
    /// Kind of media the extension applies to.
    pub kind: MediaKind,
    /// Extension URI.
    pub uri: String,
    /// Preferred extension id.
    pub preferred_id: u8,
}

/// Concrete send/receive parameters of one media unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpParameters {
    /// Media section identifier, when the engine assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    /// Codecs in use for this unit.
    pub codecs: Vec<RtpCodecParameters>,
    /// Encoding layers. One entry for a plain stream, several ordered
    /// low-to-high quality for simulcast.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encodings: Vec<RtpEncodingParameters>,
}

/// One codec entry inside [`RtpParameters`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecParameters {
    /// Codec MIME type.
    pub mime_type: String,
    /// Negotiated RTP payload type.
    pub payload_type: u8,
    /// RTP clock rate in Hz.
    pub clock_rate: u32,
    /// Channel count for audio codecs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
}

/// One encoding layer of a media unit.
///
/// Simulcast publishes several of these at once; the ceiling of each layer
/// is `max_bitrate`, ordered low-to-high quality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpEncodingParameters {
    /// Restriction identifier distinguishing simulcast layers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    /// Bitrate ceiling for this layer, in bits per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<u32>,
}

impl RtpEncodingParameters {
    /// Build the ordered simulcast layer list from bitrate ceilings
    /// (low-to-high quality).
    pub fn layers(bitrates: &[u32]) -> Vec<Self> {
        bitrates
            .iter()
            .enumerate()
            .map(|(i, &max_bitrate)| Self {
                rid: Some(format!("r{i}")),
                max_bitrate: Some(max_bitrate),
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&MediaKind::Video).unwrap(), "\"video\"");
        let kind: MediaKind = serde_json::from_str("\"audio\"").unwrap();
        assert_eq!(kind, MediaKind::Audio);
    }

    #[test]
    fn capabilities_roundtrip() {
        let caps = RtpCapabilities {
            codecs: vec![
                RtpCodecCapability {
                    kind: MediaKind::Video,
                    mime_type: "video/VP8".to_string(),
                    clock_rate: 90_000,
                    channels: None,
                },
                RtpCodecCapability {
                    kind: MediaKind::Audio,
                    mime_type: "audio/opus".to_string(),
                    clock_rate: 48_000,
                    channels: Some(2),
                },
            ],
            header_extensions: vec![],
        };

        let json = serde_json::to_string(&caps).unwrap();
        assert!(json.contains("\"mimeType\":\"video/VP8\""));
        assert!(json.contains("\"clockRate\":90000"));

        let back: RtpCapabilities = serde_json::from_str(&json).unwrap();
        assert_eq!(back, caps);
    }

    #[test]
    fn capabilities_decode_with_missing_extensions() {
        let caps: RtpCapabilities =
            serde_json::from_str(r#"{"codecs":[{"mimeType":"video/VP8","kind":"video","clockRate":90000}]}"#)
                .unwrap();
        assert_eq!(caps.codecs.len(), 1);
        assert!(caps.header_extensions.is_empty());
    }

    #[test]
    fn simulcast_layers_are_ordered_low_to_high() {
        let layers = RtpEncodingParameters::layers(&[100_000, 300_000, 900_000]);

        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0].rid.as_deref(), Some("r0"));
        assert_eq!(layers[0].max_bitrate, Some(100_000));
        assert_eq!(layers[2].max_bitrate, Some(900_000));
    }
}
