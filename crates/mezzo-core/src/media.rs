//! Opaque media handles.

use mezzo_proto::MediaKind;

/// A raw media track held by the engine or capture layer.
///
/// The session core never inspects track contents; it only moves handles
/// between collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    /// Engine-assigned track identifier.
    pub id: String,
    /// Kind of the track.
    pub kind: MediaKind,
}

impl MediaTrack {
    /// Create a track handle.
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self { id: id.into(), kind }
    }
}

/// A playable stream exposed to the embedding application.
///
/// The consume flow produces a stream composed of exactly the consumed
/// track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    /// A stream of exactly one track.
    pub fn single(track: MediaTrack) -> Self {
        Self { tracks: vec![track] }
    }

    /// Tracks composing the stream.
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }
}
