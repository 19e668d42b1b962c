//! Local media acquisition seam.

use async_trait::async_trait;
use mezzo_proto::MediaKind;

use crate::{error::MediaAcquisitionError, media::MediaTrack};

/// Source of raw local tracks (camera, microphone, screen share).
///
/// Acquisition is asynchronous because real capture APIs prompt the user;
/// denial surfaces as [`MediaAcquisitionError`] to the caller of the
/// publish operation, never as a session failure.
#[async_trait]
pub trait MediaSource: Send + Sync + 'static {
    /// Acquire a raw track of the given kind.
    async fn get_media(&self, kind: MediaKind) -> Result<MediaTrack, MediaAcquisitionError>;
}
