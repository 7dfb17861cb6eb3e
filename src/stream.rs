//! Remote media streams as the room sees them.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use webrtc::track::track_remote::TrackRemote;

use crate::types::{PeerId, StreamId};

/// A remote media stream forwarded by the relay.
///
/// Clones share the same track list, so tracks that arrive after the stream
/// was announced are visible to every holder. `peer_id` is filled in once the
/// stream's owner has been resolved.
#[derive(Clone)]
pub struct MediaStream {
    pub id: StreamId,
    pub peer_id: Option<PeerId>,
    tracks: Arc<RwLock<Vec<Arc<TrackRemote>>>>,
}

impl MediaStream {
    pub fn new(id: impl Into<StreamId>) -> Self {
        Self {
            id: id.into(),
            peer_id: None,
            tracks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_peer(mut self, peer_id: PeerId) -> Self {
        self.peer_id = Some(peer_id);
        self
    }

    pub fn add_track(&self, track: Arc<TrackRemote>) {
        self.tracks.write().push(track);
    }

    #[must_use]
    pub fn tracks(&self) -> Vec<Arc<TrackRemote>> {
        self.tracks.read().clone()
    }

    #[must_use]
    pub fn track_count(&self) -> usize {
        self.tracks.read().len()
    }

    /// Whether both handles point at the same underlying stream.
    #[must_use]
    pub fn same_stream(&self, other: &MediaStream) -> bool {
        Arc::ptr_eq(&self.tracks, &other.tracks)
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("peer_id", &self.peer_id)
            .field("tracks", &self.track_count())
            .finish()
    }
}
