//! Capability set the room needs from a media engine.
//!
//! The room never touches a concrete peer connection. It creates one through a
//! [`ConnectionFactory`], registers its five listeners, and drives the
//! answer-side SDP exchange through [`MediaConnection`].

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::signaling_state::RTCSignalingState;

use crate::signaling::{IceCandidate, SessionDescription};
use crate::stream::MediaStream;
use crate::types::StreamId;

pub type Handler<T> = Box<dyn Fn(T) + Send + Sync>;

/// One local candidate notification from the media engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalCandidate {
    Gathered(IceCandidate),
    /// The engine reported a candidate it could not encode for the wire.
    Unencodable,
    /// Gathering finished.
    Complete,
}

impl From<Option<IceCandidate>> for LocalCandidate {
    fn from(candidate: Option<IceCandidate>) -> Self {
        match candidate {
            Some(candidate) => LocalCandidate::Gathered(candidate),
            None => LocalCandidate::Complete,
        }
    }
}

#[async_trait]
pub trait MediaConnection: Send + Sync {
    fn on_add_stream(&self, handler: Handler<MediaStream>);

    fn on_remove_stream(&self, handler: Handler<StreamId>);

    fn on_ice_candidate(&self, handler: Handler<LocalCandidate>);

    fn on_ice_connection_state_change(&self, handler: Handler<RTCIceConnectionState>);

    fn on_signaling_state_change(&self, handler: Handler<RTCSignalingState>);

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn MediaConnection>>;
}
