use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RoomError;
use crate::signaling::OutboundMessage;
use crate::stream::MediaStream;
use crate::types::PeerId;

/// Events a room raises towards the application.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Open(PeerId),
    PeerJoin(PeerId),
    PeerLeave(PeerId),
    Data { data: Value },
    /// Carries the stream with its owner's `peer_id` attached.
    Stream(MediaStream),
    StreamRemoved(MediaStream),
    Log(Value),
    Close,
    Error(RoomError),
}

impl RoomEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::Open(_) => "open",
            RoomEvent::PeerJoin(_) => "peerJoin",
            RoomEvent::PeerLeave(_) => "peerLeave",
            RoomEvent::Data { .. } => "data",
            RoomEvent::Stream(_) => "stream",
            RoomEvent::StreamRemoved(_) => "streamRemoved",
            RoomEvent::Log(_) => "log",
            RoomEvent::Close => "close",
            RoomEvent::Error(_) => "error",
        }
    }
}

/// Receives everything a room emits: local events for the application and
/// messages for the signaling transport.
pub trait RoomSink: Send {
    fn emit(&self, event: RoomEvent);

    fn send(&self, message: OutboundMessage);
}

/// Forwards a room's output into two channels.
pub struct ChannelSink {
    events: mpsc::UnboundedSender<RoomEvent>,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelSink {
    pub fn new(
        events: mpsc::UnboundedSender<RoomEvent>,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Self {
        Self { events, outbound }
    }
}

impl RoomSink for ChannelSink {
    fn emit(&self, event: RoomEvent) {
        // the application may have stopped listening
        let _ = self.events.send(event);
    }

    fn send(&self, message: OutboundMessage) {
        let _ = self.outbound.send(message);
    }
}
