//! Client side of a relayed (SFU) conference room.
//!
//! A [`Room`] holds exactly one media connection, to the relay, and turns the
//! relay's signaling messages and the connection's callbacks into local
//! [`RoomEvent`]s and outbound [`OutboundMessage`]s. All of its handlers run
//! serially; [`Room::run`] is the loop that feeds them.

mod events;
mod negotiation;
mod roster;
mod streams;

#[cfg(test)]
pub(crate) mod mock;

pub use events::{ChannelSink, RoomEvent, RoomSink};
pub use negotiation::{ConnectionEvent, NegotiationState, NegotiationStep};
pub use roster::JoinOutcome;

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;

use crate::connection::{ConnectionMonitor, ConnectionStatus};
use crate::error::{Result, RoomError};
use crate::media::ConnectionFactory;
use crate::signaling::{InboundMessage, OutboundMessage, SessionDescription};
use crate::stream::MediaStream;
use crate::types::{PeerId, RoomName, StreamId};

use negotiation::Negotiator;
use roster::Roster;
use streams::StreamResolver;

pub struct Room {
    name: RoomName,
    peer_id: PeerId,
    open: bool,
    closed: bool,
    roster: Roster,
    streams: StreamResolver,
    negotiator: Negotiator,
    factory: Arc<dyn ConnectionFactory>,
    sink: Box<dyn RoomSink>,
    monitor: ConnectionMonitor,
}

impl Room {
    /// Creates a room together with the receiver its media connection reports
    /// into. Every event taken from that receiver must be handed back through
    /// [`Room::handle_connection_event`].
    pub fn new(
        name: impl Into<RoomName>,
        peer_id: impl Into<PeerId>,
        factory: Arc<dyn ConnectionFactory>,
        sink: impl RoomSink + 'static,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let peer_id = peer_id.into();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let room = Self {
            name: name.into(),
            roster: Roster::new(peer_id.clone()),
            peer_id,
            open: false,
            closed: false,
            streams: StreamResolver::new(),
            negotiator: Negotiator::new(events_tx),
            factory,
            sink: Box::new(sink),
            monitor: ConnectionMonitor::new(),
        };
        (room, events_rx)
    }

    pub fn name(&self) -> &RoomName {
        &self.name
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn members(&self) -> &[PeerId] {
        self.roster.members()
    }

    pub fn msid_map(&self) -> &HashMap<StreamId, PeerId> {
        self.streams.msid_map()
    }

    pub fn remote_streams(&self) -> &HashMap<StreamId, MediaStream> {
        self.streams.remote_streams()
    }

    pub fn unknown_streams(&self) -> &HashMap<StreamId, MediaStream> {
        self.streams.unknown_streams()
    }

    pub fn negotiation_state(&self) -> NegotiationState {
        self.negotiator.state()
    }

    pub fn has_connection(&self) -> bool {
        self.negotiator.has_connection()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.monitor.subscribe()
    }

    /// Asks the relay to admit us; the relay answers with our own `join`.
    pub fn join(&self) {
        if self.closed {
            return;
        }
        self.sink.send(OutboundMessage::Join {
            room_name: self.name.clone(),
        });
    }

    pub async fn handle_message(&mut self, message: InboundMessage) {
        if self.closed {
            debug!(room = %self.name, kind = message.kind(), "dropping message for closed room");
            return;
        }
        match message {
            InboundMessage::Join { src } => self.handle_join(src),
            InboundMessage::Leave { src } => self.handle_leave(src),
            InboundMessage::Data { data } => self.handle_data(data),
            InboundMessage::Offer { sdp } => self.handle_offer(sdp).await,
            InboundMessage::MsidMap { mapping } => self.update_msid_map(mapping),
            InboundMessage::Log(log) => self.handle_log(log),
        }
    }

    pub fn handle_join(&mut self, peer_id: PeerId) {
        if self.closed {
            return;
        }
        match self.roster.join(&peer_id) {
            JoinOutcome::Local => {
                if self.open {
                    debug!(room = %self.name, "repeated join acknowledgement");
                    return;
                }
                self.open = true;
                info!(room = %self.name, peer = %peer_id, "room open");
                self.sink.emit(RoomEvent::Open(peer_id));
            }
            JoinOutcome::Joined => {
                info!(room = %self.name, peer = %peer_id, "peer joined");
                self.sink.emit(RoomEvent::PeerJoin(peer_id));
            }
            JoinOutcome::AlreadyPresent => {
                debug!(room = %self.name, peer = %peer_id, "ignoring duplicate join");
            }
        }
    }

    pub fn handle_leave(&mut self, peer_id: PeerId) {
        if self.closed {
            return;
        }
        if self.roster.leave(&peer_id) {
            info!(room = %self.name, peer = %peer_id, "peer left");
            self.sink.emit(RoomEvent::PeerLeave(peer_id));
        } else {
            debug!(room = %self.name, peer = %peer_id, "ignoring leave of unknown peer");
        }
    }

    pub fn handle_data(&self, data: Value) {
        if self.closed {
            return;
        }
        self.sink.emit(RoomEvent::Data { data });
    }

    pub fn handle_log(&self, log: Value) {
        if self.closed {
            return;
        }
        self.sink.emit(RoomEvent::Log(log));
    }

    pub async fn handle_offer(&mut self, offer: SessionDescription) {
        if self.closed {
            return;
        }
        debug!(room = %self.name, "offer received");
        let result = self.negotiator.handle_offer(self.factory.as_ref(), offer).await;
        self.monitor.update_negotiation(self.negotiator.state());
        if let Err(err) = result {
            self.report(err);
        }
    }

    pub fn update_msid_map(&mut self, mapping: HashMap<StreamId, PeerId>) {
        if self.closed {
            return;
        }
        for stream in self.streams.update_msid_map(mapping) {
            debug!(room = %self.name, stream = %stream.id, "pending stream resolved");
            self.sink.emit(RoomEvent::Stream(stream));
        }
    }

    pub fn handle_connection_event(&mut self, event: ConnectionEvent) {
        if self.closed {
            debug!(room = %self.name, ?event, "dropping connection event for closed room");
            return;
        }
        match event {
            ConnectionEvent::StreamAdded(stream) => {
                let id = stream.id.clone();
                match self.streams.add_stream(stream) {
                    Some(stream) => self.sink.emit(RoomEvent::Stream(stream)),
                    None => debug!(room = %self.name, stream = %id, "stream owner not yet known"),
                }
            }
            ConnectionEvent::StreamRemoved(id) => {
                if let Some(stream) = self.streams.remove_stream(&id) {
                    self.sink.emit(RoomEvent::StreamRemoved(stream));
                }
            }
            ConnectionEvent::IceCandidate(notice) => {
                if let Some(answer) = self.negotiator.on_ice_candidate(notice) {
                    self.sink.send(answer);
                }
            }
            ConnectionEvent::IceConnectionStateChange(state) => {
                self.monitor.update_ice_state(state);
                match state {
                    RTCIceConnectionState::Failed | RTCIceConnectionState::Disconnected => {
                        warn!(room = %self.name, %state, "ice connection state changed")
                    }
                    _ => debug!(room = %self.name, %state, "ice connection state changed"),
                }
            }
            ConnectionEvent::SignalingStateChange(state) => {
                self.monitor.update_signaling_state(state);
                debug!(room = %self.name, %state, "signaling state changed");
            }
            ConnectionEvent::Negotiation(step) => {
                let result = self.negotiator.on_step(step);
                self.monitor.update_negotiation(self.negotiator.state());
                match result {
                    Ok(answers) => {
                        for answer in answers {
                            self.sink.send(answer);
                        }
                    }
                    Err(err) => self.report(err),
                }
            }
        }
    }

    /// Broadcasts `data` to every member through the relay.
    pub fn send(&self, data: impl Into<Value>) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.ensure_open("send")?;
        self.sink.send(OutboundMessage::Broadcast {
            room_name: self.name.clone(),
            data: data.into(),
        });
        Ok(())
    }

    /// Requests the relay's log for this room; it arrives as `RoomEvent::Log`.
    pub fn get_log(&self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.ensure_open("get_log")?;
        self.sink.send(OutboundMessage::GetLog {
            room_name: self.name.clone(),
        });
        Ok(())
    }

    /// Leaves the room and releases the media connection. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.open = false;
        info!(room = %self.name, "closing room");

        self.sink.send(OutboundMessage::Leave {
            room_name: self.name.clone(),
        });
        self.sink.emit(RoomEvent::Close);

        self.negotiator.close().await;
        self.streams.clear();
        self.roster.clear();
        self.monitor.reset();
    }

    /// Dispatches inbound messages and connection events one at a time until
    /// the room closes, the transport goes away or `shutdown` resolves.
    pub async fn run<S>(
        mut self,
        mut inbound: mpsc::Receiver<Result<InboundMessage>>,
        mut connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
        shutdown: S,
    ) where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        while !self.closed {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(Ok(message)) => self.handle_message(message).await,
                    Some(Err(err)) => self.report(err),
                    None => {
                        info!(room = %self.name, "signaling transport closed");
                        self.close().await;
                    }
                },
                Some(event) = connection_events.recv() => self.handle_connection_event(event),
                () = &mut shutdown => self.close().await,
            }
        }
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.open {
            return Ok(());
        }
        let err = RoomError::State(format!("{} on room `{}` before it is open", operation, self.name));
        warn!(room = %self.name, "{}", err);
        Err(err)
    }

    fn report(&self, err: RoomError) {
        warn!(room = %self.name, "{}", err);
        self.monitor.set_error(err.to_string());
        self.sink.emit(RoomEvent::Error(err));
    }
}
