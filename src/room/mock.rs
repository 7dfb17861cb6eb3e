//! In-memory media engine and room harness for tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::signaling_state::RTCSignalingState;

use crate::error::NegotiationStage;
use crate::media::{ConnectionFactory, Handler, LocalCandidate, MediaConnection};
use crate::room::{ChannelSink, ConnectionEvent, Room, RoomEvent};
use crate::signaling::{IceCandidate, OutboundMessage, SessionDescription};
use crate::stream::MediaStream;
use crate::types::StreamId;

pub const LOCAL_PEER: &str = "me";
pub const ROOM_NAME: &str = "lobby";
pub const FAKE_ANSWER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

#[derive(Default)]
pub struct FakeConnection {
    fail_at: Mutex<Option<NegotiationStage>>,
    calls: Mutex<Vec<&'static str>>,
    add_stream: Mutex<Option<Handler<MediaStream>>>,
    remove_stream: Mutex<Option<Handler<StreamId>>>,
    ice_candidate: Mutex<Option<Handler<LocalCandidate>>>,
    ice_state: Mutex<Option<Handler<RTCIceConnectionState>>>,
    signaling_state: Mutex<Option<Handler<RTCSignalingState>>>,
}

impl FakeConnection {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn listener_count(&self) -> usize {
        [
            self.add_stream.lock().is_some(),
            self.remove_stream.lock().is_some(),
            self.ice_candidate.lock().is_some(),
            self.ice_state.lock().is_some(),
            self.signaling_state.lock().is_some(),
        ]
        .into_iter()
        .filter(|registered| *registered)
        .count()
    }

    pub fn fire_add_stream(&self, stream: MediaStream) {
        if let Some(handler) = self.add_stream.lock().as_ref() {
            handler(stream);
        }
    }

    pub fn fire_remove_stream(&self, id: &str) {
        if let Some(handler) = self.remove_stream.lock().as_ref() {
            handler(StreamId::from(id));
        }
    }

    pub fn fire_ice_candidate(&self, candidate: Option<IceCandidate>) {
        self.fire_local_candidate(candidate.into());
    }

    pub fn fire_local_candidate(&self, notice: LocalCandidate) {
        if let Some(handler) = self.ice_candidate.lock().as_ref() {
            handler(notice);
        }
    }

    pub fn fire_ice_state(&self, state: RTCIceConnectionState) {
        if let Some(handler) = self.ice_state.lock().as_ref() {
            handler(state);
        }
    }

    pub fn fire_signaling_state(&self, state: RTCSignalingState) {
        if let Some(handler) = self.signaling_state.lock().as_ref() {
            handler(state);
        }
    }

    /// Makes every later negotiation fail at `stage`, or succeed with `None`.
    pub fn set_failure(&self, stage: Option<NegotiationStage>) {
        *self.fail_at.lock() = stage;
    }

    fn record(&self, call: &'static str, stage: NegotiationStage) -> Result<()> {
        self.calls.lock().push(call);
        if *self.fail_at.lock() == Some(stage) {
            bail!("{} rejected by fake engine", call);
        }
        Ok(())
    }
}

#[async_trait]
impl MediaConnection for FakeConnection {
    fn on_add_stream(&self, handler: Handler<MediaStream>) {
        *self.add_stream.lock() = Some(handler);
    }

    fn on_remove_stream(&self, handler: Handler<StreamId>) {
        *self.remove_stream.lock() = Some(handler);
    }

    fn on_ice_candidate(&self, handler: Handler<LocalCandidate>) {
        *self.ice_candidate.lock() = Some(handler);
    }

    fn on_ice_connection_state_change(&self, handler: Handler<RTCIceConnectionState>) {
        *self.ice_state.lock() = Some(handler);
    }

    fn on_signaling_state_change(&self, handler: Handler<RTCSignalingState>) {
        *self.signaling_state.lock() = Some(handler);
    }

    async fn set_remote_description(&self, _description: SessionDescription) -> Result<()> {
        self.record("set_remote_description", NegotiationStage::RemoteDescription)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record("create_answer", NegotiationStage::CreateAnswer)?;
        Ok(SessionDescription::answer(FAKE_ANSWER_SDP))
    }

    async fn set_local_description(&self, _description: SessionDescription) -> Result<()> {
        self.record("set_local_description", NegotiationStage::LocalDescription)
    }

    async fn close(&self) -> Result<()> {
        self.calls.lock().push("close");
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeFactory {
    refuse: bool,
    fail_at: Option<NegotiationStage>,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeFactory {
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    /// Connections from this factory fail the given negotiation stage.
    pub fn failing_at(stage: NegotiationStage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Default::default()
        }
    }

    pub fn created(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn connection(&self) -> Arc<FakeConnection> {
        self.connections.lock()[0].clone()
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    async fn create(&self) -> Result<Arc<dyn MediaConnection>> {
        if self.refuse {
            bail!("no media engine available");
        }
        let connection = Arc::new(FakeConnection {
            fail_at: Mutex::new(self.fail_at),
            ..Default::default()
        });
        self.connections.lock().push(connection.clone());
        Ok(connection as Arc<dyn MediaConnection>)
    }
}

pub struct Harness {
    pub room: Room,
    pub factory: Arc<FakeFactory>,
    connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    events: mpsc::UnboundedReceiver<RoomEvent>,
    outbound: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_factory(FakeFactory::default())
    }

    pub fn with_factory(factory: FakeFactory) -> Self {
        let factory = Arc::new(factory);
        let (events_tx, events) = mpsc::unbounded_channel();
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let (room, connection_events) = Room::new(
            ROOM_NAME,
            LOCAL_PEER,
            factory.clone(),
            ChannelSink::new(events_tx, outbound_tx),
        );
        Self {
            room,
            factory,
            connection_events,
            events,
            outbound,
        }
    }

    /// Delivers the next connection event to the room.
    pub async fn pump(&mut self) {
        let event = tokio::time::timeout(Duration::from_secs(1), self.connection_events.recv())
            .await
            .expect("timed out waiting for a connection event")
            .expect("connection event channel closed");
        self.room.handle_connection_event(event);
    }

    /// Runs the three negotiation stages of an offer already handed to the room.
    pub async fn pump_negotiation(&mut self) {
        for _ in 0..3 {
            self.pump().await;
        }
    }

    pub fn connection(&self) -> Arc<FakeConnection> {
        self.factory.connection()
    }

    pub fn events(&mut self) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn outbound(&mut self) -> Vec<OutboundMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            messages.push(message);
        }
        messages
    }
}

pub fn candidate(n: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{} 1 udp 2130706431 10.0.0.{} 5000 typ host", n, n),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}
