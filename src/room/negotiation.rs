//! Answer-side negotiation over the room's single relay connection.
//!
//! The connection is created lazily by the first offer. Each offer runs three
//! stages strictly in order: apply the remote description, create an answer,
//! commit the answer locally. Every stage runs on its own task and reports
//! back as a [`ConnectionEvent::Negotiation`], so the room stays responsive
//! between stages and decides on each continuation whether it still applies.
//!
//! The answer is not sent when the commit lands. It goes out with each
//! candidate notification, carrying the committed description together with
//! every candidate gathered so far.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::signaling_state::RTCSignalingState;

use crate::error::{NegotiationStage, Result, RoomError};
use crate::media::{ConnectionFactory, LocalCandidate, MediaConnection};
use crate::signaling::{IceCandidate, OutboundMessage, SessionDescription};
use crate::stream::MediaStream;
use crate::types::StreamId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Uninitialized,
    Negotiating(NegotiationStage),
    Established,
    /// The last negotiation failed; the connection accepts a new offer.
    Failed,
}

impl NegotiationState {
    pub fn is_negotiating(&self) -> bool {
        matches!(self, NegotiationState::Negotiating(_))
    }
}

#[derive(Debug)]
pub enum NegotiationStep {
    RemoteDescriptionApplied,
    AnswerCreated(SessionDescription),
    LocalDescriptionCommitted(SessionDescription),
    Failed(RoomError),
}

/// Notifications from the media connection, delivered to the room in order.
#[derive(Debug)]
pub enum ConnectionEvent {
    StreamAdded(MediaStream),
    StreamRemoved(StreamId),
    IceCandidate(LocalCandidate),
    IceConnectionStateChange(RTCIceConnectionState),
    SignalingStateChange(RTCSignalingState),
    Negotiation(NegotiationStep),
}

pub struct Negotiator {
    connection: Option<Arc<dyn MediaConnection>>,
    state: NegotiationState,
    local_description: Option<SessionDescription>,
    candidates: Vec<IceCandidate>,
    gathering_complete: bool,
    // candidate notifications still owed an answer, released by the next commit
    held_notifications: usize,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl Negotiator {
    pub fn new(events: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        Self {
            connection: None,
            state: NegotiationState::Uninitialized,
            local_description: None,
            candidates: Vec::new(),
            gathering_complete: false,
            held_notifications: 0,
            events,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    /// Starts negotiating `offer`, creating the connection on first use.
    ///
    /// An offer arriving while another one is still being negotiated is
    /// rejected and leaves the in-flight negotiation untouched.
    pub async fn handle_offer(
        &mut self,
        factory: &dyn ConnectionFactory,
        offer: SessionDescription,
    ) -> Result<()> {
        if let NegotiationState::Negotiating(stage) = self.state {
            return Err(RoomError::Negotiation {
                stage,
                reason: "offer rejected, a negotiation is already in flight".to_string(),
            });
        }

        let connection = match self.connection.clone() {
            Some(connection) => connection,
            None => self.connect(factory).await?,
        };

        self.state = NegotiationState::Negotiating(NegotiationStage::RemoteDescription);
        self.spawn_stage(NegotiationStage::RemoteDescription, async move {
            connection
                .set_remote_description(offer)
                .await
                .map(|()| NegotiationStep::RemoteDescriptionApplied)
        });
        Ok(())
    }

    async fn connect(&mut self, factory: &dyn ConnectionFactory) -> Result<Arc<dyn MediaConnection>> {
        let connection = match factory.create().await {
            Ok(connection) => connection,
            Err(e) => {
                self.state = NegotiationState::Failed;
                return Err(RoomError::negotiation(NegotiationStage::Connect, &e));
            }
        };
        install_listeners(connection.as_ref(), &self.events);
        debug!("media connection created");
        self.connection = Some(connection.clone());
        Ok(connection)
    }

    /// Advances the state machine with a finished stage.
    ///
    /// Returns the answers released by a commit. Steps that do not belong
    /// to the current stage are stale and ignored.
    pub fn on_step(&mut self, step: NegotiationStep) -> Result<Vec<OutboundMessage>> {
        let expected = match &step {
            NegotiationStep::RemoteDescriptionApplied => Some(NegotiationStage::RemoteDescription),
            NegotiationStep::AnswerCreated(_) => Some(NegotiationStage::CreateAnswer),
            NegotiationStep::LocalDescriptionCommitted(_) => Some(NegotiationStage::LocalDescription),
            NegotiationStep::Failed(_) => None,
        };
        let current = match self.state {
            NegotiationState::Negotiating(stage) => stage,
            state => {
                debug!(?state, ?step, "ignoring negotiation step outside a negotiation");
                return Ok(Vec::new());
            }
        };
        if expected.is_some_and(|stage| stage != current) {
            debug!(?current, ?step, "ignoring stale negotiation step");
            return Ok(Vec::new());
        }
        let Some(connection) = self.connection.clone() else {
            return Ok(Vec::new());
        };

        match step {
            NegotiationStep::RemoteDescriptionApplied => {
                self.state = NegotiationState::Negotiating(NegotiationStage::CreateAnswer);
                self.spawn_stage(NegotiationStage::CreateAnswer, async move {
                    connection
                        .create_answer()
                        .await
                        .map(NegotiationStep::AnswerCreated)
                });
                Ok(Vec::new())
            }
            NegotiationStep::AnswerCreated(answer) => {
                self.state = NegotiationState::Negotiating(NegotiationStage::LocalDescription);
                self.spawn_stage(NegotiationStage::LocalDescription, async move {
                    connection
                        .set_local_description(answer.clone())
                        .await
                        .map(|()| NegotiationStep::LocalDescriptionCommitted(answer))
                });
                Ok(Vec::new())
            }
            NegotiationStep::LocalDescriptionCommitted(description) => {
                let renegotiated = self.local_description.is_some();
                self.state = NegotiationState::Established;
                self.local_description = Some(description);

                let mut pending = std::mem::take(&mut self.held_notifications);
                if pending == 0 && renegotiated && self.gathering_complete {
                    // gathering finished earlier, no notification will come
                    pending = 1;
                }
                Ok((0..pending).filter_map(|_| self.answer()).collect())
            }
            NegotiationStep::Failed(err) => {
                self.state = NegotiationState::Failed;
                Err(err)
            }
        }
    }

    /// Records a candidate notification and returns the answer it triggers.
    ///
    /// Outside a negotiation the last committed description is answered
    /// again, even after a failed renegotiation. Without one, or while a
    /// negotiation is in flight, the notification is held for the next commit.
    pub fn on_ice_candidate(&mut self, notice: LocalCandidate) -> Option<OutboundMessage> {
        match notice {
            LocalCandidate::Gathered(candidate) => self.candidates.push(candidate),
            LocalCandidate::Unencodable => {}
            LocalCandidate::Complete => self.gathering_complete = true,
        }
        if self.state.is_negotiating() || self.local_description.is_none() {
            self.held_notifications += 1;
            return None;
        }
        self.answer()
    }

    pub async fn close(&mut self) {
        self.state = NegotiationState::Uninitialized;
        self.local_description = None;
        self.candidates.clear();
        self.gathering_complete = false;
        self.held_notifications = 0;

        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                warn!("failed to close media connection: {:#}", e);
            }
        }
    }

    fn answer(&self) -> Option<OutboundMessage> {
        self.local_description
            .clone()
            .map(|description| OutboundMessage::Answer {
                description,
                candidates: self.candidates.clone(),
            })
    }

    fn spawn_stage<F>(&self, stage: NegotiationStage, work: F)
    where
        F: Future<Output = anyhow::Result<NegotiationStep>> + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            let step = match work.await {
                Ok(step) => step,
                Err(e) => NegotiationStep::Failed(RoomError::negotiation(stage, &e)),
            };
            // the room may already be gone
            let _ = events.send(ConnectionEvent::Negotiation(step));
        });
    }
}

fn install_listeners(connection: &dyn MediaConnection, events: &mpsc::UnboundedSender<ConnectionEvent>) {
    let tx = events.clone();
    connection.on_add_stream(Box::new(move |stream: MediaStream| {
        let _ = tx.send(ConnectionEvent::StreamAdded(stream));
    }));

    let tx = events.clone();
    connection.on_remove_stream(Box::new(move |id: StreamId| {
        let _ = tx.send(ConnectionEvent::StreamRemoved(id));
    }));

    let tx = events.clone();
    connection.on_ice_candidate(Box::new(move |notice: LocalCandidate| {
        let _ = tx.send(ConnectionEvent::IceCandidate(notice));
    }));

    let tx = events.clone();
    connection.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        let _ = tx.send(ConnectionEvent::IceConnectionStateChange(state));
    }));

    let tx = events.clone();
    connection.on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
        let _ = tx.send(ConnectionEvent::SignalingStateChange(state));
    }));
}
