use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use crate::media::{ConnectionFactory, Handler, LocalCandidate, MediaConnection};
use crate::signaling::{IceCandidate, SdpKind, SessionDescription};
use crate::stream::MediaStream;
use crate::types::StreamId;

/// Builds webrtc-rs peer connections for rooms.
pub struct WebRtcConnectionFactory {
    ice_servers: Vec<String>,
}

impl WebRtcConnectionFactory {
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self { ice_servers }
    }
}

#[async_trait]
impl ConnectionFactory for WebRtcConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn MediaConnection>> {
        // Create a MediaEngine object to configure the supported codec
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };
        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(config)
                .await
                .context("failed to create peer connection")?,
        );
        Ok(Arc::new(WebRtcConnection::new(peer_connection)) as Arc<dyn MediaConnection>)
    }
}

/// A room's connection to the relay, backed by an `RTCPeerConnection`.
///
/// webrtc-rs reports tracks, not streams: the first track carrying a new msid
/// stream id announces the stream, and streams whose id disappears from a
/// later remote description are reported as removed.
pub struct WebRtcConnection {
    peer_connection: Arc<RTCPeerConnection>,
    streams: Arc<Mutex<HashMap<String, MediaStream>>>,
    on_remove_stream: Mutex<Option<Handler<StreamId>>>,
}

impl WebRtcConnection {
    pub fn new(peer_connection: Arc<RTCPeerConnection>) -> Self {
        Self {
            peer_connection,
            streams: Arc::new(Mutex::new(HashMap::new())),
            on_remove_stream: Mutex::new(None),
        }
    }

    fn prune_streams(&self, announced: &HashSet<String>) {
        let removed: Vec<String> = {
            let mut streams = self.streams.lock();
            let gone: Vec<String> = streams
                .keys()
                .filter(|id| !announced.contains(*id))
                .cloned()
                .collect();
            for id in &gone {
                streams.remove(id);
            }
            gone
        };

        if let Some(handler) = self.on_remove_stream.lock().as_ref() {
            for id in removed {
                debug!(stream = %id, "remote stream removed");
                handler(StreamId::from(id));
            }
        }
    }
}

#[async_trait]
impl MediaConnection for WebRtcConnection {
    fn on_add_stream(&self, handler: Handler<MediaStream>) {
        let handler: Arc<dyn Fn(MediaStream) + Send + Sync> = Arc::from(handler);
        let streams = self.streams.clone();

        self.peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                let mut stream_id = track.stream_id();
                if stream_id.is_empty() {
                    stream_id = track.id();
                }
                debug!(stream = %stream_id, track = %track.id(), kind = %track.kind(), "remote track added");

                let added = match streams.lock().entry(stream_id) {
                    Entry::Occupied(entry) => {
                        entry.get().add_track(track);
                        None
                    }
                    Entry::Vacant(entry) => {
                        let stream = MediaStream::new(entry.key().clone());
                        stream.add_track(track);
                        entry.insert(stream.clone());
                        Some(stream)
                    }
                };
                if let Some(stream) = added {
                    handler(stream);
                }
                Box::pin(async {})
            },
        ));
    }

    fn on_remove_stream(&self, handler: Handler<StreamId>) {
        *self.on_remove_stream.lock() = Some(handler);
    }

    fn on_ice_candidate(&self, handler: Handler<LocalCandidate>) {
        self.peer_connection
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                handler(local_candidate(candidate));
                Box::pin(async {})
            }));
    }

    fn on_ice_connection_state_change(&self, handler: Handler<RTCIceConnectionState>) {
        self.peer_connection
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                handler(state);
                Box::pin(async {})
            }));
    }

    fn on_signaling_state_change(&self, handler: Handler<RTCSignalingState>) {
        self.peer_connection
            .on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
                handler(state);
                Box::pin(async {})
            }));
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let announced = match announced_streams(&description.sdp) {
            Ok(announced) => Some(announced),
            Err(e) => {
                warn!("cannot read stream ids from remote description: {:#}", e);
                None
            }
        };

        self.peer_connection
            .set_remote_description(to_rtc(description)?)
            .await
            .context("failed to apply remote description")?;

        if let Some(announced) = announced {
            self.prune_streams(&announced);
        }
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .context("failed to create answer")?;
        from_rtc(answer)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_local_description(to_rtc(description)?)
            .await
            .context("failed to commit local description")?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.streams.lock().clear();
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Every engine notification maps to one notice, so each still earns an answer.
fn local_candidate(candidate: Option<RTCIceCandidate>) -> LocalCandidate {
    let Some(candidate) = candidate else {
        return LocalCandidate::Complete;
    };
    match candidate.to_json() {
        Ok(init) => LocalCandidate::Gathered(IceCandidate {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }),
        Err(e) => {
            warn!("failed to encode local candidate: {}", e);
            LocalCandidate::Unencodable
        }
    }
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
    let SessionDescription { kind, sdp } = description;
    let description = match kind {
        SdpKind::Offer => RTCSessionDescription::offer(sdp)?,
        SdpKind::Pranswer => RTCSessionDescription::pranswer(sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(sdp)?,
        SdpKind::Rollback => bail!("rollback descriptions are not supported"),
    };
    Ok(description)
}

fn from_rtc(description: RTCSessionDescription) -> Result<SessionDescription> {
    let kind = match description.sdp_type {
        RTCSdpType::Offer => SdpKind::Offer,
        RTCSdpType::Pranswer => SdpKind::Pranswer,
        RTCSdpType::Answer => SdpKind::Answer,
        RTCSdpType::Rollback => SdpKind::Rollback,
        other => bail!("unsupported description type {}", other),
    };
    Ok(SessionDescription {
        kind,
        sdp: description.sdp,
    })
}

/// Stream ids carried by the active media sections of `sdp`.
fn announced_streams(sdp: &str) -> Result<HashSet<String>> {
    let parsed = webrtc::sdp::SessionDescription::unmarshal(&mut Cursor::new(sdp.as_bytes()))?;

    let mut ids = HashSet::new();
    for media in &parsed.media_descriptions {
        if media.attribute("inactive").is_some() {
            continue;
        }
        if let Some(Some(msid)) = media.attribute("msid") {
            if let Some(stream_id) = msid.split_whitespace().next() {
                ids.insert(stream_id.to_string());
            }
        }
    }
    Ok(ids)
}
