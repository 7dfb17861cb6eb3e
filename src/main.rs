use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sfu_room::webrtc::WebRtcConnectionFactory;
use sfu_room::{ChannelSink, Room, RoomConfig, RoomEvent, SignalingClient};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => RoomConfig::load(path)?,
        None => RoomConfig::default(),
    };
    let peer_id = config.peer_id();
    info!(room = %config.room_name, peer = %peer_id, url = %config.signaling_url, "connecting");

    let signaling = SignalingClient::connect(&config.signaling_url).await?;
    let (outbound, inbound, writer) = signaling.into_parts();

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let factory = Arc::new(WebRtcConnectionFactory::new(config.ice_servers.clone()));
    let (room, connection_events) = Room::new(
        config.room_name.clone(),
        peer_id,
        factory,
        ChannelSink::new(events_tx, outbound),
    );

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                RoomEvent::Open(peer) => info!(peer = %peer, "joined room"),
                RoomEvent::PeerJoin(peer) => info!(peer = %peer, "peer joined"),
                RoomEvent::PeerLeave(peer) => info!(peer = %peer, "peer left"),
                RoomEvent::Data { data } => info!(%data, "data received"),
                RoomEvent::Stream(stream) => {
                    info!(stream = %stream.id, peer = ?stream.peer_id, tracks = stream.track_count(), "stream added")
                }
                RoomEvent::StreamRemoved(stream) => info!(stream = %stream.id, "stream removed"),
                RoomEvent::Log(log) => info!(%log, "room log"),
                RoomEvent::Close => info!("room closed"),
                RoomEvent::Error(e) => warn!("{}", e),
            }
        }
    });

    room.join();
    room.run(inbound, connection_events, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await;

    // the room owned the last sender, so the writer ends after the leave message
    if let Err(e) = writer.await {
        error!("signaling writer task failed: {}", e);
    }
    Ok(())
}
