use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::RoomError;
use crate::types::{PeerId, RoomName, StreamId};

const INBOUND_QUEUE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Messages the relay sends to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum InboundMessage {
    Join { src: PeerId },
    Leave { src: PeerId },
    Data { data: Value },
    Offer { sdp: SessionDescription },
    MsidMap { mapping: HashMap<StreamId, PeerId> },
    Log(Value),
}

impl InboundMessage {
    pub fn from_json(text: &str) -> Result<Self, RoomError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Join { .. } => "join",
            InboundMessage::Leave { .. } => "leave",
            InboundMessage::Data { .. } => "data",
            InboundMessage::Offer { .. } => "offer",
            InboundMessage::MsidMap { .. } => "msidMap",
            InboundMessage::Log(_) => "log",
        }
    }
}

/// Messages a room sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum OutboundMessage {
    #[serde(rename_all = "camelCase")]
    Join { room_name: RoomName },
    #[serde(rename_all = "camelCase")]
    Broadcast { room_name: RoomName, data: Value },
    Answer {
        description: SessionDescription,
        candidates: Vec<IceCandidate>,
    },
    #[serde(rename_all = "camelCase")]
    GetLog { room_name: RoomName },
    #[serde(rename_all = "camelCase")]
    Leave { room_name: RoomName },
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Join { .. } => "join",
            OutboundMessage::Broadcast { .. } => "broadcast",
            OutboundMessage::Answer { .. } => "answer",
            OutboundMessage::GetLog { .. } => "getLog",
            OutboundMessage::Leave { .. } => "leave",
        }
    }
}

/// Websocket transport carrying the room's signaling messages.
pub struct SignalingClient {
    tx: mpsc::UnboundedSender<OutboundMessage>,
    rx: mpsc::Receiver<Result<InboundMessage, RoomError>>,
    writer: JoinHandle<()>,
}

impl SignalingClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .with_context(|| format!("failed to connect to signaling server {}", url))?;
        let (mut write, mut read) = ws_stream.split();

        let (tx, rx) = mpsc::channel(INBOUND_QUEUE_SIZE);
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<OutboundMessage>();

        // Handle outgoing messages until every sender is dropped
        let writer = tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(kind = msg.kind(), "dropping unencodable message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json)).await {
                    warn!("signaling socket closed for writing: {}", e);
                    return;
                }
            }
            if let Err(e) = write.close().await {
                debug!("signaling socket close failed: {}", e);
            }
        });

        // Handle incoming messages
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("signaling socket read failed: {}", e);
                        break;
                    }
                };
                let decoded = InboundMessage::from_json(&text);
                if let Ok(ref message) = decoded {
                    debug!(kind = message.kind(), "signaling message received");
                }
                if tx.send(decoded).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            tx: outgoing_tx,
            rx,
            writer,
        })
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<OutboundMessage> {
        self.tx.clone()
    }

    /// Splits the client into its outbound sender, its inbound receiver and
    /// the writer task. The writer finishes once every sender is dropped and
    /// everything queued before that has been written.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<OutboundMessage>,
        mpsc::Receiver<Result<InboundMessage, RoomError>>,
        JoinHandle<()>,
    ) {
        (self.tx, self.rx, self.writer)
    }
}
