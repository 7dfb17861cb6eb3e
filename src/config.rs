//! Client configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_SIGNALING_URL: &str = "ws://127.0.0.1:8080";
const DEFAULT_ROOM_NAME: &str = "test-room";
const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Websocket URL of the relay's signaling endpoint
    pub signaling_url: String,
    pub room_name: String,
    /// Local peer id; a random `user-<n>` id when absent
    pub peer_id: Option<String>,
    /// ICE server URLs handed to the media connection
    pub ice_servers: Vec<String>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            signaling_url: DEFAULT_SIGNALING_URL.to_string(),
            room_name: DEFAULT_ROOM_NAME.to_string(),
            peer_id: None,
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
        }
    }
}

impl RoomConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn peer_id(&self) -> String {
        self.peer_id
            .clone()
            .unwrap_or_else(|| format!("user-{}", rand::random::<u32>()))
    }
}
