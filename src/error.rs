use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Step of the answer-side SDP exchange that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationStage {
    Connect,
    RemoteDescription,
    CreateAnswer,
    LocalDescription,
}

impl fmt::Display for NegotiationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationStage::Connect => write!(f, "connection setup"),
            NegotiationStage::RemoteDescription => write!(f, "remote description"),
            NegotiationStage::CreateAnswer => write!(f, "answer creation"),
            NegotiationStage::LocalDescription => write!(f, "local description"),
        }
    }
}

/// Failures a room reports to its observers.
///
/// None of these are raised into the dispatch path; the room emits them as
/// `RoomEvent::Error`, or returns them from the few application-facing calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("signaling error: {0}")]
    Signaling(String),

    #[error("negotiation failed during {stage}: {reason}")]
    Negotiation {
        stage: NegotiationStage,
        reason: String,
    },

    #[error("invalid room state: {0}")]
    State(String),
}

impl RoomError {
    pub fn negotiation(stage: NegotiationStage, err: &anyhow::Error) -> Self {
        RoomError::Negotiation {
            stage,
            reason: format!("{:#}", err),
        }
    }
}

impl From<serde_json::Error> for RoomError {
    fn from(err: serde_json::Error) -> Self {
        RoomError::Signaling(format!("undecodable message: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, RoomError>;
