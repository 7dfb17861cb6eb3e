use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::signaling_state::RTCSignalingState;

use crate::room::NegotiationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

/// Snapshot of the room's media connection, published on every change.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub negotiation: NegotiationState,
    pub signaling_state: RTCSignalingState,
    pub ice_state: RTCIceConnectionState,
    pub last_error: Option<String>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            negotiation: NegotiationState::Uninitialized,
            signaling_state: RTCSignalingState::Stable,
            ice_state: RTCIceConnectionState::New,
            last_error: None,
        }
    }
}

#[derive(Clone)]
pub struct ConnectionMonitor {
    status: Arc<watch::Sender<ConnectionStatus>>,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        Self {
            status: Arc::new(status),
        }
    }

    pub fn update_negotiation(&self, negotiation: NegotiationState) {
        self.status.send_modify(|status| {
            status.negotiation = negotiation;
            if negotiation.is_negotiating() && status.state == ConnectionState::Disconnected {
                status.state = ConnectionState::Connecting;
            }
        });
    }

    pub fn update_signaling_state(&self, state: RTCSignalingState) {
        self.status.send_modify(|status| {
            status.signaling_state = state;
        });
    }

    pub fn update_ice_state(&self, state: RTCIceConnectionState) {
        self.status.send_modify(|status| {
            status.ice_state = state;
            status.state = match state {
                RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
                    ConnectionState::Connected
                }
                RTCIceConnectionState::Failed => ConnectionState::Failed,
                RTCIceConnectionState::Disconnected | RTCIceConnectionState::Closed => {
                    ConnectionState::Disconnected
                }
                RTCIceConnectionState::Checking => ConnectionState::Connecting,
                _ => status.state,
            };
        });
    }

    pub fn set_error(&self, error: String) {
        self.status.send_modify(|status| {
            status.last_error = Some(error);
        });
    }

    pub fn reset(&self) {
        self.status.send_modify(|status| {
            *status = ConnectionStatus {
                last_error: status.last_error.take(),
                ..ConnectionStatus::default()
            };
        });
    }

    pub fn current(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NegotiationStage;

    #[test]
    fn test_ice_state_drives_connection_state() {
        let monitor = ConnectionMonitor::new();
        let receiver = monitor.subscribe();

        monitor.update_ice_state(RTCIceConnectionState::Checking);
        assert_eq!(receiver.borrow().state, ConnectionState::Connecting);

        monitor.update_ice_state(RTCIceConnectionState::Connected);
        assert_eq!(receiver.borrow().state, ConnectionState::Connected);

        // states without a mapping keep the previous one
        monitor.update_ice_state(RTCIceConnectionState::New);
        assert_eq!(receiver.borrow().state, ConnectionState::Connected);

        monitor.update_ice_state(RTCIceConnectionState::Failed);
        assert_eq!(monitor.current().state, ConnectionState::Failed);
    }

    #[test]
    fn test_negotiation_marks_connecting() {
        let monitor = ConnectionMonitor::new();
        monitor.update_negotiation(NegotiationState::Negotiating(NegotiationStage::RemoteDescription));

        let status = monitor.current();
        assert_eq!(status.state, ConnectionState::Connecting);
        assert!(status.negotiation.is_negotiating());
    }

    #[test]
    fn test_reset_keeps_last_error() {
        let monitor = ConnectionMonitor::new();
        monitor.update_ice_state(RTCIceConnectionState::Connected);
        monitor.set_error("boom".to_string());
        monitor.reset();

        let status = monitor.current();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert_eq!(status.last_error.as_deref(), Some("boom"));
    }
}
