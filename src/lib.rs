//! Client-side session for a conference relayed through an SFU.
//!
//! Every participant keeps a single media connection, to the relay. The
//! relay's streams arrive without any participant identity; the room matches
//! them to peers using the msid maps the relay sends over signaling.
//!
//! ## Layout
//!
//! - **`signaling`**: wire messages and the websocket transport
//! - **`room`**: roster, stream resolution, negotiation and the `Room` itself
//! - **`media`**: the capability set the room needs from a media engine
//! - **`webrtc`**: that capability set implemented on webrtc-rs
//! - **`connection`**: connection status published to observers

pub mod config;
pub mod connection;
pub mod error;
pub mod media;
pub mod room;
pub mod signaling;
pub mod stream;
pub mod types;
pub mod webrtc;

pub use config::RoomConfig;
pub use connection::{ConnectionMonitor, ConnectionState, ConnectionStatus};
pub use error::{NegotiationStage, Result, RoomError};
pub use media::{ConnectionFactory, Handler, LocalCandidate, MediaConnection};
pub use room::{ChannelSink, ConnectionEvent, NegotiationState, Room, RoomEvent, RoomSink};
pub use signaling::{IceCandidate, InboundMessage, OutboundMessage, SessionDescription, SignalingClient};
pub use stream::MediaStream;
pub use types::{PeerId, RoomName, StreamId};
