//! Identifiers shared by the signaling protocol and the room.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Application-level participant identity
    PeerId
);

string_id!(
    /// Media stream identifier (the msid stream id of the remote description)
    StreamId
);

string_id!(RoomName);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_ids_as_json_map_keys() {
        let map: HashMap<StreamId, PeerId> =
            serde_json::from_str(r#"{"s1":"peerX","s2":"peerY"}"#).unwrap();

        assert_eq!(map.get(&StreamId::from("s1")), Some(&PeerId::from("peerX")));
        assert_eq!(map.len(), 2);
    }
}
