//! Reconciles anonymous inbound streams with the peers that own them.
//!
//! The relay announces ownership through msid maps that arrive independently
//! of the streams. A stream is held in `unknown` until a map names its owner,
//! then moves to `remote`. No stream id is ever in both.

use std::collections::HashMap;

use crate::stream::MediaStream;
use crate::types::{PeerId, StreamId};

#[derive(Debug, Default)]
pub struct StreamResolver {
    msid_map: HashMap<StreamId, PeerId>,
    remote: HashMap<StreamId, MediaStream>,
    unknown: HashMap<StreamId, MediaStream>,
}

impl StreamResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stream, with its owner attached, when the owner is known.
    pub fn add_stream(&mut self, stream: MediaStream) -> Option<MediaStream> {
        let id = stream.id.clone();
        self.remote.remove(&id);
        self.unknown.remove(&id);

        match self.msid_map.get(&id) {
            Some(peer_id) => {
                let stream = stream.with_peer(peer_id.clone());
                self.remote.insert(id, stream.clone());
                Some(stream)
            }
            None => {
                self.unknown.insert(id, stream);
                None
            }
        }
    }

    /// Returns the removed stream if it had been resolved.
    pub fn remove_stream(&mut self, id: &StreamId) -> Option<MediaStream> {
        if let Some(stream) = self.remote.remove(id) {
            return Some(stream);
        }
        self.unknown.remove(id);
        None
    }

    /// Replaces the msid map and returns the pending streams it resolves.
    ///
    /// Streams already resolved keep their owner even if the new map assigns
    /// their id to someone else.
    pub fn update_msid_map(&mut self, mapping: HashMap<StreamId, PeerId>) -> Vec<MediaStream> {
        self.msid_map = mapping;

        let resolvable: Vec<StreamId> = self
            .unknown
            .keys()
            .filter(|id| self.msid_map.contains_key(*id))
            .cloned()
            .collect();

        let mut resolved = Vec::with_capacity(resolvable.len());
        for id in resolvable {
            let (Some(stream), Some(peer_id)) = (self.unknown.remove(&id), self.msid_map.get(&id))
            else {
                continue;
            };
            let stream = stream.with_peer(peer_id.clone());
            self.remote.insert(id, stream.clone());
            resolved.push(stream);
        }
        resolved
    }

    pub fn msid_map(&self) -> &HashMap<StreamId, PeerId> {
        &self.msid_map
    }

    pub fn remote_streams(&self) -> &HashMap<StreamId, MediaStream> {
        &self.remote
    }

    pub fn unknown_streams(&self) -> &HashMap<StreamId, MediaStream> {
        &self.unknown
    }

    pub fn clear(&mut self) {
        self.msid_map.clear();
        self.remote.clear();
        self.unknown.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: &[(&str, &str)]) -> HashMap<StreamId, PeerId> {
        pairs
            .iter()
            .map(|(s, p)| (StreamId::from(*s), PeerId::from(*p)))
            .collect()
    }

    #[test]
    fn test_unknown_stream_resolved_by_later_map() {
        let mut resolver = StreamResolver::new();
        assert!(resolver.add_stream(MediaStream::new("s1")).is_none());
        assert!(resolver.unknown_streams().contains_key(&StreamId::from("s1")));

        let resolved = resolver.update_msid_map(mapping(&[("s1", "peerX")]));
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].peer_id, Some(PeerId::from("peerX")));
        assert!(resolver.unknown_streams().is_empty());
        assert_eq!(
            resolver.remote_streams()[&StreamId::from("s1")].peer_id,
            Some(PeerId::from("peerX"))
        );
    }

    #[test]
    fn test_known_stream_resolves_immediately() {
        let mut resolver = StreamResolver::new();
        resolver.update_msid_map(mapping(&[("s2", "peerY")]));

        let stream = resolver.add_stream(MediaStream::new("s2")).unwrap();
        assert_eq!(stream.peer_id, Some(PeerId::from("peerY")));
        assert!(resolver.unknown_streams().is_empty());
    }

    #[test]
    fn test_map_is_replaced_not_merged() {
        let mut resolver = StreamResolver::new();
        resolver.update_msid_map(mapping(&[("a", "p1"), ("b", "p2")]));
        resolver.update_msid_map(mapping(&[("c", "p3")]));

        assert_eq!(resolver.msid_map(), &mapping(&[("c", "p3")]));
    }

    #[test]
    fn test_map_without_pending_streams_is_kept_for_lookup() {
        let mut resolver = StreamResolver::new();
        assert!(resolver.update_msid_map(mapping(&[("s9", "p9")])).is_empty());
        assert!(resolver.remote_streams().is_empty());
        assert!(resolver.add_stream(MediaStream::new("s9")).is_some());
    }

    #[test]
    fn test_resolved_stream_is_not_relabeled() {
        let mut resolver = StreamResolver::new();
        resolver.update_msid_map(mapping(&[("s1", "peerX")]));
        resolver.add_stream(MediaStream::new("s1"));

        let resolved = resolver.update_msid_map(mapping(&[("s1", "peerZ")]));
        assert!(resolved.is_empty());
        assert_eq!(
            resolver.remote_streams()[&StreamId::from("s1")].peer_id,
            Some(PeerId::from("peerX"))
        );
    }

    #[test]
    fn test_remove_from_either_partition() {
        let mut resolver = StreamResolver::new();
        resolver.update_msid_map(mapping(&[("known", "p1")]));
        resolver.add_stream(MediaStream::new("known"));
        resolver.add_stream(MediaStream::new("pending"));

        assert!(resolver.remove_stream(&StreamId::from("pending")).is_none());
        assert!(resolver.unknown_streams().is_empty());

        let removed = resolver.remove_stream(&StreamId::from("known")).unwrap();
        assert_eq!(removed.peer_id, Some(PeerId::from("p1")));
        assert!(resolver.remote_streams().is_empty());
    }

    #[test]
    fn test_readded_stream_never_in_both_partitions() {
        let mut resolver = StreamResolver::new();
        resolver.update_msid_map(mapping(&[("s1", "p1")]));
        resolver.add_stream(MediaStream::new("s1"));
        resolver.update_msid_map(HashMap::new());
        resolver.add_stream(MediaStream::new("s1"));

        assert!(resolver.unknown_streams().contains_key(&StreamId::from("s1")));
        assert!(!resolver.remote_streams().contains_key(&StreamId::from("s1")));
    }
}
