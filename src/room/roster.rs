use crate::types::PeerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The relay acknowledged our own join.
    Local,
    Joined,
    AlreadyPresent,
}

/// Ordered list of remote participants; the local peer is never a member.
#[derive(Debug)]
pub struct Roster {
    local: PeerId,
    members: Vec<PeerId>,
}

impl Roster {
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            members: Vec::new(),
        }
    }

    pub fn join(&mut self, peer_id: &PeerId) -> JoinOutcome {
        if *peer_id == self.local {
            return JoinOutcome::Local;
        }
        if self.contains(peer_id) {
            return JoinOutcome::AlreadyPresent;
        }
        self.members.push(peer_id.clone());
        JoinOutcome::Joined
    }

    /// Returns whether the peer was a member.
    pub fn leave(&mut self, peer_id: &PeerId) -> bool {
        let before = self.members.len();
        self.members.retain(|id| id != peer_id);
        self.members.len() != before
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.members.iter().any(|id| id == peer_id)
    }

    pub fn members(&self) -> &[PeerId] {
        &self.members
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}
