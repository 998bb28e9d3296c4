use serde::{Deserialize, Serialize};

pub type ConnectionId = String;

/// One player (or privileged observer) seated in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ConnectionId,
    pub name: String,
    pub score: u32,
    pub has_played: bool,
    pub is_host: bool,
    pub is_privileged: bool,
}

impl Participant {
    pub fn new(id: ConnectionId, name: String, is_privileged: bool) -> Self {
        Participant {
            id,
            name,
            score: 0,
            has_played: false,
            is_host: false,
            is_privileged,
        }
    }

    /// Eligible for turns, guessing and standings.
    pub fn is_player(&self) -> bool {
        !self.is_privileged
    }
}
