use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::participant::{ConnectionId, Participant};
use crate::round::{RoundState, RoundView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

/// Lobby listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub players: usize,
    pub max_players: usize,
    pub status: RoomStatus,
}

/// Everything a client needs to render the room on joining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: String,
    pub name: String,
    pub status: RoomStatus,
    pub max_players: usize,
    pub participants: Vec<Participant>,
    pub round: Option<RoundView>,
}

pub struct Room {
    pub id: String,
    pub name: String,
    pub status: RoomStatus,
    /// Completed turns in the current game.
    pub round_counter: u32,
    pub round: Option<RoundState>,
    /// Bumped on every phase transition; timers armed for an older value are stale.
    pub generation: u64,
    pub created_at: Instant,
    pub last_activity: Instant,
    max_players: usize,
    participants: Vec<Participant>,
}

impl Room {
    pub fn new(id: String, name: String, max_players: usize, now: Instant) -> Self {
        Room {
            id,
            name,
            status: RoomStatus::Waiting,
            round_counter: 0,
            round: None,
            generation: 0,
            created_at: now,
            last_activity: now,
            max_players,
            participants: Vec::new(),
        }
    }

    pub fn add_participant(
        &mut self,
        id: ConnectionId,
        name: String,
        is_privileged: bool,
        now: Instant,
    ) -> Result<&Participant, GameError> {
        self.admits(&name, is_privileged)?;

        let mut participant = Participant::new(id, name, is_privileged);
        participant.is_host = !is_privileged && self.non_privileged_roster().next().is_none();
        self.participants.push(participant);
        self.touch(now);
        Ok(&self.participants[self.participants.len() - 1])
    }

    /// Whether `add_participant` would accept this joiner. Privileged
    /// observers are always let in.
    pub fn admits(&self, name: &str, is_privileged: bool) -> Result<(), GameError> {
        if is_privileged {
            return Ok(());
        }
        if self.non_privileged_roster().count() >= self.max_players {
            return Err(GameError::RoomFull);
        }
        if self.status != RoomStatus::Waiting {
            return Err(GameError::GameInProgress);
        }
        let name = name.to_lowercase();
        if self.non_privileged_roster().any(|p| p.name.to_lowercase() == name) {
            return Err(GameError::NameTaken);
        }
        Ok(())
    }

    /// Removes the participant, handing host to the most recent remaining player.
    pub fn remove_participant(&mut self, id: &str, now: Instant) -> Option<Participant> {
        let index = self.participants.iter().position(|p| p.id == id)?;
        let removed = self.participants.remove(index);
        if removed.is_host {
            if let Some(heir) = self.participants.iter_mut().rev().find(|p| p.is_player()) {
                heir.is_host = true;
            }
        }
        self.touch(now);
        Some(removed)
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn participant_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }

    /// Non-privileged participants, in join order. Everything that deals
    /// turns, checks completion or scores goes through this.
    pub fn non_privileged_roster(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_player())
    }

    pub fn can_start(&self, min_players: usize) -> bool {
        self.status == RoomStatus::Waiting && self.non_privileged_roster().count() >= min_players
    }

    pub fn has_players(&self) -> bool {
        self.non_privileged_roster().next().is_some()
    }

    pub fn is_full(&self) -> bool {
        self.non_privileged_roster().count() >= self.max_players
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Back to the lobby for another game with the same people.
    pub fn reset_for_replay(&mut self, now: Instant) {
        self.status = RoomStatus::Waiting;
        self.round_counter = 0;
        self.round = None;
        for p in self.participants.iter_mut().filter(|p| p.is_player()) {
            p.score = 0;
            p.has_played = false;
        }
        self.bump_generation();
        self.touch(now);
    }

    pub fn refresh_round_scores(&mut self) {
        if let Some(round) = self.round.as_mut() {
            round.refresh_scores(&self.participants);
        }
    }

    pub fn is_round_complete(&self) -> bool {
        self.round
            .as_ref()
            .is_some_and(|round| round.is_complete(&self.participants))
    }

    pub fn snapshot(&self, now: Instant) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            max_players: self.max_players,
            participants: self.participants.clone(),
            round: self.round.as_ref().map(|round| round.view(now)),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            players: self.non_privileged_roster().count(),
            max_players: self.max_players,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> (Room, Instant) {
        let now = Instant::now();
        (Room::new("ABC123".into(), "Friday".into(), 3, now), now)
    }

    #[test]
    fn creator_becomes_host() {
        let (mut room, now) = room();
        let host = room.add_participant("a".into(), "Ana".into(), false, now).unwrap();
        assert!(host.is_host);
        let guest = room.add_participant("b".into(), "Ben".into(), false, now).unwrap();
        assert!(!guest.is_host);
    }

    #[test]
    fn names_are_unique_ignoring_case() {
        let (mut room, now) = room();
        room.add_participant("a".into(), "Ana".into(), false, now).unwrap();
        let err = room.add_participant("b".into(), "ANA".into(), false, now);
        assert_eq!(err.unwrap_err(), GameError::NameTaken);
        // observers are exempt
        assert!(room.add_participant("c".into(), "ana".into(), true, now).is_ok());
    }

    #[test]
    fn cap_ignores_observers() {
        let (mut room, now) = room();
        for (id, name) in [("a", "A"), ("b", "B"), ("c", "C")] {
            room.add_participant(id.into(), name.into(), false, now).unwrap();
        }
        let err = room.add_participant("d".into(), "D".into(), false, now);
        assert_eq!(err.unwrap_err(), GameError::RoomFull);
        assert!(room.add_participant("e".into(), "Admin".into(), true, now).is_ok());
        assert_eq!(room.non_privileged_roster().count(), 3);
    }

    #[test]
    fn started_rooms_only_admit_observers() {
        let (mut room, now) = room();
        room.add_participant("a".into(), "A".into(), false, now).unwrap();
        room.status = RoomStatus::Playing;
        let err = room.add_participant("b".into(), "B".into(), false, now);
        assert_eq!(err.unwrap_err(), GameError::GameInProgress);
        let observer = room.add_participant("c".into(), "Admin".into(), true, now).unwrap();
        assert!(observer.is_privileged);
        assert!(!observer.is_host);
    }

    #[test]
    fn host_passes_to_latest_joiner() {
        let (mut room, now) = room();
        room.add_participant("a".into(), "A".into(), false, now).unwrap();
        room.add_participant("b".into(), "B".into(), false, now).unwrap();
        room.add_participant("c".into(), "C".into(), false, now).unwrap();

        let removed = room.remove_participant("a", now).unwrap();
        assert!(removed.is_host);
        assert!(room.participant("c").unwrap().is_host);
        assert!(!room.participant("b").unwrap().is_host);
    }

    #[test]
    fn host_never_passes_to_observer() {
        let (mut room, now) = room();
        room.add_participant("a".into(), "A".into(), false, now).unwrap();
        room.add_participant("b".into(), "B".into(), false, now).unwrap();
        room.add_participant("z".into(), "Admin".into(), true, now).unwrap();

        room.remove_participant("a", now);
        assert!(room.participant("b").unwrap().is_host);
        assert!(!room.participant("z").unwrap().is_host);
    }

    #[test]
    fn removing_stranger_is_noop() {
        let (mut room, now) = room();
        room.add_participant("a".into(), "A".into(), false, now).unwrap();
        assert!(room.remove_participant("nobody", now).is_none());
        assert_eq!(room.participants().len(), 1);
    }

    #[test]
    fn can_start_needs_two_players_while_waiting() {
        let (mut room, now) = room();
        room.add_participant("a".into(), "A".into(), false, now).unwrap();
        room.add_participant("z".into(), "Admin".into(), true, now).unwrap();
        assert!(!room.can_start(2));
        room.add_participant("b".into(), "B".into(), false, now).unwrap();
        assert!(room.can_start(2));
        room.status = RoomStatus::Finished;
        assert!(!room.can_start(2));
    }

    #[test]
    fn replay_clears_scores() {
        let (mut room, now) = room();
        room.add_participant("a".into(), "A".into(), false, now).unwrap();
        {
            let a = room.participant_mut("a").unwrap();
            a.score = 15;
            a.has_played = true;
        }
        room.status = RoomStatus::Finished;
        room.round_counter = 2;

        room.reset_for_replay(now);

        let a = room.participant("a").unwrap();
        assert_eq!((a.score, a.has_played), (0, false));
        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.round_counter, 0);
    }
}
