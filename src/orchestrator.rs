//! Room registry and the per-room game state machine.
//!
//! Every method runs a single transition to completion against one room.
//! Timed transitions go through [`SessionOrchestrator::expire`], which only
//! acts when the room is still on the phase and generation the deadline was
//! armed for, so a round advances exactly once whichever trigger wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::clock::Clock;
use crate::config::GameConfig;
use crate::error::GameError;
use crate::participant::{ConnectionId, Participant};
use crate::room::{Room, RoomSnapshot, RoomStatus, RoomSummary};
use crate::round::{Phase, RoundState, RoundView, Statements, TurnHolder};
use crate::scoring::{self, Standing};
use crate::validation;

const ROOM_CODE_LEN: usize = 6;

/// A pending forced transition for one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub phase: Phase,
    pub generation: u64,
    pub after: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    NextTurn(RoundView),
    GameComplete(Vec<Standing>),
}

/// Progress made without the turn being played out normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The turn-holder was skipped (timeout, admin, or they left).
    Skipped { name: String, advance: Advance },
    RoundClosed(RoundView),
    Advanced(Advance),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessOutcome {
    pub points: u32,
    pub score: u32,
    pub round: RoundView,
    pub closed: Option<RoundView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementsOutcome {
    pub round: RoundView,
    /// Set when nobody is left to guess and the round went straight to results.
    pub closed: Option<RoundView>,
}

/// A successful create or join, plus the room the connection had to leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seated {
    pub room: RoomSnapshot,
    pub left: Option<Departure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room_id: String,
    pub participant: Participant,
    pub room_deleted: bool,
    /// Who is still attached to the room (or was, if it was just deleted).
    pub recipients: Vec<ConnectionId>,
    pub roster: Vec<Participant>,
    pub progress: Option<Progress>,
}

pub struct SessionOrchestrator {
    rooms: HashMap<String, Room>,
    memberships: HashMap<ConnectionId, String>,
    config: GameConfig,
    clock: Arc<dyn Clock>,
    rng: StdRng,
}

impl SessionOrchestrator {
    pub fn new(config: GameConfig, clock: Arc<dyn Clock>, rng: StdRng) -> Self {
        SessionOrchestrator {
            rooms: HashMap::new(),
            memberships: HashMap::new(),
            config,
            clock,
            rng,
        }
    }

    pub fn with_entropy(config: GameConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config, clock, StdRng::from_entropy())
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_of(&self, connection: &str) -> Option<&str> {
        self.memberships.get(connection).map(String::as_str)
    }

    pub fn recipients(&self, room_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(Room::connection_ids)
            .unwrap_or_default()
    }

    /// Seats the connection as host of a new room, leaving its current room
    /// only once the new one is certain to accept it.
    pub fn create_room(
        &mut self,
        connection: &str,
        room_name: &str,
        name: &str,
    ) -> Result<Seated, GameError> {
        let room_name = validation::room_name(room_name)?;
        let name = validation::display_name(name)?;
        if self.rooms.len() >= self.config.max_rooms {
            return Err(GameError::TooManyRooms);
        }

        let left = self.leave_room(connection);
        let now = self.clock.now();
        let id = self.unused_room_code();
        let mut room = Room::new(id.clone(), room_name, self.config.max_players, now);
        room.add_participant(connection.to_string(), name, false, now)?;
        let snapshot = room.snapshot(now);

        info!("Room {} created by {}", id, connection);
        self.rooms.insert(id.clone(), room);
        self.memberships.insert(connection.to_string(), id);
        Ok(Seated { room: snapshot, left })
    }

    /// Seats the connection in an existing room. Joining the room it already
    /// sits in changes nothing.
    pub fn join_room(
        &mut self,
        connection: &str,
        room_id: &str,
        name: &str,
        is_privileged: bool,
    ) -> Result<Seated, GameError> {
        let name = validation::display_name(name)?;
        let room_id = validation::room_code(room_id);
        let now = self.clock.now();

        let room = self.rooms.get(&room_id).ok_or(GameError::RoomNotFound)?;
        if self.room_of(connection) == Some(room_id.as_str()) {
            return Ok(Seated {
                room: room.snapshot(now),
                left: None,
            });
        }
        room.admits(&name, is_privileged)?;

        let left = self.leave_room(connection);
        let room = self.rooms.get_mut(&room_id).ok_or(GameError::RoomNotFound)?;
        room.add_participant(connection.to_string(), name, is_privileged, now)?;
        room.refresh_round_scores();
        let snapshot = room.snapshot(now);

        debug!("{} joined room {} (privileged: {})", connection, room_id, is_privileged);
        self.memberships.insert(connection.to_string(), room_id);
        Ok(Seated { room: snapshot, left })
    }

    pub fn start_game(&mut self, room_id: &str, requester: &str) -> Result<RoundView, GameError> {
        let now = self.clock.now();
        let min_players = self.config.min_players;
        let room = self.rooms.get_mut(room_id).ok_or(GameError::RoomNotFound)?;

        let caller = room.participant(requester).ok_or(GameError::NotInRoom)?;
        if !caller.is_host && !caller.is_privileged {
            return Err(GameError::NotHost);
        }
        if !room.can_start(min_players) {
            return Err(GameError::InsufficientPlayers(min_players));
        }

        room.status = RoomStatus::Playing;
        room.round_counter = 0;
        for id in room.connection_ids() {
            if let Some(p) = room.participant_mut(&id) {
                p.has_played = false;
            }
        }
        room.touch(now);

        info!("Game started in room {}", room_id);
        begin_round(room, &mut self.rng, &self.config, now).ok_or(GameError::InsufficientPlayers(min_players))
    }

    pub fn submit_statements(
        &mut self,
        room_id: &str,
        connection: &str,
        statements: &[String],
        lie_index: usize,
    ) -> Result<StatementsOutcome, GameError> {
        let statements = validation::statements(statements, lie_index)?;
        let now = self.clock.now();
        let room = self.rooms.get_mut(room_id).ok_or(GameError::RoomNotFound)?;
        let round = room.round.as_mut().ok_or(GameError::NotInWritingPhase)?;

        if round.phase != Phase::Writing {
            return Err(GameError::NotInWritingPhase);
        }
        if round.turn_holder.id != connection {
            return Err(GameError::NotTurnHolder);
        }

        let shuffled = Statements::shuffled(statements, lie_index, &mut self.rng);
        round.set_statements(shuffled, self.config.guessing_time, now)?;
        let view = round.view(now);

        if let Some(holder) = room.participant_mut(connection) {
            holder.has_played = true;
        }
        room.bump_generation();
        room.touch(now);

        // every guesser may have left while the statements were being written
        let closed = if room.is_round_complete() {
            close_round(room, self.config.results_delay, now)
        } else {
            None
        };
        Ok(StatementsOutcome { round: view, closed })
    }

    pub fn submit_guess(
        &mut self,
        room_id: &str,
        connection: &str,
        guess_index: usize,
    ) -> Result<GuessOutcome, GameError> {
        let guess_index = validation::choice(guess_index)?;
        let now = self.clock.now();
        let room = self.rooms.get_mut(room_id).ok_or(GameError::RoomNotFound)?;

        let is_player = room
            .participant(connection)
            .map(Participant::is_player)
            .ok_or(GameError::NotInRoom)?;
        let round = room.round.as_mut().ok_or(GameError::NotInGuessingPhase)?;
        if round.phase != Phase::Guessing {
            return Err(GameError::NotInGuessingPhase);
        }
        if !is_player || round.turn_holder.id == connection {
            return Err(GameError::NotAGuesser);
        }

        let remaining = round.time_left(now);
        let (points, replaced) = round.record_guess(connection, guess_index, remaining)?;

        let score = match room.participant_mut(connection) {
            Some(guesser) => {
                guesser.score = guesser.score.saturating_sub(replaced) + points;
                guesser.score
            }
            None => 0,
        };
        room.refresh_round_scores();
        room.touch(now);

        let round = room.round.as_ref().map(|r| r.view(now)).ok_or(GameError::NotInGuessingPhase)?;
        let closed = if room.is_round_complete() {
            close_round(room, self.config.results_delay, now)
        } else {
            None
        };

        Ok(GuessOutcome {
            points,
            score,
            round,
            closed,
        })
    }

    /// Ends the current turn and moves to the next unplayed participant.
    pub fn advance_turn(&mut self, room_id: &str) -> Result<Advance, GameError> {
        let now = self.clock.now();
        let room = self.rooms.get_mut(room_id).ok_or(GameError::RoomNotFound)?;
        if room.status != RoomStatus::Playing {
            return Err(GameError::NoActiveRound);
        }
        Ok(advance(room, &mut self.rng, &self.config, now))
    }

    /// Advance from `results` before the delay runs out.
    pub fn force_advance(&mut self, room_id: &str, connection: &str) -> Result<Advance, GameError> {
        let room = self.rooms.get(room_id).ok_or(GameError::RoomNotFound)?;
        if room.participant(connection).is_none() {
            return Err(GameError::NotInRoom);
        }
        if room.round.as_ref().map(|r| r.phase) != Some(Phase::Results) {
            return Err(GameError::NotInResultsPhase);
        }
        self.advance_turn(room_id)
    }

    /// Ends the current turn early, whatever its phase. Returns the skipped name.
    pub fn skip_turn_holder(&mut self, room_id: &str) -> Result<(String, Advance), GameError> {
        let now = self.clock.now();
        let room = self.rooms.get_mut(room_id).ok_or(GameError::RoomNotFound)?;
        if room.status != RoomStatus::Playing || room.round.is_none() {
            return Err(GameError::NoActiveRound);
        }
        Ok(skip(room, &mut self.rng, &self.config, now))
    }

    /// The forced transition the room is currently waiting on, if any.
    pub fn next_deadline(&self, room_id: &str) -> Option<Deadline> {
        let room = self.rooms.get(room_id)?;
        if room.status != RoomStatus::Playing {
            return None;
        }
        let round = room.round.as_ref()?;
        Some(Deadline {
            phase: round.phase,
            generation: room.generation,
            after: round.time_left(self.clock.now()),
        })
    }

    /// Applies a fired deadline. Stale deadlines are ignored.
    pub fn expire(&mut self, room_id: &str, deadline: Deadline) -> Option<Progress> {
        let now = self.clock.now();
        let room = self.rooms.get_mut(room_id)?;
        let current = room.round.as_ref().map(|r| r.phase);
        if room.status != RoomStatus::Playing
            || current != Some(deadline.phase)
            || room.generation != deadline.generation
        {
            debug!(
                "Ignoring stale {:?} deadline for room {} (generation {} vs {})",
                deadline.phase, room_id, deadline.generation, room.generation
            );
            return None;
        }

        let progress = match deadline.phase {
            Phase::Writing => {
                let (name, advance) = skip(room, &mut self.rng, &self.config, now);
                Progress::Skipped { name, advance }
            }
            Phase::Guessing => Progress::RoundClosed(close_round(room, self.config.results_delay, now)?),
            Phase::Results => Progress::Advanced(advance(room, &mut self.rng, &self.config, now)),
        };
        Some(progress)
    }

    /// Drops a connection from whatever room it is in.
    pub fn leave_room(&mut self, connection: &str) -> Option<Departure> {
        let room_id = self.memberships.remove(connection)?;
        let now = self.clock.now();
        let room = self.rooms.get_mut(&room_id)?;
        let participant = room.remove_participant(connection, now)?;

        if room.status == RoomStatus::Waiting && !room.has_players() {
            let recipients = self.delete_room(&room_id).map(|r| r.connection_ids()).unwrap_or_default();
            info!("Room {} closed, last player left", room_id);
            return Some(Departure {
                room_id,
                participant,
                room_deleted: true,
                recipients,
                roster: Vec::new(),
                progress: None,
            });
        }

        let mut progress = None;
        if room.status == RoomStatus::Playing {
            let state = room
                .round
                .as_ref()
                .map(|r| (r.phase, r.turn_holder.id == participant.id));
            match state {
                Some((Phase::Writing | Phase::Guessing, true)) => {
                    debug!("Turn-holder {} left room {}, forfeiting turn", connection, room_id);
                    let (name, advance) = skip(room, &mut self.rng, &self.config, now);
                    progress = Some(Progress::Skipped { name, advance });
                }
                Some((Phase::Guessing, false)) if room.is_round_complete() => {
                    progress = close_round(room, self.config.results_delay, now).map(Progress::RoundClosed);
                }
                _ => room.refresh_round_scores(),
            }
        }

        Some(Departure {
            room_id,
            participant,
            room_deleted: false,
            recipients: room.connection_ids(),
            roster: room.participants().to_vec(),
            progress,
        })
    }

    /// Puts a finished room back in the lobby.
    pub fn reset_room(&mut self, room_id: &str, requester: &str) -> Result<RoomSnapshot, GameError> {
        let now = self.clock.now();
        let room = self.rooms.get_mut(room_id).ok_or(GameError::RoomNotFound)?;
        let caller = room.participant(requester).ok_or(GameError::NotInRoom)?;
        if !caller.is_host && !caller.is_privileged {
            return Err(GameError::NotHost);
        }
        match room.status {
            RoomStatus::Playing => return Err(GameError::GameInProgress),
            RoomStatus::Finished => room.reset_for_replay(now),
            RoomStatus::Waiting => {}
        }
        Ok(room.snapshot(now))
    }

    /// Deletes a finished room on request of one of its members.
    pub fn close_room(&mut self, room_id: &str, requester: &str) -> Result<Vec<ConnectionId>, GameError> {
        let room = self.rooms.get(room_id).ok_or(GameError::RoomNotFound)?;
        if room.participant(requester).is_none() {
            return Err(GameError::NotInRoom);
        }
        if room.status != RoomStatus::Finished {
            return Err(GameError::GameInProgress);
        }
        Ok(self
            .delete_room(room_id)
            .map(|r| r.connection_ids())
            .unwrap_or_default())
    }

    pub fn delete_room(&mut self, room_id: &str) -> Option<Room> {
        let room = self.rooms.remove(room_id)?;
        for id in room.connection_ids() {
            self.memberships.remove(&id);
        }
        Some(room)
    }

    /// Removes rooms with no activity for longer than the idle window.
    pub fn sweep_idle(&mut self) -> Vec<(String, Vec<ConnectionId>)> {
        let now = self.clock.now();
        let idle_timeout = self.config.idle_timeout;
        let stale: Vec<String> = self
            .rooms
            .values()
            .filter(|room| now.saturating_duration_since(room.last_activity) > idle_timeout)
            .map(|room| room.id.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| {
                let room = self.delete_room(&id)?;
                info!("Swept idle room {}", id);
                Some((id, room.connection_ids()))
            })
            .collect()
    }

    /// Rooms a new player could join right now.
    pub fn available_rooms(&self) -> Vec<RoomSummary> {
        self.sorted_rooms()
            .filter(|room| room.status == RoomStatus::Waiting && !room.is_full())
            .map(Room::summary)
            .collect()
    }

    pub fn all_rooms(&self) -> Vec<RoomSummary> {
        self.sorted_rooms().map(Room::summary).collect()
    }

    fn sorted_rooms(&self) -> impl Iterator<Item = &Room> {
        let mut rooms: Vec<&Room> = self.rooms.values().collect();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rooms.into_iter()
    }

    fn unused_room_code(&mut self) -> String {
        loop {
            let code: String = (&mut self.rng)
                .sample_iter(&Alphanumeric)
                .take(ROOM_CODE_LEN)
                .map(char::from)
                .collect::<String>()
                .to_uppercase();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }
}

/// Picks a random participant who has not had a turn yet and opens a round for them.
fn begin_round(room: &mut Room, rng: &mut StdRng, config: &GameConfig, now: Instant) -> Option<RoundView> {
    let unplayed: Vec<&Participant> = room.non_privileged_roster().filter(|p| !p.has_played).collect();
    let remaining = u32::try_from(unplayed.len()).unwrap_or(u32::MAX);
    let holder = unplayed.choose(rng).map(|p| TurnHolder::from(*p))?;

    let round = RoundState::new(
        holder,
        room.round_counter + 1,
        room.round_counter + remaining,
        room.participants(),
        config.writing_time,
        now,
    );
    let view = round.view(now);
    debug!("Room {} round {}: {} writes", room.id, round.round, round.turn_holder.name);
    room.round = Some(round);
    room.bump_generation();
    Some(view)
}

fn advance(room: &mut Room, rng: &mut StdRng, config: &GameConfig, now: Instant) -> Advance {
    room.round_counter += 1;
    room.round = None;
    room.touch(now);
    match begin_round(room, rng, config, now) {
        Some(view) => Advance::NextTurn(view),
        None => {
            room.status = RoomStatus::Finished;
            room.bump_generation();
            info!("Game finished in room {}", room.id);
            Advance::GameComplete(scoring::final_standings(room.participants()))
        }
    }
}

fn skip(room: &mut Room, rng: &mut StdRng, config: &GameConfig, now: Instant) -> (String, Advance) {
    let holder = room.round.as_ref().map(|r| r.turn_holder.clone());
    let name = match holder {
        Some(holder) => {
            if let Some(p) = room.participant_mut(&holder.id) {
                p.has_played = true;
            }
            holder.name
        }
        None => String::new(),
    };
    (name, advance(room, rng, config, now))
}

fn close_round(room: &mut Room, results_delay: Duration, now: Instant) -> Option<RoundView> {
    let round = room.round.as_mut()?;
    round.close(results_delay, now);
    let view = round.view(now);
    room.bump_generation();
    room.touch(now);
    Some(view)
}
