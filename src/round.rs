use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::participant::{ConnectionId, Participant};
use crate::scoring;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Writing,
    Guessing,
    Results,
}

/// Identity of the turn-holder, copied when the round starts so the round
/// stays renderable if the roster changes underneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnHolder {
    pub id: ConnectionId,
    pub name: String,
    pub is_host: bool,
}

impl From<&Participant> for TurnHolder {
    fn from(p: &Participant) -> Self {
        TurnHolder {
            id: p.id.clone(),
            name: p.name.clone(),
            is_host: p.is_host,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub id: ConnectionId,
    pub name: String,
    pub score: u32,
    pub is_host: bool,
    pub is_privileged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements {
    pub statements: [String; 3],
    pub lie_index: usize,
}

impl Statements {
    /// Shuffles the three statements, keeping `lie_index` on the lie's text.
    pub fn shuffled<R: Rng + ?Sized>(statements: [String; 3], lie_index: usize, rng: &mut R) -> Self {
        let mut order = [0usize, 1, 2];
        order.shuffle(rng);
        let new_lie = order.iter().position(|&from| from == lie_index).unwrap_or(lie_index);
        let shuffled = order.map(|from| statements[from].clone());
        Statements {
            statements: shuffled,
            lie_index: new_lie,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessRecord {
    pub guess: usize,
    pub points: u32,
    pub time_remaining_secs: u64,
}

pub struct RoundState {
    pub turn_holder: TurnHolder,
    pub phase: Phase,
    /// 1-based.
    pub round: u32,
    pub total_rounds: u32,
    pub scores: Vec<ScoreEntry>,
    pub statements: Option<Statements>,
    pub guesses: BTreeMap<ConnectionId, GuessRecord>,
    pub time_budget: Duration,
    pub phase_started: Instant,
}

impl RoundState {
    pub fn new(
        turn_holder: TurnHolder,
        round: u32,
        total_rounds: u32,
        participants: &[Participant],
        writing_time: Duration,
        now: Instant,
    ) -> Self {
        let mut state = RoundState {
            turn_holder,
            phase: Phase::Writing,
            round,
            total_rounds,
            scores: Vec::new(),
            statements: None,
            guesses: BTreeMap::new(),
            time_budget: writing_time,
            phase_started: now,
        };
        state.refresh_scores(participants);
        state
    }

    pub fn set_statements(
        &mut self,
        statements: Statements,
        guessing_time: Duration,
        now: Instant,
    ) -> Result<(), GameError> {
        if self.phase != Phase::Writing {
            return Err(GameError::NotInWritingPhase);
        }
        self.statements = Some(statements);
        self.phase = Phase::Guessing;
        self.guesses.clear();
        self.time_budget = guessing_time;
        self.phase_started = now;
        Ok(())
    }

    /// Records (or replaces) a guess and returns `(new points, points it replaced)`.
    pub fn record_guess(
        &mut self,
        guesser: &str,
        guess: usize,
        time_remaining: Duration,
    ) -> Result<(u32, u32), GameError> {
        if self.phase != Phase::Guessing {
            return Err(GameError::NotInGuessingPhase);
        }
        let lie_index = self
            .statements
            .as_ref()
            .map(|s| s.lie_index)
            .ok_or(GameError::NotInGuessingPhase)?;

        let points = if guess == lie_index {
            scoring::points_for(time_remaining, self.time_budget)
        } else {
            0
        };
        let previous = self.guesses.insert(
            guesser.to_string(),
            GuessRecord {
                guess,
                points,
                time_remaining_secs: time_remaining.as_secs(),
            },
        );
        Ok((points, previous.map_or(0, |g| g.points)))
    }

    /// Every eligible guesser still in the room has answered.
    pub fn is_complete(&self, participants: &[Participant]) -> bool {
        participants
            .iter()
            .filter(|p| p.is_player() && p.id != self.turn_holder.id)
            .all(|p| self.guesses.contains_key(&p.id))
    }

    /// Moves to `results`; the budget becomes the pause before the next turn.
    pub fn close(&mut self, results_delay: Duration, now: Instant) {
        self.phase = Phase::Results;
        self.time_budget = results_delay;
        self.phase_started = now;
    }

    pub fn time_left(&self, now: Instant) -> Duration {
        self.time_budget
            .saturating_sub(now.saturating_duration_since(self.phase_started))
    }

    pub fn refresh_scores(&mut self, participants: &[Participant]) {
        self.scores = participants
            .iter()
            .map(|p| ScoreEntry {
                id: p.id.clone(),
                name: p.name.clone(),
                score: p.score,
                is_host: p.is_host,
                is_privileged: p.is_privileged,
            })
            .collect();
    }

    /// What clients get to see. The lie and individual guesses stay hidden
    /// until the round is in `results`.
    pub fn view(&self, now: Instant) -> RoundView {
        let reveal = self.phase == Phase::Results;
        RoundView {
            turn_holder: self.turn_holder.clone(),
            phase: self.phase,
            round: self.round,
            total_rounds: self.total_rounds,
            players: self.scores.clone(),
            statements: self.statements.as_ref().map(|s| s.statements.clone()),
            lie_index: self
                .statements
                .as_ref()
                .filter(|_| reveal)
                .map(|s| s.lie_index),
            guessed: self.guesses.keys().cloned().collect(),
            guesses: if reveal {
                self.guesses.clone()
            } else {
                BTreeMap::new()
            },
            time_left: self.time_left(now).as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundView {
    pub turn_holder: TurnHolder,
    pub phase: Phase,
    pub round: u32,
    pub total_rounds: u32,
    pub players: Vec<ScoreEntry>,
    pub statements: Option<[String; 3]>,
    pub lie_index: Option<usize>,
    pub guessed: Vec<ConnectionId>,
    pub guesses: BTreeMap<ConnectionId, GuessRecord>,
    pub time_left: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn triple() -> [String; 3] {
        ["I have a cat".into(), "I was born in June".into(), "I can fly".into()]
    }

    fn players() -> Vec<Participant> {
        ["a", "b", "c"]
            .iter()
            .map(|id| Participant::new((*id).to_string(), id.to_uppercase(), false))
            .collect()
    }

    fn round_for(holder: &Participant, now: Instant) -> RoundState {
        RoundState::new(holder.into(), 1, 3, &players(), Duration::from_secs(60), now)
    }

    #[test]
    fn shuffle_keeps_the_lie_for_every_position() {
        for seed in 0..32 {
            for lie in 0..3 {
                let mut rng = StdRng::seed_from_u64(seed);
                let original = triple();
                let shuffled = Statements::shuffled(original.clone(), lie, &mut rng);

                assert_eq!(shuffled.statements[shuffled.lie_index], original[lie]);
                let mut a = shuffled.statements.to_vec();
                let mut b = original.to_vec();
                a.sort();
                b.sort();
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn statements_move_to_guessing() {
        let now = Instant::now();
        let players = players();
        let mut round = round_for(&players[0], now);
        assert_eq!(round.phase, Phase::Writing);
        assert!(round.statements.is_none());

        let statements = Statements { statements: triple(), lie_index: 2 };
        round.set_statements(statements.clone(), Duration::from_secs(45), now).unwrap();
        assert_eq!(round.phase, Phase::Guessing);
        assert_eq!(round.time_budget, Duration::from_secs(45));

        let again = round.set_statements(statements, Duration::from_secs(45), now);
        assert_eq!(again.unwrap_err(), GameError::NotInWritingPhase);
    }

    #[test]
    fn guesses_need_guessing_phase() {
        let now = Instant::now();
        let players = players();
        let mut round = round_for(&players[0], now);
        let err = round.record_guess("b", 0, Duration::from_secs(40));
        assert_eq!(err.unwrap_err(), GameError::NotInGuessingPhase);
    }

    #[test]
    fn second_guess_replaces_first() {
        let now = Instant::now();
        let players = players();
        let mut round = round_for(&players[0], now);
        let statements = Statements { statements: triple(), lie_index: 1 };
        round.set_statements(statements, Duration::from_secs(45), now).unwrap();

        let first = round.record_guess("b", 1, Duration::from_secs(41)).unwrap();
        assert_eq!(first, (10, 0));
        let second = round.record_guess("b", 0, Duration::from_secs(40)).unwrap();
        assert_eq!(second, (0, 10));
        assert_eq!(round.guesses.len(), 1);
        assert_eq!(round.guesses["b"].guess, 0);
    }

    #[test]
    fn complete_when_every_other_player_guessed() {
        let now = Instant::now();
        let mut roster = players();
        roster.push(Participant::new("z".into(), "Admin".into(), true));
        let mut round = round_for(&roster[0], now);
        let statements = Statements { statements: triple(), lie_index: 0 };
        round.set_statements(statements, Duration::from_secs(45), now).unwrap();

        assert!(!round.is_complete(&roster));
        round.record_guess("b", 0, Duration::from_secs(30)).unwrap();
        assert!(!round.is_complete(&roster));
        round.record_guess("c", 2, Duration::from_secs(30)).unwrap();
        assert!(round.is_complete(&roster));
    }

    #[test]
    fn view_hides_answer_until_results() {
        let now = Instant::now();
        let players = players();
        let mut round = round_for(&players[0], now);
        let statements = Statements { statements: triple(), lie_index: 2 };
        round.set_statements(statements, Duration::from_secs(45), now).unwrap();
        round.record_guess("b", 2, Duration::from_secs(44)).unwrap();

        let hidden = round.view(now + Duration::from_secs(5));
        assert_eq!(hidden.lie_index, None);
        assert!(hidden.guesses.is_empty());
        assert_eq!(hidden.guessed, vec!["b".to_string()]);
        assert_eq!(hidden.time_left, 40);

        round.close(Duration::from_secs(8), now);
        let shown = round.view(now);
        assert_eq!(shown.lie_index, Some(2));
        assert_eq!(shown.guesses["b"].points, 10);
    }
}
