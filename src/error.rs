use thiserror::Error;

/// Every way a client action can be refused.
///
/// All variants are recoverable: the gateway turns them into an `error`
/// event for the originating connection and carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("Game already started, cannot join")]
    GameInProgress,
    #[error("Name is already taken in this room")]
    NameTaken,
    #[error("At least {0} players are needed to start the game")]
    InsufficientPlayers(usize),
    #[error("Statements can only be submitted during the writing phase")]
    NotInWritingPhase,
    #[error("Guesses can only be submitted during the guessing phase")]
    NotInGuessingPhase,
    #[error("The round is not showing results")]
    NotInResultsPhase,
    #[error("No round is in progress")]
    NoActiveRound,
    #[error("Invalid credentials")]
    Unauthorized,
    #[error("Only the current turn-holder can submit statements")]
    NotTurnHolder,
    #[error("You cannot guess in this round")]
    NotAGuesser,
    #[error("Only the host can do that")]
    NotHost,
    #[error("You are not in this room")]
    NotInRoom,
    #[error("Too many rooms are open, try again later")]
    TooManyRooms,
    #[error("{0}")]
    InvalidInput(String),
}

impl GameError {
    /// Stable code sent alongside the human-readable message.
    pub fn kind(&self) -> &'static str {
        match self {
            GameError::RoomNotFound => "room-not-found",
            GameError::RoomFull => "room-full",
            GameError::GameInProgress => "game-in-progress",
            GameError::NameTaken => "name-taken",
            GameError::InsufficientPlayers(_) => "insufficient-players",
            GameError::NotInWritingPhase => "not-in-writing-phase",
            GameError::NotInGuessingPhase => "not-in-guessing-phase",
            GameError::NotInResultsPhase => "not-in-results-phase",
            GameError::NoActiveRound => "no-active-round",
            GameError::Unauthorized => "unauthorized",
            GameError::NotTurnHolder => "not-turn-holder",
            GameError::NotAGuesser => "not-a-guesser",
            GameError::NotHost => "not-host",
            GameError::NotInRoom => "not-in-room",
            GameError::TooManyRooms => "too-many-rooms",
            GameError::InvalidInput(_) => "invalid-input",
        }
    }
}

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("No certificates found in {0}")]
    NoCertificates(String),
    #[error("No private key found in {0}")]
    NoPrivateKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct() {
        let all = [
            GameError::RoomNotFound,
            GameError::RoomFull,
            GameError::GameInProgress,
            GameError::NameTaken,
            GameError::InsufficientPlayers(2),
            GameError::NotInWritingPhase,
            GameError::NotInGuessingPhase,
            GameError::NotInResultsPhase,
            GameError::NoActiveRound,
            GameError::Unauthorized,
            GameError::NotTurnHolder,
            GameError::NotAGuesser,
            GameError::NotHost,
            GameError::NotInRoom,
            GameError::TooManyRooms,
            GameError::InvalidInput(String::new()),
        ];
        let mut kinds: Vec<_> = all.iter().map(GameError::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), all.len());
    }

    #[test]
    fn message_includes_minimum() {
        assert_eq!(
            GameError::InsufficientPlayers(3).to_string(),
            "At least 3 players are needed to start the game"
        );
    }
}
