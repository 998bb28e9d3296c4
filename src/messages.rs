use serde::{Deserialize, Serialize};

use crate::participant::Participant;
use crate::room::{RoomSnapshot, RoomSummary};
use crate::round::RoundView;
use crate::scoring::Standing;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    CreateRoom {
        room_name: String,
        name: String,
    },
    JoinRoom {
        room_id: String,
        name: String,
        admin_passphrase: Option<String>,
    },
    StartGame {
        room_id: String,
    },
    SubmitStatements {
        room_id: String,
        statements: Vec<String>,
        lie_index: usize,
    },
    SubmitGuess {
        room_id: String,
        guess_index: usize,
    },
    ForceAdvance {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    AdminSkipPlayer {
        room_id: String,
        username: String,
        passphrase: String,
    },
    AdminListRooms {
        username: String,
        passphrase: String,
    },
    PlayAgain {
        room_id: String,
    },
    CloseRoom {
        room_id: String,
    },
    ListRooms,
}

impl ClientMessage {
    /// The room code a room-scoped message targets.
    pub fn room_id_mut(&mut self) -> Option<&mut String> {
        match self {
            ClientMessage::JoinRoom { room_id, .. }
            | ClientMessage::StartGame { room_id }
            | ClientMessage::SubmitStatements { room_id, .. }
            | ClientMessage::SubmitGuess { room_id, .. }
            | ClientMessage::ForceAdvance { room_id }
            | ClientMessage::LeaveRoom { room_id }
            | ClientMessage::AdminSkipPlayer { room_id, .. }
            | ClientMessage::PlayAgain { room_id }
            | ClientMessage::CloseRoom { room_id } => Some(room_id),
            ClientMessage::CreateRoom { .. }
            | ClientMessage::AdminListRooms { .. }
            | ClientMessage::ListRooms => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    RoomCreated {
        room: RoomSnapshot,
    },
    RoomJoined {
        room: RoomSnapshot,
    },
    RosterUpdated {
        participants: Vec<Participant>,
    },
    GameStarted {
        round: RoundView,
    },
    StatementsReady {
        round: RoundView,
    },
    GuessRecorded {
        round: RoundView,
    },
    ScoreUpdated {
        points: u32,
        score: u32,
    },
    RoundComplete {
        round: RoundView,
    },
    PlayerSkipped {
        name: String,
    },
    NextTurn {
        round: RoundView,
    },
    GameComplete {
        standings: Vec<Standing>,
    },
    RoomReset {
        room: RoomSnapshot,
    },
    RoomClosed {
        room_id: String,
    },
    LeftRoom {
        room_id: String,
    },
    RoomList {
        rooms: Vec<RoomSummary>,
    },
    RoomListUpdated {
        rooms: Vec<RoomSummary>,
    },
    Error {
        kind: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_kebab_tags() {
        let raw = r#"{"type":"submit-statements","room_id":"AB12CD","statements":["a","b","c"],"lie_index":2}"#;
        let parsed: ClientMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed,
            ClientMessage::SubmitStatements {
                room_id: "AB12CD".into(),
                statements: vec!["a".into(), "b".into(), "c".into()],
                lie_index: 2,
            }
        );

        let list: ClientMessage = serde_json::from_str(r#"{"type":"list-rooms"}"#).unwrap();
        assert_eq!(list, ClientMessage::ListRooms);
    }

    #[test]
    fn passphrase_is_optional() {
        let raw = r#"{"type":"join-room","room_id":"AB12CD","name":"Ana"}"#;
        match serde_json::from_str::<ClientMessage>(raw).unwrap() {
            ClientMessage::JoinRoom { admin_passphrase, .. } => assert!(admin_passphrase.is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn room_scoped_messages_expose_code() {
        let mut start = ClientMessage::StartGame { room_id: "ab12cd".into() };
        assert_eq!(start.room_id_mut().map(|id| id.as_str()), Some("ab12cd"));
        assert!(ClientMessage::ListRooms.room_id_mut().is_none());
    }

    #[test]
    fn errors_carry_kind() {
        let json = serde_json::to_value(ServerMessage::Error {
            kind: "room-full".into(),
            message: "Room is full".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["kind"], "room-full");
    }
}
