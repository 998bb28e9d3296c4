use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use crate::admin::CredentialCheck;
use crate::error::GameError;
use crate::messages::{ClientMessage, ServerMessage};
use crate::orchestrator::{Advance, Deadline, Departure, Progress, Seated, SessionOrchestrator};
use crate::participant::ConnectionId;
use crate::room::RoomSnapshot;
use crate::validation;

type Connections = Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>>;

enum Target {
    One(ConnectionId),
    Many(Vec<ConnectionId>),
    Everyone,
}

struct Outbound {
    target: Target,
    message: ServerMessage,
}

/// Result of one event: what to send, and which rooms need their timer re-armed.
#[derive(Default)]
struct Dispatch {
    outbound: Vec<Outbound>,
    rearm: Vec<String>,
}

impl Dispatch {
    fn to(&mut self, id: &str, message: ServerMessage) {
        self.outbound.push(Outbound {
            target: Target::One(id.to_string()),
            message,
        });
    }

    fn to_many(&mut self, ids: &[ConnectionId], message: ServerMessage) {
        self.outbound.push(Outbound {
            target: Target::Many(ids.to_vec()),
            message,
        });
    }

    fn to_everyone(&mut self, message: ServerMessage) {
        self.outbound.push(Outbound {
            target: Target::Everyone,
            message,
        });
    }

    fn advance(&mut self, ids: &[ConnectionId], advance: Advance) {
        match advance {
            Advance::NextTurn(round) => self.to_many(ids, ServerMessage::NextTurn { round }),
            Advance::GameComplete(standings) => {
                self.to_many(ids, ServerMessage::GameComplete { standings });
            }
        }
    }

    fn progress(&mut self, ids: &[ConnectionId], progress: Progress) {
        match progress {
            Progress::Skipped { name, advance } => {
                self.to_many(ids, ServerMessage::PlayerSkipped { name });
                self.advance(ids, advance);
            }
            Progress::RoundClosed(round) => self.to_many(ids, ServerMessage::RoundComplete { round }),
            Progress::Advanced(advance) => self.advance(ids, advance),
        }
    }

    fn room_list(&mut self, orchestrator: &SessionOrchestrator) {
        self.to_everyone(ServerMessage::RoomListUpdated {
            rooms: orchestrator.available_rooms(),
        });
    }

    /// Announces a successful create or join, after the room it replaced.
    fn seated(
        &mut self,
        orchestrator: &SessionOrchestrator,
        id: &str,
        seated: Seated,
        reply: impl FnOnce(RoomSnapshot) -> ServerMessage,
    ) {
        let Seated { room, left } = seated;
        if let Some(departure) = left {
            self.departure(orchestrator, departure);
        }
        let ids = orchestrator.recipients(&room.id);
        let participants = room.participants.clone();
        self.to(id, reply(room));
        self.to_many(&ids, ServerMessage::RosterUpdated { participants });
        self.room_list(orchestrator);
    }

    fn departure(&mut self, orchestrator: &SessionOrchestrator, departure: Departure) {
        let Departure {
            room_id,
            participant,
            room_deleted,
            recipients,
            roster,
            progress,
        } = departure;
        debug!("{} ({}) left room {}", participant.name, participant.id, room_id);

        if room_deleted {
            self.to_many(&recipients, ServerMessage::RoomClosed { room_id: room_id.clone() });
        } else {
            self.to_many(&recipients, ServerMessage::RosterUpdated { participants: roster });
            if let Some(progress) = progress {
                self.progress(&recipients, progress);
            }
        }
        self.room_list(orchestrator);
        self.rearm.push(room_id);
    }
}

struct ArmedTimer {
    deadline: Deadline,
    handle: JoinHandle<()>,
}

/// Owns the sockets and the phase timers; all game state lives behind the
/// orchestrator lock, so one event is fully applied before the next.
#[derive(Clone)]
pub struct Server {
    orchestrator: Arc<Mutex<SessionOrchestrator>>,
    connections: Connections,
    timers: Arc<Mutex<HashMap<String, ArmedTimer>>>,
    admin: Arc<dyn CredentialCheck>,
}

impl Server {
    pub fn new(orchestrator: SessionOrchestrator, admin: Arc<dyn CredentialCheck>) -> Self {
        Server {
            orchestrator: Arc::new(Mutex::new(orchestrator)),
            connections: Arc::new(RwLock::new(HashMap::new())),
            timers: Arc::new(Mutex::new(HashMap::new())),
            admin,
        }
    }

    pub async fn handle_connection(&self, ws: WebSocket) {
        let participant_id = Uuid::new_v4().to_string();
        let (mut ws_tx, mut ws_rx) = ws.split();
        let mut rx = self.register(&participant_id).await;
        info!("Connection {} opened", participant_id);

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_tx.send(message).await {
                    warn!("Failed to send WebSocket message: {}", e);
                    break;
                }
            }
        });

        while let Some(result) = ws_rx.next().await {
            match result {
                Ok(msg) if msg.is_close() => break,
                Ok(msg) => {
                    if let Ok(text) = msg.to_str() {
                        self.handle_text(&participant_id, text).await;
                    }
                }
                Err(e) => {
                    error!("WebSocket error on {}: {}", participant_id, e);
                    break;
                }
            }
        }

        self.handle_disconnect(&participant_id).await;
        info!("Connection {} closed", participant_id);
    }

    pub(crate) async fn register(&self, participant_id: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .write()
            .await
            .insert(participant_id.to_string(), tx);
        rx
    }

    pub async fn handle_text(&self, participant_id: &str, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle_client_message(participant_id, message).await,
            Err(e) => {
                warn!("Malformed message from {}: {}", participant_id, e);
                let mut dispatch = Dispatch::default();
                reject(&mut dispatch, participant_id, &GameError::InvalidInput("Malformed message".to_string()));
                self.deliver(dispatch.outbound).await;
            }
        }
    }

    pub async fn handle_client_message(&self, participant_id: &str, message: ClientMessage) {
        let dispatch = {
            let mut orchestrator = self.orchestrator.lock().await;
            let mut dispatch = Dispatch::default();
            if let Err(e) = self.apply(&mut orchestrator, participant_id, message, &mut dispatch) {
                debug!("Rejected action from {}: {}", participant_id, e);
                reject(&mut dispatch, participant_id, &e);
            }
            dispatch
        };
        self.finish(dispatch).await;
    }

    fn apply(
        &self,
        orchestrator: &mut SessionOrchestrator,
        id: &str,
        mut message: ClientMessage,
        dispatch: &mut Dispatch,
    ) -> Result<(), GameError> {
        if let Some(room_id) = message.room_id_mut() {
            *room_id = validation::room_code(room_id);
        }
        match message {
            ClientMessage::CreateRoom { room_name, name } => {
                let seated = orchestrator.create_room(id, &room_name, &name)?;
                dispatch.seated(orchestrator, id, seated, |room| ServerMessage::RoomCreated { room });
            }

            ClientMessage::JoinRoom {
                room_id,
                name,
                admin_passphrase,
            } => {
                let is_privileged = match admin_passphrase {
                    Some(passphrase) if self.admin.is_admin(&name, &passphrase) => true,
                    Some(_) => return Err(GameError::Unauthorized),
                    None => false,
                };
                let seated = orchestrator.join_room(id, &room_id, &name, is_privileged)?;
                dispatch.seated(orchestrator, id, seated, |room| ServerMessage::RoomJoined { room });
            }

            ClientMessage::StartGame { room_id } => {
                let round = orchestrator.start_game(&room_id, id)?;
                dispatch.to_many(&orchestrator.recipients(&room_id), ServerMessage::GameStarted { round });
                dispatch.room_list(orchestrator);
                dispatch.rearm.push(room_id);
            }

            ClientMessage::SubmitStatements {
                room_id,
                statements,
                lie_index,
            } => {
                let outcome = orchestrator.submit_statements(&room_id, id, &statements, lie_index)?;
                let ids = orchestrator.recipients(&room_id);
                dispatch.to_many(&ids, ServerMessage::StatementsReady { round: outcome.round });
                if let Some(round) = outcome.closed {
                    dispatch.to_many(&ids, ServerMessage::RoundComplete { round });
                }
                dispatch.rearm.push(room_id);
            }

            ClientMessage::SubmitGuess { room_id, guess_index } => {
                let outcome = orchestrator.submit_guess(&room_id, id, guess_index)?;
                let ids = orchestrator.recipients(&room_id);
                dispatch.to(
                    id,
                    ServerMessage::ScoreUpdated {
                        points: outcome.points,
                        score: outcome.score,
                    },
                );
                dispatch.to_many(&ids, ServerMessage::GuessRecorded { round: outcome.round });
                if let Some(round) = outcome.closed {
                    dispatch.to_many(&ids, ServerMessage::RoundComplete { round });
                    dispatch.rearm.push(room_id);
                }
            }

            ClientMessage::ForceAdvance { room_id } => {
                let advance = orchestrator.force_advance(&room_id, id)?;
                dispatch.advance(&orchestrator.recipients(&room_id), advance);
                dispatch.rearm.push(room_id);
            }

            ClientMessage::LeaveRoom { room_id } => {
                if orchestrator.room_of(id) != Some(room_id.as_str()) {
                    return Err(GameError::NotInRoom);
                }
                if let Some(departure) = orchestrator.leave_room(id) {
                    dispatch.to(id, ServerMessage::LeftRoom { room_id });
                    dispatch.departure(orchestrator, departure);
                }
            }

            ClientMessage::AdminSkipPlayer {
                room_id,
                username,
                passphrase,
            } => {
                if !self.admin.is_admin(&username, &passphrase) {
                    return Err(GameError::Unauthorized);
                }
                let (name, advance) = orchestrator.skip_turn_holder(&room_id)?;
                info!("Admin skipped {} in room {}", name, room_id);
                dispatch.progress(&orchestrator.recipients(&room_id), Progress::Skipped { name, advance });
                dispatch.rearm.push(room_id);
            }

            ClientMessage::AdminListRooms { username, passphrase } => {
                if !self.admin.is_admin(&username, &passphrase) {
                    return Err(GameError::Unauthorized);
                }
                dispatch.to(id, ServerMessage::RoomList { rooms: orchestrator.all_rooms() });
            }

            ClientMessage::PlayAgain { room_id } => {
                let room = orchestrator.reset_room(&room_id, id)?;
                dispatch.to_many(&orchestrator.recipients(&room_id), ServerMessage::RoomReset { room });
                dispatch.room_list(orchestrator);
            }

            ClientMessage::CloseRoom { room_id } => {
                let ids = orchestrator.close_room(&room_id, id)?;
                dispatch.to_many(&ids, ServerMessage::RoomClosed { room_id: room_id.clone() });
                dispatch.room_list(orchestrator);
                dispatch.rearm.push(room_id);
            }

            ClientMessage::ListRooms => {
                dispatch.to(id, ServerMessage::RoomList { rooms: orchestrator.available_rooms() });
            }
        }
        Ok(())
    }

    pub async fn handle_disconnect(&self, participant_id: &str) {
        self.connections.write().await.remove(participant_id);
        let dispatch = {
            let mut orchestrator = self.orchestrator.lock().await;
            let mut dispatch = Dispatch::default();
            if let Some(departure) = orchestrator.leave_room(participant_id) {
                dispatch.departure(&orchestrator, departure);
            }
            dispatch
        };
        self.finish(dispatch).await;
    }

    /// Deletes idle rooms and tells whoever is still attached.
    pub async fn sweep_idle(&self) {
        let dispatch = {
            let mut orchestrator = self.orchestrator.lock().await;
            let swept = orchestrator.sweep_idle();
            let mut dispatch = Dispatch::default();
            if swept.is_empty() {
                return;
            }
            for (room_id, ids) in swept {
                dispatch.to_many(&ids, ServerMessage::RoomClosed { room_id: room_id.clone() });
                dispatch.rearm.push(room_id);
            }
            dispatch.room_list(&orchestrator);
            dispatch
        };
        self.finish(dispatch).await;
    }

    async fn finish(&self, dispatch: Dispatch) {
        self.deliver(dispatch.outbound).await;
        for room_id in dispatch.rearm {
            self.rearm(&room_id).await;
        }
    }

    /// Replaces the room's pending timer with one for its current phase.
    async fn rearm(&self, room_id: &str) {
        let mut timers = self.timers.lock().await;
        if let Some(old) = timers.remove(room_id) {
            old.handle.abort();
        }
        let deadline = self.orchestrator.lock().await.next_deadline(room_id);
        let Some(deadline) = deadline else {
            return;
        };

        let server = self.clone();
        let room = room_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(deadline.after).await;
            server.fire(room, deadline).await;
        });
        debug!("Armed {:?} deadline for room {} in {:?}", deadline.phase, room_id, deadline.after);
        timers.insert(room_id.to_string(), ArmedTimer { deadline, handle });
    }

    /// Boxed because it re-arms the next timer, which spawns another `fire`.
    fn fire(&self, room_id: String, deadline: Deadline) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            {
                let mut timers = self.timers.lock().await;
                if timers.get(&room_id).is_some_and(|t| t.deadline == deadline) {
                    timers.remove(&room_id);
                }
            }

            let dispatch = {
                let mut orchestrator = self.orchestrator.lock().await;
                let Some(progress) = orchestrator.expire(&room_id, deadline) else {
                    return;
                };
                let mut dispatch = Dispatch::default();
                dispatch.progress(&orchestrator.recipients(&room_id), progress);
                dispatch.rearm.push(room_id);
                dispatch
            };
            self.finish(dispatch).await;
        })
    }

    async fn deliver(&self, outbound: Vec<Outbound>) {
        let connections = self.connections.read().await;
        for Outbound { target, message } in outbound {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode message: {}", e);
                    continue;
                }
            };
            match target {
                Target::One(id) => send(&connections, &id, &text),
                Target::Many(ids) => {
                    for id in ids {
                        send(&connections, &id, &text);
                    }
                }
                Target::Everyone => {
                    for sender in connections.values() {
                        let _ = sender.send(Message::text(text.clone()));
                    }
                }
            }
        }
    }
}

fn send(connections: &HashMap<ConnectionId, mpsc::UnboundedSender<Message>>, id: &str, text: &str) {
    if let Some(sender) = connections.get(id) {
        let _ = sender.send(Message::text(text));
    }
}

fn reject(dispatch: &mut Dispatch, id: &str, error: &GameError) {
    dispatch.to(
        id,
        ServerMessage::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
        },
    );
}
