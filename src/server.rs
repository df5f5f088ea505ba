use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use warp::ws::WebSocket;

use crate::broadcast::Broadcaster;
use crate::messages::{ClientMessage, PageName, ServerMessage};
use crate::quiz::{Question, QuizRunner};
use crate::session::{ConnectionId, SessionState};

/// Connection gateway: owns the session state and the broadcaster,
/// maps each websocket to a `ConnectionId`, and dispatches inbound
/// events to the roster and the quiz runner.
#[derive(Clone)]
pub struct Server {
    state: Arc<RwLock<SessionState>>,
    broadcaster: Broadcaster,
    questions: Arc<Vec<Question>>,
}

impl Server {
    pub fn new(questions: Vec<Question>, expected_players: i64) -> Self {
        Server {
            state: Arc::new(RwLock::new(SessionState::new(expected_players))),
            broadcaster: Broadcaster::new(),
            questions: Arc::new(questions),
        }
    }

    pub async fn handle_connection(&self, ws: WebSocket) {
        let id = ConnectionId::new();
        info!("user connected: {id}");

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.broadcaster.add(id, tx).await;

        let server = self.clone();
        tokio::spawn(async move {
            while let Some(result) = ws_rx.next().await {
                match result {
                    Ok(msg) => {
                        if let Ok(text) = msg.to_str() {
                            match serde_json::from_str::<ClientMessage>(text) {
                                Ok(client_msg) => {
                                    server.handle_client_message(id, client_msg).await;
                                }
                                Err(e) => debug!("unparseable frame from {id}: {e}"),
                            }
                        }
                    }
                    Err(e) => {
                        error!("websocket error on {id}: {e}");
                        break;
                    }
                }
            }

            server.handle_disconnect(id).await;
        });

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_tx.send(message).await {
                    debug!("failed to send websocket message: {e}");
                    break;
                }
            }
        });
    }

    async fn handle_client_message(&self, id: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::Identify { name } => self.handle_identify(id, &name).await,

            ClientMessage::SetExpectedPlayers { value } => {
                {
                    let mut state = self.state.write().await;
                    state.set_expected_players(value);
                }
                info!("expected players: {value}");
                self.broadcaster
                    .broadcast_all(&ServerMessage::ExpectedPlayers { value })
                    .await;
            }

            ClientMessage::StartQuiz => self.handle_start_quiz().await,

            ClientMessage::Answer { value } => {
                let mut state = self.state.write().await;
                state.record_answer(id, value);
            }
        }
    }

    async fn handle_identify(&self, id: ConnectionId, name: &str) {
        let registered = {
            let mut state = self.state.write().await;
            if state.is_registered(id) {
                debug!("connection {id} tried to identify twice");
                return;
            }
            state
                .register(id, name)
                .map(|()| (state.expected_players(), state.players()))
        };

        match registered {
            Ok((expected_players, players)) => {
                self.broadcaster
                    .send_to(
                        id,
                        &ServerMessage::Page {
                            page: PageName::Waiting,
                        },
                    )
                    .await;
                self.broadcaster
                    .send_to(
                        id,
                        &ServerMessage::ExpectedPlayers {
                            value: expected_players,
                        },
                    )
                    .await;
                self.broadcaster
                    .broadcast_all(&ServerMessage::Players { players })
                    .await;
                info!("new player: {name}");
            }
            Err(e) => {
                self.broadcaster
                    .send_to(
                        id,
                        &ServerMessage::Alert {
                            message: e.to_string(),
                        },
                    )
                    .await;
            }
        }
    }

    /// Transitions the lobby into a running quiz. The `Lobby -> Running`
    /// flip happens under the write lock, so only one caller ever gets
    /// the participant list back and spawns a runner.
    async fn handle_start_quiz(&self) {
        let started = {
            let mut state = self.state.write().await;
            state.begin()
        };

        let Some(participants) = started else {
            debug!("start_quiz ignored, quiz already started");
            return;
        };

        info!("starting quiz");
        for id in participants {
            self.broadcaster
                .send_to(
                    id,
                    &ServerMessage::Page {
                        page: PageName::Question,
                    },
                )
                .await;
        }

        let runner = QuizRunner::new((*self.questions).clone());
        let state = self.state.clone();
        let broadcaster = self.broadcaster.clone();
        tokio::spawn(async move {
            runner.run(state, broadcaster).await;
        });
    }

    async fn handle_disconnect(&self, id: ConnectionId) {
        let removed = {
            let mut state = self.state.write().await;
            state.remove(id)
        };

        if let Some(name) = removed {
            info!("user disconnected: {name}");
            self.broadcaster
                .broadcast_all(&ServerMessage::PlayerLeft { name })
                .await;
            let players = {
                let state = self.state.read().await;
                state.players()
            };
            self.broadcaster
                .broadcast_all(&ServerMessage::Players { players })
                .await;
        }

        self.broadcaster.remove(id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Phase;
    use serde_json::{json, Value};
    use tokio::sync::mpsc::UnboundedReceiver;
    use warp::ws::Message;

    async fn connect(server: &Server) -> (ConnectionId, UnboundedReceiver<Message>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        server.broadcaster.add(id, tx).await;
        (id, rx)
    }

    fn next_json(rx: &mut UnboundedReceiver<Message>) -> Value {
        let msg = rx.try_recv().expect("expected a pending message");
        serde_json::from_str(msg.to_str().unwrap()).unwrap()
    }

    fn identify(name: &str) -> ClientMessage {
        ClientMessage::Identify {
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn identify_sends_waiting_page_and_roster() {
        let server = Server::new(Vec::new(), 14);
        let (alice, mut rx) = connect(&server).await;

        server.handle_client_message(alice, identify("Alice")).await;

        assert_eq!(next_json(&mut rx)["page"], "waiting");
        assert_eq!(next_json(&mut rx)["value"], 14);
        assert_eq!(next_json(&mut rx)["players"], json!(["Alice"]));
    }

    #[tokio::test]
    async fn duplicate_name_alerts_only_the_offender() {
        let server = Server::new(Vec::new(), 14);
        let (alice, mut alice_rx) = connect(&server).await;
        let (impostor, mut impostor_rx) = connect(&server).await;

        server.handle_client_message(alice, identify("Alice")).await;
        while alice_rx.try_recv().is_ok() {}
        while impostor_rx.try_recv().is_ok() {}

        server
            .handle_client_message(impostor, identify("Alice"))
            .await;

        let alert = next_json(&mut impostor_rx);
        assert_eq!(alert["type"], "alert");
        assert!(alice_rx.try_recv().is_err());
        assert_eq!(server.state.read().await.players(), vec!["Alice"]);
    }

    #[tokio::test]
    async fn disconnect_broadcasts_departure_and_new_roster() {
        let server = Server::new(Vec::new(), 14);
        let (alice, _alice_rx) = connect(&server).await;
        let (bob, mut bob_rx) = connect(&server).await;

        server.handle_client_message(alice, identify("Alice")).await;
        server.handle_client_message(bob, identify("Bob")).await;
        while bob_rx.try_recv().is_ok() {}

        server.handle_disconnect(alice).await;

        let left = next_json(&mut bob_rx);
        assert_eq!(left["type"], "player_left");
        assert_eq!(left["name"], "Alice");
        let roster = next_json(&mut bob_rx);
        assert_eq!(roster["players"], json!(["Bob"]));
    }

    #[tokio::test]
    async fn disconnect_before_identify_is_silent() {
        let server = Server::new(Vec::new(), 14);
        let (nameless, _rx) = connect(&server).await;
        let (bob, mut bob_rx) = connect(&server).await;
        server.handle_client_message(bob, identify("Bob")).await;
        while bob_rx.try_recv().is_ok() {}

        server.handle_disconnect(nameless).await;

        assert!(bob_rx.try_recv().is_err());
        assert_eq!(server.state.read().await.players(), vec!["Bob"]);
    }

    #[tokio::test]
    async fn set_expected_players_is_broadcast_unvalidated() {
        let server = Server::new(Vec::new(), 14);
        let (admin, mut rx) = connect(&server).await;

        server
            .handle_client_message(admin, ClientMessage::SetExpectedPlayers { value: -3 })
            .await;

        let msg = next_json(&mut rx);
        assert_eq!(msg["type"], "expected_players");
        assert_eq!(msg["value"], -3);
        assert_eq!(server.state.read().await.expected_players(), -3);
    }

    #[tokio::test]
    async fn start_quiz_moves_players_to_question_page_once() {
        let server = Server::new(Vec::new(), 1);
        let (alice, mut rx) = connect(&server).await;
        server.handle_client_message(alice, identify("Alice")).await;
        while rx.try_recv().is_ok() {}

        server
            .handle_client_message(alice, ClientMessage::StartQuiz)
            .await;
        assert_eq!(next_json(&mut rx)["page"], "question");

        // second trigger must not restart anything
        tokio::task::yield_now().await;
        while rx.try_recv().is_ok() {}
        server
            .handle_client_message(alice, ClientMessage::StartQuiz)
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn answers_are_recorded_for_running_participants() {
        let server = Server::new(Vec::new(), 1);
        let (alice, _rx) = connect(&server).await;
        server.handle_client_message(alice, identify("Alice")).await;

        {
            let mut state = server.state.write().await;
            state.begin().unwrap();
        }
        server
            .handle_client_message(alice, ClientMessage::Answer { value: json!(2) })
            .await;

        assert!(server.state.read().await.all_answered(0));
        assert_ne!(server.state.read().await.phase(), Phase::Lobby);
    }
}
