use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Opaque identity of one websocket connection. Participants are keyed
/// by this rather than by display name, so a disconnect can never leave
/// a dangling name-based handle behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub const MAX_NAME_LEN: usize = 15;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RosterError {
    #[error("Please enter a name between 1 and 15 characters.")]
    InvalidName,
    #[error("That name is already taken.")]
    NameTaken,
}

/// Per-participant phase. Gates which broadcasts a participant receives
/// and whether they count toward question completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Waiting,
    Answering,
    Done,
}

pub struct Participant {
    pub name: String,
    pub state: LifecycleState,
    /// One entry per question index, appended in arrival order. Values
    /// are recorded verbatim; nothing checks them against the option
    /// list.
    pub answers: Vec<Value>,
    /// Parallel to `answers`. Scoring is not implemented yet, so this
    /// stays empty; the slot exists for future results delivery.
    #[allow(dead_code)]
    pub scores: Vec<i64>,
}

impl Participant {
    fn new(name: String) -> Self {
        Participant {
            name,
            state: LifecycleState::Waiting,
            answers: Vec::new(),
            scores: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Running,
    Ended,
}

/// All mutable quiz-session state: the ordered roster, the id-keyed
/// participant registry, the operator's expected-player target, the
/// session phase, and the active question index.
///
/// The roster vector and the registry map stay bijective: every name in
/// `players` belongs to exactly one entry in `participants` and vice
/// versa. Callers hold this behind a single `RwLock`, so the
/// all-answered check always sees a consistent snapshot.
pub struct SessionState {
    players: Vec<String>,
    participants: HashMap<ConnectionId, Participant>,
    expected_players: i64,
    phase: Phase,
    current_question: usize,
}

impl SessionState {
    pub fn new(expected_players: i64) -> Self {
        SessionState {
            players: Vec::new(),
            participants: HashMap::new(),
            expected_players,
            phase: Phase::Lobby,
            current_question: 0,
        }
    }

    /// Registers a display name for a connection. On success the name is
    /// appended to the roster and the participant starts out `Waiting`.
    pub fn register(&mut self, id: ConnectionId, name: &str) -> Result<(), RosterError> {
        let len = name.chars().count();
        if len < 1 || len > MAX_NAME_LEN {
            return Err(RosterError::InvalidName);
        }
        if self.players.iter().any(|p| p == name) {
            return Err(RosterError::NameTaken);
        }

        self.players.push(name.to_string());
        self.participants.insert(id, Participant::new(name.to_string()));
        Ok(())
    }

    /// Removes a connection's participant, returning the freed name.
    /// Unknown ids are a no-op and return `None` so the caller knows not
    /// to broadcast anything.
    pub fn remove(&mut self, id: ConnectionId) -> Option<String> {
        let participant = self.participants.remove(&id)?;
        self.players.retain(|p| *p != participant.name);
        Some(participant.name)
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.participants.contains_key(&id)
    }

    pub fn players(&self) -> Vec<String> {
        self.players.clone()
    }

    /// No validation on purpose: the admin page may send any value and
    /// the count is only ever displayed, never enforced.
    pub fn set_expected_players(&mut self, value: i64) {
        self.expected_players = value;
    }

    pub fn expected_players(&self) -> i64 {
        self.expected_players
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_question(&self) -> usize {
        self.current_question
    }

    /// Starts the quiz: `Lobby` becomes `Running` and every `Waiting`
    /// participant becomes `Answering`. Returns the transitioned ids so
    /// the gateway can send each its page signal, or `None` when the
    /// quiz is already past the lobby (the caller must not start a
    /// second runner).
    pub fn begin(&mut self) -> Option<Vec<ConnectionId>> {
        if self.phase != Phase::Lobby {
            return None;
        }
        self.phase = Phase::Running;

        let mut started = Vec::new();
        for (id, participant) in &mut self.participants {
            if participant.state == LifecycleState::Waiting {
                participant.state = LifecycleState::Answering;
                started.push(*id);
            }
        }
        Some(started)
    }

    /// Appends an answer for an `Answering` participant. Late values
    /// (after the question's race resolved) are still appended; the
    /// runner simply no longer waits on them.
    pub fn record_answer(&mut self, id: ConnectionId, value: Value) {
        if let Some(participant) = self.participants.get_mut(&id) {
            if participant.state == LifecycleState::Answering {
                participant.answers.push(value);
            }
        }
    }

    /// Ids of all participants currently in `Answering` state, i.e. the
    /// audience for a question broadcast.
    pub fn answering(&self) -> Vec<ConnectionId> {
        self.participants
            .iter()
            .filter(|(_, p)| p.state == LifecycleState::Answering)
            .map(|(id, _)| *id)
            .collect()
    }

    /// True when every `Answering` participant has submitted for the
    /// given question index. Vacuously true with nobody answering, so a
    /// question round can never hang on an empty session.
    pub fn all_answered(&self, question_index: usize) -> bool {
        self.participants
            .values()
            .filter(|p| p.state == LifecycleState::Answering)
            .all(|p| p.answers.len() > question_index)
    }

    /// Advances the active question index. Only ever moves forward.
    pub fn advance_question(&mut self) {
        self.current_question += 1;
    }

    /// Ends the session: phase becomes `Ended` and every `Answering`
    /// participant lands in the terminal `Done` state.
    pub fn finish(&mut self) {
        self.phase = Phase::Ended;
        for participant in self.participants.values_mut() {
            if participant.state == LifecycleState::Answering {
                participant.state = LifecycleState::Done;
            }
        }
    }
}
