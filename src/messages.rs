use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "identify")]
    Identify {
        name: String,
    },
    #[serde(rename = "set_expected_players")]
    SetExpectedPlayers {
        value: i64,
    },
    #[serde(rename = "start_quiz")]
    StartQuiz,
    #[serde(rename = "answer")]
    Answer {
        // any value the client sends is recorded as-is
        value: serde_json::Value,
    },
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "alert")]
    Alert {
        message: String,
    },
    #[serde(rename = "page")]
    Page {
        page: PageName,
    },
    #[serde(rename = "expected_players")]
    ExpectedPlayers {
        value: i64,
    },
    #[serde(rename = "players")]
    Players {
        players: Vec<String>,
    },
    #[serde(rename = "player_left")]
    PlayerLeft {
        name: String,
    },
    #[serde(rename = "question")]
    Question {
        question: String,
        options: Vec<String>,
    },
}

/// Screen the client should show. The correct-answer index never rides
/// along with a `Question` message, so it is not part of this protocol.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum PageName {
    Waiting,
    Question,
}
