use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::RwLock;
use tokio::time::{interval_at, sleep, Instant};

use crate::broadcast::Broadcaster;
use crate::messages::ServerMessage;
use crate::session::SessionState;

#[derive(Clone)]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
    /// Index into `options`. Kept server-side only; never serialized
    /// toward participants.
    pub correct: usize,
    pub time_limit_secs: u64,
}

impl Question {
    pub fn new(prompt: &str, options: &[&str], correct: usize, time_limit_secs: u64) -> Self {
        Question {
            prompt: prompt.to_string(),
            options: options.iter().map(|o| (*o).to_string()).collect(),
            correct,
            time_limit_secs,
        }
    }
}

/// The built-in question set served until questions come from real
/// configuration.
pub fn default_questions() -> Vec<Question> {
    let options = ["Paris", "London", "Berlin", "Madrid"];
    vec![
        Question::new("What is the capital of France?", &options, 0, 10),
        Question::new("What is the capital of Spain?", &options, 3, 10),
        Question::new("What is the capital of Germany?", &options, 2, 10),
    ]
}

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Drives one quiz round: `Idle` until spawned, then one cycle per
/// question, then the session is finished exactly once.
///
/// Each cycle broadcasts the question to every answering participant
/// and races the question's deadline against an all-answered poll. The
/// deadline is authoritative; the poll only lets a question close
/// early. `select!` drops whichever future loses, so neither a poll
/// ticker nor a deadline sleep outlives its question.
pub struct QuizRunner {
    questions: Vec<Question>,
    poll_interval: Duration,
}

impl QuizRunner {
    pub fn new(questions: Vec<Question>) -> Self {
        QuizRunner {
            questions,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub async fn run(&self, state: Arc<RwLock<SessionState>>, broadcaster: Broadcaster) {
        for (index, question) in self.questions.iter().enumerate() {
            info!("question: {}", question.prompt);
            info!("options: {}", question.options.join(", "));
            info!("correct: {}", question.correct);
            info!("time: {}s", question.time_limit_secs);

            let audience = {
                let state = state.read().await;
                state.answering()
            };
            let message = ServerMessage::Question {
                question: question.prompt.clone(),
                options: question.options.clone(),
            };
            for id in audience {
                broadcaster.send_to(id, &message).await;
            }

            tokio::select! {
                () = sleep(Duration::from_secs(question.time_limit_secs)) => {
                    debug!("question {index} closed at deadline");
                }
                () = self.wait_all_answered(&state, index) => {
                    debug!("question {index} closed early, everyone answered");
                }
            }

            let mut state = state.write().await;
            state.advance_question();
        }

        let mut state = state.write().await;
        state.finish();
        self.finalize(state.current_question());
    }

    /// Resolves once every answering participant has submitted for the
    /// given question index, checked on a fixed cadence. With nobody
    /// answering this resolves on the first tick. Never resolves on its
    /// own otherwise; the deadline branch of the race bounds it.
    async fn wait_all_answered(&self, state: &Arc<RwLock<SessionState>>, question_index: usize) {
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        loop {
            ticker.tick().await;
            let state = state.read().await;
            if state.all_answered(question_index) {
                return;
            }
        }
    }

    /// Reserved hook for results delivery once scoring exists.
    fn finalize(&self, questions_asked: usize) {
        info!("ending quiz after {questions_asked} questions");
    }
}
