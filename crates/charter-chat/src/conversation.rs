//! Per-session conversation state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

pub const DEFAULT_SESSION: &str = "default";
pub const DEFAULT_HISTORY_TURNS: usize = 20;

/// One answered question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            asked_at: Utc::now(),
        }
    }
}

/// Ordered turns of one session, oldest first.
///
/// With `max_turns` set, the oldest turns are evicted once the window is full.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: VecDeque<Turn>,
    max_turns: Option<usize>,
}

impl Conversation {
    pub fn new(max_turns: Option<usize>) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        if let Some(max) = self.max_turns {
            while self.turns.len() > max {
                self.turns.pop_front();
            }
        }
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Owned copy of the turns, for prompt rendering
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Session id to conversation. Each conversation has its own lock, so one
/// session's requests serialize while other sessions run in parallel.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Conversation>>>>,
    max_turns: Option<usize>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Some(DEFAULT_HISTORY_TURNS))
    }
}

impl SessionStore {
    pub fn new(max_turns: Option<usize>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns,
        }
    }

    /// Blank or missing ids map to the shared default session
    pub fn normalize(session_id: Option<&str>) -> &str {
        match session_id.map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => DEFAULT_SESSION,
        }
    }

    /// The conversation for `session_id`, created on first use
    pub async fn session(&self, session_id: Option<&str>) -> Arc<Mutex<Conversation>> {
        let id = Self::normalize(session_id);

        if let Some(existing) = self.sessions.read().await.get(id) {
            return existing.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!(session = %id, "new conversation");
                Arc::new(Mutex::new(Conversation::new(self.max_turns)))
            })
            .clone()
    }

    /// Forget a session's history. Returns whether it had any.
    pub async fn reset(&self, session_id: Option<&str>) -> bool {
        let id = Self::normalize(session_id);
        let conversation = self.sessions.write().await.remove(id);
        match conversation {
            Some(conversation) => {
                let mut conversation = conversation.lock().await;
                let had_turns = !conversation.is_empty();
                conversation.clear();
                had_turns
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
