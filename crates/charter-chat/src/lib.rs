//! Conversational layer for charter
//!
//! Routes each message to a mode, retrieves passages, composes a grounded
//! answer and keeps per-session conversation history.

mod composer;
mod config;
mod conversation;
mod prompts;
mod router;
mod service;


pub use composer::{AnswerComposer, ComposeRequest};
pub use config::ChatConfig;
pub use conversation::{Conversation, DEFAULT_HISTORY_TURNS, DEFAULT_SESSION, SessionStore, Turn};
pub use prompts::{
    DEFAULT_TITLE, NOT_FOUND, condense_prompt, focused_prompt, render_context, render_history,
    summarize_prompt,
};
pub use router::{
    Classifier, DEFAULT_DEEP_K, DEFAULT_KEYWORDS, DEFAULT_SHALLOW_K, KeywordClassifier,
    ModeRouter, RoutePlan,
};
pub use service::{Answer, ChatService, MAX_MESSAGE_CHARS, Source};

// Re-export core types
pub use charter_core::{Error, Mode, Result};
