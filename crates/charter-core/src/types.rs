//! Common types used across charter

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Chunk;

/// How a question is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Broad recall, exhaustive coverage, no conversation memory
    Summarize,
    /// Narrow recall, concise cited answer, uses conversation memory
    FocusedQa,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Summarize => write!(f, "summarize"),
            Mode::FocusedQa => write!(f, "focused_qa"),
        }
    }
}

/// One passage of a retrieved passage set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub chunk: Chunk,
    /// Highest relevance seen across the original question and its reformulations
    pub score: f32,
    /// Relevance to the original question, if the original question matched it
    pub original_score: Option<f32>,
}

impl RetrievedPassage {
    pub fn source(&self) -> &str {
        self.chunk.source()
    }
}
