//! Request orchestration: route, retrieve, compose, remember

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use charter_core::{
    Embedder, Error, GenerationConfig, LLMProvider, Mode, Result, RetrievedPassage, VectorIndex,
};
use charter_rag::{QueryExpander, RetrievalRequest, Retriever};

use crate::composer::{AnswerComposer, ComposeRequest};
use crate::config::ChatConfig;
use crate::conversation::{SessionStore, Turn};
use crate::router::{ModeRouter, RoutePlan};

/// Longest message accepted, in characters
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// A cited passage backing an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub source: String,
    pub chunk_id: String,
    pub score: f32,
}

impl From<&RetrievedPassage> for Source {
    fn from(passage: &RetrievedPassage) -> Self {
        Self {
            source: passage.source().to_string(),
            chunk_id: passage.chunk.id.to_string(),
            score: passage.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub response: String,
    pub mode: Mode,
    pub sources: Vec<Source>,
}

/// Everything one chat request needs, shared across requests
pub struct ChatService {
    retriever: Retriever,
    composer: AnswerComposer,
    router: ModeRouter,
    sessions: SessionStore,
}

impl ChatService {
    pub fn new(
        retriever: Retriever,
        composer: AnswerComposer,
        router: ModeRouter,
        sessions: SessionStore,
    ) -> Self {
        Self {
            retriever,
            composer,
            router,
            sessions,
        }
    }

    /// Wire the default pipeline from its capabilities
    pub fn build(
        config: &ChatConfig,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LLMProvider>,
        generation: GenerationConfig,
    ) -> Self {
        let expansion = GenerationConfig {
            max_tokens: 256,
            ..generation.clone()
        };
        let expander = QueryExpander::new(llm.clone(), expansion).with_count(config.expansions);

        let retriever = Retriever::new(index, embedder)
            .with_expander(Arc::new(expander))
            .with_min_relevance(config.min_relevance);
        let composer = AnswerComposer::new(llm, generation).with_title(&config.document_title);
        let router = ModeRouter::default().with_depths(config.deep_k, config.shallow_k);

        Self::new(
            retriever,
            composer,
            router,
            SessionStore::new(config.history_turns),
        )
    }

    /// Answer `message` within `session_id`'s conversation.
    ///
    /// Focused questions hold the session lock from reading the history until
    /// the new turn is recorded. Only successful focused answers are recorded.
    pub async fn ask(&self, session_id: Option<&str>, message: &str) -> Result<Answer> {
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::InvalidInput("message must not be empty".to_string()));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(Error::InvalidInput(format!(
                "message is longer than {} characters",
                MAX_MESSAGE_CHARS
            )));
        }

        let plan = self.router.route(message);
        info!(
            session = %SessionStore::normalize(session_id),
            mode = %plan.mode,
            depth = plan.depth,
            "answering"
        );

        if !plan.use_history {
            let passages = self.retrieve(message, &plan).await?;
            let response = self
                .composer
                .compose(ComposeRequest {
                    mode: plan.mode,
                    question: message,
                    passages: &passages,
                    history: &[],
                })
                .await?;
            return Ok(answer(response, plan.mode, &passages));
        }

        let session = self.sessions.session(session_id).await;
        let mut conversation = session.lock().await;
        let history = conversation.snapshot();

        let standalone = self.composer.condense(message, &history).await;
        let passages = self.retrieve(&standalone, &plan).await?;
        let response = self
            .composer
            .compose(ComposeRequest {
                mode: plan.mode,
                question: message,
                passages: &passages,
                history: &history,
            })
            .await?;

        conversation.push(Turn::new(message, response.clone()));
        Ok(answer(response, plan.mode, &passages))
    }

    /// Forget a session's conversation
    pub async fn reset(&self, session_id: Option<&str>) -> bool {
        let cleared = self.sessions.reset(session_id).await;
        info!(session = %SessionStore::normalize(session_id), cleared, "conversation reset");
        cleared
    }

    pub async fn indexed_chunks(&self) -> Result<usize> {
        self.retriever.index().count().await
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    async fn retrieve(&self, question: &str, plan: &RoutePlan) -> Result<Vec<RetrievedPassage>> {
        self.retriever
            .retrieve(RetrievalRequest {
                question,
                k: plan.depth,
                expand: plan.expand,
                diversify: plan.diversify,
            })
            .await
    }
}

fn answer(response: String, mode: Mode, passages: &[RetrievedPassage]) -> Answer {
    Answer {
        response,
        mode,
        sources: passages.iter().map(Source::from).collect(),
    }
}
