//! Grounded answer composition

use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use charter_core::{Error, GenerationConfig, LLMProvider, Mode, Result, RetrievedPassage};

use crate::conversation::Turn;
use crate::prompts::{
    DEFAULT_TITLE, NOT_FOUND, condense_prompt, focused_prompt, render_context, render_history,
    summarize_prompt,
};

/// Inputs for one answer
#[derive(Debug, Clone, Copy)]
pub struct ComposeRequest<'a> {
    pub mode: Mode,
    pub question: &'a str,
    pub passages: &'a [RetrievedPassage],
    /// Ignored in summarize mode
    pub history: &'a [Turn],
}

pub struct AnswerComposer {
    llm: Arc<dyn LLMProvider>,
    config: GenerationConfig,
    title: String,
}

impl AnswerComposer {
    pub fn new(llm: Arc<dyn LLMProvider>, config: GenerationConfig) -> Self {
        Self {
            llm,
            config,
            title: DEFAULT_TITLE.to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn build_prompt(&self, request: &ComposeRequest<'_>) -> String {
        let context = render_context(request.passages);
        match request.mode {
            Mode::Summarize => summarize_prompt(&self.title, &context, request.question),
            Mode::FocusedQa => focused_prompt(
                &self.title,
                &render_history(request.history),
                &context,
                request.question,
            ),
        }
    }

    /// The LLM's answer, verbatim. With no passages the not-found phrase is
    /// returned without calling the LLM.
    pub async fn compose(&self, request: ComposeRequest<'_>) -> Result<String> {
        if request.passages.is_empty() {
            debug!(mode = %request.mode, "no passages; answering not-found");
            return Ok(NOT_FOUND.to_string());
        }

        let prompt = self.build_prompt(&request);
        let answer = self.call(&prompt).await.inspect_err(|e| {
            error!(mode = %request.mode, error = %e, "answer generation failed");
        })?;

        debug!(mode = %request.mode, chars = answer.len(), "composed answer");
        Ok(answer)
    }

    /// Rewrite a follow-up as a standalone question. Falls back to the raw
    /// question on any failure.
    pub async fn condense(&self, question: &str, history: &[Turn]) -> String {
        if history.is_empty() {
            return question.to_string();
        }

        let prompt = condense_prompt(&render_history(history), question);
        match self.call(&prompt).await {
            Ok(standalone) => {
                let standalone = standalone.trim();
                if standalone.is_empty() {
                    warn!("condensed question was empty; using the raw question");
                    question.to_string()
                } else {
                    debug!(standalone = %standalone, "condensed follow-up");
                    standalone.to_string()
                }
            }
            Err(e) => {
                warn!(error = %e, "condensing failed; using the raw question");
                question.to_string()
            }
        }
    }

    async fn call(&self, prompt: &str) -> Result<String> {
        let call = self.llm.generate_with_config(prompt, &self.config);
        match timeout(self.config.timeout, call).await {
            Ok(Ok(result)) => Ok(result.text),
            Ok(Err(Error::Generation(msg))) => Err(Error::Generation(msg)),
            Ok(Err(other)) => Err(Error::Generation(other.to_string())),
            Err(_) => Err(Error::Generation(format!(
                "no answer within {}s",
                self.config.timeout.as_secs()
            ))),
        }
    }
}
