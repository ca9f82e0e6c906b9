//! Multi-query expansion: alternative phrasings of the user's question

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tokio::time::timeout;
use tracing::{debug, warn};

use charter_core::{GenerationConfig, LLMProvider};

pub const DEFAULT_EXPANSIONS: usize = 3;

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+\s*[.):-]|[-*•]|Q\d*:)\s*").expect("list marker pattern is valid")
});

/// Build the expansion prompt for `question`
pub fn expansion_prompt(question: &str, count: usize) -> String {
    format!(
        "You are an AI language model assistant. Your task is to generate {count} \
different versions of the given user question to retrieve relevant documents from \
a vector database. By generating multiple perspectives on the user question, your \
goal is to help the user overcome some of the limitations of distance-based \
similarity search. Provide these alternative questions separated by newlines, one \
per line, without numbering or commentary.\n\
Original question: {question}"
    )
}

/// Turn raw LLM output into at most `count` distinct reformulations
pub fn parse_reformulations(output: &str, original: &str, count: usize) -> Vec<String> {
    let original_key = normalize(original);
    let mut seen = vec![original_key];
    let mut phrasings = Vec::new();

    for line in output.lines() {
        if phrasings.len() == count {
            break;
        }
        let cleaned = LIST_MARKER.replace(line, "");
        let cleaned = cleaned.trim().trim_matches('"').trim();
        if cleaned.is_empty() {
            continue;
        }
        let key = normalize(cleaned);
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        phrasings.push(cleaned.to_string());
    }

    phrasings
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('?')
        .to_lowercase()
}

/// Asks the LLM for alternative phrasings. Never fails: any problem
/// degrades to searching with the original question alone.
pub struct QueryExpander {
    llm: Arc<dyn LLMProvider>,
    count: usize,
    config: GenerationConfig,
}

impl QueryExpander {
    pub fn new(llm: Arc<dyn LLMProvider>, config: GenerationConfig) -> Self {
        Self {
            llm,
            count: DEFAULT_EXPANSIONS,
            config,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// The original question followed by up to `count` reformulations
    pub async fn expand(&self, question: &str) -> Vec<String> {
        let mut queries = vec![question.to_string()];
        if self.count == 0 {
            return queries;
        }

        let prompt = expansion_prompt(question, self.count);
        let call = self.llm.generate_with_config(&prompt, &self.config);

        let output = match timeout(self.config.timeout, call).await {
            Ok(Ok(result)) => result.text,
            Ok(Err(e)) => {
                warn!(condition = "ExpansionDegraded", error = %e, "query expansion failed; using the original question only");
                return queries;
            }
            Err(_) => {
                warn!(condition = "ExpansionDegraded", timeout_secs = self.config.timeout.as_secs(), "query expansion timed out; using the original question only");
                return queries;
            }
        };

        let phrasings = parse_reformulations(&output, question, self.count);
        if phrasings.is_empty() {
            warn!(condition = "ExpansionDegraded", "query expansion produced no usable phrasings");
        }
        debug!(reformulations = ?phrasings, "expanded question");

        queries.extend(phrasings);
        queries
    }
}
