//! Prompt templates

use charter_core::RetrievedPassage;

use crate::conversation::Turn;

pub const DEFAULT_TITLE: &str = "Constitution of Pakistan (1973)";

/// The grounding phrase. Returned verbatim when the context has no answer.
pub const NOT_FOUND: &str = "I could not find this in the Constitution of Pakistan 1973.";

/// Focused question answering, with chat history
pub fn focused_prompt(title: &str, history: &str, context: &str, question: &str) -> String {
    format!(
        "You are an expert assistant on the {title}.

- Cite Article numbers, Sections, or Page numbers if available in metadata.
- If you do not find the answer in the context, say:
\"{NOT_FOUND}\"
- Be clear.
- Include all details which are asked

Chat history:
{history}

Context:
{context}

Question: {question}

Answer (with citations if possible):"
    )
}

/// Exhaustive summary of the retrieved context
pub fn summarize_prompt(title: &str, context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant. The user is asking to summarize or explain part of the {title}.

Instructions:
- Summarize the ENTIRE provided text, not just headings.
- Include all key ideas, legal principles, and important clauses.
- Use clear, plain language.
- If the context spans multiple paragraphs, cover them all.
- If you do not find the answer in the context, say:
\"{NOT_FOUND}\"

Context:
{context}

User Request: {question}

Summarized Answer:"
    )
}

/// Rewrites a follow-up into a question that stands on its own
pub fn condense_prompt(history: &str, question: &str) -> String {
    format!(
        "Given the following conversation and a follow up question, rephrase the follow up \
question to be a standalone question, in its original language.

Chat History:
{history}
Follow Up Input: {question}
Standalone question:"
    )
}

/// Passages as `[source]` labelled blocks, in rank order
pub fn render_context(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .map(|p| format!("[{}]\n{}", p.source(), p.chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_history(turns: &[Turn]) -> String {
    if turns.is_empty() {
        return "(none)".to_string();
    }
    turns
        .iter()
        .map(|t| format!("Human: {}\nAssistant: {}", t.question, t.answer))
        .collect::<Vec<_>>()
        .join("\n")
}
