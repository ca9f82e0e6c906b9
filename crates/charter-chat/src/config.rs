//! Chat configuration

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use charter_core::{Error, Result};
use charter_rag::DEFAULT_EXPANSIONS;

use crate::conversation::DEFAULT_HISTORY_TURNS;
use crate::prompts::DEFAULT_TITLE;
use crate::router::{DEFAULT_DEEP_K, DEFAULT_SHALLOW_K};

/// Retrieval depths, expansion and memory settings for the chat service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    pub deep_k: usize,
    pub shallow_k: usize,
    pub expansions: usize,
    /// `None` keeps every turn
    pub history_turns: Option<usize>,
    pub min_relevance: Option<f32>,
    pub document_title: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            deep_k: DEFAULT_DEEP_K,
            shallow_k: DEFAULT_SHALLOW_K,
            expansions: DEFAULT_EXPANSIONS,
            history_turns: Some(DEFAULT_HISTORY_TURNS),
            min_relevance: None,
            document_title: DEFAULT_TITLE.to_string(),
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let deep_k = parse(&lookup, "CHARTER_DEEP_K")?.unwrap_or(defaults.deep_k);
        let shallow_k = parse(&lookup, "CHARTER_SHALLOW_K")?.unwrap_or(defaults.shallow_k);
        if deep_k == 0 || shallow_k == 0 {
            return Err(Error::Configuration(
                "CHARTER_DEEP_K and CHARTER_SHALLOW_K must be at least 1".to_string(),
            ));
        }

        let history_turns = match parse::<usize, _>(&lookup, "CHARTER_HISTORY_TURNS")? {
            Some(0) => None,
            Some(n) => Some(n),
            None => defaults.history_turns,
        };

        let min_relevance = parse::<f32, _>(&lookup, "CHARTER_MIN_RELEVANCE")?;
        if let Some(threshold) = min_relevance {
            if !(-1.0..=1.0).contains(&threshold) {
                return Err(Error::Configuration(format!(
                    "CHARTER_MIN_RELEVANCE must be between -1 and 1, got {}",
                    threshold
                )));
            }
        }

        Ok(Self {
            deep_k,
            shallow_k,
            expansions: parse(&lookup, "CHARTER_EXPANSIONS")?.unwrap_or(defaults.expansions),
            history_turns,
            min_relevance,
            document_title: lookup("CHARTER_DOCUMENT_TITLE")
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(defaults.document_title),
        })
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Configuration(format!("{} has an invalid value '{}'", key, raw))),
        _ => Ok(None),
    }
}
