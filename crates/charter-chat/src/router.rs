//! Mode routing: which template, how deep to search, whether to use history

use regex::Regex;

use charter_core::{Error, Mode, Result};

pub const DEFAULT_KEYWORDS: [&str; 3] = ["summarize", "explain", "simplify"];
pub const DEFAULT_DEEP_K: usize = 10;
pub const DEFAULT_SHALLOW_K: usize = 4;

/// Decides how a message should be answered
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> Mode;
}

/// Summarize when any keyword occurs anywhere in the message, ignoring case.
/// "explained" and "oversimplify" match too.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    pattern: Regex,
}

impl KeywordClassifier {
    pub fn new<I, S>(keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .map(|k| regex::escape(&k))
            .collect();

        if alternatives.is_empty() {
            return Err(Error::Configuration(
                "keyword classifier needs at least one keyword".to_string(),
            ));
        }

        let pattern = Regex::new(&format!("(?i)(?:{})", alternatives.join("|")))
            .map_err(|e| Error::Configuration(format!("invalid keyword pattern: {}", e)))?;
        Ok(Self { pattern })
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS).expect("default keywords are valid")
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Mode {
        if self.pattern.is_match(text) {
            Mode::Summarize
        } else {
            Mode::FocusedQa
        }
    }
}

/// Everything the service needs to answer one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePlan {
    pub mode: Mode,
    pub depth: usize,
    pub expand: bool,
    pub diversify: bool,
    pub use_history: bool,
}

pub struct ModeRouter {
    classifier: Box<dyn Classifier>,
    deep_k: usize,
    shallow_k: usize,
}

impl Default for ModeRouter {
    fn default() -> Self {
        Self::new(Box::new(KeywordClassifier::default()))
    }
}

impl ModeRouter {
    pub fn new(classifier: Box<dyn Classifier>) -> Self {
        Self {
            classifier,
            deep_k: DEFAULT_DEEP_K,
            shallow_k: DEFAULT_SHALLOW_K,
        }
    }

    pub fn with_depths(mut self, deep_k: usize, shallow_k: usize) -> Self {
        self.deep_k = deep_k;
        self.shallow_k = shallow_k;
        self
    }

    pub fn route(&self, text: &str) -> RoutePlan {
        self.plan_for(self.classifier.classify(text))
    }

    pub fn plan_for(&self, mode: Mode) -> RoutePlan {
        match mode {
            Mode::Summarize => RoutePlan {
                mode,
                depth: self.deep_k,
                expand: false,
                diversify: true,
                use_history: false,
            },
            Mode::FocusedQa => RoutePlan {
                mode,
                depth: self.shallow_k,
                expand: true,
                diversify: true,
                use_history: true,
            },
        }
    }
}
