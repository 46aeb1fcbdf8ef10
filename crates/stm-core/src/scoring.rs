//! Importance scoring.
//!
//! Scores are a pure function of the text, an immutable keyword table, and an
//! optional [`ScoringContext`]:
//!
//! ```text
//! score = max(matched weights)
//!       + 0.05 per additional distinct keyword
//!       + question bonus        (text contains '?')
//!       + length bonus          (more than 200 characters)
//!       + context bonuses
//! clamped to [0, 1]
//! ```
//!
//! Keywords match on whole tokens, so "call" does not fire inside "recall".
//! Multi-word keywords ("follow up") match contiguous token runs.

use std::collections::BTreeMap;

use crate::config::{ConfigValidationError, ScoringConfig};

const EXTRA_MATCH_BONUS: f64 = 0.05;
const LONG_TEXT_CHARS: usize = 200;
const LONG_CONVERSATION_TURNS: usize = 10;
const LONG_CONVERSATION_BONUS: f64 = 0.1;

/// Built-in keyword table.
const DEFAULT_KEYWORDS: &[(&str, f64)] = &[
    ("emergency", 0.95),
    ("urgent", 0.9),
    ("critical", 0.9),
    ("outage", 0.85),
    ("asap", 0.85),
    ("important", 0.8),
    ("deadline", 0.75),
    ("meeting", 0.7),
    ("error", 0.7),
    ("fail", 0.7),
    ("failed", 0.7),
    ("failure", 0.7),
    ("bug", 0.65),
    ("call", 0.6),
    ("down", 0.6),
    ("reminder", 0.45),
    ("remember", 0.45),
    ("follow up", 0.4),
    ("schedule", 0.4),
    ("note", 0.35),
    ("task", 0.35),
    ("todo", 0.35),
    ("plan", 0.3),
];

/// Immutable, validated keyword -> weight table.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordWeights {
    /// Keyword token sequence paired with its weight
    entries: Vec<(Vec<String>, f64)>,
}

impl KeywordWeights {
    /// Build a table from a keyword map.
    ///
    /// Keywords are lowercased and tokenized; weights must be finite and
    /// within `[0, 1]`.
    pub fn from_map(map: BTreeMap<String, f64>) -> Result<Self, ConfigValidationError> {
        let mut entries = Vec::with_capacity(map.len());

        for (keyword, weight) in map {
            let tokens = tokenize(&keyword);
            if tokens.is_empty() {
                return Err(ConfigValidationError::InvalidKeyword {
                    keyword,
                    message: "must contain at least one letter or digit".into(),
                });
            }
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(ConfigValidationError::InvalidKeyword {
                    keyword,
                    message: format!("weight {} must be between 0 and 1", weight),
                });
            }
            entries.push((tokens, weight));
        }

        Ok(Self { entries })
    }

    /// Number of keywords in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Weight for a keyword, if present.
    pub fn weight(&self, keyword: &str) -> Option<f64> {
        let tokens = tokenize(keyword);
        self.entries
            .iter()
            .find(|(k, _)| *k == tokens)
            .map(|(_, w)| *w)
    }

    /// Weights of every keyword that occurs in `tokens`.
    fn matches<'a>(&'a self, tokens: &'a [String]) -> impl Iterator<Item = f64> + 'a {
        self.entries
            .iter()
            .filter(move |(keyword, _)| contains_run(tokens, keyword))
            .map(|(_, weight)| *weight)
    }
}

impl Default for KeywordWeights {
    fn default() -> Self {
        Self {
            entries: DEFAULT_KEYWORDS
                .iter()
                .map(|(k, w)| (tokenize(k), *w))
                .collect(),
        }
    }
}

/// Extra signals about the situation an entry was recorded in.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringContext {
    /// The user explicitly asked for this to be remembered.
    pub explicit_request: bool,
    /// Number of turns in the conversation so far.
    pub conversation_length: usize,
}

/// Computes importance scores.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    weights: KeywordWeights,
    question_bonus: f64,
    length_bonus: f64,
    explicit_request_bonus: f64,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(KeywordWeights::default())
    }
}

impl ScoringEngine {
    /// Create an engine with the given keyword table and default bonuses.
    pub fn new(weights: KeywordWeights) -> Self {
        let defaults = ScoringConfig::default();
        Self {
            weights,
            question_bonus: defaults.question_bonus,
            length_bonus: defaults.length_bonus,
            explicit_request_bonus: defaults.explicit_request_bonus,
        }
    }

    /// Create an engine from configuration.
    pub fn from_config(config: &ScoringConfig) -> Result<Self, ConfigValidationError> {
        let weights = match &config.keyword_weights {
            Some(map) => KeywordWeights::from_map(map.clone())?,
            None => KeywordWeights::default(),
        };

        Ok(Self {
            weights,
            question_bonus: config.question_bonus,
            length_bonus: config.length_bonus,
            explicit_request_bonus: config.explicit_request_bonus,
        })
    }

    pub fn weights(&self) -> &KeywordWeights {
        &self.weights
    }

    /// Score text with no extra context.
    pub fn score(&self, content: &str) -> f64 {
        self.score_with_context(content, &ScoringContext::default())
    }

    /// Score text in context. Empty or whitespace-only text scores 0.0.
    pub fn score_with_context(&self, content: &str, context: &ScoringContext) -> f64 {
        let tokens = tokenize(content);
        if tokens.is_empty() {
            return 0.0;
        }

        let mut matched = 0usize;
        let mut best = 0.0f64;
        for weight in self.weights.matches(&tokens) {
            matched += 1;
            best = best.max(weight);
        }

        let mut score = best;
        if matched > 1 {
            score += EXTRA_MATCH_BONUS * (matched - 1) as f64;
        }

        if content.contains('?') {
            score += self.question_bonus;
        }

        if content.chars().count() > LONG_TEXT_CHARS {
            score += self.length_bonus;
        }

        if context.explicit_request {
            score += self.explicit_request_bonus;
        }

        if context.conversation_length > LONG_CONVERSATION_TURNS {
            score += LONG_CONVERSATION_BONUS;
        }

        score.clamp(0.0, 1.0)
    }
}

/// Lowercase alphanumeric tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether `needle` occurs as a contiguous run inside `haystack`.
fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Basic Scoring Tests
    // ─────────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_text_scores_zero() {
        let engine = ScoringEngine::default();
        assert_eq!(engine.score(""), 0.0);
        assert_eq!(engine.score("   \n\t  "), 0.0);
        assert_eq!(engine.score("!!! ..."), 0.0);
    }

    #[test]
    fn test_meeting_scores_point_seven() {
        let engine = ScoringEngine::default();
        assert!(approx(engine.score("Meeting at 3pm"), 0.7));
    }

    #[test]
    fn test_urgent_outage_scores_high() {
        let engine = ScoringEngine::default();
        let score = engine.score("urgent: server down");
        assert!(score >= 0.9, "got {}", score);
    }

    #[test]
    fn test_plain_text_scores_zero() {
        let engine = ScoringEngine::default();
        assert_eq!(engine.score("the sky is blue"), 0.0);
    }

    #[test]
    fn test_keywords_match_whole_tokens_only() {
        let engine = ScoringEngine::default();
        // "call" must not fire inside "recall"
        assert_eq!(engine.score("recall the weather"), 0.0);
        assert!(approx(engine.score("call the plumber"), 0.6));
    }

    #[test]
    fn test_multi_word_keyword() {
        let engine = ScoringEngine::default();
        assert!(approx(engine.score("follow up with Dana"), 0.4));
        assert_eq!(engine.score("follow the white rabbit up"), 0.0);
    }

    #[test]
    fn test_additional_matches_add_small_bonus() {
        let engine = ScoringEngine::default();
        // meeting (0.7) + deadline as second match
        assert!(approx(engine.score("meeting about the deadline"), 0.75 + 0.05));
    }

    #[test]
    fn test_question_bonus() {
        let engine = ScoringEngine::default();
        assert!(approx(engine.score("where is the meeting?"), 0.8));
    }

    #[test]
    fn test_length_bonus() {
        let engine = ScoringEngine::default();
        let long = "word ".repeat(60);
        assert!(approx(engine.score(&long), 0.1));
    }

    #[test]
    fn test_score_is_clamped() {
        let engine = ScoringEngine::default();
        let text = "urgent emergency critical outage asap important deadline meeting?";
        assert_eq!(engine.score(text), 1.0);
    }

    #[test]
    fn test_context_bonuses() {
        let engine = ScoringEngine::default();
        let explicit = ScoringContext {
            explicit_request: true,
            ..Default::default()
        };
        assert!(approx(engine.score_with_context("my locker is 42", &explicit), 0.4));

        let long_conversation = ScoringContext {
            conversation_length: 11,
            ..Default::default()
        };
        assert!(approx(
            engine.score_with_context("my locker is 42", &long_conversation),
            0.1
        ));

        // Context never rescues empty text
        assert_eq!(engine.score_with_context("  ", &explicit), 0.0);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let engine = ScoringEngine::default();
        let text = "Remember to file the bug report before the deadline";
        assert_eq!(engine.score(text), engine.score(text));
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Monotonicity Tests
    // ─────────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_adding_urgent_keyword_never_decreases_score() {
        let engine = ScoringEngine::default();
        let samples = [
            "",
            "the sky is blue",
            "Meeting at 3pm",
            "follow up with Dana?",
            "critical emergency outage",
            "note: plan the task",
        ];

        for sample in samples {
            let base = engine.score(sample);
            for keyword in ["urgent", "emergency", "critical", "asap"] {
                let appended = engine.score(&format!("{} {}", sample, keyword));
                let prepended = engine.score(&format!("{} {}", keyword, sample));
                assert!(appended >= base, "{:?} + {}", sample, keyword);
                assert!(prepended >= base, "{} + {:?}", keyword, sample);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Keyword Table Tests
    // ─────────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_default_table() {
        let weights = KeywordWeights::default();
        assert_eq!(weights.len(), DEFAULT_KEYWORDS.len());
        assert_eq!(weights.weight("meeting"), Some(0.7));
        assert_eq!(weights.weight("Follow  Up"), Some(0.4));
        assert_eq!(weights.weight("unknown"), None);
    }

    #[test]
    fn test_custom_table() {
        let mut map = BTreeMap::new();
        map.insert("Deploy".to_string(), 0.5);
        let engine = ScoringEngine::new(KeywordWeights::from_map(map).unwrap());

        assert!(approx(engine.score("deploy friday"), 0.5));
        // Built-in keywords are gone
        assert_eq!(engine.score("urgent"), 0.0);
    }

    #[test]
    fn test_table_validation() {
        let mut map = BTreeMap::new();
        map.insert("   ".to_string(), 0.5);
        assert!(KeywordWeights::from_map(map).is_err());

        let mut map = BTreeMap::new();
        map.insert("urgent".to_string(), -0.1);
        assert!(KeywordWeights::from_map(map).is_err());

        let mut map = BTreeMap::new();
        map.insert("urgent".to_string(), f64::NAN);
        assert!(KeywordWeights::from_map(map).is_err());
    }

    #[test]
    fn test_from_config_bonuses() {
        let config = ScoringConfig {
            question_bonus: 0.0,
            ..Default::default()
        };
        let engine = ScoringEngine::from_config(&config).unwrap();
        assert!(approx(engine.score("meeting?"), 0.7));
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Urgent: server-down!"), vec!["urgent", "server", "down"]);
        assert!(tokenize("  ").is_empty());
    }
}
