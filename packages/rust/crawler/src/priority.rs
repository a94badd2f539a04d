//! URL priority scoring.
//!
//! A URL's score is the maximum over every matching rule, so rule order
//! never changes the result.

use regex::Regex;

use artemis_shared::{ArtemisError, PRIORITY_DEFAULT, PRIORITY_MAX, PriorityRuleConfig, Result};

/// Built-in `(pattern, score)` pairs.
const DEFAULT_RULES: &[(&str, u32)] = &[
    (r"(?i)patent|invention|research|arxiv\.org|pubmed", 10),
    (
        r"(?i)\.edu(?:[/:]|$)|\.gov(?:[/:]|$)|open-source|github\.com/.*/blob",
        8,
    ),
    (r"(?i)blog|medium\.com|news|techcrunch", 5),
    (r"(?i)forum|reddit|stack(?:overflow|exchange)", 3),
    (r"(?i)social|facebook|twitter|x\.com|tiktok", 1),
];

/// One pattern→score rule.
#[derive(Debug, Clone)]
pub struct PriorityRule {
    pub pattern: Regex,
    pub score: u32,
}

/// An ordered list of rules reduced with `max`.
#[derive(Debug, Clone)]
pub struct PriorityRules {
    rules: Vec<PriorityRule>,
}

impl Default for PriorityRules {
    fn default() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .map(|(pattern, score)| PriorityRule {
                pattern: Regex::new(pattern).expect("built-in priority pattern"),
                score: *score,
            })
            .collect();
        Self { rules }
    }
}

impl PriorityRules {
    pub fn new(rules: Vec<PriorityRule>) -> Self {
        Self { rules }
    }

    /// Compile rules from config. An empty list selects the built-in set.
    /// Scores above [`PRIORITY_MAX`] are clamped.
    pub fn from_config(configs: &[PriorityRuleConfig]) -> Result<Self> {
        if configs.is_empty() {
            return Ok(Self::default());
        }

        let rules = configs
            .iter()
            .map(|rule| {
                let pattern = Regex::new(&rule.pattern).map_err(|e| {
                    ArtemisError::config(format!("invalid priority pattern '{}': {e}", rule.pattern))
                })?;
                Ok(PriorityRule {
                    pattern,
                    score: rule.score.min(PRIORITY_MAX),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Maximum score over all matching rules, or [`PRIORITY_DEFAULT`].
    pub fn score(&self, url: &str) -> u32 {
        self.rules
            .iter()
            .filter(|rule| rule.pattern.is_match(url))
            .map(|rule| rule.score)
            .fold(PRIORITY_DEFAULT, u32::max)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
