//! Sensitivity classification
//!
//! Decides whether an OCR token should be destroyed. The bundled
//! [`PatternClassifier`] is deliberately coarse: it prefers blacking out too
//! much over leaving something readable. Any `Fn(&TextToken) -> bool` can be
//! used in its place.

use regex::{Regex, RegexSet};
use serde::Serialize;

use crate::config::ClassifierConfig;
use crate::error::{RedactError, Result};
use crate::ocr::TextToken;

/// Pluggable sensitivity predicate
pub trait SensitivityClassifier: Send + Sync {
    fn is_sensitive(&self, token: &TextToken) -> bool;
}

impl<F> SensitivityClassifier for F
where
    F: Fn(&TextToken) -> bool + Send + Sync,
{
    fn is_sensitive(&self, token: &TextToken) -> bool {
        self(token)
    }
}

/// Why a token was flagged
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SensitivityReason {
    LowConfidence,
    EmailMarker,
    DigitRun,
    IbanPrefix,
    Keyword(String),
}

/// Threshold plus trigger-pattern classifier
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    threshold: f64,
    email: Regex,
    digits: Regex,
    iban: Regex,
    keywords: Vec<String>,
    keyword_set: RegexSet,
}

impl PatternClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let keywords: Vec<String> = config
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        let keyword_set = RegexSet::new(
            keywords
                .iter()
                .map(|k| format!("(?i){}", regex::escape(k))),
        )
        .map_err(|e| RedactError::Config(format!("invalid keyword pattern: {}", e)))?;

        Ok(Self {
            threshold: config.confidence_threshold,
            email: compile("@")?,
            digits: compile("[0-9]{4,}")?,
            iban: compile("[A-Z]{2}[0-9]{2}")?,
            keywords,
            keyword_set,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// First rule that flags the token, if any
    pub fn reason(&self, token: &TextToken) -> Option<SensitivityReason> {
        // NaN confidence counts as low
        if !(token.confidence >= self.threshold) {
            return Some(SensitivityReason::LowConfidence);
        }

        let text = token.text.as_str();
        if self.email.is_match(text) {
            return Some(SensitivityReason::EmailMarker);
        }
        if self.digits.is_match(text) {
            return Some(SensitivityReason::DigitRun);
        }
        if self.iban.is_match(text) {
            return Some(SensitivityReason::IbanPrefix);
        }

        self.keyword_set
            .matches(text)
            .iter()
            .next()
            .map(|i| SensitivityReason::Keyword(self.keywords[i].clone()))
    }
}

impl SensitivityClassifier for PatternClassifier {
    fn is_sensitive(&self, token: &TextToken) -> bool {
        self.reason(token).is_some()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| RedactError::Config(e.to_string()))
}
