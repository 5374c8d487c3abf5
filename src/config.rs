//! Configuration for the redaction engine
//!
//! All values are in-process constants with sensible defaults. Hosts that
//! want to tune them can deserialize a JSON document; missing fields fall
//! back to the defaults.

use std::path::Path;

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::error::{RedactError, Result};

/// Default low-confidence threshold (tokens below it are redacted)
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 50.0;

/// Default padding around OCR boxes, in raster pixels
pub const DEFAULT_PADDING: u32 = 2;

/// Default manual stroke width, in raster pixels
pub const DEFAULT_STROKE_WIDTH: f32 = 25.0;

/// Default OCR timeout
pub const DEFAULT_OCR_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    pub classifier: ClassifierConfig,
    pub redaction: RedactionStyle,
    pub ocr: OcrConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Confidence (0-100) below which a token is always sensitive
    pub confidence_threshold: f64,
    /// Case-insensitive trigger keywords
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionStyle {
    /// Margin added on every side of an OCR box
    pub padding: u32,
    /// RGBA fill for auto-redacted regions
    pub fill_color: [u8; 4],
    /// Manual stroke width in raster pixels
    pub stroke_width: f32,
    /// RGBA color for manual strokes
    pub stroke_color: [u8; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Language code passed to the engine
    pub language: String,
    /// Upper bound on a single recognition pass
    pub timeout_secs: u64,
    /// Path to the tesseract executable (default uses PATH)
    pub tesseract_path: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            redaction: RedactionStyle::default(),
            ocr: OcrConfig::default(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            keywords: ["IBAN", "Total", "Address", "Phone", "Invoice", "Amount"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl Default for RedactionStyle {
    fn default() -> Self {
        Self {
            padding: DEFAULT_PADDING,
            fill_color: [0, 0, 0, 255],
            stroke_width: DEFAULT_STROKE_WIDTH,
            stroke_color: [0, 0, 0, 255],
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            timeout_secs: DEFAULT_OCR_TIMEOUT_SECS,
            tesseract_path: "tesseract".to_string(),
        }
    }
}

impl RedactionStyle {
    pub fn fill(&self) -> Rgba<u8> {
        Rgba(self.fill_color)
    }

    pub fn stroke(&self) -> Rgba<u8> {
        Rgba(self.stroke_color)
    }
}

impl RedactionConfig {
    /// Parse a JSON document, filling gaps with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RedactError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reject values the engine cannot honor
    pub fn validate(&self) -> Result<()> {
        let threshold = self.classifier.confidence_threshold;
        if !threshold.is_finite() || !(0.0..=100.0).contains(&threshold) {
            return Err(RedactError::Config(format!(
                "confidence_threshold must be within 0-100, got {}",
                threshold
            )));
        }
        let width = self.redaction.stroke_width;
        if !width.is_finite() || width <= 0.0 {
            return Err(RedactError::Config(format!(
                "stroke_width must be positive, got {}",
                width
            )));
        }
        if self.ocr.language.trim().is_empty() {
            return Err(RedactError::Config("ocr.language must not be empty".to_string()));
        }
        if self.ocr.timeout_secs == 0 {
            return Err(RedactError::Config("ocr.timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }
}
