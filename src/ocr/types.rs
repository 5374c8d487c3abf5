//! OCR Types
//!
//! Defines the tokens produced by a recognition pass over a raster.

use serde::{Deserialize, Serialize};

/// OCR provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrProvider {
    /// Tesseract OCR (local command-line engine)
    Tesseract,
    /// Engine supplied by the embedding application
    External,
}

impl Default for OcrProvider {
    fn default() -> Self {
        Self::Tesseract
    }
}

/// Bounding box in raster pixel coordinates (`x0 <= x1`, `y0 <= y1`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl BoundingBox {
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Build from a top-left corner and size, as Tesseract reports it.
    /// `None` if the far edge does not fit in an `i64`.
    pub fn from_origin_size(left: i64, top: i64, width: i64, height: i64) -> Option<Self> {
        Some(Self {
            x0: left,
            y0: top,
            x1: left.checked_add(width)?,
            y1: top.checked_add(height)?,
        })
    }

    pub fn is_well_formed(&self) -> bool {
        self.x0 <= self.x1 && self.y0 <= self.y1
    }

    /// Grow by `margin` on every side
    pub fn expand(&self, margin: i64) -> Self {
        Self {
            x0: self.x0.saturating_sub(margin),
            y0: self.y0.saturating_sub(margin),
            x1: self.x1.saturating_add(margin),
            y1: self.y1.saturating_add(margin),
        }
    }
}

/// Single recognized word
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    /// Word text
    pub text: String,
    /// Bounding box in raster pixels
    pub bbox: BoundingBox,
    /// Confidence score (0-100)
    pub confidence: f64,
}

impl TextToken {
    pub fn new(text: impl Into<String>, bbox: BoundingBox, confidence: f64) -> Self {
        Self {
            text: text.into(),
            bbox,
            confidence,
        }
    }
}

/// OCR error types
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("OCR provider not available: {0}")]
    ProviderNotAvailable(String),

    #[error("Failed to prepare image for OCR: {0}")]
    ImageExtractionError(String),

    #[error("OCR processing failed: {0}")]
    ProcessingError(String),

    #[error("Malformed OCR output: {0}")]
    MalformedOutput(String),

    #[error("Invalid language code: {0}")]
    InvalidLanguage(String),
}

/// Validate language code to prevent argument injection
pub fn validate_language(lang: &str) -> Result<(), OcrError> {
    // e.g. "eng", "eng+deu", "chi_sim"
    if lang.is_empty() || lang.len() > 20 {
        return Err(OcrError::InvalidLanguage(format!(
            "length must be 1-20, got {}",
            lang.len()
        )));
    }
    for c in lang.chars() {
        if !c.is_ascii_alphanumeric() && c != '+' && c != '_' {
            return Err(OcrError::InvalidLanguage(format!(
                "invalid character in language code: {}",
                c
            )));
        }
    }
    Ok(())
}
