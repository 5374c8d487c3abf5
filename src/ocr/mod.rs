//! OCR Module
//!
//! Turns the current raster into word tokens with pixel bounding boxes and
//! confidence scores. The engine itself is a black box behind
//! [`OcrProviderTrait`]; the bundled backend drives a local Tesseract
//! install, and embedding applications can plug in their own.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use invoice_sanitizer::config::OcrConfig;
//! use invoice_sanitizer::ocr::OcrAdapter;
//!
//! let adapter = OcrAdapter::new(&OcrConfig::default());
//! let tokens = adapter.recognize(&buffer).await?;
//! ```

mod provider;
mod service;
mod types;

pub use provider::{parse_tsv, OcrProviderTrait, TesseractProvider};
pub use service::OcrAdapter;
pub use types::{validate_language, BoundingBox, OcrError, OcrProvider, TextToken};

#[cfg(test)]
pub(crate) use provider::testing;
