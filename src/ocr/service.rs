//! OCR Adapter
//!
//! Runs the configured providers against a raster snapshot and normalizes
//! their output into validated text tokens.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::{
    provider::{OcrProviderTrait, TesseractProvider},
    types::{validate_language, OcrError, OcrProvider, TextToken},
};
use crate::config::OcrConfig;
use crate::error::{RedactError, Result};
use crate::raster::RasterBuffer;

/// OCR adapter for the current raster
pub struct OcrAdapter {
    language: String,
    timeout_secs: u64,
    providers: Vec<Arc<dyn OcrProviderTrait>>,
}

impl OcrAdapter {
    /// Create an adapter backed by the local Tesseract engine
    pub fn new(config: &OcrConfig) -> Self {
        let tesseract: Arc<dyn OcrProviderTrait> =
            Arc::new(TesseractProvider::new(&config.tesseract_path));
        Self::with_providers(config, vec![tesseract])
    }

    /// Create an adapter with an explicit provider order
    pub fn with_providers(config: &OcrConfig, providers: Vec<Arc<dyn OcrProviderTrait>>) -> Self {
        Self {
            language: config.language.clone(),
            timeout_secs: config.timeout_secs,
            providers,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Get available providers
    pub async fn available_providers(&self) -> Vec<OcrProvider> {
        let mut available = Vec::new();
        for provider in &self.providers {
            if provider.is_available().await {
                available.push(provider.provider_type());
            }
        }
        available
    }

    /// Recognize the words in the buffer.
    ///
    /// The buffer is only read. The whole pass is bounded by the configured
    /// timeout and fails with [`RedactError::OcrTimeout`] when exceeded.
    pub async fn recognize(&self, buffer: &RasterBuffer) -> Result<Vec<TextToken>> {
        let snapshot = buffer
            .export(crate::export::ExportFormat::Png)
            .map_err(|e| OcrError::ImageExtractionError(e.to_string()))?;
        self.recognize_snapshot(&snapshot).await
    }

    /// Recognize words in an already encoded PNG snapshot
    pub async fn recognize_snapshot(&self, snapshot: &[u8]) -> Result<Vec<TextToken>> {
        validate_language(&self.language)?;

        let tokens = timeout(
            Duration::from_secs(self.timeout_secs),
            self.run_providers(snapshot),
        )
        .await
        .map_err(|_| RedactError::OcrTimeout(self.timeout_secs))??;

        let tokens = normalize(tokens)?;
        tracing::debug!(tokens = tokens.len(), language = %self.language, "OCR pass complete");
        Ok(tokens)
    }

    /// Try providers in order, falling back on failure
    async fn run_providers(&self, snapshot: &[u8]) -> std::result::Result<Vec<TextToken>, OcrError> {
        let mut last_error = None;

        for provider in &self.providers {
            if !provider.is_available().await {
                continue;
            }
            match provider.recognize(snapshot, &self.language).await {
                Ok(tokens) => return Ok(tokens),
                Err(e) => {
                    tracing::warn!(
                        "OCR provider {:?} failed: {}, trying next",
                        provider.provider_type(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            OcrError::ProviderNotAvailable("No OCR providers available".to_string())
        }))
    }
}

/// Reject tokens no engine should produce
fn normalize(tokens: Vec<TextToken>) -> std::result::Result<Vec<TextToken>, OcrError> {
    for token in &tokens {
        if !token.confidence.is_finite() || !(0.0..=100.0).contains(&token.confidence) {
            return Err(OcrError::MalformedOutput(format!(
                "confidence {} outside 0-100",
                token.confidence
            )));
        }
        if !token.bbox.is_well_formed() {
            return Err(OcrError::MalformedOutput(format!(
                "inverted bounding box {:?}",
                token.bbox
            )));
        }
    }
    Ok(tokens)
}
