//! OCR Providers
//!
//! Defines the provider trait and the Tesseract command-line backend.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::types::{BoundingBox, OcrError, OcrProvider, TextToken};

/// OCR provider trait
#[async_trait]
pub trait OcrProviderTrait: Send + Sync {
    /// Get the provider type
    fn provider_type(&self) -> OcrProvider;

    /// Check if the provider is available
    async fn is_available(&self) -> bool;

    /// Recognize words in a PNG-encoded raster snapshot
    async fn recognize(&self, image_data: &[u8], language: &str) -> Result<Vec<TextToken>, OcrError>;
}

/// Tesseract OCR provider
///
/// Pipes the snapshot through `tesseract stdin stdout tsv`, so nothing
/// touches disk.
pub struct TesseractProvider {
    /// Path to tesseract executable
    binary: String,
}

impl TesseractProvider {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }
}

impl Default for TesseractProvider {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

#[async_trait]
impl OcrProviderTrait for TesseractProvider {
    fn provider_type(&self) -> OcrProvider {
        OcrProvider::Tesseract
    }

    async fn is_available(&self) -> bool {
        let result = Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        matches!(result, Ok(status) if status.success())
    }

    async fn recognize(&self, image_data: &[u8], language: &str) -> Result<Vec<TextToken>, OcrError> {
        let mut child = Command::new(&self.binary)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .arg("--psm")
            .arg("3")
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OcrError::ProviderNotAvailable(format!("Failed to run tesseract: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(image_data)
                .await
                .map_err(|e| OcrError::ProcessingError(format!("Failed to send image: {}", e)))?;
            // Closing stdin lets tesseract start recognizing
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OcrError::ProcessingError(format!("Failed to wait for tesseract: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::ProcessingError(format!(
                "Tesseract failed: {}",
                stderr.trim()
            )));
        }

        let tsv = String::from_utf8(output.stdout)
            .map_err(|e| OcrError::MalformedOutput(format!("Output is not UTF-8: {}", e)))?;

        parse_tsv(&tsv)
    }
}

/// Tesseract TSV row level for single words
const WORD_LEVEL: u32 = 5;

/// Parse Tesseract TSV output into word tokens.
///
/// Columns: level, page_num, block_num, par_num, line_num, word_num, left,
/// top, width, height, conf, text. Only word rows with non-blank text are
/// kept.
pub fn parse_tsv(tsv: &str) -> Result<Vec<TextToken>, OcrError> {
    let mut tokens = Vec::new();

    for (line_no, line) in tsv.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with("level") {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 11 {
            return Err(OcrError::MalformedOutput(format!(
                "line {}: expected at least 11 columns, found {}",
                line_no + 1,
                fields.len()
            )));
        }

        let level: u32 = parse_field(fields[0], "level", line_no)?;
        if level != WORD_LEVEL {
            continue;
        }

        let text = fields.get(11).map(|t| t.trim()).unwrap_or("");
        if text.is_empty() {
            continue;
        }

        let left: i64 = parse_field(fields[6], "left", line_no)?;
        let top: i64 = parse_field(fields[7], "top", line_no)?;
        let width: i64 = parse_field(fields[8], "width", line_no)?;
        let height: i64 = parse_field(fields[9], "height", line_no)?;
        let confidence: f64 = parse_field(fields[10], "conf", line_no)?;

        let bbox = BoundingBox::from_origin_size(left, top, width, height).ok_or_else(|| {
            OcrError::MalformedOutput(format!(
                "line {}: box {}+{} x {}+{} out of range",
                line_no + 1,
                left,
                width,
                top,
                height
            ))
        })?;

        tokens.push(TextToken::new(text, bbox, confidence));
    }

    Ok(tokens)
}

fn parse_field<T: std::str::FromStr>(value: &str, name: &str, line_no: usize) -> Result<T, OcrError> {
    value.trim().parse().map_err(|_| {
        OcrError::MalformedOutput(format!(
            "line {}: invalid {} value {:?}",
            line_no + 1,
            name,
            value
        ))
    })
}
