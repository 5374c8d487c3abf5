//! Error types for the sanitizer
//!
//! Every failure is local and recoverable: none of them invalidate the
//! session, only clearing the image resets state.

use thiserror::Error;

use crate::ocr::OcrError;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, RedactError>;

/// Sanitizer error type
#[derive(Debug, Error)]
pub enum RedactError {
    /// Upload was not an image; no raster is created
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Upload claimed to be an image but could not be decoded
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// OCR engine failed or returned malformed data
    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    /// OCR did not finish within the configured bound
    #[error("OCR timed out after {0} seconds")]
    OcrTimeout(u64),

    /// Operation requires a loaded image
    #[error("No image loaded")]
    NotLoaded,

    /// An auto-redact pass is already in flight
    #[error("Auto-redact already in progress")]
    Busy,

    /// The image was replaced while an auto-redact pass was reading it
    #[error("Image changed during auto-redact; nothing was applied")]
    RasterChanged,

    /// Manual strokes are rejected while auto-redact runs
    #[error("Manual redaction is disabled while auto-redact is running")]
    ManualInputDisabled,

    /// Display geometry cannot be mapped onto the raster
    #[error("Invalid viewport: {0}")]
    InvalidViewport(String),

    /// Failed to encode the raster for export or OCR
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error while writing an export or reading an upload
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RedactError {
    /// Short machine-readable kind, suitable for surfacing to a UI
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFileType(_) => "unsupported_file_type",
            Self::Decode(_) => "decode_error",
            Self::Ocr(_) => "ocr_error",
            Self::OcrTimeout(_) => "ocr_timeout",
            Self::NotLoaded => "not_loaded",
            Self::Busy => "busy",
            Self::RasterChanged => "raster_changed",
            Self::ManualInputDisabled => "manual_input_disabled",
            Self::InvalidViewport(_) => "invalid_viewport",
            Self::Encode(_) => "encode_error",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ocr_error_converts() {
        let err: RedactError = OcrError::ProcessingError("engine crashed".to_string()).into();
        assert_eq!(err.kind(), "ocr_error");
        assert!(err.to_string().contains("engine crashed"));
    }

    #[test]
    fn test_timeout_message() {
        let err = RedactError::OcrTimeout(30);
        assert_eq!(err.to_string(), "OCR timed out after 30 seconds");
    }
}
