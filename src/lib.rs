//! Invoice Sanitizer
//!
//! Local, destructive redaction of document images. An uploaded image is
//! decoded into a raster, OCR locates words, a coarse classifier flags the
//! sensitive ones and their boxes are painted over. Users can paint over
//! anything else by hand before exporting a flattened image. Nothing leaves
//! the process.
//!
//! # Modules
//!
//! - `raster`: pixel buffer with rectangle fills and thick strokes
//! - `ocr`: OCR adapter and providers (Tesseract)
//! - `classifier`: sensitivity predicate
//! - `engine`: auto-redaction and manual stroke mapping
//! - `session`: loaded image, processing flag, drawing state
//! - `export`: serialization of the final raster
//!
//! ```rust,ignore
//! use invoice_sanitizer::{ExportFormat, RedactionConfig, Session};
//!
//! let session = Session::new(&RedactionConfig::default())?;
//! session.load(&bytes, "image/png")?;
//! let report = session.auto_redact().await?;
//! let png = session.export(ExportFormat::Png)?;
//! ```

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod ocr;
pub mod raster;
pub mod session;

pub use classifier::{PatternClassifier, SensitivityClassifier};
pub use config::RedactionConfig;
pub use engine::{DevicePoint, DisplayRect, RedactionEngine, RedactionReport, Viewport};
pub use error::{RedactError, Result};
pub use export::ExportFormat;
pub use raster::RasterBuffer;
pub use session::{DrawState, Session};
