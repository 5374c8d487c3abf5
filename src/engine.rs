//! Redaction engine
//!
//! Orchestrates OCR, classification and pixel overwrites:
//!
//! - auto-redaction turns every sensitive token into a padded, clamped
//!   rectangle and fills it;
//! - manual strokes map pointer positions from display space into raster
//!   space before drawing, so the black lands on the pixel the user
//!   actually pointed at regardless of display scaling.
//!
//! The engine is stateless apart from its collaborators. Flags and the
//! drawing state machine live in [`crate::session::Session`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classifier::{PatternClassifier, SensitivityClassifier};
use crate::config::{RedactionConfig, RedactionStyle};
use crate::error::{RedactError, Result};
use crate::ocr::{BoundingBox, OcrAdapter, TextToken};
use crate::raster::{LineCap, PixelRect, Point, RasterBuffer};

/// A token box plus the margin to add around it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RedactionRect {
    pub token_box: BoundingBox,
    pub padding: u32,
}

impl RedactionRect {
    pub fn new(token_box: BoundingBox, padding: u32) -> Self {
        Self { token_box, padding }
    }

    /// Padded box, inclusive on every edge
    pub fn region(&self) -> BoundingBox {
        self.token_box.expand(self.padding as i64)
    }

    /// Intersect the padded box with the raster
    pub fn clamp_to(&self, buffer: &RasterBuffer) -> Option<PixelRect> {
        let region = self.region();
        // Pull far edges in to one pixel past the raster so widths stay small
        let (width, height) = (buffer.width() as i64, buffer.height() as i64);
        let x0 = region.x0.clamp(-1, width);
        let y0 = region.y0.clamp(-1, height);
        let x1 = region.x1.clamp(-1, width);
        let y1 = region.y1.clamp(-1, height);
        buffer.clamp_rect(x0, y0, x1 - x0 + 1, y1 - y0 + 1)
    }
}

/// Pointer position in on-screen display coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DevicePoint {
    pub x: f32,
    pub y: f32,
}

impl DevicePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Where the raster is drawn on screen, in display units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Display placement plus native raster size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub display: DisplayRect,
    pub native_width: u32,
    pub native_height: u32,
}

impl Viewport {
    pub fn new(display: DisplayRect, native_width: u32, native_height: u32) -> Self {
        Self {
            display,
            native_width,
            native_height,
        }
    }

    /// Raster shown unscaled at the origin
    pub fn identity(width: u32, height: u32) -> Self {
        Self::new(
            DisplayRect {
                left: 0.0,
                top: 0.0,
                width: width as f32,
                height: height as f32,
            },
            width,
            height,
        )
    }

    /// Scale factors `native / display` per axis
    pub fn scale(&self) -> Result<(f32, f32)> {
        let DisplayRect { width, height, .. } = self.display;
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(RedactError::InvalidViewport(format!(
                "display size must be positive, got {}x{}",
                width, height
            )));
        }
        let sx = self.native_width as f32 / width;
        let sy = self.native_height as f32 / height;
        if !(sx.is_finite() && sy.is_finite()) {
            return Err(RedactError::InvalidViewport(format!(
                "display size {}x{} too small for a {}x{} raster",
                width, height, self.native_width, self.native_height
            )));
        }
        Ok((sx, sy))
    }

    /// Map a device point into raster space
    pub fn to_raster(&self, point: DevicePoint) -> Result<Point> {
        let (sx, sy) = self.scale()?;
        let mapped = Point::new(
            (point.x - self.display.left) * sx,
            (point.y - self.display.top) * sy,
        );
        if !(mapped.x.is_finite() && mapped.y.is_finite()) {
            return Err(RedactError::InvalidViewport(format!(
                "point ({}, {}) does not map to a finite raster position",
                point.x, point.y
            )));
        }
        Ok(mapped)
    }
}

/// Outcome of an auto-redaction pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RedactionReport {
    /// Tokens returned by OCR
    pub tokens: usize,
    /// Tokens classified as sensitive
    pub sensitive: usize,
    /// Regions actually filled, in OCR order
    pub regions: Vec<PixelRect>,
}

impl RedactionReport {
    pub fn count(&self) -> usize {
        self.regions.len()
    }
}

pub struct RedactionEngine {
    ocr: OcrAdapter,
    classifier: Arc<dyn SensitivityClassifier>,
    style: RedactionStyle,
}

impl RedactionEngine {
    /// Local Tesseract OCR with the pattern classifier
    pub fn new(config: &RedactionConfig) -> Result<Self> {
        config.validate()?;
        let classifier = PatternClassifier::new(&config.classifier)?;
        Ok(Self::with_parts(
            OcrAdapter::new(&config.ocr),
            Arc::new(classifier),
            config.redaction.clone(),
        ))
    }

    pub fn with_parts(
        ocr: OcrAdapter,
        classifier: Arc<dyn SensitivityClassifier>,
        style: RedactionStyle,
    ) -> Self {
        Self {
            ocr,
            classifier,
            style,
        }
    }

    /// Swap the sensitivity predicate
    pub fn with_classifier(mut self, classifier: Arc<dyn SensitivityClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn ocr(&self) -> &OcrAdapter {
        &self.ocr
    }

    pub fn style(&self) -> &RedactionStyle {
        &self.style
    }

    /// Padded rectangles for every sensitive token, in OCR order
    pub fn plan(&self, tokens: &[TextToken]) -> Vec<RedactionRect> {
        tokens
            .iter()
            .filter(|token| self.classifier.is_sensitive(token))
            .map(|token| RedactionRect::new(token.bbox, self.style.padding))
            .collect()
    }

    /// Fill the planned rectangles. Rectangles entirely off the raster are
    /// skipped and not reported.
    pub fn apply(&self, buffer: &mut RasterBuffer, rects: &[RedactionRect]) -> Vec<PixelRect> {
        let fill = self.style.fill();
        rects
            .iter()
            .filter_map(|rect| {
                let clamped = rect.clamp_to(buffer)?;
                buffer.fill_rect(
                    clamped.x as i64,
                    clamped.y as i64,
                    clamped.width as i64,
                    clamped.height as i64,
                    fill,
                )
            })
            .collect()
    }

    /// Classify recognized tokens and black out the sensitive ones
    pub fn redact_tokens(&self, buffer: &mut RasterBuffer, tokens: &[TextToken]) -> RedactionReport {
        let rects = self.plan(tokens);
        let regions = self.apply(buffer, &rects);

        tracing::info!(
            tokens = tokens.len(),
            sensitive = rects.len(),
            regions = regions.len(),
            "Applied redactions"
        );

        RedactionReport {
            tokens: tokens.len(),
            sensitive: rects.len(),
            regions,
        }
    }

    /// Run OCR over the buffer, then redact.
    ///
    /// Nothing is written unless recognition succeeds in full.
    pub async fn auto_redact(&self, buffer: &mut RasterBuffer) -> Result<RedactionReport> {
        let tokens = self.ocr.recognize(buffer).await?;
        Ok(self.redact_tokens(buffer, &tokens))
    }

    /// Draw one manual stroke segment given in display coordinates
    pub fn manual_stroke(
        &self,
        buffer: &mut RasterBuffer,
        from: DevicePoint,
        to: DevicePoint,
        viewport: &Viewport,
    ) -> Result<Option<PixelRect>> {
        let from = viewport.to_raster(from)?;
        let to = viewport.to_raster(to)?;
        Ok(self.stroke_raster(buffer, from, to))
    }

    /// Draw a segment already in raster coordinates
    pub fn stroke_raster(&self, buffer: &mut RasterBuffer, from: Point, to: Point) -> Option<PixelRect> {
        buffer.stroke_line(
            from,
            to,
            self.style.stroke_width,
            self.style.stroke(),
            LineCap::Round,
        )
    }
}
