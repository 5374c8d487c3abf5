//! Raster buffer
//!
//! The in-memory pixel grid that every redaction writes into. Dimensions are
//! fixed when an image is loaded; mutations only ever overwrite existing
//! pixels. There is no undo buffer: once a region is filled the previous
//! samples are gone.

use std::path::Path;

use image::{DynamicImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{RedactError, Result};
use crate::export::{self, ExportFormat};

/// Point in raster pixel space. Pixel `(x, y)` sits at `Point { x, y }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Pixel-based rectangle, always within the raster it was clamped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// End cap for stroked segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    #[default]
    Round,
    Butt,
}

/// Owned RGBA pixel grid
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    image: RgbaImage,
}

impl RasterBuffer {
    /// Create a buffer filled with a flat color
    pub fn new(width: u32, height: u32, background: Rgba<u8>) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, background),
        }
    }

    /// Take ownership of a decoded image
    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            image: image.into_rgba8(),
        }
    }

    /// Decode uploaded bytes, rejecting anything not declared as an image
    pub fn decode(bytes: &[u8], mime_type: &str) -> Result<Self> {
        if !is_image_mime(mime_type) {
            return Err(RedactError::UnsupportedFileType(mime_type.to_string()));
        }

        let image =
            image::load_from_memory(bytes).map_err(|e| RedactError::Decode(e.to_string()))?;
        let buffer = Self::from_image(image);

        tracing::debug!(
            width = buffer.width(),
            height = buffer.height(),
            mime_type,
            "Decoded upload"
        );

        Ok(buffer)
    }

    /// Read and decode an image file, guessing its MIME type from the extension
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        if mime.type_() != mime_guess::mime::IMAGE {
            return Err(RedactError::UnsupportedFileType(mime.essence_str().to_string()));
        }

        let bytes = std::fs::read(path)?;
        Self::decode(&bytes, mime.essence_str())
    }

    /// Replace the entire content with a new image
    pub fn load(&mut self, image: DynamicImage) {
        self.image = image.into_rgba8();
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.image.get_pixel_checked(x, y).copied()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    /// Clamp a signed rectangle to the raster. `None` when nothing remains.
    pub fn clamp_rect(&self, x: i64, y: i64, width: i64, height: i64) -> Option<PixelRect> {
        if width <= 0 || height <= 0 {
            return None;
        }

        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(width).min(self.width() as i64);
        let y1 = y.saturating_add(height).min(self.height() as i64);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(PixelRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }

    /// Overwrite every pixel of the rectangle with a flat color.
    ///
    /// Returns the region actually written, or `None` if the rectangle has
    /// no area after clamping.
    pub fn fill_rect(
        &mut self,
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        color: Rgba<u8>,
    ) -> Option<PixelRect> {
        let rect = self.clamp_rect(x, y, width, height)?;

        for py in rect.y..rect.y + rect.height {
            for px in rect.x..rect.x + rect.width {
                self.image.put_pixel(px, py, color);
            }
        }

        Some(rect)
    }

    /// Draw a thick segment, overwriting every pixel within `width / 2` of it.
    ///
    /// Returns the bounding box of the touched area, if any.
    pub fn stroke_line(
        &mut self,
        from: Point,
        to: Point,
        width: f32,
        color: Rgba<u8>,
        cap: LineCap,
    ) -> Option<PixelRect> {
        if !(width > 0.0) || !all_finite(&[from.x, from.y, to.x, to.y]) {
            return None;
        }

        let (fx, fy) = (from.x as f64, from.y as f64);
        let (tx, ty) = (to.x as f64, to.y as f64);
        let dx = tx - fx;
        let dy = ty - fy;
        let len2 = dx * dx + dy * dy;
        if cap == LineCap::Butt && len2 == 0.0 {
            return None;
        }

        let radius = width as f64 / 2.0;
        let r2 = radius * radius;

        // Bounds are clipped to the raster before the integer cast
        let clip = |v: f64, limit: u32| v.clamp(-1.0, limit as f64 + 1.0) as i64;
        let min_x = clip((fx.min(tx) - radius).floor(), self.width());
        let min_y = clip((fy.min(ty) - radius).floor(), self.height());
        let max_x = clip((fx.max(tx) + radius).ceil(), self.width());
        let max_y = clip((fy.max(ty) + radius).ceil(), self.height());
        let bounds = self.clamp_rect(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)?;

        let mut touched: Option<(u32, u32, u32, u32)> = None;

        for py in bounds.y..bounds.y + bounds.height {
            for px in bounds.x..bounds.x + bounds.width {
                let cx = px as f64;
                let cy = py as f64;

                // Distances are taken relative to the pixel, never by
                // interpolating from a far endpoint
                let before_start = (cx - fx) * dx + (cy - fy) * dy < 0.0;
                let past_end = (cx - tx) * dx + (cy - ty) * dy > 0.0;
                let dist2 = if len2 == 0.0 {
                    (cx - fx).powi(2) + (cy - fy).powi(2)
                } else if before_start || past_end {
                    if cap == LineCap::Butt {
                        continue;
                    }
                    let (ex, ey) = if before_start { (fx, fy) } else { (tx, ty) };
                    (cx - ex).powi(2) + (cy - ey).powi(2)
                } else {
                    let cross = dx * (cy - fy) - dy * (cx - fx);
                    cross * cross / len2
                };
                if dist2 > r2 {
                    continue;
                }

                self.image.put_pixel(px, py, color);
                touched = Some(match touched {
                    None => (px, py, px, py),
                    Some((x0, y0, x1, y1)) => (x0.min(px), y0.min(py), x1.max(px), y1.max(py)),
                });
            }
        }

        touched.map(|(x0, y0, x1, y1)| PixelRect {
            x: x0,
            y: y0,
            width: x1 - x0 + 1,
            height: y1 - y0 + 1,
        })
    }

    /// Encode the current pixel state
    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>> {
        export::serialize(self, format)
    }
}

/// Check whether a MIME type names an image (`image/*`, parameters ignored)
pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type
        .split(';')
        .next()
        .map(|essence| essence.trim().to_ascii_lowercase())
        .and_then(|essence| essence.split_once('/').map(|(t, s)| (t == "image") && !s.is_empty()))
        .unwrap_or(false)
}

fn all_finite(values: &[f32]) -> bool {
    values.iter().all(|v| v.is_finite())
}
