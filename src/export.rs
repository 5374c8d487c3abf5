//! Export
//!
//! Serializes the current raster to a portable image. The output is built
//! from the live pixel grid only, so nothing from before a redaction can
//! survive into the file. Export never mutates the buffer.

use std::io::{Cursor, Write};
use std::path::Path;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::{RedactError, Result};
use crate::raster::RasterBuffer;

/// Default download name for a sanitized document
pub const DEFAULT_FILE_NAME: &str = "sanitized-invoice.png";

/// Output image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Webp => "webp",
        }
    }

    /// Suggested file name for a download in this format
    pub fn file_name(&self) -> String {
        match self {
            ExportFormat::Png => DEFAULT_FILE_NAME.to_string(),
            other => format!("sanitized-invoice.{}", other.extension()),
        }
    }
}

/// Encode the buffer exactly as it currently is
pub fn serialize(buffer: &RasterBuffer, format: ExportFormat) -> Result<Vec<u8>> {
    let mut output = Vec::new();

    match format {
        ExportFormat::Png => {
            DynamicImage::ImageRgba8(buffer.as_image().clone())
                .write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png)
                .map_err(|e| RedactError::Encode(e.to_string()))?;
        }
        ExportFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(buffer.as_image().clone()).into_rgb8();
            DynamicImage::ImageRgb8(rgb)
                .write_to(&mut Cursor::new(&mut output), image::ImageFormat::Jpeg)
                .map_err(|e| RedactError::Encode(e.to_string()))?;
        }
        ExportFormat::Webp => {
            DynamicImage::ImageRgba8(buffer.as_image().clone())
                .write_to(&mut Cursor::new(&mut output), image::ImageFormat::WebP)
                .map_err(|e| RedactError::Encode(e.to_string()))?;
        }
    }

    tracing::debug!(
        format = format.content_type(),
        bytes = output.len(),
        "Serialized raster"
    );

    Ok(output)
}

/// Serialize and hand the bytes to a caller-provided sink
pub fn write_to<W: Write>(buffer: &RasterBuffer, format: ExportFormat, sink: &mut W) -> Result<usize> {
    let bytes = serialize(buffer, format)?;
    sink.write_all(&bytes)?;
    sink.flush()?;
    Ok(bytes.len())
}

/// Serialize to a file on local disk
pub fn save(buffer: &RasterBuffer, format: ExportFormat, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let mut file = std::fs::File::create(path)?;
    let written = write_to(buffer, format, &mut file)?;

    tracing::info!(path = %path.display(), bytes = written, "Exported sanitized image");

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    #[test]
    fn test_png_round_trips_current_pixels() {
        let mut buffer = RasterBuffer::new(12, 8, WHITE);
        buffer.fill_rect(2, 2, 4, 3, BLACK);

        let bytes = serialize(&buffer, ExportFormat::Png).unwrap();
        let decoded = RasterBuffer::decode(&bytes, "image/png").unwrap();

        assert_eq!(decoded, buffer);
    }

    #[test]
    fn test_export_does_not_mutate() {
        let buffer = RasterBuffer::new(5, 5, WHITE);
        let before = buffer.clone();
        serialize(&buffer, ExportFormat::Jpeg).unwrap();
        assert_eq!(buffer, before);
    }

    #[test]
    fn test_jpeg_is_decodable() {
        let buffer = RasterBuffer::new(16, 16, WHITE);
        let bytes = serialize(&buffer, ExportFormat::Jpeg).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Jpeg);
    }

    #[test]
    fn test_write_to_sink() {
        let buffer = RasterBuffer::new(4, 4, BLACK);
        let mut sink = Vec::new();
        let written = write_to(&buffer, ExportFormat::Png, &mut sink).unwrap();

        assert_eq!(written, sink.len());
        assert_eq!(image::guess_format(&sink).unwrap(), image::ImageFormat::Png);
    }

    #[test]
    fn test_save_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ExportFormat::Png.file_name());
        let buffer = RasterBuffer::new(4, 4, BLACK);

        save(&buffer, ExportFormat::Png, &path).unwrap();

        let reloaded = RasterBuffer::open(&path).unwrap();
        assert_eq!(reloaded, buffer);
    }

    #[test]
    fn test_file_names() {
        assert_eq!(ExportFormat::default().file_name(), "sanitized-invoice.png");
        assert_eq!(ExportFormat::Jpeg.file_name(), "sanitized-invoice.jpg");
        assert_eq!(ExportFormat::Webp.content_type(), "image/webp");
    }
}
