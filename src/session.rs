//! Document session
//!
//! Owns the current raster and the flags around it:
//! - whether an image is loaded,
//! - whether an auto-redact pass is in flight (at most one at a time),
//! - the manual drawing state machine (`Idle` / `Drawing`).
//!
//! While auto-redact runs, manual input, load and clear are rejected so the
//! raster only ever has one writer. Those checks are made while holding the
//! raster write lock. Locks are never held across `.await`. Lock order is
//! `drawing` before `raster`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use image::DynamicImage;
use parking_lot::{Mutex, RwLock};

use crate::config::RedactionConfig;
use crate::engine::{DevicePoint, RedactionEngine, RedactionReport, Viewport};
use crate::error::{RedactError, Result};
use crate::export::{self, ExportFormat};
use crate::ocr::OcrError;
use crate::raster::{PixelRect, Point, RasterBuffer};

/// Manual drawing state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawState {
    Idle,
    /// A gesture is in progress; `last` is the previous raster point
    Drawing { last: Point },
}

/// Shared handle to one document session
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    engine: RedactionEngine,
    raster: RwLock<Option<RasterBuffer>>,
    /// Bumped whenever the raster is replaced or cleared
    generation: AtomicU64,
    processing: AtomicBool,
    drawing: Mutex<DrawState>,
}

/// Clears the processing flag on every exit path
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Session {
    /// Create a session with the default engine for `config`
    pub fn new(config: &RedactionConfig) -> Result<Self> {
        Ok(Self::with_engine(RedactionEngine::new(config)?))
    }

    pub fn with_engine(engine: RedactionEngine) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                engine,
                raster: RwLock::new(None),
                generation: AtomicU64::new(0),
                processing: AtomicBool::new(false),
                drawing: Mutex::new(DrawState::Idle),
            }),
        }
    }

    pub fn engine(&self) -> &RedactionEngine {
        &self.inner.engine
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Decode an upload and make it the current image
    pub fn load(&self, bytes: &[u8], mime_type: &str) -> Result<(u32, u32)> {
        self.ensure_idle()?;
        let buffer = RasterBuffer::decode(bytes, mime_type)?;
        self.replace(Some(buffer))
    }

    /// Read an image file from disk and make it the current image
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<(u32, u32)> {
        self.ensure_idle()?;
        let buffer = RasterBuffer::open(path)?;
        self.replace(Some(buffer))
    }

    /// Use an already decoded image
    pub fn load_image(&self, image: DynamicImage) -> Result<(u32, u32)> {
        self.ensure_idle()?;
        self.replace(Some(RasterBuffer::from_image(image)))
    }

    /// Discard the current image and reset all state
    pub fn clear(&self) -> Result<()> {
        self.ensure_idle()?;
        self.replace(None)?;
        tracing::info!("Session cleared");
        Ok(())
    }

    /// Swap the raster. A pass may have started since the caller's early
    /// check, so the flag is read again under the write lock.
    fn replace(&self, buffer: Option<RasterBuffer>) -> Result<(u32, u32)> {
        let mut drawing = self.inner.drawing.lock();
        let mut raster = self.inner.raster.write();
        self.ensure_idle()?;

        let dimensions = buffer.as_ref().map(RasterBuffer::dimensions).unwrap_or((0, 0));
        *raster = buffer;
        *drawing = DrawState::Idle;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        if raster.is_some() {
            tracing::info!(
                width = dimensions.0,
                height = dimensions.1,
                "Loaded image into session"
            );
        }
        Ok(dimensions)
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_processing() {
            tracing::warn!("Rejected session change during auto-redact");
            return Err(RedactError::Busy);
        }
        Ok(())
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn is_loaded(&self) -> bool {
        self.inner.raster.read().is_some()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::SeqCst)
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.draw_state(), DrawState::Drawing { .. })
    }

    pub fn draw_state(&self) -> DrawState {
        *self.inner.drawing.lock()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.inner.raster.read().as_ref().map(RasterBuffer::dimensions)
    }

    /// Copy of the current raster
    pub fn snapshot(&self) -> Option<RasterBuffer> {
        self.inner.raster.read().clone()
    }

    /// Identity viewport for the loaded image
    pub fn native_viewport(&self) -> Result<Viewport> {
        let (width, height) = self.dimensions().ok_or(RedactError::NotLoaded)?;
        Ok(Viewport::identity(width, height))
    }

    // ========================================================================
    // Auto-redaction
    // ========================================================================

    /// Run OCR and black out every sensitive token.
    ///
    /// Rejects with [`RedactError::Busy`] while another pass is in flight.
    /// If recognition fails the raster is left untouched.
    pub async fn auto_redact(&self) -> Result<RedactionReport> {
        if self
            .inner
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Auto-redact already in progress, ignoring request");
            return Err(RedactError::Busy);
        }
        let _guard = ProcessingGuard(&self.inner.processing);

        // Any gesture in progress ends here
        *self.inner.drawing.lock() = DrawState::Idle;

        let (snapshot, generation) = {
            let raster = self.inner.raster.read();
            let buffer = raster.as_ref().ok_or(RedactError::NotLoaded)?;
            let snapshot = buffer
                .export(ExportFormat::Png)
                .map_err(|e| OcrError::ImageExtractionError(e.to_string()))?;
            (snapshot, self.inner.generation.load(Ordering::SeqCst))
        };

        tracing::info!("Starting auto-redact pass");
        let tokens = self.inner.engine.ocr().recognize_snapshot(&snapshot).await?;

        let mut raster = self.inner.raster.write();
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            tracing::warn!("Image replaced during auto-redact, discarding results");
            return Err(RedactError::RasterChanged);
        }
        let buffer = raster.as_mut().ok_or(RedactError::NotLoaded)?;
        Ok(self.inner.engine.redact_tokens(buffer, &tokens))
    }

    // ========================================================================
    // Manual drawing
    // ========================================================================

    /// Begin a gesture. The press point itself is stamped.
    pub fn pointer_down(&self, point: DevicePoint, viewport: &Viewport) -> Result<Option<PixelRect>> {
        let mut drawing = self.inner.drawing.lock();
        let (start, stamped) = self.with_manual_raster(|engine, buffer| {
            let start = viewport.to_raster(point)?;
            Ok((start, engine.stroke_raster(buffer, start, start)))
        })?;

        *drawing = DrawState::Drawing { last: start };
        tracing::debug!(x = start.x, y = start.y, "Manual stroke started");
        Ok(stamped)
    }

    /// Extend the current gesture. Moves without a press are ignored.
    pub fn pointer_move(&self, point: DevicePoint, viewport: &Viewport) -> Result<Option<PixelRect>> {
        let mut drawing = self.inner.drawing.lock();
        let DrawState::Drawing { last } = *drawing else {
            return Ok(None);
        };

        let result = self.with_manual_raster(|engine, buffer| {
            let next = viewport.to_raster(point)?;
            Ok((next, engine.stroke_raster(buffer, last, next)))
        });
        match result {
            Ok((next, touched)) => {
                *drawing = DrawState::Drawing { last: next };
                Ok(touched)
            }
            Err(e @ (RedactError::ManualInputDisabled | RedactError::NotLoaded)) => {
                *drawing = DrawState::Idle;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Finish the gesture on release. Returns whether one was in progress.
    pub fn pointer_up(&self) -> bool {
        self.finish_stroke()
    }

    /// Finish the gesture when the pointer leaves the drawable area
    pub fn pointer_leave(&self) -> bool {
        self.finish_stroke()
    }

    fn finish_stroke(&self) -> bool {
        let mut drawing = self.inner.drawing.lock();
        let was_drawing = matches!(*drawing, DrawState::Drawing { .. });
        *drawing = DrawState::Idle;
        if was_drawing {
            tracing::debug!("Manual stroke finished");
        }
        was_drawing
    }

    /// Draw a single segment outside of a gesture
    pub fn manual_stroke(
        &self,
        from: DevicePoint,
        to: DevicePoint,
        viewport: &Viewport,
    ) -> Result<Option<PixelRect>> {
        let _drawing = self.inner.drawing.lock();
        self.with_manual_raster(|engine, buffer| engine.manual_stroke(buffer, from, to, viewport))
    }

    /// Run a manual edit under the raster write lock, after checking that
    /// no auto-redact pass owns the raster
    fn with_manual_raster<T>(
        &self,
        edit: impl FnOnce(&RedactionEngine, &mut RasterBuffer) -> Result<T>,
    ) -> Result<T> {
        let mut raster = self.inner.raster.write();
        if self.is_processing() {
            return Err(RedactError::ManualInputDisabled);
        }
        let buffer = raster.as_mut().ok_or(RedactError::NotLoaded)?;
        edit(&self.inner.engine, buffer)
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Encode the current raster
    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>> {
        let raster = self.inner.raster.read();
        let buffer = raster.as_ref().ok_or(RedactError::NotLoaded)?;
        export::serialize(buffer, format)
    }

    /// Encode the current raster into a caller-provided sink
    pub fn export_to<W: std::io::Write>(&self, format: ExportFormat, sink: &mut W) -> Result<usize> {
        let raster = self.inner.raster.read();
        let buffer = raster.as_ref().ok_or(RedactError::NotLoaded)?;
        export::write_to(buffer, format, sink)
    }

    /// Save the current raster to disk
    pub fn save(&self, format: ExportFormat, path: impl AsRef<Path>) -> Result<usize> {
        let raster = self.inner.raster.read();
        let buffer = raster.as_ref().ok_or(RedactError::NotLoaded)?;
        export::save(buffer, format, path)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::classifier::PatternClassifier;
    use crate::config::OcrConfig;
    use crate::engine::DisplayRect;
    use crate::ocr::testing::MockProvider;
    use crate::ocr::{BoundingBox, OcrAdapter, TextToken};
    use image::{Rgba, RgbaImage};

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn session_with(provider: MockProvider) -> Session {
        let config = RedactionConfig::default();
        let engine = RedactionEngine::with_parts(
            OcrAdapter::with_providers(&OcrConfig::default(), vec![provider.into_dyn()]),
            Arc::new(PatternClassifier::new(&config.classifier).unwrap()),
            config.redaction,
        );
        Session::with_engine(engine)
    }

    fn white_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, WHITE))
    }

    fn email_token() -> TextToken {
        TextToken::new("invoice@acme.com", BoundingBox::new(10, 10, 90, 30), 95.0)
    }

    fn pixel(session: &Session, x: u32, y: u32) -> Option<Rgba<u8>> {
        session.snapshot().and_then(|b| b.pixel(x, y))
    }

    #[tokio::test]
    async fn test_auto_redact_requires_image() {
        let session = session_with(MockProvider::returning(vec![email_token()]));

        let result = session.auto_redact().await;

        assert!(matches!(result, Err(RedactError::NotLoaded)));
        assert!(!session.is_processing());
    }

    #[tokio::test]
    async fn test_auto_redact_end_to_end() {
        let session = session_with(MockProvider::returning(vec![email_token()]));
        session.load_image(white_image(200, 100)).unwrap();

        let report = session.auto_redact().await.unwrap();

        assert_eq!(report.count(), 1);
        assert!(!session.is_processing());
        assert_eq!(pixel(&session, 8, 8), Some(BLACK));
        assert_eq!(pixel(&session, 92, 32), Some(BLACK));
        assert_eq!(pixel(&session, 7, 8), Some(WHITE));
        assert_eq!(pixel(&session, 93, 32), Some(WHITE));
    }

    #[tokio::test]
    async fn test_ocr_failure_leaves_raster_and_clears_flag() {
        let session = session_with(MockProvider::failing("engine threw"));
        session.load_image(white_image(64, 64)).unwrap();
        let before = session.snapshot().unwrap();

        let result = session.auto_redact().await;

        assert!(matches!(result, Err(RedactError::Ocr(_))));
        assert_eq!(session.snapshot().unwrap(), before);
        assert!(!session.is_processing());

        // The user may retry after a failure
        assert!(matches!(session.auto_redact().await, Err(RedactError::Ocr(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_pass_blocks_other_writers() {
        let provider = MockProvider::returning(vec![email_token()]).with_delay(Duration::from_secs(30));
        let session = session_with(provider);
        session.load_image(white_image(200, 100)).unwrap();
        let viewport = session.native_viewport().unwrap();

        let background = session.clone();
        let handle = tokio::spawn(async move { background.auto_redact().await });
        while !session.is_processing() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(session.auto_redact().await, Err(RedactError::Busy)));
        assert!(matches!(
            session.pointer_down(DevicePoint::new(150.0, 80.0), &viewport),
            Err(RedactError::ManualInputDisabled)
        ));
        assert!(matches!(
            session.manual_stroke(DevicePoint::new(0.0, 0.0), DevicePoint::new(5.0, 5.0), &viewport),
            Err(RedactError::ManualInputDisabled)
        ));
        assert!(matches!(session.clear(), Err(RedactError::Busy)));
        assert!(matches!(session.load_image(white_image(5, 5)), Err(RedactError::Busy)));

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.count(), 1);
        assert!(!session.is_processing());
        assert_eq!(pixel(&session, 150, 80), Some(WHITE));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_upload_overlapping_pass_is_rejected() {
        let provider = MockProvider::returning(vec![email_token()]).with_delay(Duration::from_secs(2));
        let session = session_with(provider);
        session.load_image(white_image(200, 100)).unwrap();

        let mut upload = Vec::new();
        white_image(1500, 1500)
            .write_to(&mut std::io::Cursor::new(&mut upload), image::ImageFormat::Png)
            .unwrap();

        let background = session.clone();
        let pass = tokio::spawn(async move { background.auto_redact().await });
        while !session.is_processing() {
            tokio::task::yield_now().await;
        }

        let uploader = session.clone();
        let loaded = tokio::task::spawn_blocking(move || uploader.load(&upload, "image/png"));
        assert!(matches!(loaded.await.unwrap(), Err(RedactError::Busy)));

        // An upload that passed the early check before the pass began is
        // still refused when it comes to swap the raster
        let late = session.replace(Some(RasterBuffer::from_image(white_image(1500, 1500))));
        assert!(matches!(late, Err(RedactError::Busy)));

        let report = pass.await.unwrap().unwrap();
        assert_eq!(report.count(), 1);
        assert_eq!(session.dimensions(), Some((200, 100)));
        assert_eq!(pixel(&session, 50, 20), Some(BLACK));
        assert!(!session.is_processing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pass_discards_results_when_image_swapped() {
        let provider = MockProvider::returning(vec![email_token()]).with_delay(Duration::from_secs(30));
        let session = session_with(provider);
        session.load_image(white_image(200, 100)).unwrap();

        let background = session.clone();
        let handle = tokio::spawn(async move { background.auto_redact().await });
        while !session.is_processing() {
            tokio::task::yield_now().await;
        }

        // Swap the raster without going through the flag check
        {
            let mut raster = session.inner.raster.write();
            *raster = Some(RasterBuffer::from_image(white_image(300, 300)));
            session.inner.generation.fetch_add(1, Ordering::SeqCst);
        }

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(RedactError::RasterChanged)));
        assert_eq!(result.unwrap_err().kind(), "raster_changed");
        assert_eq!(pixel(&session, 50, 20), Some(WHITE));
        assert!(!session.is_processing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_raster_unchanged() {
        let provider = MockProvider::returning(vec![email_token()]).with_delay(Duration::from_secs(600));
        let session = session_with(provider);
        session.load_image(white_image(200, 100)).unwrap();
        let before = session.snapshot().unwrap();

        let result = session.auto_redact().await;

        assert!(matches!(result, Err(RedactError::OcrTimeout(_))));
        assert_eq!(session.snapshot().unwrap(), before);
        assert!(!session.is_processing());
    }

    #[test]
    fn test_drawing_state_machine() {
        let session = session_with(MockProvider::returning(Vec::new()));
        session.load_image(white_image(100, 100)).unwrap();
        let viewport = session.native_viewport().unwrap();

        assert_eq!(session.draw_state(), DrawState::Idle);
        // Moves before a press draw nothing
        assert_eq!(session.pointer_move(DevicePoint::new(50.0, 50.0), &viewport).unwrap(), None);
        assert_eq!(pixel(&session, 50, 50), Some(WHITE));

        session.pointer_down(DevicePoint::new(20.0, 50.0), &viewport).unwrap();
        assert_eq!(session.draw_state(), DrawState::Drawing { last: Point::new(20.0, 50.0) });
        assert_eq!(pixel(&session, 20, 50), Some(BLACK));

        session.pointer_move(DevicePoint::new(40.0, 50.0), &viewport).unwrap();
        session.pointer_move(DevicePoint::new(60.0, 50.0), &viewport).unwrap();
        for x in 20..=60 {
            assert_eq!(pixel(&session, x, 50), Some(BLACK), "x = {}", x);
        }

        assert!(session.pointer_up());
        assert!(!session.is_drawing());
        assert!(!session.pointer_up());

        session.pointer_move(DevicePoint::new(60.0, 90.0), &viewport).unwrap();
        assert_eq!(pixel(&session, 60, 90), Some(WHITE));
    }

    #[test]
    fn test_pointer_leave_finalizes() {
        let session = session_with(MockProvider::returning(Vec::new()));
        session.load_image(white_image(100, 100)).unwrap();
        let viewport = session.native_viewport().unwrap();

        session.pointer_down(DevicePoint::new(10.0, 10.0), &viewport).unwrap();
        assert!(session.pointer_leave());
        assert_eq!(session.draw_state(), DrawState::Idle);
    }

    #[test]
    fn test_scaled_gesture_lands_on_target_pixel() {
        let session = session_with(MockProvider::returning(Vec::new()));
        session.load_image(white_image(400, 200)).unwrap();
        // Displayed at half size, offset by the page layout
        let viewport = Viewport::new(
            DisplayRect { left: 100.0, top: 40.0, width: 200.0, height: 100.0 },
            400,
            200,
        );

        session.pointer_down(DevicePoint::new(110.0, 50.0), &viewport).unwrap();
        session.pointer_move(DevicePoint::new(150.0, 50.0), &viewport).unwrap();
        session.pointer_up();

        // device (110, 50) -> raster (20, 20), device (150, 50) -> raster (100, 20)
        assert_eq!(pixel(&session, 20, 20), Some(BLACK));
        assert_eq!(pixel(&session, 100, 20), Some(BLACK));
        assert_eq!(pixel(&session, 200, 100), Some(WHITE));
    }

    #[test]
    fn test_manual_input_requires_image() {
        let session = session_with(MockProvider::returning(Vec::new()));
        let viewport = Viewport::identity(10, 10);

        assert!(matches!(
            session.pointer_down(DevicePoint::new(1.0, 1.0), &viewport),
            Err(RedactError::NotLoaded)
        ));
        assert!(!session.is_drawing());
    }

    #[test]
    fn test_clear_resets_state() {
        let session = session_with(MockProvider::returning(Vec::new()));
        session.load_image(white_image(30, 30)).unwrap();
        let viewport = session.native_viewport().unwrap();
        session.pointer_down(DevicePoint::new(5.0, 5.0), &viewport).unwrap();

        session.clear().unwrap();

        assert!(!session.is_loaded());
        assert!(!session.is_drawing());
        assert!(matches!(session.export(ExportFormat::Png), Err(RedactError::NotLoaded)));
    }

    #[test]
    fn test_load_rejects_non_image() {
        let session = session_with(MockProvider::returning(Vec::new()));

        let result = session.load(b"%PDF-1.4", "application/pdf");

        assert!(matches!(result, Err(RedactError::UnsupportedFileType(_))));
        assert!(!session.is_loaded());
    }

    #[test]
    fn test_new_upload_replaces_previous() {
        let session = session_with(MockProvider::returning(Vec::new()));
        session.load_image(white_image(30, 30)).unwrap();

        let mut png = Vec::new();
        white_image(12, 7)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let dims = session.load(&png, "image/png").unwrap();

        assert_eq!(dims, (12, 7));
        assert_eq!(session.dimensions(), Some((12, 7)));
    }

    #[tokio::test]
    async fn test_export_reflects_redactions_only() {
        let session = session_with(MockProvider::returning(vec![email_token()]));
        let mut original = RgbaImage::from_pixel(200, 100, WHITE);
        original.put_pixel(50, 20, Rgba([200, 10, 10, 255]));
        session.load_image(DynamicImage::ImageRgba8(original)).unwrap();

        session.auto_redact().await.unwrap();
        let mut sink = Vec::new();
        session.export_to(ExportFormat::Png, &mut sink).unwrap();

        let exported = RasterBuffer::decode(&sink, "image/png").unwrap();
        assert_eq!(exported.pixel(50, 20), Some(BLACK));
        assert_eq!(exported, session.snapshot().unwrap());
    }

    #[test]
    fn test_save_writes_file() {
        let session = session_with(MockProvider::returning(Vec::new()));
        session.load_image(white_image(10, 10)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ExportFormat::Png.file_name());

        let written = session.save(ExportFormat::Png, &path).unwrap();

        assert_eq!(written as u64, std::fs::metadata(&path).unwrap().len());
    }
}
