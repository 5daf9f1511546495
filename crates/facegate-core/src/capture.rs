//! Scoped camera access and on-demand still-frame snapshots.
//!
//! A [`CaptureSource`] owns exactly one camera stream. Opening an already
//! open source is a no-op that hands back the existing stream, and the
//! device is released on `close()` or when the source is dropped, so every
//! exit path (including error paths and task cancellation) gives the
//! camera back.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::frame::{encode_jpeg_data_uri, CameraError, EncodedImage, RawFrame, DEFAULT_JPEG_QUALITY};

/// Hardware (or simulated) camera behind a [`CaptureSource`].
pub trait CameraDevice: Send {
    /// Request access to the device. Denial maps to [`CameraError::Unavailable`].
    fn acquire(&mut self) -> Result<(), CameraError>;

    /// Native dimensions of the decoded stream, or `None` while no frame
    /// has been decoded yet.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Grab the current frame.
    fn grab(&mut self) -> Result<RawFrame, CameraError>;

    /// Give the device back.
    fn release(&mut self);
}

/// Identifies the stream held by an open [`CaptureSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandle {
    pub id: u64,
    pub dimensions: Option<(u32, u32)>,
}

/// Capture source shared between the orchestrator actor, its liveness
/// ticks and the emotion flow.
pub type SharedCapture<D> = Arc<Mutex<CaptureSource<D>>>;

pub struct CaptureSource<D: CameraDevice> {
    device: D,
    stream: Option<u64>,
    streams_opened: u64,
    jpeg_quality: u8,
}

impl<D: CameraDevice> CaptureSource<D> {
    pub fn new(device: D) -> Self {
        Self::with_quality(device, DEFAULT_JPEG_QUALITY)
    }

    pub fn with_quality(device: D, jpeg_quality: u8) -> Self {
        Self {
            device,
            stream: None,
            streams_opened: 0,
            jpeg_quality,
        }
    }

    /// Wrap the source for sharing across tasks.
    pub fn shared(self) -> SharedCapture<D> {
        Arc::new(Mutex::new(self))
    }

    /// Acquire the camera, or return the already open stream.
    pub fn open(&mut self) -> Result<StreamHandle, CameraError> {
        if let Some(id) = self.stream {
            tracing::debug!(stream = id, "camera already open");
            return Ok(self.handle(id));
        }

        if let Err(e) = self.device.acquire() {
            tracing::warn!(error = %e, "camera acquisition failed");
            return Err(e);
        }

        self.streams_opened += 1;
        let id = self.streams_opened;
        self.stream = Some(id);

        let handle = self.handle(id);
        tracing::info!(stream = id, dimensions = ?handle.dimensions, "camera opened");
        Ok(handle)
    }

    /// Encode the current frame as a JPEG data URI.
    ///
    /// Callable repeatedly without re-acquiring the stream. Fails with
    /// [`CameraError::NotReady`] when the source is closed or the stream
    /// has not decoded a frame yet.
    pub fn snapshot(&mut self) -> Result<EncodedImage, CameraError> {
        if self.stream.is_none() {
            return Err(CameraError::NotReady);
        }
        match self.device.dimensions() {
            Some((w, h)) if w > 0 && h > 0 => {}
            _ => return Err(CameraError::NotReady),
        }

        let frame = self.device.grab()?;
        encode_jpeg_data_uri(&frame, self.jpeg_quality)
    }

    /// Release the camera. Safe to call when already closed.
    pub fn close(&mut self) {
        if let Some(id) = self.stream.take() {
            self.device.release();
            tracing::info!(stream = id, "camera released");
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn handle(&self, id: u64) -> StreamHandle {
        StreamHandle {
            id,
            dimensions: self.device.dimensions(),
        }
    }
}

impl<D: CameraDevice> Drop for CaptureSource<D> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        acquired: AtomicUsize,
        released: AtomicUsize,
        grabbed: AtomicUsize,
    }

    struct FakeCamera {
        deny: bool,
        dims: Option<(u32, u32)>,
        counters: Arc<Counters>,
    }

    impl FakeCamera {
        fn new(dims: Option<(u32, u32)>) -> (Self, Arc<Counters>) {
            let counters = Arc::new(Counters::default());
            (
                Self {
                    deny: false,
                    dims,
                    counters: counters.clone(),
                },
                counters,
            )
        }
    }

    impl CameraDevice for FakeCamera {
        fn acquire(&mut self) -> Result<(), CameraError> {
            if self.deny {
                return Err(CameraError::Unavailable("permission denied".into()));
            }
            self.counters.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn dimensions(&self) -> Option<(u32, u32)> {
            self.dims
        }

        fn grab(&mut self) -> Result<RawFrame, CameraError> {
            self.counters.grabbed.fetch_add(1, Ordering::SeqCst);
            let (w, h) = self.dims.ok_or(CameraError::NotReady)?;
            Ok(RawFrame::solid(w, h, [90, 90, 90]))
        }

        fn release(&mut self) {
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn reopen_returns_existing_stream() {
        let (camera, counters) = FakeCamera::new(Some((8, 8)));
        let mut source = CaptureSource::new(camera);

        let first = source.open().unwrap();
        let second = source.open().unwrap();

        assert_eq!(first, second);
        assert_eq!(counters.acquired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn denied_camera_is_unavailable() {
        let (mut camera, _) = FakeCamera::new(Some((8, 8)));
        camera.deny = true;
        let mut source = CaptureSource::new(camera);

        assert!(matches!(source.open(), Err(CameraError::Unavailable(_))));
        assert!(!source.is_open());
    }

    #[test]
    fn snapshot_repeats_without_reacquiring() {
        let (camera, counters) = FakeCamera::new(Some((8, 8)));
        let mut source = CaptureSource::new(camera);
        source.open().unwrap();

        for _ in 0..3 {
            let image = source.snapshot().unwrap();
            assert_eq!(image.mime(), Some("image/jpeg"));
        }
        assert_eq!(counters.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(counters.grabbed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn snapshot_before_first_frame_is_not_ready() {
        let (camera, counters) = FakeCamera::new(None);
        let mut source = CaptureSource::new(camera);
        source.open().unwrap();

        assert_eq!(source.snapshot().unwrap_err(), CameraError::NotReady);
        assert_eq!(counters.grabbed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn snapshot_on_closed_source_is_not_ready() {
        let (camera, _) = FakeCamera::new(Some((8, 8)));
        let mut source = CaptureSource::new(camera);
        assert_eq!(source.snapshot().unwrap_err(), CameraError::NotReady);
    }

    #[test]
    fn drop_releases_open_stream_once() {
        let (camera, counters) = FakeCamera::new(Some((8, 8)));
        {
            let mut source = CaptureSource::new(camera);
            source.open().unwrap();
            source.close();
            source.close();
            source.open().unwrap();
        }
        assert_eq!(counters.acquired.load(Ordering::SeqCst), 2);
        assert_eq!(counters.released.load(Ordering::SeqCst), 2);
    }
}
