//! Camera backed by a directory of still images.
//!
//! Stands in for a webcam on machines without one: every `grab` returns the
//! next image (sorted by file name), wrapping around at the end.

use std::path::{Path, PathBuf};

use facegate_core::{CameraDevice, CameraError, RawFrame};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

pub struct DirectoryCamera {
    dir: PathBuf,
    frames: Vec<PathBuf>,
    next: usize,
    dimensions: Option<(u32, u32)>,
}

impl DirectoryCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            frames: Vec::new(),
            next: 0,
            dimensions: None,
        }
    }

    fn list_frames(&self) -> Result<Vec<PathBuf>, CameraError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            CameraError::Unavailable(format!("cannot read {}: {e}", self.dir.display()))
        })?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        frames.sort();

        if frames.is_empty() {
            return Err(CameraError::Unavailable(format!(
                "no images in {}",
                self.dir.display()
            )));
        }
        Ok(frames)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn load_frame(path: &Path) -> Result<RawFrame, CameraError> {
    let img = image::open(path)
        .map_err(|e| CameraError::Grab(format!("{}: {e}", path.display())))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    Ok(RawFrame {
        width,
        height,
        data: img.into_raw(),
    })
}

impl CameraDevice for DirectoryCamera {
    fn acquire(&mut self) -> Result<(), CameraError> {
        let frames = self.list_frames()?;
        // Decode the first frame up front so the stream has dimensions.
        let first = load_frame(&frames[0]).map_err(|e| CameraError::Unavailable(e.to_string()))?;

        tracing::debug!(dir = %self.dir.display(), frames = frames.len(), "directory camera acquired");
        self.dimensions = Some((first.width, first.height));
        self.frames = frames;
        self.next = 0;
        Ok(())
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    fn grab(&mut self) -> Result<RawFrame, CameraError> {
        if self.frames.is_empty() {
            return Err(CameraError::NotReady);
        }
        let path = &self.frames[self.next % self.frames.len()];
        let frame = load_frame(path)?;
        self.next = (self.next + 1) % self.frames.len();
        self.dimensions = Some((frame.width, frame.height));
        Ok(frame)
    }

    fn release(&mut self) {
        self.frames.clear();
        self.next = 0;
        self.dimensions = None;
    }
}
