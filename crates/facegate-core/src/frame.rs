//! Raw camera frames and their encoded (JPEG data URI) form.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use thiserror::Error;

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Default JPEG quality, matching a browser canvas `toDataURL("image/jpeg")`.
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("camera not ready: no decoded frame dimensions yet")]
    NotReady,
    #[error("frame grab failed: {0}")]
    Grab(String),
    #[error("frame encoding failed: {0}")]
    Encode(String),
}

/// A single decoded frame in packed RGB8 layout.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Build a frame filled with one RGB colour. Mostly useful for tests and demos.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Lossy-compressed still frame, carried as a `data:image/jpeg;base64,` URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// Wrap an already-encoded data URI.
    pub fn from_data_uri(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// MIME type declared in the URI header, if well formed.
    pub fn mime(&self) -> Option<&str> {
        let rest = self.0.strip_prefix("data:")?;
        let (header, _) = rest.split_once(',')?;
        header.split(';').next()
    }

    /// Decode the base64 payload back into the compressed bytes.
    pub fn decode_payload(&self) -> Result<Vec<u8>, CameraError> {
        let (_, payload) = self
            .0
            .split_once(',')
            .ok_or_else(|| CameraError::Encode("missing data URI separator".into()))?;
        STANDARD
            .decode(payload)
            .map_err(|e| CameraError::Encode(e.to_string()))
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Encode an RGB frame as a JPEG data URI.
pub fn encode_jpeg_data_uri(frame: &RawFrame, quality: u8) -> Result<EncodedImage, CameraError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(CameraError::NotReady);
    }
    if frame.data.len() != frame.expected_len() {
        return Err(CameraError::Encode(format!(
            "buffer is {} bytes, expected {} for {}x{} RGB",
            frame.data.len(),
            frame.expected_len(),
            frame.width,
            frame.height
        )));
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|e| CameraError::Encode(e.to_string()))?;

    let mut uri = String::with_capacity(DATA_URI_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
    uri.push_str(DATA_URI_PREFIX);
    STANDARD.encode_string(&jpeg, &mut uri);
    Ok(EncodedImage(uri))
}
