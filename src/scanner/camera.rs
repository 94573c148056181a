//! Camera seams: the device backend, the open video stream and the frames it yields.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use image::ImageFormat;
use serde::Serialize;

/// One greyscale video frame, row-major, one byte per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    luma: Vec<u8>,
}

impl Frame {
    /// Wraps raw luma bytes.
    ///
    /// # Errors
    /// [`Error::Camera`] when the buffer length is not `width * height`.
    pub fn from_luma(width: u32, height: u32, luma: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if luma.len() != expected {
            return Err(Error::Camera {
                message: format!(
                    "frame buffer holds {} bytes, expected {expected} for {width}x{height}",
                    luma.len()
                ),
            });
        }
        Ok(Self {
            width,
            height,
            luma,
        })
    }

    /// Decodes a PNG snapshot and converts it to greyscale.
    pub fn from_png(png: &[u8]) -> Result<Self> {
        let image = image::load_from_memory_with_format(png, ImageFormat::Png)
            .map_err(|e| Error::Camera {
                message: e.to_string(),
            })?
            .to_luma8();
        let (width, height) = image.dimensions();
        Ok(Self {
            width,
            height,
            luma: image.into_raw(),
        })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn luma(&self) -> &[u8] {
        &self.luma
    }

    /// Brightness at `(x, y)`. Out of range reads as white.
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.luma
            .get(y * self.width as usize + x)
            .copied()
            .unwrap_or(u8::MAX)
    }
}

/// A camera the backend can open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraDevice {
    /// Backend-specific device id
    pub id: String,
    /// Human readable name, e.g. "Back Camera"
    pub label: String,
}

/// An open camera. Dropping the stream without calling [`VideoStream::stop`] may
/// leave the device busy.
#[async_trait]
pub trait VideoStream: Send + 'static {
    /// Waits for the next frame. An error means the device is gone.
    async fn next_frame(&mut self) -> Result<Frame>;

    fn supports_torch(&self) -> bool;

    async fn set_torch(&mut self, on: bool) -> Result<()>;

    /// Releases every track. Must be safe to call more than once.
    async fn stop(&mut self);
}

/// Access to the platform's cameras.
#[async_trait]
pub trait CameraBackend: Send + Sync + 'static {
    type Stream: VideoStream;

    /// Asks the user for camera access. Denial is [`Error::CameraPermissionDenied`].
    async fn request_access(&self) -> Result<()>;

    /// Lists cameras. Only meaningful after access was granted.
    async fn list_devices(&self) -> Result<Vec<CameraDevice>>;

    /// Opens `device_id`, or the platform's preferred (rear) camera for `None`.
    async fn open(&self, device_id: Option<&str>) -> Result<Self::Stream>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_from_luma_checks_length() {
        assert!(Frame::from_luma(2, 2, vec![0; 4]).is_ok());
        assert!(matches!(
            Frame::from_luma(2, 2, vec![0; 3]),
            Err(Error::Camera { .. })
        ));
    }

    #[test]
    fn test_pixel_lookup() {
        let frame = Frame::from_luma(2, 1, vec![10, 20]).unwrap();
        assert_eq!(frame.pixel(1, 0), 20);
        assert_eq!(frame.pixel(5, 5), u8::MAX);
    }

    #[test]
    fn test_from_png_reads_dimensions() {
        let png = crate::qr::encode_png("frame").unwrap();
        let frame = Frame::from_png(&png).unwrap();
        assert!(frame.width() >= crate::qr::QR_MIN_SIZE);
        assert_eq!(frame.luma().len(), (frame.width() * frame.height()) as usize);
    }
}
