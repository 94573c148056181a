//! Frame decoding.

use super::camera::Frame;
use thiserror::Error;

/// Why a frame produced no text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// No code visible; the normal case for most frames
    #[error("no QR code in frame")]
    NotFound,

    /// A code was located but could not be read
    #[error("failed to decode QR code: {message}")]
    Failed { message: String },
}

/// Turns a frame into the text of the code it shows.
pub trait FrameDecoder: Send + Sync + 'static {
    fn decode(&self, frame: &Frame) -> Result<String, DecodeError>;
}

/// Production decoder backed by `rqrr`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QrFrameDecoder;

impl FrameDecoder for QrFrameDecoder {
    fn decode(&self, frame: &Frame) -> Result<String, DecodeError> {
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            frame.width() as usize,
            frame.height() as usize,
            |x, y| frame.pixel(x, y),
        );

        let mut last_error = None;
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_, content)) => return Ok(content),
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        Err(last_error.map_or(DecodeError::NotFound, |message| DecodeError::Failed { message }))
    }
}
