//! QR code rendering for coupon emails.
//!
//! Rendering is a pure function of the payload text: the same text always produces
//! the same PNG. Error correction level Q keeps the code readable from a cracked
//! phone screen at the gate.

use crate::errors::{Error, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;

/// Smallest edge of the rendered image in pixels, quiet zone included.
pub const QR_MIN_SIZE: u32 = 250;

/// Renders `text` as a greyscale PNG.
///
/// # Errors
/// Returns [`Error::QrEncode`] for empty text, text too long for a QR code, or a
/// PNG encoding failure. Callers treat this as a hard stop.
pub fn encode_png(text: &str) -> Result<Vec<u8>> {
    if text.is_empty() {
        return Err(Error::QrEncode {
            message: "nothing to encode".to_string(),
        });
    }

    let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::Q).map_err(|e| {
        Error::QrEncode {
            message: e.to_string(),
        }
    })?;
    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_MIN_SIZE, QR_MIN_SIZE)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| Error::QrEncode {
            message: e.to_string(),
        })?;
    Ok(png)
}

/// Wraps PNG bytes as a `data:` URL, the form the email endpoint embeds inline.
#[must_use]
pub fn to_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}
