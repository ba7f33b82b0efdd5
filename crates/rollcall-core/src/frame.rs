//! Decoding of frames and reference photos delivered as encoded images.

use crate::encoder::EncoderError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("empty image payload")]
    Empty,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("face encoding failed: {0}")]
    Encoder(#[from] EncoderError),
}

/// Decode a data URL (`data:image/jpeg;base64,...`) or bare base64 string
/// into an RGB image.
pub fn decode_frame(payload: &str) -> Result<RgbImage, FrameError> {
    let encoded = match payload.split_once(',') {
        Some((header, data)) if header.starts_with("data:") => data,
        _ => payload,
    };
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Err(FrameError::Empty);
    }

    let bytes = STANDARD.decode(encoded)?;
    decode_image(&bytes)
}

/// Decode raw encoded image bytes (JPEG, PNG, ...) into RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, FrameError> {
    if bytes.is_empty() {
        return Err(FrameError::Empty);
    }
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(4, 3, Rgb([10, 200, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_data_url() {
        let url = format!("data:image/png;base64,{}", STANDARD.encode(png_bytes()));
        let img = decode_frame(&url).unwrap();
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.get_pixel(0, 0), &Rgb([10, 200, 30]));
    }

    #[test]
    fn test_decode_bare_base64() {
        let img = decode_frame(&STANDARD.encode(png_bytes())).unwrap();
        assert_eq!(img.dimensions(), (4, 3));
    }

    #[test]
    fn test_reject_empty_payload() {
        assert!(matches!(decode_frame("data:image/jpeg;base64,"), Err(FrameError::Empty)));
        assert!(matches!(decode_frame(""), Err(FrameError::Empty)));
    }

    #[test]
    fn test_reject_bad_base64() {
        assert!(matches!(decode_frame("data:image/jpeg;base64,@@@"), Err(FrameError::Base64(_))));
    }

    #[test]
    fn test_reject_non_image_bytes() {
        let url = format!("data:image/jpeg;base64,{}", STANDARD.encode(b"definitely not a jpeg"));
        assert!(matches!(decode_frame(&url), Err(FrameError::Image(_))));
    }
}
