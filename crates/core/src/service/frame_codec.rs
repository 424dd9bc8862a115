//! Conversions between the encoded images a browser sends and [`Frame`].
//!
//! Everything decoded here is normalised to 8-bit RGB, whatever the source
//! format or colour layout was.
use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use thiserror::Error;

use crate::shared::constants::JPEG_QUALITY;
use crate::shared::frame::Frame;

const DATA_URL_JPEG_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Error, Debug)]
pub enum FrameCodecError {
    #[error("image payload is empty")]
    Empty,
    #[error("invalid base64 image payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("cannot decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("cannot encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("frame buffer does not match {width}x{height} RGB")]
    NotRgb { width: u32, height: u32 },
}

/// Decode a `data:image/...;base64,` URL, or bare base64, into a frame.
pub fn decode_data_url(payload: &str) -> Result<Frame, FrameCodecError> {
    let payload = payload.trim();
    let encoded = match payload.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or("", |(_, data)| data),
        None => payload,
    };
    if encoded.is_empty() {
        return Err(FrameCodecError::Empty);
    }
    let bytes = STANDARD.decode(encoded)?;
    decode_image_bytes(&bytes)
}

/// Decode any image format the `image` crate recognises into an RGB frame.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<Frame, FrameCodecError> {
    if bytes.is_empty() {
        return Err(FrameCodecError::Empty);
    }
    let rgb = image::load_from_memory(bytes)
        .map_err(FrameCodecError::Decode)?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Frame::new(rgb.into_raw(), width, height, 3))
}

pub fn frame_to_rgb_image(frame: Frame) -> Result<RgbImage, FrameCodecError> {
    let (width, height) = (frame.width(), frame.height());
    if frame.channels() != 3 {
        return Err(FrameCodecError::NotRgb { width, height });
    }
    RgbImage::from_raw(width, height, frame.into_data())
        .ok_or(FrameCodecError::NotRgb { width, height })
}

pub fn encode_jpeg(frame: Frame, quality: u8) -> Result<Vec<u8>, FrameCodecError> {
    let rgb = frame_to_rgb_image(frame)?;
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(FrameCodecError::Encode)?;
    Ok(out.into_inner())
}

/// Encode a frame as a JPEG data URL ready to drop into an `<img>` tag.
pub fn encode_data_url(frame: Frame) -> Result<String, FrameCodecError> {
    let jpeg = encode_jpeg(frame, JPEG_QUALITY)?;
    Ok(format!("{DATA_URL_JPEG_PREFIX}{}", STANDARD.encode(jpeg)))
}
