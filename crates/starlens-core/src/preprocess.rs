//! Image → classifier input.
//!
//! Decode, pick a crop (first detected face, else the central 60% box),
//! resize to 224×224 and normalize with the ImageNet statistics the
//! classifier was trained with.

use crate::detector::FaceLocator;
use crate::types::{FaceRegion, ImageTensor, INPUT_SIZE};
use image::imageops::{self, FilterType};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage};
use std::io::Cursor;
use thiserror::Error;

// Must match training; a mismatch degrades accuracy without any error.
const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

const FALLBACK_LO: f64 = 0.2;
const FALLBACK_HI: f64 = 0.8;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("crop region is empty for a {width}x{height} image")]
    EmptyCrop { width: u32, height: u32 },
}

/// Result of preparing one image for the classifier.
pub struct Prepared {
    pub tensor: ImageTensor,
    pub face_detected: bool,
    pub crop: FaceRegion,
}

/// Decode raw bytes into an upright RGB image, honoring the EXIF orientation tag.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, PreprocessError> {
    if bytes.is_empty() {
        return Err(PreprocessError::Decode("empty input".into()));
    }
    let decode_err = |e: image::ImageError| PreprocessError::Decode(e.to_string());

    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?
        .into_decoder()
        .map_err(decode_err)?;
    // Unreadable EXIF is not fatal; the pixels are still usable as stored.
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    img.apply_orientation(orientation);
    Ok(img.to_rgb8())
}

/// Central 60% × 60% box: 20%..80% of each dimension, truncated to pixels.
pub fn fallback_crop(width: u32, height: u32) -> Result<FaceRegion, PreprocessError> {
    let x0 = (width as f64 * FALLBACK_LO) as u32;
    let x1 = (width as f64 * FALLBACK_HI) as u32;
    let y0 = (height as f64 * FALLBACK_LO) as u32;
    let y1 = (height as f64 * FALLBACK_HI) as u32;

    if x1 <= x0 || y1 <= y0 {
        return Err(PreprocessError::EmptyCrop { width, height });
    }

    Ok(FaceRegion {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

/// Copy the given region out of `img`.
pub fn crop_region(img: &RgbImage, region: &FaceRegion) -> Result<RgbImage, PreprocessError> {
    let (width, height) = img.dimensions();
    if !region.fits_within(width, height) {
        return Err(PreprocessError::EmptyCrop { width, height });
    }
    Ok(imageops::crop_imm(img, region.x, region.y, region.width, region.height).to_image())
}

/// Resize a crop to the classifier input size and normalize it into NCHW.
pub fn to_tensor(crop: &RgbImage) -> ImageTensor {
    let size = INPUT_SIZE as u32;
    let resized = imageops::resize(crop, size, size, FilterType::Triangle);

    let mut tensor = ImageTensor::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (value - CHANNEL_MEAN[c]) / CHANNEL_STD[c];
        }
    }
    tensor
}

/// Full preprocessing: decode, locate, crop and normalize.
pub fn prepare(bytes: &[u8], locator: &dyn FaceLocator) -> Result<Prepared, PreprocessError> {
    let img = decode(bytes)?;
    let (width, height) = img.dimensions();

    let gray = imageops::grayscale(&img);
    // First region in detector order wins; no ranking by size or score.
    let face = locator.locate(&gray).into_iter().next();
    let face_detected = face.is_some();

    let crop = match face {
        Some(region) => region,
        None => fallback_crop(width, height)?,
    };
    tracing::debug!(width, height, face_detected, ?crop, "selected crop");

    let tensor = to_tensor(&crop_region(&img, &crop)?);

    Ok(Prepared {
        tensor,
        face_detected,
        crop,
    })
}
