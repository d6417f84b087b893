//! Cascade face locator.
//!
//! Wraps the SeetaFace funnel-structured cascade (via `rustface`). The cascade
//! parameters are loaded once from a binary model artifact; each `locate` call
//! builds a fresh detector from a clone of them, so calls share no state.

use crate::types::FaceRegion;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

// The cascade rejects values outside these bounds with a panic.
const CASCADE_MIN_FACE_SIZE: u32 = 20;
const CASCADE_PYRAMID_RANGE: (f32, f32) = (0.01, 0.99);

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("cascade model not found: {0}")]
    ModelNotFound(String),
    #[error("failed to read cascade model {path}: {source}")]
    ModelRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid detector parameter: {0}")]
    InvalidParams(String),
}

/// Tuning knobs for the cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeParams {
    /// Image pyramid downscale ratio per pass (> 1.0).
    pub scale_factor: f32,
    /// Smallest face edge in pixels.
    pub min_face_size: u32,
    /// Minimum cascade score for a window to be reported as a face.
    pub score_threshold: f64,
    /// Sliding-window stride in pixels, both axes.
    pub window_step: u32,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_face_size: 20,
            score_threshold: 2.0,
            window_step: 4,
        }
    }
}

impl CascadeParams {
    /// Pyramid step as the cascade expects it: a shrink ratio in (0, 1).
    pub fn pyramid_step(&self) -> f32 {
        1.0 / self.scale_factor
    }

    pub fn validate(&self) -> Result<(), DetectorError> {
        let step = self.pyramid_step();
        if self.scale_factor.is_nan()
            || self.scale_factor <= 1.0
            || step < CASCADE_PYRAMID_RANGE.0
            || step > CASCADE_PYRAMID_RANGE.1
        {
            return Err(DetectorError::InvalidParams(format!(
                "scale_factor must be in (1.0101, 100], got {}",
                self.scale_factor
            )));
        }
        if self.min_face_size < CASCADE_MIN_FACE_SIZE {
            return Err(DetectorError::InvalidParams(format!(
                "min_face_size must be >= {CASCADE_MIN_FACE_SIZE}, got {}",
                self.min_face_size
            )));
        }
        if self.score_threshold.is_nan() || self.score_threshold <= 0.0 {
            return Err(DetectorError::InvalidParams(format!(
                "score_threshold must be > 0, got {}",
                self.score_threshold
            )));
        }
        if self.window_step == 0 {
            return Err(DetectorError::InvalidParams("window_step must be > 0".into()));
        }
        Ok(())
    }
}

/// Finds face regions in a grayscale image.
///
/// Implementations must be deterministic and return regions inside the image
/// bounds, in their native detection order.
pub trait FaceLocator {
    fn locate(&self, gray: &GrayImage) -> Vec<FaceRegion>;
}

/// SeetaFace cascade locator.
pub struct CascadeLocator {
    model: rustface::Model,
    params: CascadeParams,
}

impl CascadeLocator {
    /// Load cascade parameters from the given artifact.
    pub fn load(model_path: impl AsRef<Path>, params: CascadeParams) -> Result<Self, DetectorError> {
        params.validate()?;

        let model_path = model_path.as_ref();
        let display = model_path.display().to_string();
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(display));
        }

        let file = File::open(model_path).map_err(|source| DetectorError::ModelRead {
            path: display.clone(),
            source,
        })?;
        let model = rustface::read_model(BufReader::new(file)).map_err(|source| {
            DetectorError::ModelRead {
                path: display.clone(),
                source,
            }
        })?;

        tracing::info!(
            path = %model_path.display(),
            scale_factor = params.scale_factor,
            min_face_size = params.min_face_size,
            score_threshold = params.score_threshold,
            "loaded face cascade"
        );

        Ok(Self { model, params })
    }

    pub fn params(&self) -> &CascadeParams {
        &self.params
    }
}

impl FaceLocator for CascadeLocator {
    fn locate(&self, gray: &GrayImage) -> Vec<FaceRegion> {
        let (width, height) = gray.dimensions();
        if width.min(height) < self.params.min_face_size {
            return Vec::new();
        }

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.params.min_face_size);
        detector.set_score_thresh(self.params.score_threshold);
        detector.set_pyramid_scale_factor(self.params.pyramid_step());
        detector.set_slide_window_step(self.params.window_step, self.params.window_step);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));
        tracing::debug!(found = faces.len(), width, height, "cascade pass complete");

        faces
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                FaceRegion::clamped(
                    bbox.x() as i64,
                    bbox.y() as i64,
                    bbox.width() as i64,
                    bbox.height() as i64,
                    width,
                    height,
                )
            })
            .collect()
    }
}
