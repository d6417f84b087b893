use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Edge length of the square classifier input.
pub const INPUT_SIZE: usize = 224;

/// Normalized NCHW input tensor, shape `[1, 3, INPUT_SIZE, INPUT_SIZE]`.
pub type ImageTensor = Array4<f32>;

/// Rectangular face region in source-image pixel coordinates.
///
/// Always non-empty and fully inside the image it was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    /// Clamp a raw detector box to an image of `img_w` × `img_h`.
    ///
    /// Returns `None` when nothing of the box remains inside the image.
    pub fn clamped(x: i64, y: i64, width: i64, height: i64, img_w: u32, img_h: u32) -> Option<Self> {
        let x0 = x.clamp(0, img_w as i64);
        let y0 = y.clamp(0, img_h as i64);
        let x1 = (x + width).clamp(0, img_w as i64);
        let y1 = (y + height).clamp(0, img_h as i64);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(Self {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }

    /// True when the region lies entirely within an image of the given size.
    pub fn fits_within(&self, img_w: u32, img_h: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= img_w as u64
            && self.y as u64 + self.height as u64 <= img_h as u64
    }
}

/// One entry of the ranked prediction list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedLabel {
    pub index: usize,
    pub label: String,
    pub confidence: f32,
}

/// Outcome of classifying one image.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub class_index: usize,
    pub label: String,
    pub confidence: f32,
    pub face_detected: bool,
    /// Region the classifier actually saw (face box or center fallback).
    pub crop: FaceRegion,
    /// Highest-probability labels, descending, ties by ascending index.
    pub top: Vec<RankedLabel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_inside() {
        let r = FaceRegion::clamped(10, 20, 30, 40, 100, 100).unwrap();
        assert_eq!(r, FaceRegion { x: 10, y: 20, width: 30, height: 40 });
    }

    #[test]
    fn test_clamped_negative_origin() {
        let r = FaceRegion::clamped(-5, -10, 30, 40, 100, 100).unwrap();
        assert_eq!(r, FaceRegion { x: 0, y: 0, width: 25, height: 30 });
        assert!(r.fits_within(100, 100));
    }

    #[test]
    fn test_clamped_overflowing_edge() {
        let r = FaceRegion::clamped(80, 90, 50, 50, 100, 100).unwrap();
        assert_eq!(r, FaceRegion { x: 80, y: 90, width: 20, height: 10 });
        assert!(r.fits_within(100, 100));
    }

    #[test]
    fn test_clamped_outside_is_none() {
        assert!(FaceRegion::clamped(120, 10, 20, 20, 100, 100).is_none());
        assert!(FaceRegion::clamped(-40, 10, 20, 20, 100, 100).is_none());
        assert!(FaceRegion::clamped(10, 10, 0, 20, 100, 100).is_none());
    }

    #[test]
    fn test_fits_within() {
        let r = FaceRegion { x: 0, y: 0, width: 10, height: 10 };
        assert!(r.fits_within(10, 10));
        assert!(!r.fits_within(9, 10));
    }
}
