//! HTTP request/response bodies.

use serde::Serialize;
use starlens_core::Prediction;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub device: String,
}

/// Catalog listing
#[derive(Debug, Serialize)]
pub struct CelebritiesResponse {
    pub celebrities: Vec<String>,
    pub total: usize,
}

/// Successful prediction
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub predicted_celebrity: String,
    pub confidence: f64,
    pub class_index: usize,
    pub face_detected: bool,
    pub top_predictions: Vec<TopPrediction>,
}

#[derive(Debug, Serialize)]
pub struct TopPrediction {
    pub celebrity: String,
    pub confidence: f64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<Prediction> for PredictResponse {
    fn from(p: Prediction) -> Self {
        Self {
            predicted_celebrity: p.label,
            confidence: round4(p.confidence),
            class_index: p.class_index,
            face_detected: p.face_detected,
            top_predictions: p
                .top
                .into_iter()
                .map(|r| TopPrediction {
                    celebrity: r.label,
                    confidence: round4(r.confidence),
                })
                .collect(),
        }
    }
}

/// Round a probability to four decimal places.
pub fn round4(value: f32) -> f64 {
    (value as f64 * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use starlens_core::{FaceRegion, RankedLabel};

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.95), 0.95);
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(1.0), 1.0);
        assert_eq!(round4(0.0), 0.0);
    }

    #[test]
    fn test_from_prediction() {
        let prediction = Prediction {
            class_index: 4,
            label: "Edsger Dijkstra".into(),
            confidence: 0.876543,
            face_detected: true,
            crop: FaceRegion { x: 1, y: 2, width: 3, height: 4 },
            top: vec![
                RankedLabel { index: 4, label: "Edsger Dijkstra".into(), confidence: 0.876543 },
                RankedLabel { index: 0, label: "Ada Lovelace".into(), confidence: 0.123457 },
            ],
        };

        let json = serde_json::to_value(PredictResponse::from(prediction)).unwrap();
        assert_eq!(json["predicted_celebrity"], "Edsger Dijkstra");
        assert_eq!(json["confidence"], 0.8765);
        assert_eq!(json["class_index"], 4);
        assert_eq!(json["face_detected"], true);
        assert_eq!(json["top_predictions"][0]["celebrity"], "Edsger Dijkstra");
        assert_eq!(json["top_predictions"][0]["confidence"], 0.8765);
        assert_eq!(json["top_predictions"][1]["confidence"], 0.1235);
        assert!(json.get("crop").is_none());
    }
}
