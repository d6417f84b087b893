//! End-to-end prediction: preprocess → classify → rank.

use crate::classifier::{Classifier, ClassifierError};
use crate::detector::FaceLocator;
use crate::labels::LabelCatalog;
use crate::preprocess::{self, PreprocessError};
use crate::types::{Prediction, RankedLabel};
use std::sync::Arc;
use thiserror::Error;

/// Default length of the ranked prediction list.
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("classifier returned an empty distribution")]
    EmptyDistribution,
}

/// Owns the locator and classifier; shares the catalog.
pub struct Pipeline {
    catalog: Arc<LabelCatalog>,
    locator: Box<dyn FaceLocator>,
    classifier: Box<dyn Classifier>,
    top_k: usize,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<LabelCatalog>,
        locator: Box<dyn FaceLocator>,
        classifier: Box<dyn Classifier>,
    ) -> Self {
        Self {
            catalog,
            locator,
            classifier,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn catalog(&self) -> &Arc<LabelCatalog> {
        &self.catalog
    }

    pub fn device(&self) -> &str {
        self.classifier.device()
    }

    /// Classify the face (or center region) of one encoded image.
    pub fn predict(&mut self, image_bytes: &[u8]) -> Result<Prediction, PipelineError> {
        let prepared = preprocess::prepare(image_bytes, self.locator.as_ref())?;
        let probabilities = self.classifier.infer(&prepared.tensor)?;

        let top = rank(&probabilities, &self.catalog, self.top_k);
        let best = top.first().cloned().ok_or(PipelineError::EmptyDistribution)?;

        Ok(Prediction {
            class_index: best.index,
            label: best.label,
            confidence: best.confidence,
            face_detected: prepared.face_detected,
            crop: prepared.crop,
            top,
        })
    }
}

/// The `k` most probable classes, descending; equal probabilities keep
/// ascending index order.
pub fn rank(probabilities: &[f32], catalog: &LabelCatalog, k: usize) -> Vec<RankedLabel> {
    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    // NaN ranks last; stable sort keeps ties in index order
    let key = |i: usize| {
        let p = probabilities[i];
        if p.is_nan() {
            f32::NEG_INFINITY
        } else {
            p
        }
    };
    order.sort_by(|&a, &b| key(b).total_cmp(&key(a)));

    order
        .into_iter()
        .take(k)
        .map(|index| RankedLabel {
            index,
            label: catalog.name_or_unknown(index),
            confidence: probabilities[index],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::softmax;
    use crate::preprocess::tests::{png_bytes, FixedLocator};
    use crate::types::{FaceRegion, ImageTensor};
    use image::{Rgb, RgbImage};

    struct FixedClassifier {
        logits: Vec<f32>,
    }

    impl Classifier for FixedClassifier {
        fn infer(&mut self, _input: &ImageTensor) -> Result<Vec<f32>, ClassifierError> {
            Ok(softmax(&self.logits))
        }

        fn num_classes(&self) -> usize {
            self.logits.len()
        }

        fn device(&self) -> &str {
            "test"
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn infer(&mut self, _input: &ImageTensor) -> Result<Vec<f32>, ClassifierError> {
            Err(ClassifierError::InferenceFailed("boom".into()))
        }

        fn num_classes(&self) -> usize {
            0
        }

        fn device(&self) -> &str {
            "test"
        }
    }

    fn catalog(n: usize) -> Arc<LabelCatalog> {
        Arc::new((0..n).map(|i| format!("person-{i}")).collect())
    }

    fn sample_png() -> Vec<u8> {
        png_bytes(&RgbImage::from_pixel(100, 100, Rgb([120, 90, 60])))
    }

    #[test]
    fn test_rank_descending_with_index_tiebreak() {
        let cat = catalog(5);
        let ranked = rank(&[0.1, 0.3, 0.1, 0.3, 0.2], &cat, 5);
        let indices: Vec<usize> = ranked.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 3, 4, 0, 2]);
    }

    #[test]
    fn test_rank_puts_nan_last() {
        let cat = catalog(4);
        let ranked = rank(&[0.1, f32::NAN, 0.3, 0.2], &cat, 4);
        let indices: Vec<usize> = ranked.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![2, 3, 0, 1]);

        let mut probs = vec![0.0f32; 100];
        for (i, p) in probs.iter_mut().enumerate() {
            *p = if i % 3 == 0 { f32::NAN } else { i as f32 / 1000.0 };
        }
        let ranked = rank(&probs, &catalog(100), 100);
        assert_eq!(ranked.len(), 100);
        assert_eq!(ranked[0].index, 98);
        let finite: Vec<f32> = ranked.iter().map(|r| r.confidence).take_while(|c| !c.is_nan()).collect();
        assert_eq!(finite.len(), 66);
        assert!(finite.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_rank_truncates_to_k() {
        let cat = catalog(8);
        let probs = softmax(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let ranked = rank(&probs, &cat, 5);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].index, 7);
        assert_eq!(ranked[0].label, "person-7");
        assert!(ranked.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn test_rank_small_catalog() {
        let cat = catalog(2);
        let ranked = rank(&[0.4, 0.6], &cat, 5);
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_predict_top1_matches_first_ranked() {
        let mut pipeline = Pipeline::new(
            catalog(7),
            Box::new(FixedLocator(vec![])),
            Box::new(FixedClassifier { logits: vec![0.0, 1.0, 4.0, 2.0, 0.5, 3.0, -1.0] }),
        );

        let prediction = pipeline.predict(&sample_png()).unwrap();
        assert_eq!(prediction.class_index, 2);
        assert_eq!(prediction.label, "person-2");
        assert_eq!(prediction.top.len(), 5);
        assert_eq!(prediction.top[0].label, prediction.label);
        assert_eq!(prediction.top[0].confidence, prediction.confidence);
        assert!(!prediction.face_detected);
        assert_eq!(prediction.crop, FaceRegion { x: 20, y: 20, width: 60, height: 60 });
    }

    #[test]
    fn test_predict_reports_face() {
        let face = FaceRegion { x: 10, y: 10, width: 50, height: 50 };
        let mut pipeline = Pipeline::new(
            catalog(3),
            Box::new(FixedLocator(vec![face])),
            Box::new(FixedClassifier { logits: vec![1.0, 0.0, 0.0] }),
        );
        let prediction = pipeline.predict(&sample_png()).unwrap();
        assert!(prediction.face_detected);
        assert_eq!(prediction.crop, face);
        assert_eq!(prediction.top.len(), 3);
        let total: f32 = prediction.top.iter().map(|r| r.confidence).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_predict_custom_top_k() {
        let mut pipeline = Pipeline::new(
            catalog(6),
            Box::new(FixedLocator(vec![])),
            Box::new(FixedClassifier { logits: vec![0.0; 6] }),
        )
        .with_top_k(2);
        let prediction = pipeline.predict(&sample_png()).unwrap();
        assert_eq!(prediction.top.len(), 2);
        // all equal: lowest index wins
        assert_eq!(prediction.class_index, 0);
        assert_eq!(prediction.top[1].index, 1);
    }

    #[test]
    fn test_predict_decode_error() {
        let mut pipeline = Pipeline::new(
            catalog(2),
            Box::new(FixedLocator(vec![])),
            Box::new(FixedClassifier { logits: vec![0.0, 1.0] }),
        );
        let err = pipeline.predict(b"").unwrap_err();
        assert!(matches!(err, PipelineError::Preprocess(PreprocessError::Decode(_))));
    }

    #[test]
    fn test_predict_classifier_error() {
        let mut pipeline = Pipeline::new(catalog(2), Box::new(FixedLocator(vec![])), Box::new(FailingClassifier));
        let err = pipeline.predict(&sample_png()).unwrap_err();
        assert!(matches!(err, PipelineError::Classifier(_)));
    }

    #[test]
    fn test_predict_empty_distribution() {
        let mut pipeline = Pipeline::new(
            catalog(0),
            Box::new(FixedLocator(vec![])),
            Box::new(FixedClassifier { logits: vec![] }),
        );
        assert!(matches!(pipeline.predict(&sample_png()), Err(PipelineError::EmptyDistribution)));
    }
}
