use crate::config::Config;
use starlens_core::classifier::ClassifierError;
use starlens_core::detector::DetectorError;
use starlens_core::{CascadeLocator, LabelCatalog, OnnxClassifier, Pipeline, PipelineError, Prediction};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("face locator: {0}")]
    Detector(#[from] DetectorError),
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Predict {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Prediction, PipelineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    device: Arc<str>,
}

impl EngineHandle {
    /// Run one image through the pipeline.
    pub async fn predict(&self, image: Vec<u8>) -> Result<Prediction, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Predict {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// False once the engine thread has stopped taking requests.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Compute device the classifier runs on.
    pub fn device(&self) -> &str {
        &self.device
    }
}

/// Load the locator and classifier named in `config` and start the engine.
pub fn spawn_from_config(config: &Config, catalog: Arc<LabelCatalog>) -> Result<EngineHandle, EngineError> {
    let cascade_path = config.cascade_model.clone();
    let classifier_path = config.classifier_model.clone();
    let params = config.detector.clone();
    let intra_threads = config.intra_threads;
    let top_k = config.top_k;

    spawn_engine(
        move || {
            let locator = CascadeLocator::load(&cascade_path, params)?;
            tracing::info!(path = %cascade_path.display(), "face cascade ready");

            let classifier = OnnxClassifier::load(&classifier_path, catalog.len(), intra_threads)?;
            tracing::info!(path = %classifier_path.display(), classes = catalog.len(), "classifier ready");

            Ok(Pipeline::new(catalog, Box::new(locator), Box::new(classifier)).with_top_k(top_k))
        },
        config.queue_depth,
    )
}

/// Spawn the engine on a dedicated OS thread.
///
/// `build` runs on that thread, so the pipeline never crosses threads. This
/// returns only after `build` finishes; a load failure is returned here and
/// no handle is produced.
pub fn spawn_engine<F>(build: F, queue_depth: usize) -> Result<EngineHandle, EngineError>
where
    F: FnOnce() -> Result<Pipeline, EngineError> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth);
    let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<String, EngineError>>(1);

    std::thread::Builder::new()
        .name("starlens-engine".into())
        .spawn(move || {
            let mut pipeline = match build() {
                Ok(pipeline) => {
                    let _ = ready_tx.send(Ok(pipeline.device().to_string()));
                    pipeline
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Predict { image, reply } => {
                        let started = Instant::now();
                        let result = pipeline.predict(&image);
                        let elapsed_ms = started.elapsed().as_millis() as u64;
                        match &result {
                            Ok(p) => tracing::info!(
                                class_index = p.class_index,
                                confidence = p.confidence,
                                face_detected = p.face_detected,
                                elapsed_ms,
                                "prediction complete"
                            ),
                            Err(e) => tracing::warn!(error = %e, elapsed_ms, "prediction failed"),
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    let device = ready_rx.recv().map_err(|_| EngineError::ChannelClosed)??;
    tracing::info!(device = %device, queue_depth, "inference engine ready");

    Ok(EngineHandle {
        tx,
        device: device.into(),
    })
}
