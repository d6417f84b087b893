use serde::Deserialize;
use starlens_core::detector::{CascadeParams, DetectorError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file read when `STARLENS_CONFIG` is unset and the file exists.
pub const DEFAULT_CONFIG_FILE: &str = "starlens.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Detector(#[from] DetectorError),
}

/// Daemon configuration: optional TOML file, then `STARLENS_*` overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address for the HTTP API.
    pub bind: String,
    /// JSON map of class index → display name.
    pub label_map: PathBuf,
    /// SeetaFace cascade parameter file.
    pub cascade_model: PathBuf,
    /// ONNX classifier whose output width equals the label count.
    pub classifier_model: PathBuf,
    /// ONNX Runtime intra-op threads.
    pub intra_threads: usize,
    /// Pending predictions queued for the engine thread.
    pub queue_depth: usize,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Length of `top_predictions`.
    pub top_k: usize,
    pub detector: CascadeParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            label_map: PathBuf::from("label_map.json"),
            cascade_model: PathBuf::from("models/seeta_fd_frontal_v1.0.bin"),
            classifier_model: PathBuf::from("models/cnn_face_model.onnx"),
            intra_threads: 2,
            queue_depth: 4,
            max_body_bytes: 16 * 1024 * 1024,
            top_k: 5,
            detector: CascadeParams::default(),
        }
    }
}

impl Config {
    /// Load from the config file (if any) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("STARLENS_CONFIG").ok().map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&text)?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply `STARLENS_*` overrides. Unparseable values are logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("STARLENS_BIND") {
            self.bind = v;
        }
        if let Some(v) = lookup("STARLENS_LABEL_MAP") {
            self.label_map = PathBuf::from(v);
        }
        if let Some(v) = lookup("STARLENS_CASCADE_MODEL") {
            self.cascade_model = PathBuf::from(v);
        }
        if let Some(v) = lookup("STARLENS_CLASSIFIER_MODEL") {
            self.classifier_model = PathBuf::from(v);
        }
        override_parsed(&lookup, "STARLENS_INTRA_THREADS", &mut self.intra_threads);
        override_parsed(&lookup, "STARLENS_QUEUE_DEPTH", &mut self.queue_depth);
        override_parsed(&lookup, "STARLENS_MAX_BODY_BYTES", &mut self.max_body_bytes);
        override_parsed(&lookup, "STARLENS_TOP_K", &mut self.top_k);
        override_parsed(&lookup, "STARLENS_SCALE_FACTOR", &mut self.detector.scale_factor);
        override_parsed(&lookup, "STARLENS_MIN_FACE_SIZE", &mut self.detector.min_face_size);
        override_parsed(&lookup, "STARLENS_SCORE_THRESHOLD", &mut self.detector.score_threshold);
        override_parsed(&lookup, "STARLENS_WINDOW_STEP", &mut self.detector.window_step);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;
        if self.intra_threads == 0 {
            return Err(ConfigError::Invalid("intra_threads must be > 0".into()));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::Invalid("queue_depth must be > 0".into()));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be > 0".into()));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max_body_bytes must be > 0".into()));
        }
        Ok(())
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable environment override"),
    }
}
