use likeness_core::recognizer::FACENET_INPUT_SIZE;
use likeness_core::{PipelineConfig, TensorLayout};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Optional settings read from the TOML file named by `LIKENESS_CONFIG`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    camera_device: Option<String>,
    model_dir: Option<PathBuf>,
    similarity_threshold: Option<f32>,
    eye_distance: Option<f64>,
    patch_size: Option<u32>,
    warmup_frames: Option<usize>,
    debug_dir: Option<PathBuf>,
    embedder_layout: Option<TensorLayout>,
}

/// Daemon configuration: config file first, `LIKENESS_*` variables on top.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Similarity at or above which a comparison counts as a match.
    pub similarity_threshold: f32,
    /// Alignment tunables handed to the session pipeline.
    pub pipeline: PipelineConfig,
    /// Number of warmup frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Where debug PNGs are written; `None` disables debug rendering.
    pub debug_dir: Option<PathBuf>,
    /// Input layout of the FaceNet export.
    pub embedder_layout: TensorLayout,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn load<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match lookup("LIKENESS_CONFIG") {
            Some(path) => read_file(Path::new(&path))?,
            None => FileConfig::default(),
        };
        let defaults = PipelineConfig::default();

        let config = Self {
            camera_device: lookup("LIKENESS_CAMERA_DEVICE")
                .or(file.camera_device)
                .unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir: lookup("LIKENESS_MODEL_DIR")
                .map(PathBuf::from)
                .or(file.model_dir)
                .unwrap_or_else(likeness_core::default_model_dir),
            similarity_threshold: env_parse(&lookup, "LIKENESS_SIMILARITY_THRESHOLD")
                .or(file.similarity_threshold)
                .unwrap_or(0.7),
            pipeline: PipelineConfig {
                eye_distance: env_parse(&lookup, "LIKENESS_EYE_DISTANCE")
                    .or(file.eye_distance)
                    .unwrap_or(defaults.eye_distance),
                patch_size: env_parse(&lookup, "LIKENESS_PATCH_SIZE")
                    .or(file.patch_size)
                    .unwrap_or(defaults.patch_size),
            },
            warmup_frames: env_parse(&lookup, "LIKENESS_WARMUP_FRAMES")
                .or(file.warmup_frames)
                .unwrap_or(4),
            debug_dir: lookup("LIKENESS_DEBUG_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .or(file.debug_dir),
            embedder_layout: env_parse(&lookup, "LIKENESS_EMBEDDER_LAYOUT")
                .or(file.embedder_layout)
                .unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.pipeline.eye_distance.is_finite() && self.pipeline.eye_distance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "eye distance must be positive, got {}",
                self.pipeline.eye_distance
            )));
        }
        if self.pipeline.patch_size as usize != FACENET_INPUT_SIZE {
            return Err(ConfigError::Invalid(format!(
                "patch size {} does not match the FaceNet input size {FACENET_INPUT_SIZE}",
                self.pipeline.patch_size
            )));
        }
        if !self.similarity_threshold.is_finite() {
            return Err(ConfigError::Invalid("similarity threshold must be finite".into()));
        }
        Ok(())
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir.join("det_10g.onnx").to_string_lossy().into_owned()
    }

    /// Path to the FaceNet embedding model.
    pub fn facenet_model_path(&self) -> String {
        self.model_dir.join("facenet.onnx").to_string_lossy().into_owned()
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(file)
}

/// Parse a variable, ignoring (with a warning) values that do not parse.
fn env_parse<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
