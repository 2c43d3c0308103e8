//! likeness-core: Face alignment, embedding and one-shot verification.
//!
//! Levels and scales faces from their eye landmarks, crops a canonical
//! 160×160 patch, embeds it with FaceNet and scores it against the first
//! face enrolled in the session.

pub mod alignment;
pub mod debug;
pub mod detector;
pub mod embedding;
pub mod geometry;
pub mod normalizer;
pub mod recognizer;
pub mod roi;
pub mod session;
pub mod types;

pub use detector::{FaceDetector, ScrfdDetector};
pub use embedding::{Embedding, RawEmbedding};
pub use geometry::AlignmentTransform;
pub use normalizer::CanonicalPatch;
pub use recognizer::{EmbeddingEngine, FaceNetEmbedder, TensorLayout};
pub use session::{
    ActivationFlag, AttemptError, AttemptOutcome, PipelineConfig, SessionPhase, SessionPipeline, SessionState,
};
pub use types::{BoundingBox, ColorLayout, DetectedFace, Frame, Landmark, LandmarkSet, Point};

/// Default directory holding the ONNX models, `$XDG_DATA_HOME/likeness/models`.
pub fn default_model_dir() -> std::path::PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        });
    data_home.join("likeness").join("models")
}
