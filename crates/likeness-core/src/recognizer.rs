//! Embedding inference: the engine seam and a FaceNet implementation via ONNX Runtime.
//!
//! FaceNet consumes a 160×160 RGB patch with samples already scaled to
//! [0, 1] and produces a raw (not yet normalized) embedding.

use crate::embedding::RawEmbedding;
use crate::normalizer::CanonicalPatch;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Side of the square patch FaceNet consumes.
pub const FACENET_INPUT_SIZE: usize = 160;
const FACENET_MODEL_VERSION: &str = "facenet";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} (export a FaceNet model to ONNX as facenet.onnx in the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("patch is {actual}x{actual}, model expects {expected}x{expected}")]
    PatchSize { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that turns a canonical patch into a raw embedding.
pub trait EmbeddingEngine {
    fn embed(&mut self, patch: &CanonicalPatch) -> Result<RawEmbedding, RecognizerError>;
}

/// Memory layout of the model's image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, H, W, 3]`, TensorFlow/TFLite exports.
    #[default]
    Nhwc,
    /// `[1, 3, H, W]`, PyTorch exports.
    Nchw,
}

impl FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nhwc" => Ok(Self::Nhwc),
            "nchw" => Ok(Self::Nchw),
            other => Err(format!("unknown tensor layout {other:?} (expected nhwc or nchw)")),
        }
    }
}

/// FaceNet-based embedding engine.
pub struct FaceNetEmbedder {
    session: Session,
    layout: TensorLayout,
}

impl FaceNetEmbedder {
    /// Load the FaceNet ONNX model from the given path.
    pub fn load(model_path: &str, layout: TensorLayout) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            ?layout,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FaceNet model"
        );

        Ok(Self { session, layout })
    }

    /// Pack the HWC patch into the model's input tensor.
    fn preprocess(patch: &CanonicalPatch, layout: TensorLayout) -> Result<Array4<f32>, RecognizerError> {
        let size = patch.size() as usize;
        if size != FACENET_INPUT_SIZE {
            return Err(RecognizerError::PatchSize {
                expected: FACENET_INPUT_SIZE,
                actual: size,
            });
        }

        let tensor = match layout {
            TensorLayout::Nhwc => Array4::from_shape_vec((1, size, size, 3), patch.data().to_vec())
                .map_err(|e| RecognizerError::InferenceFailed(format!("input shape: {e}")))?,
            TensorLayout::Nchw => {
                let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
                for y in 0..size {
                    for x in 0..size {
                        let rgb = patch.pixel(x as u32, y as u32);
                        for (c, v) in rgb.into_iter().enumerate() {
                            tensor[[0, c, y, x]] = v;
                        }
                    }
                }
                tensor
            }
        };

        Ok(tensor)
    }
}

impl EmbeddingEngine for FaceNetEmbedder {
    fn embed(&mut self, patch: &CanonicalPatch) -> Result<RawEmbedding, RecognizerError> {
        let input = Self::preprocess(patch, self.layout)?;

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw_data.is_empty() {
            return Err(RecognizerError::InferenceFailed("model returned an empty embedding".into()));
        }

        Ok(RawEmbedding {
            values: raw_data.to_vec(),
            model_version: Some(FACENET_MODEL_VERSION.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize_patch;
    use crate::types::{ColorLayout, Frame};

    fn patch() -> CanonicalPatch {
        // BGR (0, 51, 255) → RGB (1.0, 0.2, 0.0)
        let crop = Frame::filled(160, 160, ColorLayout::Bgr, [0, 51, 255]);
        normalize_patch(&crop, 160)
    }

    #[test]
    fn test_preprocess_nhwc_shape_and_values() {
        let tensor = FaceNetEmbedder::preprocess(&patch(), TensorLayout::Nhwc).unwrap();
        assert_eq!(tensor.shape(), &[1, 160, 160, 3]);
        assert!((tensor[[0, 10, 20, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 10, 20, 1]] - 0.2).abs() < 1e-6);
        assert_eq!(tensor[[0, 10, 20, 2]], 0.0);
    }

    #[test]
    fn test_preprocess_nchw_shape_and_values() {
        let tensor = FaceNetEmbedder::preprocess(&patch(), TensorLayout::Nchw).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 160, 160]);
        assert!((tensor[[0, 0, 159, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 159, 0]] - 0.2).abs() < 1e-6);
        assert_eq!(tensor[[0, 2, 159, 0]], 0.0);
    }

    #[test]
    fn test_preprocess_rejects_wrong_size() {
        let crop = Frame::filled(112, 112, ColorLayout::Bgr, [0, 0, 0]);
        let small = normalize_patch(&crop, 112);
        let err = FaceNetEmbedder::preprocess(&small, TensorLayout::Nhwc).unwrap_err();
        assert!(matches!(err, RecognizerError::PatchSize { expected: 160, actual: 112 }));
    }

    #[test]
    fn test_layout_parsing() {
        assert_eq!("NHWC".parse::<TensorLayout>(), Ok(TensorLayout::Nhwc));
        assert_eq!("nchw".parse::<TensorLayout>(), Ok(TensorLayout::Nchw));
        assert!("chw".parse::<TensorLayout>().is_err());
    }
}
