//! Embedding normalization and cosine scoring.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Norms at or below this cannot be normalized.
const MIN_NORM: f32 = 1e-12;

#[derive(Error, Debug, PartialEq)]
pub enum EmbeddingError {
    #[error("embedding has zero L2 norm")]
    ZeroVector,
    #[error("embedding dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Embedding exactly as produced by the inference engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEmbedding {
    pub values: Vec<f32>,
    /// Model that produced this embedding (e.g., "facenet").
    pub model_version: Option<String>,
}

impl RawEmbedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn l2_norm(&self) -> f32 {
        self.values.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

/// Unit-length embedding. Only obtainable through [`normalize`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embedding {
    values: Vec<f32>,
    model_version: Option<String>,
}

impl Embedding {
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn model_version(&self) -> Option<&str> {
        self.model_version.as_deref()
    }
}

/// Scale `raw` to unit L2 norm.
pub fn normalize(raw: &RawEmbedding) -> Result<Embedding, EmbeddingError> {
    let norm = raw.l2_norm();
    if !norm.is_finite() || norm <= MIN_NORM {
        return Err(EmbeddingError::ZeroVector);
    }
    Ok(Embedding {
        values: raw.values.iter().map(|x| x / norm).collect(),
        model_version: raw.model_version.clone(),
    })
}

/// Dot product of two unit embeddings, i.e. their cosine similarity in [-1, 1].
///
/// No normalization happens here; both sides are already unit length by type.
pub fn similarity(a: &Embedding, b: &Embedding) -> Result<f32, EmbeddingError> {
    if a.dim() != b.dim() {
        return Err(EmbeddingError::DimensionMismatch {
            left: a.dim(),
            right: b.dim(),
        });
    }
    Ok(a.values.iter().zip(&b.values).map(|(x, y)| x * y).sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(values: &[f32]) -> RawEmbedding {
        RawEmbedding::new(values.to_vec())
    }

    fn norm_of(e: &Embedding) -> f32 {
        e.values().iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_normalize_unit_length() {
        let vectors: [&[f32]; 4] = [
            &[3.0, 4.0],
            &[1e-3, -2e-3, 5e-4],
            &[1234.5, -987.0, 0.25, 42.0],
            &[0.0, 0.0, 7.0],
        ];
        for v in vectors {
            let n = normalize(&raw(v)).unwrap();
            assert!((norm_of(&n) - 1.0).abs() < 1e-5, "{v:?} -> norm {}", norm_of(&n));
        }
        let n = normalize(&raw(&[3.0, 4.0])).unwrap();
        assert!((n.values()[0] - 0.6).abs() < 1e-6);
        assert!((n.values()[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_128_dim() {
        let values: Vec<f32> = (0..128).map(|i| ((i * 37) % 19) as f32 - 9.0).collect();
        let n = normalize(&RawEmbedding::new(values)).unwrap();
        assert_eq!(n.dim(), 128);
        assert!((norm_of(&n) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(normalize(&raw(&[0.0, 0.0, 0.0])), Err(EmbeddingError::ZeroVector));
        assert_eq!(normalize(&raw(&[])), Err(EmbeddingError::ZeroVector));
    }

    #[test]
    fn test_normalize_keeps_model_version() {
        let mut r = raw(&[1.0, 1.0]);
        r.model_version = Some("facenet".into());
        assert_eq!(normalize(&r).unwrap().model_version(), Some("facenet"));
    }

    #[test]
    fn test_similarity_self_is_one() {
        let v = normalize(&raw(&[0.3, -1.2, 4.0, 0.01])).unwrap();
        assert!((similarity(&v, &v).unwrap() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similarity_negated_is_minus_one() {
        let v = [0.3, -1.2, 4.0, 0.01];
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        let a = normalize(&raw(&v)).unwrap();
        let b = normalize(&raw(&neg)).unwrap();
        assert!((similarity(&a, &b).unwrap() + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similarity_orthogonal() {
        let a = normalize(&raw(&[1.0, 0.0])).unwrap();
        let b = normalize(&raw(&[0.0, 2.0])).unwrap();
        assert!(similarity(&a, &b).unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_similarity_symmetric() {
        let a = normalize(&raw(&[0.5, 2.0, -1.0])).unwrap();
        let b = normalize(&raw(&[1.5, -0.25, 3.0])).unwrap();
        assert_eq!(similarity(&a, &b).unwrap(), similarity(&b, &a).unwrap());
    }

    #[test]
    fn test_similarity_dimension_mismatch() {
        let a = normalize(&raw(&[1.0, 0.0])).unwrap();
        let b = normalize(&raw(&[1.0, 0.0, 0.0])).unwrap();
        assert_eq!(
            similarity(&a, &b),
            Err(EmbeddingError::DimensionMismatch { left: 2, right: 3 })
        );
    }
}
