//! Eye-pair similarity transform estimation.
//!
//! Converts two eye centres into a rotation about their midpoint that levels
//! the eye line, combined with a uniform scale that brings the inter-eye
//! distance to a fixed target.

use crate::types::Point;
use thiserror::Error;

/// Target inter-eye distance after alignment, in pixels.
pub const DEFAULT_EYE_DISTANCE: f64 = 80.0;

/// Eye distances below this are treated as coincident.
const MIN_EYE_DISTANCE: f64 = 1e-6;

#[derive(Error, Debug, PartialEq)]
pub enum GeometryError {
    #[error("eye landmarks coincide (distance {distance:e}); scale is undefined")]
    DegenerateGeometry { distance: f64 },
}

/// Rotation, uniform scale and pivot derived from an eye pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentTransform {
    /// Eye-line angle in degrees, `atan2(dy, dx)` of `right - left`.
    pub angle_deg: f64,
    /// `target_distance / current_distance`.
    pub scale: f64,
    /// Midpoint between the eyes; fixed under the transform.
    pub pivot: Point,
}

impl AlignmentTransform {
    /// Estimate the transform for an eye pair.
    pub fn from_eyes(
        left_eye: Point,
        right_eye: Point,
        target_distance: f64,
    ) -> Result<Self, GeometryError> {
        let dx = right_eye.x as f64 - left_eye.x as f64;
        let dy = right_eye.y as f64 - left_eye.y as f64;
        let distance = dx.hypot(dy);

        if !distance.is_finite() || distance < MIN_EYE_DISTANCE {
            return Err(GeometryError::DegenerateGeometry { distance });
        }

        Ok(Self {
            angle_deg: dy.atan2(dx).to_degrees(),
            scale: target_distance / distance,
            pivot: left_eye.midpoint(right_eye),
        })
    }

    /// Forward 2×3 matrix `[a, b, tx, c, d, ty]` mapping source to aligned coordinates:
    /// ```text
    /// |  α  β  (1-α)·cx - β·cy |
    /// | -β  α  β·cx + (1-α)·cy |
    /// ```
    /// with `α = scale·cos θ`, `β = scale·sin θ`.
    pub fn matrix(&self) -> [f64; 6] {
        let theta = self.angle_deg.to_radians();
        let alpha = self.scale * theta.cos();
        let beta = self.scale * theta.sin();
        let cx = self.pivot.x as f64;
        let cy = self.pivot.y as f64;

        [
            alpha,
            beta,
            (1.0 - alpha) * cx - beta * cy,
            -beta,
            alpha,
            beta * cx + (1.0 - alpha) * cy,
        ]
    }

    /// Map a source point into aligned coordinates.
    pub fn apply(&self, p: Point) -> (f64, f64) {
        let m = self.matrix();
        let (x, y) = (p.x as f64, p.y as f64);
        (m[0] * x + m[1] * y + m[2], m[3] * x + m[4] * y + m[5])
    }

    /// Map an aligned point back into source coordinates.
    pub fn invert(&self, x: f64, y: f64) -> (f64, f64) {
        let theta = self.angle_deg.to_radians();
        let (sin, cos) = theta.sin_cos();
        let cx = self.pivot.x as f64;
        let cy = self.pivot.y as f64;

        // Inverse of a rotation-scale about the pivot: undo scale, rotate back by θ.
        let ux = (x - cx) / self.scale;
        let uy = (y - cy) / self.scale;
        (cx + cos * ux - sin * uy, cy + sin * ux + cos * uy)
    }
}
