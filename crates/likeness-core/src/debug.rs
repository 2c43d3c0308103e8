//! Best-effort visual debugging of canonical patches.

use image::RgbImage;
use serde::Serialize;

/// Which side of the comparison a patch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugSlot {
    /// Patch that is about to become the enrolled reference.
    Reference,
    /// Patch compared against the reference.
    Candidate,
}

impl DebugSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            DebugSlot::Reference => "reference",
            DebugSlot::Candidate => "candidate",
        }
    }
}

/// A canonical patch before and after normalization.
#[derive(Debug, Clone)]
pub struct DebugView {
    pub slot: DebugSlot,
    /// Cropped region in 8-bit RGB, before float conversion.
    pub crop: RgbImage,
    /// Normalized patch rendered back to 8-bit RGB.
    pub normalized: RgbImage,
}

/// Receiver of debug views.
///
/// `submit` is called on the frame worker and must return without waiting on
/// rendering; implementations drop views they cannot accept immediately.
pub trait DebugSink: Send {
    /// Whether views should be built at all.
    fn enabled(&self) -> bool {
        true
    }

    fn submit(&self, view: DebugView);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDebug;

impl DebugSink for NoDebug {
    fn enabled(&self) -> bool {
        false
    }

    fn submit(&self, _view: DebugView) {}
}
