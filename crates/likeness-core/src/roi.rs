//! Square region-of-interest extraction around the eye midpoint.
//!
//! Regions are shifted back inside the frame when they would cross an edge;
//! they are never shrunk and never padded.

use crate::types::{ColorLayout, Frame, Point};
use thiserror::Error;

/// Side of the canonical face patch, in pixels.
pub const DEFAULT_PATCH_SIZE: u32 = 160;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RoiError {
    #[error("frame {width}x{height} is smaller than the {size}x{size} patch")]
    InsufficientFrameSize { width: u32, height: u32, size: u32 },
}

/// A cropped square region and its placement in the source frame.
#[derive(Debug, Clone)]
pub struct Roi {
    /// Top-left corner in source coordinates.
    pub origin: (u32, u32),
    pub patch: Frame,
}

/// Top-left coordinate along one axis: centred on `center`, then shifted so
/// `[start, start + size)` lies inside `[0, extent)`.
///
/// Callers guarantee `size <= extent`.
fn clamp_origin(center: i64, size: u32, extent: u32) -> u32 {
    let size = size as i64;
    let extent = extent as i64;
    center.saturating_sub(size / 2).clamp(0, extent - size) as u32
}

/// Compute the top-left corner of the `size`×`size` region centred on `center`.
pub fn roi_origin(center: Point, size: u32, width: u32, height: u32) -> Result<(u32, u32), RoiError> {
    if width < size || height < size {
        return Err(RoiError::InsufficientFrameSize {
            width,
            height,
            size,
        });
    }
    let cx = center.x.round() as i64;
    let cy = center.y.round() as i64;
    Ok((clamp_origin(cx, size, width), clamp_origin(cy, size, height)))
}

/// Crop the `size`×`size` region centred on `center` from `frame`.
pub fn extract_roi(frame: &Frame, center: Point, size: u32) -> Result<Roi, RoiError> {
    let (x0, y0) = roi_origin(center, size, frame.width(), frame.height())?;

    let channels = ColorLayout::CHANNELS;
    let row_bytes = size as usize * channels;
    let stride = frame.width() as usize * channels;
    let src = frame.data();

    let mut data = Vec::with_capacity(row_bytes * size as usize);
    for y in y0 as usize..(y0 + size) as usize {
        let start = y * stride + x0 as usize * channels;
        data.extend_from_slice(&src[start..start + row_bytes]);
    }

    Ok(Roi {
        origin: (x0, y0),
        patch: Frame::from_raw(size, size, frame.layout(), data),
    })
}
