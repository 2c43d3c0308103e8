//! Canonical patch normalization: RGB channel order, float samples in [0, 1].

use crate::types::{ColorLayout, Frame};
use image::RgbImage;
use serde::{Deserialize, Serialize};

const SAMPLE_SCALE: f32 = 1.0 / 255.0;

/// A square, RGB-interleaved float patch ready for embedding inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPatch {
    size: u32,
    data: Vec<f32>,
}

impl CanonicalPatch {
    /// Side length in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// HWC samples, `size * size * 3` values in [0, 1].
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// RGB sample at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let i = (y as usize * self.size as usize + x as usize) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Render back to 8-bit RGB for visual inspection.
    pub fn to_rgb_image(&self) -> RgbImage {
        let bytes = self
            .data
            .iter()
            .map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
            .collect();
        RgbImage::from_raw(self.size, self.size, bytes)
            .unwrap_or_else(|| RgbImage::new(self.size, self.size))
    }
}

/// Convert a crop to a `size`×`size` canonical patch.
///
/// Crops that are not already `size`×`size` are resized with bilinear
/// interpolation first.
pub fn normalize_patch(crop: &Frame, size: u32) -> CanonicalPatch {
    let resized;
    let source = if crop.width() == size && crop.height() == size {
        crop
    } else {
        tracing::debug!(
            width = crop.width(),
            height = crop.height(),
            size,
            "crop is not canonical size, resizing"
        );
        resized = resize_bilinear(crop, size, size);
        &resized
    };

    let layout = source.layout();
    let data = source
        .data()
        .chunks_exact(ColorLayout::CHANNELS)
        .flat_map(|px| layout.to_rgb([px[0], px[1], px[2]]))
        .map(|v| v as f32 * SAMPLE_SCALE)
        .collect();

    CanonicalPatch { size, data }
}

/// Resize a frame with bilinear interpolation, sampling at pixel centres.
pub fn resize_bilinear(frame: &Frame, new_width: u32, new_height: u32) -> Frame {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let (nw, nh) = (new_width as usize, new_height as usize);
    let channels = ColorLayout::CHANNELS;

    if width == 0 || height == 0 {
        return Frame::filled(new_width, new_height, frame.layout(), [0, 0, 0]);
    }

    let src = frame.data();
    let scale_x = width as f32 / nw.max(1) as f32;
    let scale_y = height as f32 / nh.max(1) as f32;
    let mut out = vec![0u8; nw * nh * channels];

    for y in 0..nh {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..nw {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..channels {
                let tl = src[(y0 * width + x0) * channels + c] as f32;
                let tr = src[(y0 * width + x1) * channels + c] as f32;
                let bl = src[(y1 * width + x0) * channels + c] as f32;
                let br = src[(y1 * width + x1) * channels + c] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                out[(y * nw + x) * channels + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    Frame::from_raw(new_width, new_height, frame.layout(), out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgr_becomes_rgb_float() {
        let crop = Frame::filled(4, 4, ColorLayout::Bgr, [255, 0, 51]);
        let patch = normalize_patch(&crop, 4);
        assert_eq!(patch.size(), 4);
        assert_eq!(patch.data().len(), 4 * 4 * 3);
        let [r, g, b] = patch.pixel(2, 3);
        assert!((r - 0.2).abs() < 1e-6, "r = {r}");
        assert_eq!(g, 0.0);
        assert!((b - 1.0).abs() < 1e-6, "b = {b}");
    }

    #[test]
    fn test_rgb_source_keeps_order() {
        let crop = Frame::filled(2, 2, ColorLayout::Rgb, [255, 0, 51]);
        let patch = normalize_patch(&crop, 2);
        let [r, _, b] = patch.pixel(0, 0);
        assert!((r - 1.0).abs() < 1e-6);
        assert!((b - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_values_within_unit_range() {
        let data: Vec<u8> = (0..=255u8).cycle().take(16 * 16 * 3).collect();
        let crop = Frame::new(16, 16, ColorLayout::Bgr, data).unwrap();
        let patch = normalize_patch(&crop, 16);
        assert!(patch.data().iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(patch.data().iter().any(|&v| v == 1.0));
        assert!(patch.data().iter().any(|&v| v == 0.0));
    }

    #[test]
    fn test_wrong_size_crop_is_resized() {
        let crop = Frame::filled(100, 120, ColorLayout::Bgr, [30, 60, 90]);
        let patch = normalize_patch(&crop, 160);
        assert_eq!(patch.size(), 160);
        assert_eq!(patch.data().len(), 160 * 160 * 3);
        // Uniform input stays uniform through bilinear resize.
        let [r, g, b] = patch.pixel(80, 80);
        assert!((r - 90.0 / 255.0).abs() < 1e-6);
        assert!((g - 60.0 / 255.0).abs() < 1e-6);
        assert!((b - 30.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_resize_uniform_stays_uniform() {
        let frame = Frame::filled(100, 100, ColorLayout::Rgb, [128, 128, 128]);
        let resized = resize_bilinear(&frame, 200, 50);
        assert_eq!(resized.width(), 200);
        assert_eq!(resized.height(), 50);
        assert!(resized.data().iter().all(|&p| p == 128));
    }

    #[test]
    fn test_to_rgb_image_roundtrips_bytes() {
        let crop = Frame::filled(8, 8, ColorLayout::Bgr, [10, 20, 30]);
        let image = normalize_patch(&crop, 8).to_rgb_image();
        assert_eq!(image.dimensions(), (8, 8));
        assert_eq!(image.get_pixel(3, 3).0, [30, 20, 10]);
    }
}
