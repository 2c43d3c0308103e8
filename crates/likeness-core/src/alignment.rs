//! Frame alignment via eye-pair similarity transform.
//!
//! Warps a whole frame so the eye line is horizontal and the eyes sit
//! [`DEFAULT_EYE_DISTANCE`](crate::geometry::DEFAULT_EYE_DISTANCE) pixels
//! apart, keeping the original frame dimensions.

use crate::geometry::AlignmentTransform;
use crate::types::{ColorLayout, Frame};

/// Value written where the inverse mapping falls outside the source frame.
const BACKGROUND: f32 = 0.0;

/// Warp `frame` with the forward transform, producing a new frame of the same
/// size and color layout.
///
/// Each output pixel is inverse-mapped into the source and sampled with
/// bilinear interpolation per channel. Out-of-bounds samples are black.
pub fn align_frame(frame: &Frame, transform: &AlignmentTransform) -> Frame {
    let m = transform.matrix();
    let (a, b, tx) = (m[0], m[1], m[2]);
    let ty = m[5];

    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let channels = ColorLayout::CHANNELS;
    let src = frame.data();

    // Forward 2x2 part is [[a, b], [-b, a]], det = a^2 + b^2 > 0 for any valid scale.
    let det = a * a + b * b;
    let ia = a / det;
    let ib = b / det;

    let mut output = vec![0u8; width * height * channels];

    let sample = |x: i64, y: i64, c: usize| -> f32 {
        if x >= 0 && (x as usize) < width && y >= 0 && (y as usize) < height {
            src[(y as usize * width + x as usize) * channels + c] as f32
        } else {
            BACKGROUND
        }
    };

    for oy in 0..height {
        for ox in 0..width {
            // src = A^-1 * (dst - t)
            let dx = ox as f64 - tx;
            let dy = oy as f64 - ty;
            let sx = ia * dx - ib * dy;
            let sy = ib * dx + ia * dy;

            let x0f = sx.floor();
            let y0f = sy.floor();
            let fx = (sx - x0f) as f32;
            let fy = (sy - y0f) as f32;
            let x0 = x0f as i64;
            let y0 = y0f as i64;

            let out = (oy * width + ox) * channels;
            for c in 0..channels {
                let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                    + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                    + sample(x0 + 1, y0 + 1, c) * fx * fy;
                output[out + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    Frame::from_raw(frame.width(), frame.height(), frame.layout(), output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::DEFAULT_EYE_DISTANCE;
    use crate::types::Point;

    fn paint_square(data: &mut [u8], width: usize, cx: usize, cy: usize, half: usize, px: [u8; 3]) {
        for y in cy - half..=cy + half {
            for x in cx - half..=cx + half {
                let i = (y * width + x) * 3;
                data[i..i + 3].copy_from_slice(&px);
            }
        }
    }

    fn brightest_near(frame: &Frame, x: f64, y: f64, radius: i64) -> u8 {
        let mut max_val = 0u8;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let px = x.round() as i64 + dx;
                let py = y.round() as i64 + dy;
                if px >= 0 && py >= 0 && (px as u32) < frame.width() && (py as u32) < frame.height() {
                    max_val = max_val.max(frame.pixel(px as u32, py as u32)[1]);
                }
            }
        }
        max_val
    }

    #[test]
    fn test_output_keeps_frame_dimensions() {
        let frame = Frame::filled(64, 48, ColorLayout::Bgr, [10, 20, 30]);
        let t = AlignmentTransform::from_eyes(
            Point::new(20.0, 20.0),
            Point::new(40.0, 25.0),
            DEFAULT_EYE_DISTANCE,
        )
        .unwrap();
        let aligned = align_frame(&frame, &t);
        assert_eq!(aligned.width(), 64);
        assert_eq!(aligned.height(), 48);
        assert_eq!(aligned.layout(), ColorLayout::Bgr);
        assert_eq!(aligned.data().len(), 64 * 48 * 3);
    }

    #[test]
    fn test_identity_transform_preserves_pixels() {
        let width = 32u32;
        let height = 24u32;
        let data: Vec<u8> = (0..(width * height * 3) as usize).map(|i| (i % 251) as u8).collect();
        let frame = Frame::new(width, height, ColorLayout::Bgr, data.clone()).unwrap();

        let t = AlignmentTransform::from_eyes(
            Point::new(0.0, 10.0),
            Point::new(DEFAULT_EYE_DISTANCE as f32, 10.0),
            DEFAULT_EYE_DISTANCE,
        )
        .unwrap();
        let aligned = align_frame(&frame, &t);
        assert_eq!(aligned.data(), &data[..]);
    }

    #[test]
    fn test_out_of_bounds_is_black() {
        let frame = Frame::filled(100, 100, ColorLayout::Rgb, [200, 200, 200]);
        // Scale 0.5 about the centre shrinks the image; corners map outside the source.
        let t = AlignmentTransform::from_eyes(
            Point::new(50.0 - 80.0, 50.0),
            Point::new(50.0 + 80.0, 50.0),
            DEFAULT_EYE_DISTANCE,
        )
        .unwrap();
        assert!((t.scale - 0.5).abs() < 1e-9);
        let aligned = align_frame(&frame, &t);
        assert_eq!(aligned.pixel(0, 0), [0, 0, 0]);
        assert_eq!(aligned.pixel(50, 50), [200, 200, 200]);
    }

    #[test]
    fn test_eyes_land_level_at_target_distance() {
        let w = 320usize;
        let h = 240usize;
        let mut data = vec![0u8; w * h * 3];

        let left = Point::new(130.0, 110.0);
        let right = Point::new(170.0, 130.0);
        paint_square(&mut data, w, 130, 110, 2, [255, 255, 255]);
        paint_square(&mut data, w, 170, 130, 2, [255, 255, 255]);

        let frame = Frame::new(w as u32, h as u32, ColorLayout::Bgr, data).unwrap();
        let t = AlignmentTransform::from_eyes(left, right, DEFAULT_EYE_DISTANCE).unwrap();
        let aligned = align_frame(&frame, &t);

        let (lx, ly) = t.apply(left);
        let (rx, ry) = t.apply(right);
        assert!((ly - ry).abs() < 1e-6, "eye line not level: {ly} vs {ry}");
        assert!(((rx - lx) - DEFAULT_EYE_DISTANCE).abs() < 1e-6);

        assert!(brightest_near(&aligned, lx, ly, 1) > 100, "left eye missing near ({lx}, {ly})");
        assert!(brightest_near(&aligned, rx, ry, 1) > 100, "right eye missing near ({rx}, {ry})");
    }
}
