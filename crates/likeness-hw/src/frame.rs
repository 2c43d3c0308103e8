//! Pixel-format conversion into packed BGR, plus dark-frame detection.

use likeness_core::Frame;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid {format} length: expected {expected}, got {actual}")]
    InvalidLength {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
}

fn check_len(format: &'static str, buf: &[u8], expected: usize) -> Result<(), FrameError> {
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            format,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// BT.601 limited-range YCbCr to BGR, integer arithmetic.
#[inline]
fn ycbcr_to_bgr(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    [clamp_u8(b), clamp_u8(g), clamp_u8(r)]
}

/// Convert packed YUYV (4:2:2) to packed BGR.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share
/// the chroma pair.
pub fn yuyv_to_bgr(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    check_len("YUYV", yuyv, pixels * 2)?;

    let mut bgr = Vec::with_capacity(pixels * 3);
    for quad in yuyv[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        bgr.extend_from_slice(&ycbcr_to_bgr(y0, u, v));
        bgr.extend_from_slice(&ycbcr_to_bgr(y1, u, v));
    }
    // Odd pixel counts leave one trailing luma sample without a chroma pair.
    if pixels % 2 == 1 {
        let y = yuyv[pixels * 2 - 2];
        bgr.extend_from_slice(&ycbcr_to_bgr(y, 128, 128));
    }
    Ok(bgr)
}

/// Replicate 8-bit grayscale into three BGR channels.
pub fn grey_to_bgr(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    check_len("GREY", grey, pixels)?;
    Ok(grey[..pixels].iter().flat_map(|&g| [g, g, g]).collect())
}

/// Swap packed RGB into packed BGR.
pub fn rgb_to_bgr(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    check_len("RGB3", rgb, pixels * 3)?;
    Ok(rgb[..pixels * 3]
        .chunks_exact(3)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect())
}

/// Copy packed BGR, trimming any driver padding.
pub fn bgr_copy(bgr: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let len = (width * height * 3) as usize;
    check_len("BGR3", bgr, len)?;
    Ok(bgr[..len].to_vec())
}

/// Check whether a frame is dark.
///
/// Returns true if more than `threshold_pct` of pixels have a luma below 32.
pub fn is_dark_frame(frame: &Frame, threshold_pct: f32) -> bool {
    let pixels = (frame.width() * frame.height()) as usize;
    if pixels == 0 {
        return true;
    }
    let dark_count = frame
        .data()
        .chunks_exact(3)
        .map(|px| {
            let [r, g, b] = frame.layout().to_rgb([px[0], px[1], px[2]]);
            (77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8
        })
        .filter(|&luma| luma < 32)
        .count();
    (dark_count as f32 / pixels as f32) > threshold_pct
}

#[cfg(test)]
mod tests {
    use super::*;
    use likeness_core::ColorLayout;

    #[test]
    fn test_yuyv_neutral_grey() {
        // 2x1 image: Y=126 with neutral chroma → mid grey
        let yuyv = vec![126, 128, 126, 128];
        let bgr = yuyv_to_bgr(&yuyv, 2, 1).unwrap();
        assert_eq!(bgr.len(), 6);
        assert!(bgr.iter().all(|&c| c == 128), "got {bgr:?}");
    }

    #[test]
    fn test_yuyv_extremes_clamp() {
        let yuyv = vec![16, 128, 235, 128];
        let bgr = yuyv_to_bgr(&yuyv, 2, 1).unwrap();
        assert_eq!(&bgr[..3], &[0, 0, 0]);
        assert_eq!(&bgr[3..], &[255, 255, 255]);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        // High V pushes red up and blue stays low.
        let yuyv = vec![81, 90, 81, 240];
        let bgr = yuyv_to_bgr(&yuyv, 2, 1).unwrap();
        let (b, r) = (bgr[0], bgr[2]);
        assert!(r > 200, "red {r}");
        assert!(b < 40, "blue {b}");
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let err = yuyv_to_bgr(&[100, 128], 2, 1).unwrap_err();
        assert_eq!(
            err,
            FrameError::InvalidLength {
                format: "YUYV",
                expected: 4,
                actual: 2
            }
        );
    }

    #[test]
    fn test_grey_replicates() {
        let bgr = grey_to_bgr(&[7, 200], 2, 1).unwrap();
        assert_eq!(bgr, vec![7, 7, 7, 200, 200, 200]);
    }

    #[test]
    fn test_rgb_swaps_channels() {
        let bgr = rgb_to_bgr(&[1, 2, 3, 4, 5, 6], 2, 1).unwrap();
        assert_eq!(bgr, vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_bgr_copy_trims_padding() {
        let bgr = bgr_copy(&[1, 2, 3, 9, 9], 1, 1).unwrap();
        assert_eq!(bgr, vec![1, 2, 3]);
        assert!(bgr_copy(&[1, 2], 1, 1).is_err());
    }

    #[test]
    fn test_dark_frame_all_black() {
        let frame = Frame::filled(20, 20, ColorLayout::Bgr, [0, 0, 0]);
        assert!(is_dark_frame(&frame, 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        let frame = Frame::filled(20, 20, ColorLayout::Bgr, [128, 128, 128]);
        assert!(!is_dark_frame(&frame, 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        let frame = Frame::filled(0, 0, ColorLayout::Bgr, [0, 0, 0]);
        assert!(is_dark_frame(&frame, 0.95));
    }

    #[test]
    fn test_dark_frame_mostly_dark() {
        // 96% dark, 4% bright → dark
        let mut data = vec![10u8; 960 * 3];
        data.extend(vec![128u8; 40 * 3]);
        let frame = Frame::new(1000, 1, ColorLayout::Bgr, data).unwrap();
        assert!(is_dark_frame(&frame, 0.95));
    }

    #[test]
    fn test_dark_frame_borderline_bright() {
        // 94% dark, 6% bright → not dark
        let mut data = vec![10u8; 940 * 3];
        data.extend(vec![128u8; 60 * 3]);
        let frame = Frame::new(1000, 1, ColorLayout::Bgr, data).unwrap();
        assert!(!is_dark_frame(&frame, 0.95));
    }
}
