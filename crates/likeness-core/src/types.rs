use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A 2D point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Midpoint between `self` and `other`.
    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Channel order of a 3-byte-per-pixel interleaved buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorLayout {
    /// Blue, green, red: the native order of most capture pipelines.
    Bgr,
    /// Red, green, blue.
    Rgb,
}

impl ColorLayout {
    pub const CHANNELS: usize = 3;

    /// Reorder a pixel in this layout into RGB order.
    #[inline]
    pub fn to_rgb(self, px: [u8; 3]) -> [u8; 3] {
        match self {
            ColorLayout::Bgr => [px[2], px[1], px[0]],
            ColorLayout::Rgb => px,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame buffer size mismatch: {width}x{height} needs {expected} bytes, got {actual}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// An immutable, tightly packed, 3-channel camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    layout: ColorLayout,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a pixel buffer. The buffer must hold exactly `width * height * 3` bytes.
    pub fn new(width: u32, height: u32, layout: ColorLayout, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * ColorLayout::CHANNELS;
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    /// Wrap a buffer already known to match the dimensions.
    pub(crate) fn from_raw(width: u32, height: u32, layout: ColorLayout, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * ColorLayout::CHANNELS);
        Self {
            width,
            height,
            layout,
            data,
        }
    }

    /// A frame filled with a single pixel value.
    pub fn filled(width: u32, height: u32, layout: ColorLayout, px: [u8; 3]) -> Self {
        let data = px
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * ColorLayout::CHANNELS)
            .collect();
        Self {
            width,
            height,
            layout,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> ColorLayout {
        self.layout
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at (x, y) in the frame's own layout. Panics when out of bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * ColorLayout::CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Copy into an RGB image, reordering channels as needed.
    pub fn to_rgb_image(&self) -> RgbImage {
        let layout = self.layout;
        let bytes = self
            .data
            .chunks_exact(ColorLayout::CHANNELS)
            .flat_map(|px| layout.to_rgb([px[0], px[1], px[2]]))
            .collect();
        RgbImage::from_raw(self.width, self.height, bytes)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    /// Wrap a decoded RGB image.
    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::from_raw(width, height, ColorLayout::Rgb, image.into_raw())
    }
}

/// Named facial landmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Landmark {
    LeftEye,
    RightEye,
    NoseTip,
    MouthLeft,
    MouthRight,
}

impl Landmark {
    /// Order of the five-point landmark convention used by SCRFD/RetinaFace.
    pub const FIVE_POINT: [Landmark; 5] = [
        Landmark::LeftEye,
        Landmark::RightEye,
        Landmark::NoseTip,
        Landmark::MouthLeft,
        Landmark::MouthRight,
    ];
}

/// Named landmark points for one detected face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    points: BTreeMap<Landmark, Point>,
}

impl LandmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a five-point array in [`Landmark::FIVE_POINT`] order.
    pub fn from_five_point(points: [(f32, f32); 5]) -> Self {
        let points = Landmark::FIVE_POINT
            .iter()
            .zip(points)
            .map(|(&name, (x, y))| (name, Point::new(x, y)))
            .collect();
        Self { points }
    }

    pub fn with(mut self, name: Landmark, point: Point) -> Self {
        self.insert(name, point);
        self
    }

    pub fn insert(&mut self, name: Landmark, point: Point) {
        self.points.insert(name, point);
    }

    pub fn get(&self, name: Landmark) -> Option<Point> {
        self.points.get(&name).copied()
    }

    /// Left and right eye centres, if both are present.
    pub fn eyes(&self) -> Option<(Point, Point)> {
        Some((self.get(Landmark::LeftEye)?, self.get(Landmark::RightEye)?))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Axis-aligned face bounds in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// One face reported by a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bounds: BoundingBox,
    pub landmarks: LandmarkSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_wrong_buffer_size() {
        let err = Frame::new(4, 4, ColorLayout::Bgr, vec![0u8; 47]).unwrap_err();
        assert_eq!(
            err,
            FrameError::BufferSize {
                width: 4,
                height: 4,
                expected: 48,
                actual: 47
            }
        );
    }

    #[test]
    fn test_frame_pixel_access() {
        let mut data = vec![0u8; 2 * 2 * 3];
        // pixel (1, 1)
        data[9..12].copy_from_slice(&[10, 20, 30]);
        let frame = Frame::new(2, 2, ColorLayout::Bgr, data).unwrap();
        assert_eq!(frame.pixel(1, 1), [10, 20, 30]);
        assert_eq!(frame.pixel(0, 0), [0, 0, 0]);
    }

    #[test]
    fn test_bgr_to_rgb_swaps_outer_channels() {
        assert_eq!(ColorLayout::Bgr.to_rgb([1, 2, 3]), [3, 2, 1]);
        assert_eq!(ColorLayout::Rgb.to_rgb([1, 2, 3]), [1, 2, 3]);
    }

    #[test]
    fn test_rgb_image_conversion() {
        let frame = Frame::filled(3, 2, ColorLayout::Bgr, [1, 2, 3]);
        let image = frame.to_rgb_image();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 1).0, [3, 2, 1]);

        let back = Frame::from_rgb_image(image);
        assert_eq!(back.layout(), ColorLayout::Rgb);
        assert_eq!(back.pixel(0, 0), [3, 2, 1]);
    }

    #[test]
    fn test_five_point_landmarks() {
        let set = LandmarkSet::from_five_point([
            (1.0, 2.0),
            (3.0, 4.0),
            (5.0, 6.0),
            (7.0, 8.0),
            (9.0, 10.0),
        ]);
        assert_eq!(set.len(), 5);
        assert_eq!(set.get(Landmark::RightEye), Some(Point::new(3.0, 4.0)));
        assert_eq!(set.get(Landmark::MouthRight), Some(Point::new(9.0, 10.0)));
        assert_eq!(
            set.eyes(),
            Some((Point::new(1.0, 2.0), Point::new(3.0, 4.0)))
        );
    }

    #[test]
    fn test_eyes_requires_both() {
        let set = LandmarkSet::new().with(Landmark::LeftEye, Point::new(1.0, 1.0));
        assert!(set.eyes().is_none());
    }
}
