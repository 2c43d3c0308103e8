//! likeness-hw: V4L2 camera capture delivering BGR frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{is_dark_frame, FrameError};
