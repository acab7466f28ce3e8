//! rollcall-hw — camera capture.
//!
//! V4L2 access through the `v4l` crate, converted to grayscale frames and
//! exposed to the pipeline through [`FrameSource`].

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
pub use source::FrameSource;
