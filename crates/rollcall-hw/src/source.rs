//! The frame-source seam between capture hardware and the pipeline.

use crate::camera::CameraError;
use crate::frame::Frame;

/// Anything that yields frames on demand.
///
/// Implementations block until a frame is available or the read fails. A
/// failed read is reported once; the caller decides whether to stop.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<Frame, CameraError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        (**self).read_frame()
    }
}
