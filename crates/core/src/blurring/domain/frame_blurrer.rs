use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Domain interface for applying blur to specified regions within a frame.
///
/// Implementations modify the frame in-place (`&mut Frame`) to avoid allocation.
/// `kernel_size` is read per call because the blur strength can change
/// between frames.
pub trait FrameBlurrer: Send + Sync {
    fn blur(
        &self,
        frame: &mut Frame,
        regions: &[Region],
        kernel_size: usize,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
