use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Domain interface for face detection.
///
/// One detector is built at startup and shared by every request, so
/// implementations must be stateless with respect to frames (`&self`)
/// and safe to call from several threads at once.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}
