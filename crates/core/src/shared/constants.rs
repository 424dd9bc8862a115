pub const CASCADE_NAME: &str = "haarcascade_frontalface_default.xml";
pub const CASCADE_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml";

/// Step between successive pyramid scales.
pub const SCALE_FACTOR: f64 = 1.1;

/// A raw detection cluster needs more than this many members to be kept.
pub const MIN_NEIGHBORS: usize = 5;

/// Smallest face, in pixels, the detector will report (both dimensions).
pub const MIN_FACE_SIZE: u32 = 30;

/// Relative tolerance used when clustering raw detections.
pub const GROUP_EPS: f64 = 0.2;

pub const DEFAULT_BLUR_STRENGTH: u32 = 15;
pub const MIN_BLUR_STRENGTH: u32 = 1;
pub const MAX_BLUR_STRENGTH: u32 = 51;

pub const JPEG_QUALITY: u8 = 85;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];
