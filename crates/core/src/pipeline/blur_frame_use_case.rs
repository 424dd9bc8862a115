use std::sync::Arc;

use crate::blurring::domain::frame_blurrer::FrameBlurrer;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::blur_strength::BlurStrength;
use crate::shared::frame::Frame;

/// Result of running one frame through [`BlurFrameUseCase`].
#[derive(Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Every detected face was blurred. `faces` may be zero.
    Blurred { frame: Frame, faces: usize },
    /// Detection or blurring failed; `frame` is the input, untouched.
    Unmodified { frame: Frame, reason: String },
}

impl FrameOutcome {
    pub fn frame(&self) -> &Frame {
        match self {
            FrameOutcome::Blurred { frame, .. } | FrameOutcome::Unmodified { frame, .. } => frame,
        }
    }

    pub fn into_frame(self) -> Frame {
        match self {
            FrameOutcome::Blurred { frame, .. } | FrameOutcome::Unmodified { frame, .. } => frame,
        }
    }

    /// Faces blurred; a failed frame counts as zero.
    pub fn face_count(&self) -> usize {
        match self {
            FrameOutcome::Blurred { faces, .. } => *faces,
            FrameOutcome::Unmodified { .. } => 0,
        }
    }
}

/// Single-frame pipeline: grayscale detect → blur each face in place.
///
/// Detector and blurrer are injected once at startup; the blur strength
/// is read once per frame so a concurrent update applies from the next
/// frame on.
pub struct BlurFrameUseCase {
    detector: Box<dyn FaceDetector>,
    blurrer: Box<dyn FrameBlurrer>,
    strength: Arc<BlurStrength>,
}

impl BlurFrameUseCase {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        blurrer: Box<dyn FrameBlurrer>,
        strength: Arc<BlurStrength>,
    ) -> Self {
        Self {
            detector,
            blurrer,
            strength,
        }
    }

    pub fn strength(&self) -> &Arc<BlurStrength> {
        &self.strength
    }

    pub fn execute(&self, mut frame: Frame) -> FrameOutcome {
        if frame.is_empty() {
            return FrameOutcome::Blurred { frame, faces: 0 };
        }

        let kernel_size = self.strength.get() as usize;
        let regions = match self.detector.detect(&frame) {
            Ok(regions) => regions,
            Err(e) => return Self::downgrade(frame, "face detection", e),
        };

        if let Err(e) = self.blurrer.blur(&mut frame, &regions, kernel_size) {
            return Self::downgrade(frame, "blurring", e);
        }

        log::debug!("Blurred {} faces (kernel {kernel_size})", regions.len());
        FrameOutcome::Blurred {
            frame,
            faces: regions.len(),
        }
    }

    fn downgrade(frame: Frame, stage: &str, e: Box<dyn std::error::Error>) -> FrameOutcome {
        let reason = format!("{stage} failed: {e}");
        log::warn!("{reason}; returning frame unmodified");
        FrameOutcome::Unmodified { frame, reason }
    }
}
