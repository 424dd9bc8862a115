use crate::pipeline::blur_frame_use_case::{BlurFrameUseCase, FrameOutcome};
use crate::shared::blur_strength::coerce_blur_value;

use super::frame_codec;
use super::messages::{
    ErrorResponse, ProcessFrameRequest, ProcessFrameResponse, Request, SetBlurRequest,
    SetBlurResponse,
};

/// Request-level entry points: decode → blur faces → encode, and blur
/// strength updates.
///
/// Takes `&self` everywhere so one instance can serve concurrent callers;
/// the blur strength is the only state that changes between requests.
pub struct FrameService {
    use_case: BlurFrameUseCase,
}

impl FrameService {
    pub fn new(use_case: BlurFrameUseCase) -> Self {
        Self { use_case }
    }

    pub fn blur_strength(&self) -> u32 {
        self.use_case.strength().get()
    }

    /// Codec failures become a failure response; a failed detection or blur
    /// still answers with the untouched frame and zero faces.
    pub fn process_frame(&self, request: &ProcessFrameRequest) -> ProcessFrameResponse {
        let frame = match frame_codec::decode_data_url(&request.image) {
            Ok(frame) => frame,
            Err(e) => return Self::failed(e),
        };

        let outcome = self.use_case.execute(frame);
        let faces_detected = outcome.face_count();
        if let FrameOutcome::Unmodified { reason, .. } = &outcome {
            log::debug!("Frame returned unmodified: {reason}");
        }

        match frame_codec::encode_data_url(outcome.into_frame()) {
            Ok(image) => ProcessFrameResponse::processed(image, faces_detected),
            Err(e) => Self::failed(e),
        }
    }

    pub fn set_blur(&self, request: &SetBlurRequest) -> SetBlurResponse {
        let requested = coerce_blur_value(request.blur.as_ref());
        SetBlurResponse::new(self.use_case.strength().set(requested))
    }

    /// Handle one line of the line-delimited JSON protocol and return the
    /// JSON reply (without a trailing newline).
    pub fn handle_line(&self, line: &str) -> String {
        let reply = match serde_json::from_str::<Request>(line) {
            Ok(Request::ProcessFrame(req)) => serde_json::to_string(&self.process_frame(&req)),
            Ok(Request::SetBlur(req)) => serde_json::to_string(&self.set_blur(&req)),
            Err(e) => {
                log::warn!("Rejected request: {e}");
                serde_json::to_string(&ErrorResponse::new(format!("invalid request: {e}")))
            }
        };
        reply.unwrap_or_else(|e| {
            format!(r#"{{"success":false,"error":"cannot serialize response: {e}"}}"#)
        })
    }

    fn failed(e: frame_codec::FrameCodecError) -> ProcessFrameResponse {
        log::warn!("Error processing frame: {e}");
        ProcessFrameResponse::failed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blurring::infrastructure::cpu_rectangular_blurrer::CpuRectangularBlurrer;
    use crate::detection::domain::face_detector::FaceDetector;
    use crate::service::frame_codec::tests::png_data_url;
    use crate::shared::blur_strength::BlurStrength;
    use crate::shared::frame::Frame;
    use crate::shared::region::Region;
    use image::{Rgb, RgbImage};
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct StubDetector {
        regions: Vec<Region>,
    }

    impl FaceDetector for StubDetector {
        fn detect(&self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            Ok(self.regions.clone())
        }
    }

    fn service(regions: Vec<Region>) -> FrameService {
        FrameService::new(BlurFrameUseCase::new(
            Box::new(StubDetector { regions }),
            Box::new(CpuRectangularBlurrer::new()),
            Arc::new(BlurStrength::default()),
        ))
    }

    fn checkerboard(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgb([250, 250, 250])
            } else {
                Rgb([5, 5, 5])
            }
        })
    }

    #[test]
    fn test_process_frame_reports_faces_and_preserves_size() {
        let svc = service(vec![Region::new(8, 8, 16, 16)]);
        let req = ProcessFrameRequest {
            image: png_data_url(&checkerboard(40, 32)),
        };

        match svc.process_frame(&req) {
            ProcessFrameResponse::Processed {
                image,
                faces_detected,
                ..
            } => {
                assert_eq!(faces_detected, 1);
                let frame = frame_codec::decode_data_url(&image).unwrap();
                assert_eq!((frame.width(), frame.height()), (40, 32));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_process_frame_without_faces() {
        let svc = service(vec![]);
        let req = ProcessFrameRequest {
            image: png_data_url(&RgbImage::from_pixel(10, 10, Rgb([50, 60, 70]))),
        };
        assert!(matches!(
            svc.process_frame(&req),
            ProcessFrameResponse::Processed {
                faces_detected: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_undecodable_frame_is_a_failure_response() {
        let svc = service(vec![]);
        for image in ["", "data:image/jpeg;base64,", "data:image/jpeg;base64,Zm9vYmFy"] {
            match svc.process_frame(&ProcessFrameRequest {
                image: image.to_string(),
            }) {
                ProcessFrameResponse::Failed(resp) => {
                    assert!(!resp.success);
                    assert!(!resp.error.is_empty());
                }
                other => panic!("expected failure for {image:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_blur_failure_still_answers_with_zero_faces() {
        // Region outside the frame makes the blurrer refuse.
        let svc = service(vec![Region::new(100, 100, 10, 10)]);
        let req = ProcessFrameRequest {
            image: png_data_url(&checkerboard(20, 20)),
        };
        assert!(matches!(
            svc.process_frame(&req),
            ProcessFrameResponse::Processed {
                faces_detected: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_set_blur_normalizes_and_applies() {
        let svc = service(vec![]);
        let resp = svc.set_blur(&SetBlurRequest {
            blur: Some(json!(52)),
        });
        assert_eq!(resp.blur_strength, 51);
        assert_eq!(svc.blur_strength(), 51);

        let resp = svc.set_blur(&SetBlurRequest::default());
        assert_eq!(resp.blur_strength, 15);
    }

    #[test]
    fn test_handle_line_set_blur() {
        let svc = service(vec![]);
        let reply: Value = serde_json::from_str(&svc.handle_line(r#"{"op":"set_blur","blur":"8"}"#)).unwrap();
        assert_eq!(reply, json!({"success": true, "blur_strength": 9}));
    }

    #[test]
    fn test_handle_line_process_frame() {
        let svc = service(vec![]);
        let line = json!({"op": "process_frame", "image": png_data_url(&checkerboard(8, 8))}).to_string();
        let reply: Value = serde_json::from_str(&svc.handle_line(&line)).unwrap();
        assert_eq!(reply["success"], json!(true));
        assert_eq!(reply["faces_detected"], json!(0));
        assert!(reply["image"].as_str().unwrap().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_handle_line_garbage_is_failure() {
        let svc = service(vec![]);
        let reply: Value = serde_json::from_str(&svc.handle_line("{not json")).unwrap();
        assert_eq!(reply["success"], json!(false));
        assert!(!reply["error"].as_str().unwrap().is_empty());
    }
}
