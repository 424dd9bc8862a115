//! JSON shapes exchanged with the webcam page.
//!
//! Responses always carry a `success` flag; failures carry `error` and
//! nothing else.
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessFrameRequest {
    /// `data:image/...;base64,` URL (or bare base64) of one webcam frame.
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SetBlurRequest {
    /// Requested strength; any JSON value is accepted and coerced.
    #[serde(default)]
    pub blur: Option<Value>,
}

/// One line of the line-delimited request protocol.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ProcessFrame(ProcessFrameRequest),
    SetBlur(SetBlurRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProcessFrameResponse {
    Processed {
        success: bool,
        image: String,
        faces_detected: usize,
    },
    Failed(ErrorResponse),
}

impl ProcessFrameResponse {
    pub fn processed(image: String, faces_detected: usize) -> Self {
        ProcessFrameResponse::Processed {
            success: true,
            image,
            faces_detected,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        ProcessFrameResponse::Failed(ErrorResponse::new(error))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SetBlurResponse {
    pub success: bool,
    pub blur_strength: u32,
}

impl SetBlurResponse {
    pub fn new(blur_strength: u32) -> Self {
        Self {
            success: true,
            blur_strength,
        }
    }
}

/// Failure reply, also used for requests that never reached an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}
