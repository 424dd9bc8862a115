pub mod frame_codec;
pub mod frame_service;
pub mod messages;
