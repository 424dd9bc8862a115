pub mod cascade_face_detector;
pub mod haar_cascade;
pub mod integral_image;
mod math;
pub mod region_grouper;
