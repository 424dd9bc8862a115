//! Face detection and blurring for individual webcam frames.
//!
//! A Haar cascade locates faces, each face rectangle is Gaussian-blurred in
//! place, and the [`service`] layer wraps that in the JSON requests a
//! browser page sends.

pub mod blurring;
pub mod detection;
pub mod pipeline;
pub mod service;
pub mod shared;
