pub mod blur_strength;
pub mod cascade_resolver;
pub mod constants;
pub mod frame;
pub mod region;
