pub mod camera;
pub mod config;
pub mod frame;

pub use camera::{DistortionCoeffs, IntrinsicCameraParams};
pub use frame::{Frame, FrameError};
