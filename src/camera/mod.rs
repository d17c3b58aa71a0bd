#[cfg(feature = "desktop")]
pub mod capture;
pub mod frame;

#[cfg(feature = "desktop")]
pub use capture::{flip_horizontal, frame_to_mat, mat_to_frame, OpenCvCamera};
pub use frame::{Frame, FrameSource};
