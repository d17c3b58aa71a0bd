pub mod detector;
pub mod keypoint;
#[cfg(feature = "desktop")]
pub mod preprocess;

pub use detector::{decode_landmarks, PoseExtractor};
#[cfg(feature = "desktop")]
pub use detector::OnnxPoseExtractor;
pub use keypoint::{Keypoint, Landmark, Pose};
#[cfg(feature = "desktop")]
pub use preprocess::preprocess_for_landmarks;
