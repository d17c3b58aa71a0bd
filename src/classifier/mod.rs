//! Classifier module - per-joint form-error classification
//!
//! Feature extraction, the sliding window, the model seam and the rule table
//! that turns per-joint flags into a label.

pub mod features;
pub mod interpret;
pub mod model;
pub mod window;

pub use features::{extract_features, feature_len, KEYPOINTS_OF_INTEREST};
pub use interpret::{evaluate, interpret, ErrorVector, Evaluation, Joint, Prediction, JOINT_COUNT};
#[cfg(feature = "onnx")]
pub use model::OnnxClassifier;
pub use model::SequenceClassifier;
pub use window::FeatureWindow;
