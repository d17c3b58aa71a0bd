use crate::camera::Frame;
use crate::error::CaptureError;

use super::keypoint::{Keypoint, Landmark, Pose};

/// ランドマーク1点あたりの出力値 (x, y, z, visibility, presence)
pub const LANDMARK_STRIDE: usize = 5;

/// 1フレームから姿勢を推定する
///
/// 人物が見つからなければ `Ok(None)`。外部の推論ランナーに依存する実装は、
/// ランナーが停止済みなら `CaptureError::RunnerShutdown` を返す。
/// セッションをプロセス内に持つ `OnnxPoseExtractor` は停止状態を持たないので、
/// 失敗はすべて `CaptureError::Model` になる。
pub trait PoseExtractor: Send {
    fn extract(&mut self, frame: &Frame) -> Result<Option<Pose>, CaptureError>;
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// ランドマークモデルの生出力を Pose に変換
///
/// `raw` は入力画像ピクセル単位の [x, y, z, visibility, presence] * N。
/// 先頭 33 点のみ使う。
pub fn decode_landmarks(raw: &[f32], input_size: usize) -> Option<Pose> {
    if raw.len() < Landmark::COUNT * LANDMARK_STRIDE || input_size == 0 {
        return None;
    }
    let scale = input_size as f32;

    let mut keypoints = [Keypoint::default(); Landmark::COUNT];
    for (i, kp) in keypoints.iter_mut().enumerate() {
        let v = &raw[i * LANDMARK_STRIDE..(i + 1) * LANDMARK_STRIDE];
        *kp = Keypoint::new(v[0] / scale, v[1] / scale, v[2] / scale, sigmoid(v[3]));
    }

    Some(Pose::new(keypoints))
}

#[cfg(feature = "desktop")]
pub use onnx::OnnxPoseExtractor;

#[cfg(feature = "desktop")]
mod onnx {
    use anyhow::{Context, Result};
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;

    use super::*;
    use crate::config::ModelConfig;
    use crate::pose::preprocess::preprocess_for_landmarks;

    /// BlazePose ランドマークモデルによる姿勢推定
    pub struct OnnxPoseExtractor {
        session: Session,
        input_size: usize,
        input_name: String,
        landmarks_output: String,
        presence_output: String,
        presence_threshold: f32,
    }

    impl OnnxPoseExtractor {
        /// ONNXモデルを読み込んで初期化
        pub fn new(config: &ModelConfig) -> Result<Self> {
            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(&config.pose_model)
                .with_context(|| format!("Failed to load pose model {}", config.pose_model))?;

            Ok(Self {
                session,
                input_size: config.pose_input_size,
                input_name: config.pose_input_name.clone(),
                landmarks_output: config.pose_landmarks_output.clone(),
                presence_output: config.pose_presence_output.clone(),
                presence_threshold: config.presence_threshold,
            })
        }

        fn run(&mut self, frame: &Frame) -> Result<(Vec<f32>, f32)> {
            let input = preprocess_for_landmarks(frame, self.input_size)?;
            let input_tensor = Tensor::from_array(input)?;
            let outputs = self
                .session
                .run(ort::inputs![self.input_name.as_str() => input_tensor])
                .context("Inference failed")?;

            let landmarks: ndarray::ArrayViewD<f32> = outputs[self.landmarks_output.as_str()]
                .try_extract_array()
                .context("Failed to extract landmarks tensor")?;
            let presence: ndarray::ArrayViewD<f32> = outputs[self.presence_output.as_str()]
                .try_extract_array()
                .context("Failed to extract presence tensor")?;

            let score = presence.iter().copied().next().unwrap_or(0.0);
            Ok((landmarks.iter().copied().collect(), score))
        }
    }

    impl PoseExtractor for OnnxPoseExtractor {
        fn extract(&mut self, frame: &Frame) -> Result<Option<Pose>, CaptureError> {
            let (raw, presence) = self
                .run(frame)
                .map_err(|e| CaptureError::Model(format!("{:#}", e)))?;

            if presence < self.presence_threshold {
                return Ok(None);
            }
            Ok(decode_landmarks(&raw, self.input_size))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_too_short() {
        assert!(decode_landmarks(&[0.0; 10], 256).is_none());
    }

    #[test]
    fn test_decode_scales_to_unit() {
        // BlazePose full は 39 点出力する
        let mut raw = vec![0.0; 39 * LANDMARK_STRIDE];
        let i = Landmark::RightWrist.index() * LANDMARK_STRIDE;
        raw[i] = 128.0;
        raw[i + 1] = 64.0;
        raw[i + 2] = -32.0;
        raw[i + 3] = 0.0;

        let pose = decode_landmarks(&raw, 256).unwrap();
        let wrist = pose.get(Landmark::RightWrist);
        assert!((wrist.x - 0.5).abs() < 1e-6);
        assert!((wrist.y - 0.25).abs() < 1e-6);
        assert!((wrist.z + 0.125).abs() < 1e-6);
        assert!((wrist.visibility - 0.5).abs() < 1e-6);
    }
}
