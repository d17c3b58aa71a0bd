//! Sequence classifier over one feature window.

use ndarray::Array3;

use crate::error::CaptureError;

/// `[1, W, F]` の特徴ウィンドウから関節ごとのエラー確率 (6値) を返す
///
/// `CaptureError::RunnerShutdown` を返すとキャプチャループは正常終了する。
/// `OnnxClassifier` はプロセス内のセッションなので返さない。
pub trait SequenceClassifier: Send {
    fn predict(&mut self, window: Array3<f32>) -> Result<Vec<f32>, CaptureError>;
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;

#[cfg(feature = "onnx")]
mod onnx {
    use anyhow::{Context, Result};
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;

    use super::*;
    use crate::config::ModelConfig;

    /// 学習済み LSTM モデル (ONNX 変換済み)
    pub struct OnnxClassifier {
        session: Session,
        input_name: String,
        output_name: String,
    }

    impl OnnxClassifier {
        pub fn new(config: &ModelConfig) -> Result<Self> {
            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(&config.classifier_model)
                .with_context(|| {
                    format!("Failed to load classifier model {}", config.classifier_model)
                })?;

            Ok(Self {
                session,
                input_name: config.classifier_input_name.clone(),
                output_name: config.classifier_output_name.clone(),
            })
        }

        fn run(&mut self, window: Array3<f32>) -> Result<Vec<f32>> {
            let input_tensor = Tensor::from_array(window)?;
            let outputs = self
                .session
                .run(ort::inputs![self.input_name.as_str() => input_tensor])
                .context("Inference failed")?;

            let probs: ndarray::ArrayViewD<f32> = outputs[self.output_name.as_str()]
                .try_extract_array()
                .context("Failed to extract output tensor")?;
            Ok(probs.iter().copied().collect())
        }
    }

    impl SequenceClassifier for OnnxClassifier {
        fn predict(&mut self, window: Array3<f32>) -> Result<Vec<f32>, CaptureError> {
            self.run(window)
                .map_err(|e| CaptureError::Model(format!("{:#}", e)))
        }
    }
}
