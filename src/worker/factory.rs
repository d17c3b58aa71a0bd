use std::sync::Arc;

use super::capture::CaptureWorker;
use crate::exercise::ExerciseProfile;

/// 反復ごとに新しいキャプチャワーカーを作る
///
/// 前のワーカーが `stop()` でモデルとカメラを解放した後に UI スレッドから
/// 呼ばれる。重い読み込みは `WorkerParts` に包んでキャプチャスレッドに任せる。
pub trait WorkerFactory {
    fn create(&self, exercise: Arc<ExerciseProfile>) -> anyhow::Result<CaptureWorker>;
}

#[cfg(feature = "desktop")]
pub use desktop::OnnxWorkerFactory;

#[cfg(feature = "desktop")]
mod desktop {
    use anyhow::Result;
    use std::sync::Arc;
    use tracing::debug;

    use super::WorkerFactory;
    use crate::camera::{FrameSource, OpenCvCamera};
    use crate::classifier::OnnxClassifier;
    use crate::config::Config;
    use crate::error::CaptureError;
    use crate::exercise::{ExerciseProfile, ExerciseRegistry};
    use crate::pose::OnnxPoseExtractor;
    use crate::worker::capture::{
        CaptureSettings, CaptureWorker, ModelLoader, Models, SourceOpener, WorkerParts,
    };

    /// ONNX モデルと OpenCV カメラを使うワーカーを作る
    ///
    /// モデルの読み込みとカメラのオープンはどちらもキャプチャスレッドで行う。
    pub struct OnnxWorkerFactory {
        config: Config,
        registry: Arc<ExerciseRegistry>,
    }

    impl OnnxWorkerFactory {
        pub fn new(config: Config, registry: Arc<ExerciseRegistry>) -> Self {
            Self { config, registry }
        }
    }

    impl WorkerFactory for OnnxWorkerFactory {
        fn create(&self, exercise: Arc<ExerciseProfile>) -> Result<CaptureWorker> {
            let models = self.config.models.clone();
            let name = exercise.name.clone();
            let load_models: ModelLoader = Box::new(move || {
                let model_error = |e: anyhow::Error| CaptureError::Model(format!("{:#}", e));
                let pose = OnnxPoseExtractor::new(&models).map_err(model_error)?;
                let classifier = OnnxClassifier::new(&models).map_err(model_error)?;
                debug!("models loaded for {}", name);
                Ok(Models {
                    pose: Box::new(pose),
                    classifier: Box::new(classifier),
                })
            });

            let camera = self.config.camera.clone();
            let open_source: SourceOpener = Box::new(move || {
                let cam = OpenCvCamera::open(&camera)?;
                Ok(Box::new(cam) as Box<dyn FrameSource>)
            });

            Ok(CaptureWorker::new(
                WorkerParts {
                    open_source,
                    load_models,
                },
                CaptureSettings::from_config(&self.config),
                Arc::clone(&self.registry),
                exercise,
            ))
        }
    }
}
