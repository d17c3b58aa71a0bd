//! カメラ・モデルを使わないテスト用の部品

use ndarray::Array3;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::capture::{CaptureSettings, CaptureWorker, Models, WorkerParts};
use super::events::WorkerEvent;
use super::factory::WorkerFactory;
use crate::camera::{Frame, FrameSource};
use crate::classifier::{SequenceClassifier, JOINT_COUNT};
use crate::error::CaptureError;
use crate::exercise::{ExerciseProfile, ExerciseRegistry};
use crate::pose::{Keypoint, Landmark, Pose, PoseExtractor};

const WAIT_LIMIT: Duration = Duration::from_secs(5);

pub fn fast_settings(window_size: usize, sliding_amount: usize) -> CaptureSettings {
    CaptureSettings {
        target_fps: 1000.0,
        window_size,
        sliding_amount,
        warmup_frames: 10,
        fps_history: 30,
        event_capacity: 1024,
        mirror: true,
        reopen_attempts: 3,
        reopen_backoff: Duration::from_millis(1),
    }
}

pub fn sample_pose() -> Pose {
    let mut pose = Pose::default();
    let points = [
        (Landmark::LeftShoulder, 0.6, 0.3),
        (Landmark::RightShoulder, 0.4, 0.3),
        (Landmark::LeftElbow, 0.7, 0.5),
        (Landmark::RightElbow, 0.3, 0.5),
        (Landmark::LeftWrist, 0.7, 0.7),
        (Landmark::RightWrist, 0.3, 0.7),
        (Landmark::LeftHip, 0.55, 0.8),
        (Landmark::RightHip, 0.45, 0.8),
    ];
    for (landmark, x, y) in points {
        pose.keypoints[landmark.index()] = Keypoint::new(x, y, 0.0, 1.0);
    }
    pose
}

pub fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Finished が来るまでのイベントをすべて集める
pub fn collect_until_finished(rx: &Receiver<WorkerEvent>) -> Vec<WorkerEvent> {
    let mut events = Vec::new();
    loop {
        let event = rx
            .recv_timeout(WAIT_LIMIT)
            .expect("worker did not finish in time");
        let finished = matches!(event, WorkerEvent::Finished);
        events.push(event);
        if finished {
            return events;
        }
    }
}

/// 姿勢推定の呼び出し回数と、推論が走った時点の回数を記録する
#[derive(Clone, Default)]
pub struct FakeScript {
    extract_calls: Arc<AtomicUsize>,
    inferences: Arc<Mutex<Vec<usize>>>,
}

impl FakeScript {
    /// `person(n)` は n 回目 (1始まり) の姿勢推定で人物を返すか
    pub fn models(&self, person: impl Fn(usize) -> bool + Send + 'static, probs: Vec<f32>) -> Models {
        Models {
            pose: Box::new(ScriptedPose {
                calls: Arc::clone(&self.extract_calls),
                person: Box::new(person),
            }),
            classifier: Box::new(FixedClassifier {
                probs,
                extract_calls: Arc::clone(&self.extract_calls),
                inferences: Arc::clone(&self.inferences),
            }),
        }
    }

    pub fn parts(&self, person: impl Fn(usize) -> bool + Send + 'static, probs: Vec<f32>) -> WorkerParts {
        parts_from(self.models(person, probs))
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    pub fn inference_frames(&self) -> Vec<usize> {
        self.inferences.lock().clone()
    }
}

/// 読み込み済みのモデルと StillSource を使う
pub fn parts_from(models: Models) -> WorkerParts {
    WorkerParts {
        open_source: Box::new(|| Ok(Box::new(StillSource) as Box<dyn FrameSource>)),
        load_models: Box::new(move || Ok(models)),
    }
}

pub struct StillSource;

impl FrameSource for StillSource {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        Ok(Frame::filled(32, 24, [40, 40, 40]))
    }

    fn reopen(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn mirror(&mut self, _frame: &mut Frame) -> Result<(), CaptureError> {
        Ok(())
    }
}

/// `fail_after` 回読んだ後は読み込みも開き直しも失敗する
pub struct BrokenSource {
    pub fail_after: usize,
    pub reads: usize,
    pub reopens: Arc<AtomicUsize>,
}

impl FrameSource for BrokenSource {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        self.reads += 1;
        if self.reads > self.fail_after {
            return Err(CaptureError::CameraRead("unplugged".to_string()));
        }
        Ok(Frame::filled(32, 24, [40, 40, 40]))
    }

    fn reopen(&mut self) -> Result<(), CaptureError> {
        self.reopens.fetch_add(1, Ordering::SeqCst);
        Err(CaptureError::CameraOpen {
            index: 0,
            reason: "unplugged".to_string(),
        })
    }

    fn mirror(&mut self, _frame: &mut Frame) -> Result<(), CaptureError> {
        Ok(())
    }
}

struct ScriptedPose {
    calls: Arc<AtomicUsize>,
    person: Box<dyn Fn(usize) -> bool + Send>,
}

impl PoseExtractor for ScriptedPose {
    fn extract(&mut self, _frame: &Frame) -> Result<Option<Pose>, CaptureError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok((self.person)(n).then(sample_pose))
    }
}

pub struct ShutdownPose;

impl PoseExtractor for ShutdownPose {
    fn extract(&mut self, _frame: &Frame) -> Result<Option<Pose>, CaptureError> {
        Err(CaptureError::RunnerShutdown)
    }
}

struct FixedClassifier {
    probs: Vec<f32>,
    extract_calls: Arc<AtomicUsize>,
    inferences: Arc<Mutex<Vec<usize>>>,
}

impl SequenceClassifier for FixedClassifier {
    fn predict(&mut self, _window: Array3<f32>) -> Result<Vec<f32>, CaptureError> {
        self.inferences
            .lock()
            .push(self.extract_calls.load(Ordering::SeqCst));
        Ok(self.probs.clone())
    }
}

/// 推論に時間がかかる分類器。呼ばれたら `entered` を立てる
pub struct SlowClassifier {
    pub entered: Arc<AtomicBool>,
    pub delay: Duration,
    pub probs: Vec<f32>,
}

impl SequenceClassifier for SlowClassifier {
    fn predict(&mut self, _window: Array3<f32>) -> Result<Vec<f32>, CaptureError> {
        self.entered.store(true, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(self.probs.clone())
    }
}

/// 同時に1つしか読み込めないモデル。drop で解放される
pub struct ExclusiveModel {
    held: Arc<AtomicBool>,
}

impl ExclusiveModel {
    pub fn load(held: &Arc<AtomicBool>) -> Option<Self> {
        held.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self {
                held: Arc::clone(held),
            })
    }
}

impl SequenceClassifier for ExclusiveModel {
    fn predict(&mut self, _window: Array3<f32>) -> Result<Vec<f32>, CaptureError> {
        Ok(vec![0.0; JOINT_COUNT])
    }
}

impl Drop for ExclusiveModel {
    fn drop(&mut self) {
        self.held.store(false, Ordering::SeqCst);
    }
}

/// 共有の確率を返すワーカーを作るファクトリ
pub struct FakeWorkerFactory {
    pub registry: Arc<ExerciseRegistry>,
    pub probs: Arc<Mutex<Vec<f32>>>,
    /// 反復の途中でも切り替えられる
    pub person: Arc<AtomicBool>,
    /// `create` 自体が失敗する
    pub fail: bool,
    /// スレッド内のモデル読み込みが失敗する
    pub fail_models: bool,
    pub created: Arc<AtomicUsize>,
    pub settings: CaptureSettings,
}

impl FakeWorkerFactory {
    pub fn new(registry: Arc<ExerciseRegistry>) -> Self {
        let mut settings = fast_settings(2, 1);
        settings.warmup_frames = 2;
        Self {
            registry,
            probs: Arc::new(Mutex::new(vec![0.0; JOINT_COUNT])),
            person: Arc::new(AtomicBool::new(true)),
            fail: false,
            fail_models: false,
            created: Arc::new(AtomicUsize::new(0)),
            settings,
        }
    }
}

/// 確率を共有し、テスト中に差し替えられる分類器
struct SharedClassifier {
    probs: Arc<Mutex<Vec<f32>>>,
}

impl SequenceClassifier for SharedClassifier {
    fn predict(&mut self, _window: Array3<f32>) -> Result<Vec<f32>, CaptureError> {
        Ok(self.probs.lock().clone())
    }
}

impl WorkerFactory for FakeWorkerFactory {
    fn create(&self, exercise: Arc<ExerciseProfile>) -> anyhow::Result<CaptureWorker> {
        if self.fail {
            anyhow::bail!("worker could not be created");
        }
        self.created.fetch_add(1, Ordering::SeqCst);

        let person = Arc::clone(&self.person);
        let probs = Arc::clone(&self.probs);
        let fail_models = self.fail_models;
        let parts = WorkerParts {
            open_source: Box::new(|| Ok(Box::new(StillSource) as Box<dyn FrameSource>)),
            load_models: Box::new(move || {
                if fail_models {
                    return Err(CaptureError::Model("model file missing".to_string()));
                }
                Ok(Models {
                    pose: Box::new(ScriptedPose {
                        calls: Arc::new(AtomicUsize::new(0)),
                        person: Box::new(move |_| person.load(Ordering::SeqCst)),
                    }),
                    classifier: Box::new(SharedClassifier { probs }),
                })
            }),
        };
        Ok(CaptureWorker::new(
            parts,
            self.settings.clone(),
            Arc::clone(&self.registry),
            exercise,
        ))
    }
}
