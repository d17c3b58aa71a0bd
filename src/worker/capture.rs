use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::events::{EventPublisher, WorkerEvent};
use super::pacing::{frame_interval, FpsMeter, FrameClock};
use crate::camera::{Frame, FrameSource};
use crate::classifier::{
    evaluate, extract_features, feature_len, Evaluation, FeatureWindow, Prediction,
    SequenceClassifier, JOINT_COUNT,
};
use crate::config::Config;
use crate::controller::{ErrorTally, RepProgress};
use crate::error::{CaptureError, StateError};
use crate::exercise::{ExerciseProfile, ExerciseRegistry};
use crate::pose::{Pose, PoseExtractor};
use crate::render::annotate;

/// 設定の FPS が使えないときのフレーム間隔 (15 fps)
const FALLBACK_FRAME_INTERVAL: Duration = Duration::from_nanos(66_666_667);

/// キャプチャスレッド内でカメラを開く
pub type SourceOpener = Box<dyn FnOnce() -> Result<Box<dyn FrameSource>, CaptureError> + Send>;

/// キャプチャスレッド内でモデルを読み込む
pub type ModelLoader = Box<dyn FnOnce() -> Result<Models, CaptureError> + Send>;

/// 姿勢推定と分類のモデル
pub struct Models {
    pub pose: Box<dyn PoseExtractor>,
    pub classifier: Box<dyn SequenceClassifier>,
}

/// ワーカーが所有するデバイスとモデルの用意の仕方
///
/// どちらもキャプチャスレッドの中で呼ばれ、UI スレッドを止めない。
pub struct WorkerParts {
    pub open_source: SourceOpener,
    pub load_models: ModelLoader,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub target_fps: f32,
    pub window_size: usize,
    pub sliding_amount: usize,
    pub warmup_frames: usize,
    pub fps_history: usize,
    pub event_capacity: usize,
    pub mirror: bool,
    pub reopen_attempts: u32,
    pub reopen_backoff: Duration,
}

impl CaptureSettings {
    pub fn from_config(config: &Config) -> Self {
        let c = &config.capture;
        Self {
            target_fps: c.target_fps,
            window_size: c.window_size,
            sliding_amount: c.sliding_amount,
            warmup_frames: c.warmup_frames,
            fps_history: c.fps_history,
            event_capacity: c.event_capacity,
            mirror: c.mirror,
            reopen_attempts: config.camera.reopen_attempts,
            reopen_backoff: Duration::from_millis(config.camera.reopen_backoff_ms),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// UI スレッドとキャプチャスレッドで共有する状態。必ずロックして触る
struct Shared {
    exercise: Arc<ExerciseProfile>,
    /// 種目変更のたびに増える。古い種目の推論結果を捨てるために使う
    generation: u64,
    window: FeatureWindow,
    frames_since_inference: usize,
    sliding_amount: usize,
    min_frame_time: Duration,
    latest: Option<Evaluation>,
    prediction: Prediction,
    /// UI がまだ受け取っていないフォームエラー。フレームイベントが捨てられても残る
    faults: ErrorTally,
}

/// カメラ読み込み・姿勢推定・分類をバックグラウンドで回すワーカー
///
/// `Idle → Running → Stopping → Stopped`。一度止めたワーカーは再開できない。
pub struct CaptureWorker {
    state: WorkerState,
    parts: Option<WorkerParts>,
    shared: Arc<Mutex<Shared>>,
    running: Arc<AtomicBool>,
    dropped_frames: Arc<AtomicU64>,
    registry: Arc<ExerciseRegistry>,
    settings: CaptureSettings,
    handle: Option<JoinHandle<()>>,
}

impl CaptureWorker {
    pub fn new(
        parts: WorkerParts,
        settings: CaptureSettings,
        registry: Arc<ExerciseRegistry>,
        exercise: Arc<ExerciseProfile>,
    ) -> Self {
        let min_frame_time = frame_interval(settings.target_fps).unwrap_or_else(|| {
            warn!("unusable target fps {}, capping at 15 fps", settings.target_fps);
            FALLBACK_FRAME_INTERVAL
        });
        let shared = Shared {
            exercise,
            generation: 0,
            window: FeatureWindow::new(settings.window_size, feature_len(registry.len())),
            frames_since_inference: 0,
            sliding_amount: settings.sliding_amount.max(1),
            min_frame_time,
            latest: None,
            prediction: Prediction::Waiting,
            faults: ErrorTally::default(),
        };

        Self {
            state: WorkerState::Idle,
            parts: Some(parts),
            shared: Arc::new(Mutex::new(shared)),
            running: Arc::new(AtomicBool::new(false)),
            dropped_frames: Arc::new(AtomicU64::new(0)),
            registry,
            settings,
            handle: None,
        }
    }

    /// キャプチャスレッドを開始し、イベントの受信側を返す
    ///
    /// モデルの読み込みとカメラのオープンはスレッド内で行う。失敗は
    /// エラーフレームと `WorkerEvent::Failed` で通知される。
    pub fn start(&mut self) -> Result<Receiver<WorkerEvent>, CaptureError> {
        if self.state != WorkerState::Idle {
            return Err(StateError::AlreadyStarted.into());
        }
        let parts = self.parts.take().ok_or(StateError::AlreadyStarted)?;

        self.shared.lock().frames_since_inference = 0;

        let (tx, rx) = mpsc::sync_channel(self.settings.event_capacity.max(1));
        self.running.store(true, Ordering::Release);

        let link = Link {
            shared: Arc::clone(&self.shared),
            running: Arc::clone(&self.running),
            publisher: EventPublisher::new(tx, Arc::clone(&self.running), Arc::clone(&self.dropped_frames)),
            settings: self.settings.clone(),
        };

        let spawned = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || link.run(parts));

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = WorkerState::Running;
                info!("capture worker started");
                Ok(rx)
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                self.state = WorkerState::Stopped;
                Err(CaptureError::Spawn(e))
            }
        }
    }

    /// 停止要求を出し、スレッドの終了を待つ
    ///
    /// 戻った時点でカメラとモデルは解放済み。
    pub fn stop(&mut self) {
        match self.state {
            WorkerState::Idle => {
                self.parts = None;
                self.state = WorkerState::Stopped;
            }
            WorkerState::Running | WorkerState::Stopping => {
                self.state = WorkerState::Stopping;
                self.running.store(false, Ordering::Release);
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        error!("capture thread panicked");
                    }
                }
                self.state = WorkerState::Stopped;
                let dropped = self.dropped_frames.load(Ordering::Relaxed);
                if dropped > 0 {
                    debug!("{} frame events were dropped", dropped);
                }
                info!("capture worker stopped");
            }
            WorkerState::Stopped => {}
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// スレッドが生きているか。カメラ障害などで自ら終了した場合は false
    pub fn is_running(&self) -> bool {
        self.state == WorkerState::Running
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 種目を切り替える。反復の途中なら拒否して何も変えない
    pub fn set_current_exercise(&self, name: &str, progress: RepProgress) -> Result<(), StateError> {
        if progress.is_mid_repetition() {
            warn!("cannot change exercise in the middle of a repetition");
            return Err(StateError::MidRepetition {
                current_rep: progress.current_rep,
                total_reps: progress.total_reps,
            });
        }
        let profile = self.registry.require(name)?;

        let mut s = self.shared.lock();
        s.exercise = profile;
        s.generation += 1;
        s.window.clear();
        s.frames_since_inference = 0;
        s.latest = None;
        s.prediction = Prediction::Waiting;
        s.faults.clear();
        info!("exercise changed to: {}", name);
        Ok(())
    }

    /// 推論間隔を変更 (1以上)
    pub fn set_sliding_amount(&self, amount: usize) -> Result<(), StateError> {
        if amount == 0 {
            return Err(StateError::InvalidSetting(
                "sliding amount must be at least 1".to_string(),
            ));
        }
        self.shared.lock().sliding_amount = amount;
        Ok(())
    }

    pub fn set_target_fps(&self, fps: f32) -> Result<(), StateError> {
        let interval = frame_interval(fps).ok_or_else(|| {
            StateError::InvalidSetting(format!(
                "target fps must be greater than 0 and not too small, got {}",
                fps
            ))
        })?;
        self.shared.lock().min_frame_time = interval;
        Ok(())
    }

    pub fn current_exercise(&self) -> Arc<ExerciseProfile> {
        Arc::clone(&self.shared.lock().exercise)
    }

    pub fn prediction(&self) -> Prediction {
        self.shared.lock().prediction.clone()
    }

    /// 前回呼んでから出たフォームエラーを受け取る
    pub fn take_faults(&self) -> ErrorTally {
        std::mem::take(&mut self.shared.lock().faults)
    }

    pub fn window_len(&self) -> usize {
        self.shared.lock().window.len()
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct InferenceJob {
    input: ndarray::Array3<f32>,
    generation: u64,
    thresholds: [f32; JOINT_COUNT],
}

/// キャプチャスレッドからワーカーへの通り道
struct Link {
    shared: Arc<Mutex<Shared>>,
    running: Arc<AtomicBool>,
    publisher: EventPublisher,
    settings: CaptureSettings,
}

impl Link {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// モデルを読み込みカメラを開いてからループに入る
    fn run(self, parts: WorkerParts) {
        let models = match (parts.load_models)() {
            Ok(models) => models,
            Err(e) => return self.abandon(e),
        };
        debug!("models loaded");
        if !self.is_running() {
            self.publisher.finished();
            return;
        }

        let source = match (parts.open_source)() {
            Ok(source) => source,
            Err(e) => return self.abandon(e),
        };

        CaptureLoop {
            link: self,
            pose: models.pose,
            classifier: models.classifier,
            pose_frames: 0,
            warmed_up: false,
        }
        .run(source);
    }

    fn abandon(self, e: CaptureError) {
        error!("{}", e);
        self.fail(&e);
        self.publisher.finished();
    }

    /// エラーフレームを表示させて失敗を通知
    fn fail(&self, e: &CaptureError) {
        self.shared.lock().prediction = Prediction::DeviceError;
        self.publisher.frame(WorkerEvent::Frame {
            frame: Frame::error_frame(&e.caption()),
            prediction: Prediction::DeviceError,
            fps: None,
        });
        self.publisher.control(WorkerEvent::Failed(e.to_string()));
    }
}

/// キャプチャスレッド本体。スレッド終了時にカメラとモデルを解放する
struct CaptureLoop {
    link: Link,
    pose: Box<dyn PoseExtractor>,
    classifier: Box<dyn SequenceClassifier>,
    pose_frames: usize,
    warmed_up: bool,
}

impl CaptureLoop {
    fn is_running(&self) -> bool {
        self.link.is_running()
    }

    fn run(mut self, mut source: Box<dyn FrameSource>) {
        let start = Instant::now();
        let mut clock = FrameClock::new(start);
        let mut fps = FpsMeter::new(self.link.settings.fps_history);
        fps.start(start);

        while self.is_running() {
            let min_frame_time = self.link.shared.lock().min_frame_time;
            let now = clock.pace(min_frame_time);
            if !self.is_running() {
                break;
            }

            let mut frame = match source.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("{}", e);
                    match self.recover(source.as_mut()) {
                        Ok(()) => continue,
                        Err(e) => {
                            error!("{}", e);
                            self.link.fail(&e);
                            break;
                        }
                    }
                }
            };
            if !self.is_running() {
                break;
            }

            let pose = match self.pose.extract(&frame) {
                Ok(pose) => pose,
                Err(e) if e.is_shutdown() => {
                    info!("pose runner stopped, leaving capture loop");
                    break;
                }
                Err(e) => {
                    warn!("pose detection error: {}", e);
                    None
                }
            };
            if !self.is_running() {
                break;
            }

            let (prediction, error_indices) = match &pose {
                Some(pose) => match self.process_pose(pose) {
                    Ok(Some(result)) => result,
                    Ok(None) => break,
                    Err(e) => {
                        info!("{}, leaving capture loop", e);
                        break;
                    }
                },
                None => (self.mark_no_person(), Vec::new()),
            };

            let mut mirrored = false;
            if self.link.settings.mirror {
                match source.mirror(&mut frame) {
                    Ok(()) => mirrored = true,
                    Err(e) => warn!("could not mirror frame: {}", e),
                }
            }
            if let Some(pose) = &pose {
                annotate(&mut frame, pose, &error_indices, mirrored);
            }

            let fps_value = fps.tick(now);
            let delivered = self.link.publisher.frame(WorkerEvent::Frame {
                frame,
                prediction,
                fps: fps_value,
            });
            if !delivered {
                debug!("event receiver dropped, leaving capture loop");
                break;
            }

            if !self.warmed_up && self.pose_frames >= self.link.settings.warmup_frames {
                self.warmed_up = true;
                debug!("collected {} pose frames", self.pose_frames);
                self.link.publisher.control(WorkerEvent::WarmedUp);
            }
        }

        drop(source);
        self.link.publisher.finished();
        info!("capture loop stopped");
    }

    /// 読み込み失敗後にカメラを開き直す。停止要求が来たら Ok で抜ける
    fn recover(&self, source: &mut dyn FrameSource) -> Result<(), CaptureError> {
        let settings = &self.link.settings;
        let mut last_error = CaptureError::CameraRead("no reopen attempted".to_string());
        for attempt in 1..=settings.reopen_attempts {
            thread::sleep(settings.reopen_backoff);
            if !self.is_running() {
                return Ok(());
            }
            match source.reopen() {
                Ok(()) => {
                    info!("camera reopened (attempt {})", attempt);
                    return Ok(());
                }
                Err(e) => {
                    warn!("could not reopen camera (attempt {}): {}", attempt, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    fn mark_no_person(&self) -> Prediction {
        let mut s = self.link.shared.lock();
        s.prediction = Prediction::NoPerson;
        Prediction::NoPerson
    }

    /// 特徴をウィンドウに積み、必要なら推論して現在の判定を返す
    ///
    /// 推論中に停止要求が来たら `Ok(None)`。推論ランナー停止以外の
    /// モデルエラーはログだけ出して続行する。
    fn process_pose(&mut self, pose: &Pose) -> Result<Option<(Prediction, Vec<usize>)>, CaptureError> {
        let job = {
            let mut s = self.link.shared.lock();
            let features = extract_features(&s.exercise.code, pose);
            match s.window.push(features) {
                Ok(()) => {
                    self.pose_frames += 1;
                    s.frames_since_inference += 1;
                }
                Err(e) => warn!("{}", e),
            }

            if s.window.is_full() && s.frames_since_inference >= s.sliding_amount {
                s.frames_since_inference = 0;
                Some(InferenceJob {
                    input: s.window.snapshot(),
                    generation: s.generation,
                    thresholds: s.exercise.thresholds,
                })
            } else {
                None
            }
        };

        // 推論中はロックを持たない
        if let Some(job) = job {
            let result = self.classifier.predict(job.input);
            if !self.is_running() {
                return Ok(None);
            }
            match result {
                Ok(probs) => {
                    if probs.len() != JOINT_COUNT {
                        warn!(
                            "classifier returned {} values, expected {}",
                            probs.len(),
                            JOINT_COUNT
                        );
                    }
                    let evaluation = evaluate(&probs, &job.thresholds);
                    let mut s = self.link.shared.lock();
                    if s.generation == job.generation {
                        s.latest = Some(evaluation);
                    } else {
                        debug!("discarding prediction made for the previous exercise");
                    }
                }
                Err(e) if e.is_shutdown() => return Err(e),
                Err(e) => warn!("classification failed: {}", e),
            }
        }

        let mut s = self.link.shared.lock();
        let (prediction, error_indices) = match &s.latest {
            Some(evaluation) => (
                Prediction::from_evaluation(evaluation),
                evaluation.error_indices.clone(),
            ),
            None => (Prediction::Waiting, Vec::new()),
        };
        if prediction.is_performer_error() {
            s.faults.add(prediction.label());
        }
        s.prediction = prediction.clone();
        Ok(Some((prediction, error_indices)))
    }
}
