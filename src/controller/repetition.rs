use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::state::{Phase, RepProgress, RepState};
use crate::camera::Frame;
use crate::classifier::Prediction;
use crate::config::RepetitionConfig;
use crate::error::StateError;
use crate::exercise::{ExerciseProfile, ExerciseRegistry};
use crate::guide::{GuidePlayer, GuideStatus};
use crate::session::{SessionId, SessionStore};
use crate::worker::{CaptureWorker, WorkerEvent, WorkerFactory};

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

/// エラーラベルの出現回数 (初出順)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorTally {
    counts: Vec<(String, u32)>,
}

impl ErrorTally {
    pub fn add(&mut self, label: &str) {
        match self.counts.iter_mut().find(|(l, _)| l == label) {
            Some((_, n)) => *n += 1,
            None => self.counts.push((label.to_string(), 1)),
        }
    }

    /// 最多のラベル。同数なら先に出たもの
    pub fn most_frequent(&self) -> Option<&str> {
        let mut best: Option<&(String, u32)> = None;
        for entry in &self.counts {
            if best.map_or(true, |b| entry.1 > b.1) {
                best = Some(entry);
            }
        }
        best.map(|(l, _)| l.as_str())
    }

    /// 別の集計を足し込む。初出順は self が先
    pub fn merge(&mut self, other: &ErrorTally) {
        for (label, n) in &other.counts {
            match self.counts.iter_mut().find(|(l, _)| l == label) {
                Some((_, m)) => *m += n,
                None => self.counts.push((label.clone(), *n)),
            }
        }
    }

    pub fn count(&self, label: &str) -> u32 {
        self.counts
            .iter()
            .find(|(l, _)| l == label)
            .map_or(0, |(_, n)| *n)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

/// 全反復終了時の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub exercise: String,
    pub total_reps: u32,
    pub incorrect_reps: u32,
    pub rep_errors: Vec<u32>,
    pub error_note: String,
    /// データベースに書き込めたか
    pub saved: bool,
}

/// 反復の進行とエラー集計を管理する。UI スレッドからのみ呼ぶ
pub struct RepetitionController {
    registry: Arc<ExerciseRegistry>,
    factory: Box<dyn WorkerFactory>,
    guide: Box<dyn GuidePlayer>,
    store: Box<dyn SessionStore>,
    exercise: Arc<ExerciseProfile>,
    countdown_secs: u32,

    phase: Phase,
    current_rep: u32,
    total_reps: u32,
    incorrect_reps: u32,
    rep_errors: Vec<u32>,
    has_error: bool,
    tally: ErrorTally,

    worker: Option<CaptureWorker>,
    events: Option<Receiver<WorkerEvent>>,
    session: Option<SessionId>,

    prediction: Prediction,
    latest_frame: Option<Frame>,
    fps: Option<f32>,
    notice: Option<String>,
    last_summary: Option<SessionSummary>,
}

impl RepetitionController {
    pub fn new(
        config: &RepetitionConfig,
        registry: Arc<ExerciseRegistry>,
        factory: Box<dyn WorkerFactory>,
        guide: Box<dyn GuidePlayer>,
        store: Box<dyn SessionStore>,
    ) -> Result<Self, StateError> {
        let exercise = match registry.get(&config.default_exercise) {
            Some(profile) => profile,
            None => {
                warn!("default exercise '{}' is not registered", config.default_exercise);
                let first = registry
                    .names()
                    .next()
                    .ok_or_else(|| StateError::UnknownExercise(config.default_exercise.clone()))?;
                registry.require(first)?
            }
        };

        let total_reps = if store.is_logged_in() {
            store
                .preferred_repetition_count()
                .filter(|n| *n > 0)
                .unwrap_or(config.default_total_reps)
        } else {
            config.default_total_reps
        };

        Ok(Self {
            registry,
            factory,
            guide,
            store,
            exercise,
            countdown_secs: config.countdown_secs,
            phase: Phase::NotStarted,
            current_rep: 0,
            total_reps: total_reps.max(1),
            incorrect_reps: 0,
            rep_errors: Vec::new(),
            has_error: false,
            tally: ErrorTally::default(),
            worker: None,
            events: None,
            session: None,
            prediction: Prediction::Waiting,
            latest_frame: None,
            fps: None,
            notice: None,
            last_summary: None,
        })
    }

    fn progress(&self) -> RepProgress {
        RepProgress::new(self.current_rep, self.total_reps)
    }

    fn reset_progress(&mut self) {
        self.incorrect_reps = 0;
        self.rep_errors.clear();
        self.has_error = false;
        self.tally.clear();
    }

    /// 次の反復のカウントダウンを始める
    pub fn start_exercise(&mut self, now: Instant) -> Result<(), StateError> {
        if self.phase.is_active() {
            return Err(StateError::Busy);
        }

        if self.current_rep == 0 || self.current_rep > self.total_reps {
            self.current_rep = 1;
            self.reset_progress();
            self.last_summary = None;

            if self.store.is_logged_in() && self.session.is_none() {
                match self.store.create_session() {
                    Ok(id) => self.session = Some(id),
                    Err(e) => error!("could not create session: {}", e),
                }
            }
        }

        self.notice = None;
        info!(
            "starting repetition {} of {} ({})",
            self.current_rep, self.total_reps, self.exercise.name
        );

        if self.countdown_secs == 0 {
            self.launch_capture();
        } else {
            self.phase = Phase::Countdown {
                remaining: self.countdown_secs,
                next_tick: now + COUNTDOWN_STEP,
            };
        }
        Ok(())
    }

    /// UI ループから定期的に呼ぶ
    pub fn tick(&mut self, now: Instant) {
        self.advance_countdown(now);
        self.drain_events();
        self.poll_guide();
    }

    fn advance_countdown(&mut self, now: Instant) {
        while let Phase::Countdown { remaining, next_tick } = self.phase {
            if now < next_tick {
                break;
            }
            if remaining <= 1 {
                self.launch_capture();
                break;
            }
            self.phase = Phase::Countdown {
                remaining: remaining - 1,
                next_tick: next_tick + COUNTDOWN_STEP,
            };
        }
    }

    fn launch_capture(&mut self) {
        if self.worker.as_ref().is_some_and(|w| w.is_running()) {
            warn!("{}", StateError::WorkerActive);
            self.notice = Some(StateError::WorkerActive.to_string());
            self.revert_phase();
            return;
        }
        // 終了済みのワーカーはここで確実に解放する
        self.release_worker();

        let started = self
            .factory
            .create(Arc::clone(&self.exercise))
            .and_then(|mut worker| {
                let events = worker.start()?;
                Ok((worker, events))
            });

        match started {
            Ok((worker, events)) => {
                self.worker = Some(worker);
                self.events = Some(events);
                self.prediction = Prediction::Waiting;
                self.phase = Phase::Capturing { guide_started: false };
            }
            Err(e) => {
                error!("could not start capture: {:#}", e);
                self.notice = Some(format!("Could not start camera: {}", e));
                self.cancel_repetition();
            }
        }
    }

    fn drain_events(&mut self) {
        let events: Vec<WorkerEvent> = match &self.events {
            Some(rx) => rx.try_iter().collect(),
            None => return,
        };

        for event in events {
            match event {
                WorkerEvent::Frame { frame, prediction, fps } => {
                    self.latest_frame = Some(frame);
                    if fps.is_some() {
                        self.fps = fps;
                    }
                    self.prediction = prediction;
                }
                WorkerEvent::WarmedUp => self.start_guide(),
                WorkerEvent::Failed(reason) => {
                    warn!("capture failed: {}", reason);
                    self.notice = Some(reason);
                    self.cancel_repetition();
                }
                WorkerEvent::Finished => {
                    debug!("capture worker finished");
                    self.collect_faults();
                    self.release_worker();
                }
            }
        }
        self.collect_faults();
    }

    fn start_guide(&mut self) {
        if self.phase != (Phase::Capturing { guide_started: false }) {
            return;
        }
        match self.guide.play(self.exercise.guide_video()) {
            Ok(()) => self.phase = Phase::Capturing { guide_started: true },
            Err(e) => {
                error!("{}", e);
                self.notice = Some(e.to_string());
                self.cancel_repetition();
            }
        }
    }

    fn poll_guide(&mut self) {
        let status = self.guide.poll();
        if status == GuideStatus::EndOfMedia
            && self.phase == (Phase::Capturing { guide_started: true })
        {
            self.on_guide_finished();
        }
    }

    /// ワーカーが出したフォームエラーを反復に記録する。1反復につき最大1回数える
    ///
    /// フレームイベントは UI が遅れると捨てられるので、エラーはワーカー側の
    /// 集計から受け取る。
    fn collect_faults(&mut self) {
        let faults = match &self.worker {
            Some(worker) => worker.take_faults(),
            None => return,
        };
        if faults.is_empty() {
            return;
        }
        let capturing = matches!(self.phase, Phase::Capturing { .. });
        if capturing && self.progress().is_mid_repetition() {
            self.has_error = true;
            self.tally.merge(&faults);
        }
    }

    /// ガイド動画の終了 = 反復の終了
    pub fn on_guide_finished(&mut self) {
        if !matches!(self.phase, Phase::Capturing { .. }) {
            return;
        }
        // 停止前に届いている判定もこの反復に含める
        self.drain_events();
        if !matches!(self.phase, Phase::Capturing { .. }) {
            return;
        }

        self.guide.stop();
        if let Some(worker) = self.worker.as_mut() {
            worker.stop();
        }
        self.collect_faults();
        self.release_worker();

        if self.has_error && !self.rep_errors.contains(&self.current_rep) {
            self.rep_errors.push(self.current_rep);
            self.incorrect_reps += 1;
        }
        self.has_error = false;
        info!("repetition {} of {} completed", self.current_rep, self.total_reps);

        self.current_rep += 1;
        if self.current_rep > self.total_reps {
            self.phase = Phase::AllComplete;
            self.commit();
        } else {
            self.phase = Phase::RepBoundary;
        }
    }

    pub fn error_note(&self) -> String {
        match self.tally.most_frequent() {
            Some(label) if self.incorrect_reps > 0 => format!("Major Errors in {}", label),
            _ => "None".to_string(),
        }
    }

    fn commit(&mut self) {
        let error_note = self.error_note();
        let mut summary = SessionSummary {
            exercise: self.exercise.name.clone(),
            total_reps: self.total_reps,
            incorrect_reps: self.incorrect_reps,
            rep_errors: self.rep_errors.clone(),
            error_note,
            saved: false,
        };

        if self.store.is_logged_in() {
            match self.session.take() {
                Some(session) => match self.persist(session, &summary) {
                    Ok(()) => summary.saved = true,
                    Err(e) => {
                        error!("could not save session: {:#}", e);
                        self.notice = Some(format!("Could not save session: {}", e));
                    }
                },
                None => warn!("no active session, results were not saved"),
            }
        }

        info!(
            "{}: {} of {} repetitions incorrect ({})",
            summary.exercise, summary.incorrect_reps, summary.total_reps, summary.error_note
        );
        self.last_summary = Some(summary);
    }

    fn persist(&mut self, session: SessionId, summary: &SessionSummary) -> anyhow::Result<()> {
        let exercise = self.store.exercise_id(&summary.exercise, summary.total_reps)?;
        self.store.record_exercise(
            session,
            exercise,
            summary.total_reps,
            summary.incorrect_reps,
            &summary.error_note,
        )?;
        let notes = (summary.incorrect_reps > 0).then_some(summary.error_note.as_str());
        self.store.complete_session(session, notes)?;
        Ok(())
    }

    /// 反復の途中でなければ種目を切り替える
    pub fn select_exercise(&mut self, name: &str) -> Result<(), StateError> {
        let progress = self.progress();
        if progress.is_mid_repetition() {
            return Err(StateError::MidRepetition {
                current_rep: progress.current_rep,
                total_reps: progress.total_reps,
            });
        }
        let profile = self.registry.require(name)?;
        if let Some(worker) = &self.worker {
            worker.set_current_exercise(name, progress)?;
        }

        self.exercise = profile;
        self.current_rep = 0;
        self.reset_progress();
        self.prediction = Prediction::Waiting;
        self.phase = Phase::NotStarted;
        info!("selected exercise: {}", name);
        Ok(())
    }

    pub fn set_total_reps(&mut self, total: u32) -> Result<(), StateError> {
        if total == 0 {
            return Err(StateError::InvalidSetting(
                "total repetitions must be at least 1".to_string(),
            ));
        }
        if self.phase.is_active() {
            return Err(StateError::Busy);
        }
        self.total_reps = total;
        // 完了後に増やした場合も最初からやり直す
        if self.current_rep > total || self.phase == Phase::AllComplete {
            self.current_rep = 0;
            self.phase = Phase::NotStarted;
        }
        Ok(())
    }

    /// 反復を数えずにキャプチャとガイドを止める (終了時など)
    pub fn abort(&mut self) {
        if self.phase.is_active() {
            info!("repetition {} aborted", self.current_rep);
            self.cancel_repetition();
        } else {
            self.stop_capture();
        }
    }

    fn stop_capture(&mut self) {
        self.guide.stop();
        self.release_worker();
    }

    fn release_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        self.events = None;
    }

    /// 現在の反復を数えずに開始前の状態へ戻す
    fn cancel_repetition(&mut self) {
        self.stop_capture();
        self.revert_phase();
    }

    fn revert_phase(&mut self) {
        self.has_error = false;
        if self.current_rep <= 1 {
            self.current_rep = 0;
            self.phase = Phase::NotStarted;
        } else {
            self.phase = Phase::RepBoundary;
        }
    }

    pub fn status_text(&self) -> String {
        match self.phase {
            Phase::NotStarted => self.notice.clone().unwrap_or_else(|| "Ready".to_string()),
            Phase::Countdown { remaining, .. } => format!("Starting in {}...", remaining),
            Phase::Capturing { .. } => match self.prediction {
                Prediction::Waiting => "Waiting for prediction".to_string(),
                ref p => p.label().to_string(),
            },
            Phase::RepBoundary => format!(
                "Repetition {} completed. Click Start for next repetition.",
                self.current_rep.saturating_sub(1)
            ),
            Phase::AllComplete => format!("All {} repetitions completed!", self.total_reps),
        }
    }

    /// 反復ボタン i (1始まり) の表示状態
    pub fn rep_state(&self, index: u32) -> RepState {
        if index < self.current_rep {
            RepState::Completed
        } else if index == self.current_rep {
            RepState::Current
        } else {
            RepState::Upcoming
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_rep(&self) -> u32 {
        self.current_rep
    }

    pub fn total_reps(&self) -> u32 {
        self.total_reps
    }

    pub fn incorrect_reps(&self) -> u32 {
        self.incorrect_reps
    }

    pub fn rep_errors(&self) -> &[u32] {
        &self.rep_errors
    }

    pub fn tally(&self) -> &ErrorTally {
        &self.tally
    }

    pub fn exercise(&self) -> &ExerciseProfile {
        &self.exercise
    }

    pub fn exercise_names(&self) -> Vec<String> {
        self.registry.names().map(str::to_string).collect()
    }

    pub fn prediction(&self) -> &Prediction {
        &self.prediction
    }

    pub fn latest_frame(&self) -> Option<&Frame> {
        self.latest_frame.as_ref()
    }

    pub fn guide_frame(&self) -> Option<&Frame> {
        self.guide.current_frame()
    }

    pub fn fps(&self) -> Option<f32> {
        self.fps
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn last_summary(&self) -> Option<&SessionSummary> {
        self.last_summary.as_ref()
    }

    pub fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }
}
