//! Error types shared across the capture pipeline.
//!
//! Device / model / state-transition / persistence errors are kept apart
//! because each is handled differently: device errors are retried locally,
//! model shutdown ends the capture loop cleanly, state errors leave the
//! previous state untouched, persistence errors never abort the exercise.

use thiserror::Error;

/// キャプチャスレッド内で発生するエラー
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera {index} could not be opened: {reason}")]
    CameraOpen { index: i32, reason: String },

    #[error("failed to read frame: {0}")]
    CameraRead(String),

    #[error("model error: {0}")]
    Model(String),

    /// 推論ランナーが停止済み。ループを正常終了させるシグナルとして扱う
    #[error("inference runner is not running")]
    RunnerShutdown,

    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    State(#[from] StateError),
}

impl CaptureError {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, CaptureError::RunnerShutdown)
    }

    /// エラーフレームに描く短い見出し
    pub fn caption(&self) -> String {
        match self {
            CaptureError::CameraOpen { index, .. } => format!("Camera {} Failed", index),
            CaptureError::CameraRead(_) => "Camera Failed".to_string(),
            CaptureError::Model(_) => "Model Failed".to_string(),
            _ => "Capture Failed".to_string(),
        }
    }
}

/// 状態遷移の拒否。呼び出し側は元の状態を維持する
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("cannot change exercise during repetition {current_rep} of {total_reps}")]
    MidRepetition { current_rep: u32, total_reps: u32 },

    #[error("unknown exercise '{0}'")]
    UnknownExercise(String),

    #[error("a capture worker is already running")]
    WorkerActive,

    #[error("capture worker was already started")]
    AlreadyStarted,

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("an exercise repetition is already in progress")]
    Busy,
}

/// セッション永続化のエラー
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("no active session")]
    NoActiveSession,

    #[error("no user is logged in")]
    NotLoggedIn,
}

/// ガイド動画再生のエラー
#[derive(Debug, Error)]
pub enum GuideError {
    #[error("guide video not found: {0}")]
    MissingFile(String),

    #[error("failed to open guide video: {0}")]
    Open(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    #[error("feature vector has length {actual}, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}
