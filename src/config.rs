use anyhow::{bail, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::exercise::ExerciseConfig;
use crate::worker::pacing::frame_interval;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub repetition: RepetitionConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// 空なら標準の3種目を使う
    #[serde(default)]
    pub exercises: Vec<ExerciseConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// カメラインデックス
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// 読み込み失敗時の再オープン試行回数
    #[serde(default = "default_reopen_attempts")]
    pub reopen_attempts: u32,
    /// 再オープン前の待ち時間（ミリ秒）
    #[serde(default = "default_reopen_backoff_ms")]
    pub reopen_backoff_ms: u64,
}

fn default_reopen_attempts() -> u32 { 3 }
fn default_reopen_backoff_ms() -> u64 { 500 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: None,
            height: None,
            reopen_attempts: default_reopen_attempts(),
            reopen_backoff_ms: default_reopen_backoff_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    /// 上限フレームレート
    #[serde(default = "default_target_fps")]
    pub target_fps: f32,
    /// 推論に使うフレーム数 (W)
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// 推論間隔（フレーム数）
    #[serde(default = "default_sliding_amount")]
    pub sliding_amount: usize,
    /// ガイド動画を開始するまでに必要な姿勢フレーム数
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: usize,
    /// FPS計算に使うフレーム間隔の履歴長
    #[serde(default = "default_fps_history")]
    pub fps_history: usize,
    /// UIスレッドへのイベントキュー長
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// 表示用に左右反転する
    #[serde(default = "default_mirror")]
    pub mirror: bool,
}

fn default_target_fps() -> f32 { 15.0 }
fn default_window_size() -> usize { 10 }
fn default_sliding_amount() -> usize { 10 }
fn default_warmup_frames() -> usize { 10 }
fn default_fps_history() -> usize { 30 }
fn default_event_capacity() -> usize { 8 }
fn default_mirror() -> bool { true }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            window_size: default_window_size(),
            sliding_amount: default_sliding_amount(),
            warmup_frames: default_warmup_frames(),
            fps_history: default_fps_history(),
            event_capacity: default_event_capacity(),
            mirror: default_mirror(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// BlazePose ランドマークモデル (ONNX)
    #[serde(default = "default_pose_model")]
    pub pose_model: String,
    #[serde(default = "default_pose_input_size")]
    pub pose_input_size: usize,
    #[serde(default = "default_pose_input_name")]
    pub pose_input_name: String,
    #[serde(default = "default_pose_landmarks_output")]
    pub pose_landmarks_output: String,
    #[serde(default = "default_pose_presence_output")]
    pub pose_presence_output: String,
    /// 人物ありと判定する presence スコアの閾値
    #[serde(default = "default_presence_threshold")]
    pub presence_threshold: f32,
    /// エラー分類モデル (ONNX)
    #[serde(default = "default_classifier_model")]
    pub classifier_model: String,
    #[serde(default = "default_classifier_input_name")]
    pub classifier_input_name: String,
    #[serde(default = "default_classifier_output_name")]
    pub classifier_output_name: String,
}

fn default_pose_model() -> String { "models/pose_landmark_full.onnx".to_string() }
fn default_pose_input_size() -> usize { 256 }
fn default_pose_input_name() -> String { "input_1".to_string() }
fn default_pose_landmarks_output() -> String { "Identity".to_string() }
fn default_pose_presence_output() -> String { "Identity_1".to_string() }
fn default_presence_threshold() -> f32 { 0.75 }
fn default_classifier_model() -> String { "models/run_3.onnx".to_string() }
fn default_classifier_input_name() -> String { "input".to_string() }
fn default_classifier_output_name() -> String { "output".to_string() }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            pose_model: default_pose_model(),
            pose_input_size: default_pose_input_size(),
            pose_input_name: default_pose_input_name(),
            pose_landmarks_output: default_pose_landmarks_output(),
            pose_presence_output: default_pose_presence_output(),
            presence_threshold: default_presence_threshold(),
            classifier_model: default_classifier_model(),
            classifier_input_name: default_classifier_input_name(),
            classifier_output_name: default_classifier_output_name(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepetitionConfig {
    /// ログインしていない場合の回数
    #[serde(default = "default_total_reps")]
    pub default_total_reps: u32,
    /// 開始前のカウントダウン（秒）
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u32,
    /// 起動時に選択する種目
    #[serde(default = "default_exercise")]
    pub default_exercise: String,
}

fn default_total_reps() -> u32 { 5 }
fn default_countdown_secs() -> u32 { 3 }
fn default_exercise() -> String { "Hiding Face".to_string() }

impl Default for RepetitionConfig {
    fn default() -> Self {
        Self {
            default_total_reps: default_total_reps(),
            countdown_secs: default_countdown_secs(),
            default_exercise: default_exercise(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// SQLite データベース
    #[serde(default = "default_database")]
    pub database: String,
    /// ログイン中のユーザー。None なら記録しない
    #[serde(default)]
    pub user_id: Option<i64>,
    /// ユーザーの希望回数
    #[serde(default)]
    pub preferred_reps: Option<u32>,
}

fn default_database() -> String { "db.sqlite".to_string() }

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            user_id: None,
            preferred_reps: None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// ファイルが無い・壊れている場合はデフォルト設定
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!("using default config ({}): {:#}", path.as_ref().display(), e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.capture;
        if c.window_size == 0 {
            bail!("capture.window_size must be > 0");
        }
        if c.sliding_amount == 0 {
            bail!("capture.sliding_amount must be > 0");
        }
        if frame_interval(c.target_fps).is_none() {
            bail!("capture.target_fps must be > 0 and not too small, got {}", c.target_fps);
        }
        if c.event_capacity == 0 {
            bail!("capture.event_capacity must be > 0");
        }
        if self.repetition.default_total_reps == 0 {
            bail!("repetition.default_total_reps must be > 0");
        }
        for exercise in &self.exercises {
            if exercise.name.trim().is_empty() {
                bail!("exercise name must not be empty");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_pipeline() {
        let config = Config::default();
        assert_eq!(config.capture.window_size, 10);
        assert_eq!(config.capture.sliding_amount, 10);
        assert_eq!(config.capture.target_fps, 15.0);
        assert_eq!(config.repetition.countdown_secs, 3);
        assert_eq!(config.repetition.default_total_reps, 5);
        assert!(config.session.user_id.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [capture]
            target_fps = 30.0

            [session]
            user_id = 7
            preferred_reps = 8

            [[exercises]]
            name = "Shoulder Shrug"
            thresholds = [0.5, 0.5, 0.5, 0.5, 0.5, 0.5]
            guide_video = "videos/shrug.mp4"
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.target_fps, 30.0);
        assert_eq!(config.capture.window_size, 10);
        assert_eq!(config.session.user_id, Some(7));
        assert_eq!(config.session.preferred_reps, Some(8));
        assert_eq!(config.exercises.len(), 1);
        assert_eq!(config.camera.reopen_attempts, 3);
    }

    #[test]
    fn test_validate_rejects_zero_cadence() {
        let mut config = Config::default();
        config.capture.sliding_amount = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unusable_fps() {
        let mut config = Config::default();
        config.capture.target_fps = 1e-20;
        assert!(config.validate().is_err());
        config.capture.target_fps = 0.0;
        assert!(config.validate().is_err());
        config.capture.target_fps = 30.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("does/not/exist.toml");
        assert_eq!(config.capture.window_size, 10);
    }
}
