use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::{GuidePlayer, GuideStatus};
use crate::camera::{mat_to_frame, Frame};
use crate::error::GuideError;

const FALLBACK_FPS: f64 = 30.0;

/// OpenCV で動画ファイルを読み、ファイルの FPS に合わせて進める
pub struct VideoGuide {
    capture: Option<VideoCapture>,
    frame_interval: Duration,
    next_frame_at: Instant,
    frame: Option<Frame>,
}

impl VideoGuide {
    pub fn new() -> Self {
        Self {
            capture: None,
            frame_interval: Duration::from_secs_f64(1.0 / FALLBACK_FPS),
            next_frame_at: Instant::now(),
            frame: None,
        }
    }

    fn read_next(&mut self) -> bool {
        let Some(capture) = self.capture.as_mut() else {
            return false;
        };
        let mut bgr = Mat::default();
        match capture.read(&mut bgr) {
            Ok(true) if !bgr.empty() => match mat_to_frame(&bgr) {
                Ok(frame) => {
                    self.frame = Some(frame);
                    true
                }
                Err(e) => {
                    warn!("guide frame conversion failed: {:#}", e);
                    false
                }
            },
            Ok(_) => false,
            Err(e) => {
                warn!("guide read failed: {}", e);
                false
            }
        }
    }
}

impl Default for VideoGuide {
    fn default() -> Self {
        Self::new()
    }
}

impl GuidePlayer for VideoGuide {
    fn play(&mut self, path: &Path) -> Result<(), GuideError> {
        if !path.exists() {
            return Err(GuideError::MissingFile(path.display().to_string()));
        }
        let name = path.to_string_lossy();
        let capture = VideoCapture::from_file(&name, videoio::CAP_ANY)
            .map_err(|e| GuideError::Open(e.to_string()))?;
        if !capture.is_opened().unwrap_or(false) {
            return Err(GuideError::Open(name.to_string()));
        }

        let fps = capture
            .get(videoio::CAP_PROP_FPS)
            .ok()
            .filter(|f| *f > 0.0)
            .unwrap_or(FALLBACK_FPS);
        self.frame_interval = Duration::from_secs_f64(1.0 / fps);
        self.next_frame_at = Instant::now();
        self.capture = Some(capture);
        info!("guide video started: {} ({:.1} fps)", name, fps);
        Ok(())
    }

    fn stop(&mut self) {
        self.capture = None;
    }

    fn poll(&mut self) -> GuideStatus {
        if self.capture.is_none() {
            return GuideStatus::Idle;
        }

        let now = Instant::now();
        while now >= self.next_frame_at {
            if !self.read_next() {
                self.capture = None;
                return GuideStatus::EndOfMedia;
            }
            self.next_frame_at += self.frame_interval;
        }
        GuideStatus::Playing
    }

    fn current_frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }
}
