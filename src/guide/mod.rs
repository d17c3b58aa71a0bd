//! Guide video playback shown next to the camera feed

#[cfg(feature = "desktop")]
pub mod video;

#[cfg(feature = "desktop")]
pub use video::VideoGuide;

use std::path::Path;

use crate::camera::Frame;
use crate::error::GuideError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuideStatus {
    Idle,
    Playing,
    /// 再生が最後まで進んだ。1回だけ返し、その後は Idle
    EndOfMedia,
}

/// ガイド動画の再生。反復の終わりは動画の終わりで決まる
pub trait GuidePlayer {
    fn play(&mut self, path: &Path) -> Result<(), GuideError>;

    /// 再生を止める。EndOfMedia は発生しない
    fn stop(&mut self);

    fn poll(&mut self) -> GuideStatus;

    fn current_frame(&self) -> Option<&Frame>;
}
