use anyhow::Context;
use opencv::{
    core::{self, AlgorithmHint, Mat, Point, Scalar, CV_8UC3},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};
use tracing::info;

use super::frame::{Frame, FrameSource};
use crate::config::CameraConfig;
use crate::error::CaptureError;

/// OpenCVを使用したカメラキャプチャ
pub struct OpenCvCamera {
    capture: VideoCapture,
    config: CameraConfig,
    width: u32,
    height: u32,
}

impl OpenCvCamera {
    /// 設定に従ってカメラを開く
    pub fn open(config: &CameraConfig) -> Result<Self, CaptureError> {
        let capture = open_capture(config)?;
        let mut camera = Self {
            capture,
            config: config.clone(),
            width: 0,
            height: 0,
        };
        camera.refresh_resolution();
        info!(
            "camera {} opened at {}x{}",
            config.index, camera.width, camera.height
        );
        Ok(camera)
    }

    /// 解像度を取得
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn refresh_resolution(&mut self) {
        self.width = self.capture.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as u32;
        self.height = self.capture.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as u32;
    }
}

impl FrameSource for OpenCvCamera {
    /// フレームを読み込み RGB に変換
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let mut bgr = Mat::default();
        let ok = self
            .capture
            .read(&mut bgr)
            .map_err(|e| CaptureError::CameraRead(e.to_string()))?;

        if !ok || bgr.empty() {
            return Err(CaptureError::CameraRead("empty frame received".to_string()));
        }

        mat_to_frame(&bgr).map_err(|e| CaptureError::CameraRead(format!("{:#}", e)))
    }

    fn reopen(&mut self) -> Result<(), CaptureError> {
        let _ = self.capture.release();
        self.capture = open_capture(&self.config)?;
        self.refresh_resolution();
        Ok(())
    }

    fn mirror(&mut self, frame: &mut Frame) -> Result<(), CaptureError> {
        *frame = flip_horizontal(frame).map_err(|e| CaptureError::CameraRead(format!("{:#}", e)))?;
        Ok(())
    }
}

fn open_capture(config: &CameraConfig) -> Result<VideoCapture, CaptureError> {
    let open_error = |reason: String| CaptureError::CameraOpen {
        index: config.index,
        reason,
    };

    let mut capture = VideoCapture::new(config.index, VideoCaptureAPIs::CAP_ANY as i32)
        .map_err(|e| open_error(e.to_string()))?;

    if !capture.is_opened().map_err(|e| open_error(e.to_string()))? {
        return Err(open_error("camera is not available".to_string()));
    }

    // 解像度を設定
    if let Some(w) = config.width {
        capture
            .set(videoio::CAP_PROP_FRAME_WIDTH, w as f64)
            .map_err(|e| open_error(e.to_string()))?;
    }
    if let Some(h) = config.height {
        capture
            .set(videoio::CAP_PROP_FRAME_HEIGHT, h as f64)
            .map_err(|e| open_error(e.to_string()))?;
    }
    capture
        .set(videoio::CAP_PROP_BUFFERSIZE, 1.0)
        .map_err(|e| open_error(e.to_string()))?;

    Ok(capture)
}

/// BGR Mat を RGB の Frame に変換
pub fn mat_to_frame(bgr: &Mat) -> anyhow::Result<Frame> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0, AlgorithmHint::ALGO_HINT_DEFAULT)?;
    rgb_mat_to_frame(&rgb)
}

fn rgb_mat_to_frame(rgb: &Mat) -> anyhow::Result<Frame> {
    let width = rgb.cols() as u32;
    let height = rgb.rows() as u32;
    let bytes = rgb.data_bytes().context("frame is not continuous")?;

    Frame::from_rgb(width, height, bytes.to_vec()).context("unexpected frame layout")
}

/// RGB の Frame を 3ch の Mat にコピー
pub fn frame_to_mat(frame: &Frame) -> opencv::Result<Mat> {
    if frame.data().is_empty() {
        return Ok(Mat::default());
    }
    let flat = Mat::from_slice(frame.data())?;
    let rgb = flat.reshape(3, frame.height() as i32)?;
    rgb.try_clone()
}

/// 左右反転
pub fn flip_horizontal(frame: &Frame) -> anyhow::Result<Frame> {
    let src = frame_to_mat(frame)?;
    let mut flipped = Mat::default();
    core::flip(&src, &mut flipped, 1)?;
    rgb_mat_to_frame(&flipped)
}

/// 単色の背景に文字列を描いたフレーム
pub fn labelled_frame(width: u32, height: u32, rgb: [u8; 3], text: &str) -> anyhow::Result<Frame> {
    let background = Scalar::new(rgb[0] as f64, rgb[1] as f64, rgb[2] as f64, 0.0);
    let mut canvas = Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC3, background)?;

    imgproc::put_text(
        &mut canvas,
        text,
        Point::new(40, height as i32 / 2),
        imgproc::FONT_HERSHEY_SIMPLEX,
        1.2,
        Scalar::new(255.0, 255.0, 255.0, 0.0),
        2,
        imgproc::LINE_8,
        false,
    )?;

    rgb_mat_to_frame(&canvas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_horizontal() {
        let frame = Frame::from_rgb(3, 1, vec![1, 1, 1, 2, 2, 2, 3, 3, 3]).unwrap();
        let flipped = flip_horizontal(&frame).unwrap();
        assert_eq!(flipped.data(), &[3, 3, 3, 2, 2, 2, 1, 1, 1]);
    }

    #[test]
    fn test_labelled_frame_draws_text() {
        let plain = Frame::filled(320, 120, [96, 0, 0]);
        let frame = labelled_frame(320, 120, [96, 0, 0], "Camera 0 Failed").unwrap();
        assert_eq!((frame.width(), frame.height()), (320, 120));
        assert_eq!(frame.pixel(0, 0), Some([96, 0, 0]));
        // 文字の部分だけ背景色から変わる
        assert_ne!(frame.data(), plain.data());
        let white = frame.data().chunks_exact(3).filter(|p| *p == [255, 255, 255]).count();
        assert!(white > 0);
    }
}
