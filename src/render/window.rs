use anyhow::Result;
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use super::canvas::Canvas;
use crate::camera::Frame;
use crate::controller::RepState;

const BACKGROUND: u32 = 0x0020_2020;
const REP_BAR_HEIGHT: usize = 28;
const REP_BOX: usize = 20;
const REP_GAP: usize = 6;

/// カメラ映像とガイド動画を横に並べて表示するウィンドウ
pub struct MinifbRenderer {
    window: Window,
    canvas: Canvas,
    pane_width: usize,
    pane_height: usize,
}

impl MinifbRenderer {
    /// ウィンドウを作成
    pub fn new(title: &str, pane_width: usize, pane_height: usize) -> Result<Self> {
        let width = pane_width * 2;
        let height = pane_height + REP_BAR_HEIGHT;
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;
        window.set_target_fps(60);

        Ok(Self {
            window,
            canvas: Canvas::new(width, height),
            pane_width,
            pane_height,
        })
    }

    /// ウィンドウが開いているか
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    /// 今回の更新で押されたキー
    pub fn pressed_keys(&self) -> Vec<Key> {
        self.window.get_keys_pressed(KeyRepeat::No)
    }

    pub fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    /// 左にカメラ、右にガイド、下に反復インジケータ
    pub fn draw(&mut self, camera: Option<&Frame>, guide: Option<&Frame>, reps: &[RepState]) {
        self.canvas.clear(BACKGROUND);
        if let Some(frame) = camera {
            self.canvas
                .blit_scaled(frame, 0, 0, self.pane_width, self.pane_height);
        }
        if let Some(frame) = guide {
            self.canvas
                .blit_scaled(frame, self.pane_width, 0, self.pane_width, self.pane_height);
        }
        let bar_y = self.pane_height + (REP_BAR_HEIGHT - REP_BOX) / 2;
        self.canvas.draw_rep_bar(reps, bar_y, REP_BOX, REP_GAP);
    }

    /// バッファをウィンドウに表示
    pub fn update(&mut self) -> Result<()> {
        self.window.update_with_buffer(
            self.canvas.buffer(),
            self.canvas.width(),
            self.canvas.height(),
        )?;
        Ok(())
    }
}
