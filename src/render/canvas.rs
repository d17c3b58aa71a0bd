use crate::camera::Frame;
use crate::controller::RepState;

/// 反復インジケータの色 (0RGB)
pub const REP_COMPLETED_COLOR: u32 = 0x0065_B865;
pub const REP_CURRENT_COLOR: u32 = 0x00F0_C040;
pub const REP_UPCOMING_COLOR: u32 = 0x0050_5050;

/// minifb に渡す 0RGB バッファ
pub struct Canvas {
    width: usize,
    height: usize,
    buffer: Vec<u32>,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            buffer: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn buffer(&self) -> &[u32] {
        &self.buffer
    }

    pub fn clear(&mut self, color: u32) {
        self.buffer.fill(color);
    }

    /// 矩形を塗る (はみ出した部分は無視)
    pub fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, color: u32) {
        let x_end = (x + w).min(self.width);
        let y_end = (y + h).min(self.height);
        for row in y.min(y_end)..y_end {
            let start = row * self.width;
            self.buffer[start + x.min(x_end)..start + x_end].fill(color);
        }
    }

    /// フレームを最近傍で (x, y, w, h) に拡大縮小して描く
    pub fn blit_scaled(&mut self, frame: &Frame, x: usize, y: usize, w: usize, h: usize) {
        let (fw, fh) = (frame.width() as usize, frame.height() as usize);
        if fw == 0 || fh == 0 || w == 0 || h == 0 {
            return;
        }
        let data = frame.data();
        for dy in 0..h {
            let ty = y + dy;
            if ty >= self.height {
                break;
            }
            let sy = dy * fh / h;
            for dx in 0..w {
                let tx = x + dx;
                if tx >= self.width {
                    break;
                }
                let sx = dx * fw / w;
                let i = (sy * fw + sx) * 3;
                let (r, g, b) = (data[i] as u32, data[i + 1] as u32, data[i + 2] as u32);
                self.buffer[ty * self.width + tx] = (r << 16) | (g << 8) | b;
            }
        }
    }

    /// 下端に反復ごとの四角を並べる
    pub fn draw_rep_bar(&mut self, states: &[RepState], y: usize, size: usize, gap: usize) {
        for (i, state) in states.iter().enumerate() {
            let color = match state {
                RepState::Completed => REP_COMPLETED_COLOR,
                RepState::Current => REP_CURRENT_COLOR,
                RepState::Upcoming => REP_UPCOMING_COLOR,
            };
            self.fill_rect(gap + i * (size + gap), y, size, size, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blit_scales_up() {
        let mut frame = Frame::filled(2, 1, [0, 0, 0]);
        frame.set_pixel(1, 0, [255, 0, 0]);

        let mut canvas = Canvas::new(8, 4);
        canvas.blit_scaled(&frame, 0, 0, 4, 2);
        let buf = canvas.buffer();
        assert_eq!(buf[0], 0);
        assert_eq!(buf[1], 0);
        assert_eq!(buf[2], 0x00FF_0000);
        assert_eq!(buf[8 + 3], 0x00FF_0000);
        // 描画範囲外はそのまま
        assert_eq!(buf[4], 0);
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut canvas = Canvas::new(4, 4);
        canvas.fill_rect(2, 2, 10, 10, 7);
        assert_eq!(canvas.buffer().iter().filter(|p| **p == 7).count(), 4);
    }

    #[test]
    fn test_rep_bar_colors() {
        let mut canvas = Canvas::new(20, 4);
        canvas.draw_rep_bar(&[RepState::Completed, RepState::Current, RepState::Upcoming], 0, 2, 1);
        let buf = canvas.buffer();
        assert_eq!(buf[1], REP_COMPLETED_COLOR);
        assert_eq!(buf[4], REP_CURRENT_COLOR);
        assert_eq!(buf[7], REP_UPCOMING_COLOR);
        assert_eq!(buf[0], 0);
    }
}
