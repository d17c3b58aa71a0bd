use crate::error::CaptureError;

const ERROR_WIDTH: u32 = 640;
const ERROR_HEIGHT: u32 = 480;
const ERROR_RGB: [u8; 3] = [96, 0, 0];

/// RGB 8bit のパックされた画像
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
    /// エラーフレームに描いた文字列
    caption: Option<String>,
}

impl Frame {
    /// `data` は width * height * 3 バイト
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * 3 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
            caption: None,
        })
    }

    /// 単色で塗りつぶしたフレーム
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            width,
            height,
            data,
            caption: None,
        }
    }

    /// カメラやモデルが使えないときに表示するフレーム
    ///
    /// desktop ビルドでは `caption` を画像に描き込む。
    pub fn error_frame(caption: &str) -> Self {
        #[cfg(feature = "desktop")]
        let frame = super::capture::labelled_frame(ERROR_WIDTH, ERROR_HEIGHT, ERROR_RGB, caption)
            .unwrap_or_else(|e| {
                tracing::warn!("could not draw error frame: {:#}", e);
                Self::filled(ERROR_WIDTH, ERROR_HEIGHT, ERROR_RGB)
            });
        #[cfg(not(feature = "desktop"))]
        let frame = Self::filled(ERROR_WIDTH, ERROR_HEIGHT, ERROR_RGB);

        Self {
            caption: Some(caption.to_string()),
            ..frame
        }
    }

    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// ピクセルをセット（境界チェック付き）
    pub fn set_pixel(&mut self, x: i32, y: i32, rgb: [u8; 3]) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            let i = (y as usize * self.width as usize + x as usize) * 3;
            self.data[i..i + 3].copy_from_slice(&rgb);
        }
    }
}

/// フレームを供給するデバイス
///
/// キャプチャスレッドが所有する。読み込み失敗時は `reopen` で
/// デバイスを開き直す。
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    fn reopen(&mut self) -> Result<(), CaptureError>;

    /// 表示用にフレームを左右反転する
    fn mirror(&mut self, frame: &mut Frame) -> Result<(), CaptureError>;
}
