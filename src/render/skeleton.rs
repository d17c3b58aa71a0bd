use crate::camera::Frame;
use crate::pose::{Landmark, Pose};

/// 上半身の骨格接続 (開始, 終了)
pub const SKELETON_CONNECTIONS: [(Landmark, Landmark); 8] = [
    // 肩
    (Landmark::LeftShoulder, Landmark::RightShoulder),
    // 左腕
    (Landmark::LeftShoulder, Landmark::LeftElbow),
    (Landmark::LeftElbow, Landmark::LeftWrist),
    // 右腕
    (Landmark::RightShoulder, Landmark::RightElbow),
    (Landmark::RightElbow, Landmark::RightWrist),
    // 胴体
    (Landmark::LeftShoulder, Landmark::LeftHip),
    (Landmark::RightShoulder, Landmark::RightHip),
    (Landmark::LeftHip, Landmark::RightHip),
];

/// 描画するランドマークの範囲 (11〜24)
pub const UPPER_BODY: std::ops::RangeInclusive<usize> = 11..=24;

/// エラー関節の色 (RGB)
pub const ERROR_COLOR: [u8; 3] = [182, 0, 18];

/// 正常な関節の色 (RGB)
pub const OK_COLOR: [u8; 3] = [101, 184, 101];

const POINT_RADIUS: i32 = 7;
const LINE_HALF_WIDTH: i32 = 2;

/// 上半身の骨格を描画する
///
/// `error_indices` に含まれる関節と、それに接続する線は赤。
/// `mirrored` はフレームが既に左右反転済みであることを示す。
pub fn annotate(frame: &mut Frame, pose: &Pose, error_indices: &[usize], mirrored: bool) {
    let (w, h) = (frame.width(), frame.height());
    let is_error = |l: Landmark| error_indices.contains(&l.index());

    for (start, end) in SKELETON_CONNECTIONS.iter() {
        let (x1, y1) = pose.get(*start).to_pixel(w, h, mirrored);
        let (x2, y2) = pose.get(*end).to_pixel(w, h, mirrored);
        let color = if is_error(*start) || is_error(*end) {
            ERROR_COLOR
        } else {
            OK_COLOR
        };
        draw_line(frame, x1, y1, x2, y2, color);
    }

    for idx in UPPER_BODY {
        let kp = &pose.keypoints[idx];
        let (px, py) = kp.to_pixel(w, h, mirrored);
        let color = if error_indices.contains(&idx) {
            ERROR_COLOR
        } else {
            OK_COLOR
        };
        draw_circle(frame, px, py, POINT_RADIUS, color);
    }
}

/// Bresenhamのアルゴリズムで線を描画（太さ付き）
fn draw_line(frame: &mut Frame, x0: i32, y0: i32, x1: i32, y1: i32, color: [u8; 3]) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let mut x = x0;
    let mut y = y0;

    loop {
        draw_circle(frame, x, y, LINE_HALF_WIDTH, color);

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// 円を描画（塗りつぶし）
fn draw_circle(frame: &mut Frame, cx: i32, cy: i32, radius: i32, color: [u8; 3]) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                frame.set_pixel(cx + dx, cy + dy, color);
            }
        }
    }
}
