use anyhow::Result;
use ndarray::Array4;
use opencv::{
    core::{Mat, Size, Vec3f, CV_32FC3},
    imgproc,
    prelude::*,
};

use crate::camera::{frame_to_mat, Frame};

/// RGB フレームをランドマークモデルの入力テンソルに変換
///
/// - size x size にリサイズ（アスペクト比は保持しない）
/// - [1, size, size, 3] の f32 テンソル (0.0-1.0)
pub fn preprocess_for_landmarks(frame: &Frame, size: usize) -> Result<Array4<f32>> {
    let rgb = frame_to_mat(frame)?;
    let side = size as i32;

    let mut resized = Mat::default();
    imgproc::resize(
        &rgb,
        &mut resized,
        Size::new(side, side),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    // f32 に変換して 0-1 に正規化
    let mut float_mat = Mat::default();
    resized.convert_to(&mut float_mat, CV_32FC3, 1.0 / 255.0, 0.0)?;

    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
    for y in 0..side {
        for x in 0..side {
            let pixel = float_mat.at_2d::<Vec3f>(y, x)?;
            tensor[[0, y as usize, x as usize, 0]] = pixel[0];
            tensor[[0, y as usize, x as usize, 1]] = pixel[1];
            tensor[[0, y as usize, x as usize, 2]] = pixel[2];
        }
    }

    Ok(tensor)
}
