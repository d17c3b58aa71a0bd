//! Feature extraction for exercise classification
//!
//! 1フレームあたり: 種目 one-hot + 肩・肘・手首の (x, y, z)

use crate::pose::{Landmark, Pose};

/// 分類に使うランドマーク (この順で並べる)
pub const KEYPOINTS_OF_INTEREST: [Landmark; 6] = [
    Landmark::LeftShoulder,
    Landmark::RightShoulder,
    Landmark::LeftElbow,
    Landmark::RightElbow,
    Landmark::LeftWrist,
    Landmark::RightWrist,
];

/// キーポイント部分の長さ
pub const KEYPOINT_FEATURES: usize = KEYPOINTS_OF_INTEREST.len() * 3;

/// 種目数 `exercise_count` のときの特徴ベクトル長
pub fn feature_len(exercise_count: usize) -> usize {
    exercise_count + KEYPOINT_FEATURES
}

/// 1フレーム分の特徴ベクトルを作る
pub fn extract_features(exercise_code: &[f32], pose: &Pose) -> Vec<f32> {
    let mut features = Vec::with_capacity(exercise_code.len() + KEYPOINT_FEATURES);
    features.extend_from_slice(exercise_code);
    for landmark in KEYPOINTS_OF_INTEREST {
        let kp = pose.get(landmark);
        features.extend_from_slice(&[kp.x, kp.y, kp.z]);
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;

    #[test]
    fn test_feature_len_reference_registry() {
        assert_eq!(feature_len(3), 21);
    }

    #[test]
    fn test_layout() {
        let mut pose = Pose::default();
        pose.keypoints[Landmark::LeftShoulder.index()] = Keypoint::new(0.1, 0.2, 0.3, 1.0);
        pose.keypoints[Landmark::RightWrist.index()] = Keypoint::new(0.7, 0.8, 0.9, 1.0);
        // 関係ないランドマークは含まれない
        pose.keypoints[Landmark::Nose.index()] = Keypoint::new(5.0, 5.0, 5.0, 1.0);

        let features = extract_features(&[0.0, 1.0, 0.0], &pose);
        assert_eq!(features.len(), 21);
        assert_eq!(&features[..3], &[0.0, 1.0, 0.0]);
        assert_eq!(&features[3..6], &[0.1, 0.2, 0.3]);
        assert_eq!(&features[18..21], &[0.7, 0.8, 0.9]);
        assert!(!features.contains(&5.0));
    }
}
