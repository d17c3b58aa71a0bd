/// BlazePose の 33 ランドマークインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Landmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl Landmark {
    pub const COUNT: usize = 33;

    const ALL: [Landmark; Landmark::COUNT] = [
        Self::Nose,
        Self::LeftEyeInner,
        Self::LeftEye,
        Self::LeftEyeOuter,
        Self::RightEyeInner,
        Self::RightEye,
        Self::RightEyeOuter,
        Self::LeftEar,
        Self::RightEar,
        Self::MouthLeft,
        Self::MouthRight,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftPinky,
        Self::RightPinky,
        Self::LeftIndex,
        Self::RightIndex,
        Self::LeftThumb,
        Self::RightThumb,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
        Self::LeftHeel,
        Self::RightHeel,
        Self::LeftFootIndex,
        Self::RightFootIndex,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 腰中心を原点とした相対深度 (x と同じスケール)
    pub z: f32,
    /// 可視性スコア (0.0〜1.0)
    pub visibility: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    /// ピクセル座標に変換。`mirrored` なら左右反転した画像上の座標
    pub fn to_pixel(&self, width: u32, height: u32, mirrored: bool) -> (i32, i32) {
        let x = if mirrored { 1.0 - self.x } else { self.x };
        let px = (x * width as f32) as i32;
        let py = (self.y * height as f32) as i32;
        (px, py)
    }
}

/// 33ランドマークからなる姿勢
#[derive(Debug, Clone)]
pub struct Pose {
    pub keypoints: [Keypoint; Landmark::COUNT],
}

impl Pose {
    pub fn new(keypoints: [Keypoint; Landmark::COUNT]) -> Self {
        Self { keypoints }
    }

    /// インデックスでランドマークを取得
    pub fn get(&self, landmark: Landmark) -> &Keypoint {
        &self.keypoints[landmark.index()]
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            keypoints: [Keypoint::default(); Landmark::COUNT],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_from_index() {
        assert_eq!(Landmark::from_index(0), Some(Landmark::Nose));
        assert_eq!(Landmark::from_index(11), Some(Landmark::LeftShoulder));
        assert_eq!(Landmark::from_index(16), Some(Landmark::RightWrist));
        assert_eq!(Landmark::from_index(32), Some(Landmark::RightFootIndex));
        assert_eq!(Landmark::from_index(33), None);
    }

    #[test]
    fn test_landmark_order_matches_index() {
        for i in 0..Landmark::COUNT {
            assert_eq!(Landmark::from_index(i).unwrap().index(), i);
        }
    }

    #[test]
    fn test_keypoint_to_pixel() {
        let kp = Keypoint::new(0.25, 0.25, 0.0, 1.0);
        assert_eq!(kp.to_pixel(640, 480, false), (160, 120));
        assert_eq!(kp.to_pixel(640, 480, true), (480, 120));
    }

    #[test]
    fn test_pose_get() {
        let mut keypoints = [Keypoint::default(); Landmark::COUNT];
        keypoints[Landmark::LeftElbow.index()] = Keypoint::new(0.5, 0.3, -0.1, 0.9);

        let pose = Pose::new(keypoints);
        let elbow = pose.get(Landmark::LeftElbow);
        assert_eq!(elbow.x, 0.5);
        assert_eq!(elbow.z, -0.1);
        assert_eq!(elbow.visibility, 0.9);
    }
}
