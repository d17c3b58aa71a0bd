//! 種目プロファイルとレジストリ
//!
//! one-hot コードはレジストリ内の位置から決まる。分類モデルは学習時と
//! 同じ並び (Flank Stretch, Hiding Face, Torso Rotation) を前提とする。

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::classifier::JOINT_COUNT;
use crate::error::StateError;

/// 設定ファイル上の種目定義
#[derive(Debug, Deserialize, Clone)]
pub struct ExerciseConfig {
    pub name: String,
    /// 関節ごとの閾値 (LS, RS, LE, RE, LW, RW)
    pub thresholds: [f32; JOINT_COUNT],
    pub guide_video: String,
}

/// 不変の種目設定
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseProfile {
    pub name: String,
    pub code: Vec<f32>,
    pub thresholds: [f32; JOINT_COUNT],
    pub guide_video: PathBuf,
}

impl ExerciseProfile {
    pub fn guide_video(&self) -> &Path {
        &self.guide_video
    }
}

#[derive(Debug, Clone)]
pub struct ExerciseRegistry {
    profiles: Vec<Arc<ExerciseProfile>>,
}

impl ExerciseRegistry {
    pub fn from_configs(configs: &[ExerciseConfig]) -> Self {
        let count = configs.len();
        let profiles = configs
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut code = vec![0.0; count];
                code[i] = 1.0;
                Arc::new(ExerciseProfile {
                    name: c.name.clone(),
                    code,
                    thresholds: c.thresholds,
                    guide_video: PathBuf::from(&c.guide_video),
                })
            })
            .collect();
        Self { profiles }
    }

    /// 設定が空なら標準の3種目
    pub fn from_config_or_default(configs: &[ExerciseConfig]) -> Self {
        if configs.is_empty() {
            Self::default()
        } else {
            Self::from_configs(configs)
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ExerciseProfile>> {
        self.profiles.iter().find(|p| p.name == name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<ExerciseProfile>, StateError> {
        self.get(name)
            .ok_or_else(|| StateError::UnknownExercise(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.name.as_str())
    }

    /// one-hot の長さ
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for ExerciseRegistry {
    fn default() -> Self {
        Self::from_configs(&[
            ExerciseConfig {
                name: "Flank Stretch".to_string(),
                thresholds: [0.75, 0.7, 0.7, 0.8, 0.7, 0.8],
                guide_video: "videos/flank_stretch.mp4".to_string(),
            },
            ExerciseConfig {
                name: "Hiding Face".to_string(),
                thresholds: [0.4, 0.45, 0.6, 0.6, 0.65, 0.55],
                guide_video: "videos/hiding_face.mp4".to_string(),
            },
            ExerciseConfig {
                name: "Torso Rotation".to_string(),
                thresholds: [0.75, 0.65, 0.75, 0.7, 0.75, 0.7],
                guide_video: "videos/torso_rotation.mp4".to_string(),
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_one_hot_codes() {
        let registry = ExerciseRegistry::default();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get("Flank Stretch").unwrap().code, vec![1.0, 0.0, 0.0]);
        assert_eq!(registry.get("Hiding Face").unwrap().code, vec![0.0, 1.0, 0.0]);
        assert_eq!(registry.get("Torso Rotation").unwrap().code, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unknown_exercise() {
        let registry = ExerciseRegistry::default();
        assert_eq!(
            registry.require("Jumping Jacks"),
            Err(StateError::UnknownExercise("Jumping Jacks".to_string()))
        );
    }

    #[test]
    fn test_registry_is_extensible() {
        let registry = ExerciseRegistry::from_config_or_default(&[
            ExerciseConfig {
                name: "A".to_string(),
                thresholds: [0.5; JOINT_COUNT],
                guide_video: "a.mp4".to_string(),
            },
            ExerciseConfig {
                name: "B".to_string(),
                thresholds: [0.5; JOINT_COUNT],
                guide_video: "b.mp4".to_string(),
            },
        ]);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(registry.get("B").unwrap().code, vec![0.0, 1.0]);
        assert_eq!(registry.get("B").unwrap().guide_video(), Path::new("b.mp4"));
    }
}
