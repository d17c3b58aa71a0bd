//! 関節ごとのエラーフラグを表示用ラベルに変換する
//!
//! 規則は上から順に評価し、最初に一致したものを採用する。

use std::fmt;

use crate::pose::Landmark;

/// 監視する関節数
pub const JOINT_COUNT: usize = 6;

/// 監視対象の関節 (ErrorVector の並び順)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joint {
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
}

impl Joint {
    pub const ALL: [Joint; JOINT_COUNT] = [
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Joint::LeftShoulder => "Left Shoulder",
            Joint::RightShoulder => "Right Shoulder",
            Joint::LeftElbow => "Left Elbow",
            Joint::RightElbow => "Right Elbow",
            Joint::LeftWrist => "Left Wrist",
            Joint::RightWrist => "Right Wrist",
        }
    }

    /// 骨格描画で使うランドマーク
    pub fn landmark(self) -> Landmark {
        match self {
            Joint::LeftShoulder => Landmark::LeftShoulder,
            Joint::RightShoulder => Landmark::RightShoulder,
            Joint::LeftElbow => Landmark::LeftElbow,
            Joint::RightElbow => Landmark::RightElbow,
            Joint::LeftWrist => Landmark::LeftWrist,
            Joint::RightWrist => Landmark::RightWrist,
        }
    }
}

/// 関節ごとのエラーフラグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorVector(pub [bool; JOINT_COUNT]);

impl ErrorVector {
    /// 確率が閾値を超えた関節をエラーとする
    pub fn from_probabilities(probs: &[f32], thresholds: &[f32; JOINT_COUNT]) -> Option<Self> {
        if probs.len() != JOINT_COUNT {
            return None;
        }
        let mut flags = [false; JOINT_COUNT];
        for (flag, (p, t)) in flags.iter_mut().zip(probs.iter().zip(thresholds)) {
            *flag = p > t;
        }
        Some(Self(flags))
    }

    pub fn from_bits(bits: [u8; JOINT_COUNT]) -> Self {
        Self(bits.map(|b| b != 0))
    }

    pub fn is_set(&self, joint: Joint) -> bool {
        self.0[joint as usize]
    }
}

/// interpret の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub label: String,
    /// エラーのあるランドマークのインデックス (11-16)
    pub error_indices: Vec<usize>,
}

pub const CORRECT_LABEL: &str = "Correct";
pub const UNKNOWN_LABEL: &str = "Unknown error";

pub fn interpret(errors: &ErrorVector) -> Evaluation {
    let [ls, rs, le, re, lw, rw] = errors.0;
    let only = |expected: [bool; JOINT_COUNT]| errors.0 == expected;

    let label = if errors.0.iter().all(|b| *b) {
        "Upper Extremity".to_string()
    } else if only([true, true, false, false, false, false]) {
        "Spine".to_string()
    } else if only([false, false, true, true, false, false]) {
        "Both Elbows".to_string()
    } else if only([false, false, false, false, true, true]) {
        "Both Wrists".to_string()
    } else if only([false, false, true, false, true, false]) {
        "Left Forearm".to_string()
    } else if only([false, false, false, true, false, true]) {
        "Right Forearm".to_string()
    } else if only([true, false, true, false, true, false]) {
        "Left Arm".to_string()
    } else if only([false, true, false, true, false, true]) {
        "Right Arm".to_string()
    } else if ls && rs && (le || re || lw || rw) {
        if le && re && lw && rw {
            "Upper Extremity".to_string()
        } else {
            "Spine".to_string()
        }
    } else {
        let names: Vec<&str> = Joint::ALL
            .iter()
            .filter(|j| errors.is_set(**j))
            .map(|j| j.name())
            .collect();
        if names.is_empty() {
            CORRECT_LABEL.to_string()
        } else {
            names.join(", ")
        }
    };

    let error_indices = Joint::ALL
        .iter()
        .filter(|j| errors.is_set(**j))
        .map(|j| j.landmark().index())
        .collect();

    Evaluation { label, error_indices }
}

/// 分類器の出力を閾値で判定してラベルにする。長さが合わなければ "Unknown error"
pub fn evaluate(probs: &[f32], thresholds: &[f32; JOINT_COUNT]) -> Evaluation {
    match ErrorVector::from_probabilities(probs, thresholds) {
        Some(errors) => interpret(&errors),
        None => Evaluation {
            label: UNKNOWN_LABEL.to_string(),
            error_indices: Vec::new(),
        },
    }
}

/// フレームごとに UI へ渡す判定結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prediction {
    /// まだ推論していない
    Waiting,
    NoPerson,
    Correct,
    /// フォームの誤り (interpret のラベル)
    Fault(String),
    /// カメラ・モデルの致命的エラー
    DeviceError,
}

impl Prediction {
    pub fn from_evaluation(evaluation: &Evaluation) -> Self {
        if evaluation.label == CORRECT_LABEL {
            Prediction::Correct
        } else {
            Prediction::Fault(evaluation.label.clone())
        }
    }

    /// 反復のエラーとして数えるか。"No Person" は検出漏れで、本人の誤りではない
    pub fn is_performer_error(&self) -> bool {
        matches!(self, Prediction::Fault(_))
    }

    pub fn label(&self) -> &str {
        match self {
            Prediction::Waiting => "Waiting",
            Prediction::NoPerson => "No Person",
            Prediction::Correct => CORRECT_LABEL,
            Prediction::Fault(label) => label,
            Prediction::DeviceError => "Error",
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(bits: [u8; 6]) -> (String, Vec<usize>) {
        let e = interpret(&ErrorVector::from_bits(bits));
        (e.label, e.error_indices)
    }

    #[test]
    fn test_all_joints() {
        assert_eq!(
            eval([1, 1, 1, 1, 1, 1]),
            ("Upper Extremity".to_string(), vec![11, 12, 13, 14, 15, 16])
        );
    }

    #[test]
    fn test_no_joints() {
        assert_eq!(eval([0, 0, 0, 0, 0, 0]), ("Correct".to_string(), vec![]));
    }

    #[test]
    fn test_shoulders_only() {
        assert_eq!(eval([1, 1, 0, 0, 0, 0]), ("Spine".to_string(), vec![11, 12]));
    }

    #[test]
    fn test_pairs() {
        assert_eq!(eval([0, 0, 1, 1, 0, 0]).0, "Both Elbows");
        assert_eq!(eval([0, 0, 0, 0, 1, 1]).0, "Both Wrists");
        assert_eq!(eval([0, 0, 1, 0, 1, 0]), ("Left Forearm".to_string(), vec![13, 15]));
        assert_eq!(eval([0, 0, 0, 1, 0, 1]).0, "Right Forearm");
    }

    #[test]
    fn test_arms() {
        assert_eq!(eval([1, 0, 1, 0, 1, 0]), ("Left Arm".to_string(), vec![11, 13, 15]));
        assert_eq!(eval([0, 1, 0, 1, 0, 1]).0, "Right Arm");
    }

    #[test]
    fn test_shoulders_with_partial_limbs_collapse_to_spine() {
        assert_eq!(eval([1, 1, 1, 0, 0, 0]).0, "Spine");
        assert_eq!(eval([1, 1, 1, 1, 1, 0]).0, "Spine");
        assert_eq!(eval([1, 1, 0, 0, 0, 1]), ("Spine".to_string(), vec![11, 12, 16]));
    }

    #[test]
    fn test_fallback_joins_names() {
        assert_eq!(eval([0, 0, 1, 0, 0, 0]).0, "Left Elbow");
        assert_eq!(eval([1, 0, 0, 1, 0, 0]).0, "Left Shoulder, Right Elbow");
        assert_eq!(
            eval([0, 1, 1, 0, 0, 1]).0,
            "Right Shoulder, Left Elbow, Right Wrist"
        );
    }

    #[test]
    fn test_wrong_length_is_unknown() {
        let thresholds = [0.5; JOINT_COUNT];
        let e = evaluate(&[0.9, 0.1], &thresholds);
        assert_eq!(e.label, "Unknown error");
        assert!(e.error_indices.is_empty());
        assert_eq!(evaluate(&[0.0; 6], &thresholds).label, "Correct");
        assert_eq!(evaluate(&[0.0, 0.0, 0.9, 0.0, 0.0, 0.0], &thresholds).label, "Left Elbow");
    }

    #[test]
    fn test_from_probabilities_is_strict() {
        let thresholds = [0.5; JOINT_COUNT];
        let v = ErrorVector::from_probabilities(&[0.5, 0.51, 0.0, 1.0, 0.2, 0.49], &thresholds).unwrap();
        assert_eq!(v, ErrorVector([false, true, false, true, false, false]));
        assert!(ErrorVector::from_probabilities(&[0.9; 5], &thresholds).is_none());
    }

    #[test]
    fn test_prediction_labels() {
        assert_eq!(Prediction::NoPerson.to_string(), "No Person");
        assert_eq!(Prediction::Waiting.to_string(), "Waiting");
        assert_eq!(Prediction::DeviceError.to_string(), "Error");
        assert!(!Prediction::NoPerson.is_performer_error());
        assert!(!Prediction::Correct.is_performer_error());
        assert!(Prediction::Fault("Spine".to_string()).is_performer_error());

        let correct = interpret(&ErrorVector::default());
        assert_eq!(Prediction::from_evaluation(&correct), Prediction::Correct);
    }
}
