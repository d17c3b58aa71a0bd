//! Sliding window of per-frame feature vectors.
//!
//! Holds the last W frames in chronological order; the snapshot is fed to
//! the sequence classifier verbatim, so order matters.

use ndarray::Array3;
use std::collections::VecDeque;

use crate::error::FeatureError;

pub struct FeatureWindow {
    capacity: usize,
    feature_len: usize,
    frames: VecDeque<Vec<f32>>,
}

impl FeatureWindow {
    pub fn new(capacity: usize, feature_len: usize) -> Self {
        Self {
            capacity,
            feature_len,
            frames: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Append a frame, evicting the oldest one once `capacity` is exceeded.
    pub fn push(&mut self, features: Vec<f32>) -> Result<(), FeatureError> {
        if features.len() != self.feature_len {
            return Err(FeatureError::LengthMismatch {
                expected: self.feature_len,
                actual: features.len(),
            });
        }
        self.frames.push_back(features);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    /// Shape `[1, len, feature_len]`, oldest frame first.
    pub fn snapshot(&self) -> Array3<f32> {
        let mut tensor = Array3::<f32>::zeros((1, self.frames.len(), self.feature_len));
        for (t, frame) in self.frames.iter().enumerate() {
            for (f, value) in frame.iter().enumerate() {
                tensor[[0, t, f]] = *value;
            }
        }
        tensor
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(v: f32) -> Vec<f32> {
        vec![v, v * 10.0]
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut window = FeatureWindow::new(3, 2);
        for i in 0..10 {
            window.push(frame(i as f32)).unwrap();
            assert!(window.len() <= 3);
        }
        assert!(window.is_full());
    }

    #[test]
    fn test_snapshot_keeps_last_w_in_push_order() {
        let mut window = FeatureWindow::new(3, 2);
        for i in 0..7 {
            window.push(frame(i as f32)).unwrap();
        }
        let snapshot = window.snapshot();
        assert_eq!(snapshot.shape(), &[1, 3, 2]);
        assert_eq!(snapshot[[0, 0, 0]], 4.0);
        assert_eq!(snapshot[[0, 1, 0]], 5.0);
        assert_eq!(snapshot[[0, 2, 0]], 6.0);
        assert_eq!(snapshot[[0, 2, 1]], 60.0);
    }

    #[test]
    fn test_not_full_until_capacity() {
        let mut window = FeatureWindow::new(3, 2);
        window.push(frame(1.0)).unwrap();
        window.push(frame(2.0)).unwrap();
        assert!(!window.is_full());
        assert_eq!(window.snapshot().shape(), &[1, 2, 2]);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let mut window = FeatureWindow::new(3, 2);
        assert_eq!(
            window.push(vec![1.0]),
            Err(FeatureError::LengthMismatch { expected: 2, actual: 1 })
        );
        assert!(window.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut window = FeatureWindow::new(2, 2);
        window.push(frame(1.0)).unwrap();
        window.push(frame(2.0)).unwrap();
        window.clear();
        assert!(window.is_empty());
        assert!(!window.is_full());
    }
}
