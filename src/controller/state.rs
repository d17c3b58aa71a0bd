use std::time::Instant;

/// 反復の進捗。`current_rep` は 1 始まり、0 は未開始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepProgress {
    pub current_rep: u32,
    pub total_reps: u32,
}

impl RepProgress {
    pub fn new(current_rep: u32, total_reps: u32) -> Self {
        Self { current_rep, total_reps }
    }

    /// 未開始でも全完了でもない
    pub fn is_mid_repetition(&self) -> bool {
        self.current_rep >= 1 && self.current_rep <= self.total_reps
    }
}

/// 反復コントローラの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Countdown { remaining: u32, next_tick: Instant },
    Capturing { guide_started: bool },
    RepBoundary,
    AllComplete,
}

impl Phase {
    /// 開始ボタンを受け付けない状態
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Countdown { .. } | Phase::Capturing { .. })
    }
}

/// 反復ボタンの表示状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepState {
    Completed,
    Current,
    Upcoming,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mid_repetition() {
        assert!(!RepProgress::new(0, 5).is_mid_repetition());
        assert!(RepProgress::new(1, 5).is_mid_repetition());
        assert!(RepProgress::new(2, 5).is_mid_repetition());
        assert!(RepProgress::new(5, 5).is_mid_repetition());
        assert!(!RepProgress::new(6, 5).is_mid_repetition());
    }
}
