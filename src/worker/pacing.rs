use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

/// 目標 FPS から最小フレーム間隔を求める
///
/// 0 以下・NaN、または間隔が `Duration` で表せないほど小さい FPS は None。
pub fn frame_interval(fps: f32) -> Option<Duration> {
    if !(fps > 0.0) {
        return None;
    }
    Duration::try_from_secs_f32(1.0 / fps).ok()
}

/// フレームレート上限を守るためのクロック
pub struct FrameClock {
    last: Instant,
}

impl FrameClock {
    pub fn new(now: Instant) -> Self {
        Self { last: now }
    }

    /// 前フレームから `min_interval` 経過するまで待つ。待った後の時刻を返す
    pub fn pace(&mut self, min_interval: Duration) -> Instant {
        let elapsed = self.last.elapsed();
        if elapsed < min_interval {
            thread::sleep(min_interval - elapsed);
        }
        self.last = Instant::now();
        self.last
    }
}

/// 直近のフレーム間隔から FPS を計算
pub struct FpsMeter {
    intervals: VecDeque<f32>,
    capacity: usize,
    last: Option<Instant>,
}

impl FpsMeter {
    pub fn new(capacity: usize) -> Self {
        Self {
            intervals: VecDeque::with_capacity(capacity),
            capacity: capacity.max(2),
            last: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// 間隔が2つ以上たまったら FPS を返す
    pub fn tick(&mut self, now: Instant) -> Option<f32> {
        if let Some(last) = self.last {
            self.intervals.push_back(now.duration_since(last).as_secs_f32());
            if self.intervals.len() > self.capacity {
                self.intervals.pop_front();
            }
        }
        self.last = Some(now);

        if self.intervals.len() < 2 {
            return None;
        }
        let total: f32 = self.intervals.iter().sum();
        if total <= 0.0 {
            return None;
        }
        Some(self.intervals.len() as f32 / total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_needs_two_intervals() {
        let t0 = Instant::now();
        let mut meter = FpsMeter::new(30);
        meter.start(t0);
        assert_eq!(meter.tick(t0 + Duration::from_millis(100)), None);
        let fps = meter.tick(t0 + Duration::from_millis(200)).unwrap();
        assert!((fps - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_fps_history_is_bounded() {
        let t0 = Instant::now();
        let mut meter = FpsMeter::new(2);
        meter.start(t0);
        meter.tick(t0 + Duration::from_millis(500));
        meter.tick(t0 + Duration::from_millis(1000));
        // 古い 500ms 間隔は捨てられ 100ms 間隔2つだけが残る
        meter.tick(t0 + Duration::from_millis(1100));
        let fps = meter.tick(t0 + Duration::from_millis(1200)).unwrap();
        assert!((fps - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_frame_interval_limits() {
        assert_eq!(frame_interval(4.0), Some(Duration::from_millis(250)));
        assert_eq!(frame_interval(0.0), None);
        assert_eq!(frame_interval(-5.0), None);
        assert_eq!(frame_interval(f32::NAN), None);
        assert_eq!(frame_interval(1e-20), None);
    }

    #[test]
    fn test_clock_enforces_minimum_interval() {
        let start = Instant::now();
        let mut clock = FrameClock::new(start);
        clock.pace(Duration::from_millis(30));
        clock.pace(Duration::from_millis(30));
        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
