use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

use crate::camera::Frame;
use crate::classifier::Prediction;

/// キャプチャスレッド → UI スレッドのイベント
#[derive(Debug)]
pub enum WorkerEvent {
    /// 注釈済みフレームと、その時点の判定・FPS
    Frame {
        frame: Frame,
        prediction: Prediction,
        fps: Option<f32>,
    },
    /// 十分な姿勢フレームが集まった (1回だけ)
    WarmedUp,
    /// カメラが使えずループを終了した
    Failed(String),
    /// ループ終了
    Finished,
}

const CONTROL_RETRY: Duration = Duration::from_millis(5);

/// イベント送信。フレームは UI が追いつかなければ捨て、
/// 制御イベントは停止要求が来るまで再送する
pub(crate) struct EventPublisher {
    tx: SyncSender<WorkerEvent>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl EventPublisher {
    pub fn new(tx: SyncSender<WorkerEvent>, running: Arc<AtomicBool>, dropped: Arc<AtomicU64>) -> Self {
        Self { tx, running, dropped }
    }

    /// 受信側が閉じていれば false
    pub fn frame(&self, event: WorkerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if n % 100 == 1 {
                    debug!("UI is behind, dropped {} frame events", n);
                }
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn control(&self, mut event: WorkerEvent) -> bool {
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return true,
                Err(TrySendError::Full(e)) => {
                    if !self.running.load(Ordering::Acquire) {
                        return false;
                    }
                    event = e;
                    thread::sleep(CONTROL_RETRY);
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    /// 終了通知。キューが満杯なら諦める
    pub fn finished(&self) {
        let _ = self.tx.try_send(WorkerEvent::Finished);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    fn publisher(capacity: usize, running: bool) -> (EventPublisher, std::sync::mpsc::Receiver<WorkerEvent>, Arc<AtomicU64>) {
        let (tx, rx) = sync_channel(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let p = EventPublisher::new(tx, Arc::new(AtomicBool::new(running)), dropped.clone());
        (p, rx, dropped)
    }

    fn frame_event() -> WorkerEvent {
        WorkerEvent::Frame {
            frame: Frame::filled(1, 1, [0, 0, 0]),
            prediction: Prediction::Waiting,
            fps: None,
        }
    }

    #[test]
    fn test_frames_are_dropped_when_full() {
        let (p, rx, dropped) = publisher(1, true);
        assert!(p.frame(frame_event()));
        assert!(p.frame(frame_event()));
        assert_eq!(dropped.load(Ordering::Relaxed), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_control_gives_up_when_stopping() {
        let (p, _rx, _) = publisher(1, false);
        assert!(p.frame(frame_event()));
        assert!(!p.control(WorkerEvent::WarmedUp));
    }

    #[test]
    fn test_disconnected_receiver() {
        let (p, rx, _) = publisher(1, true);
        drop(rx);
        assert!(!p.frame(frame_event()));
        assert!(!p.control(WorkerEvent::WarmedUp));
    }
}
