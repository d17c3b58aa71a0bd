//! Capture worker - camera, pose and classifier on a background thread

pub mod capture;
pub mod events;
pub mod factory;
pub mod pacing;

#[cfg(test)]
pub(crate) mod testing;

pub use capture::{
    CaptureSettings, CaptureWorker, ModelLoader, Models, SourceOpener, WorkerParts, WorkerState,
};
pub use events::WorkerEvent;
#[cfg(feature = "desktop")]
pub use factory::OnnxWorkerFactory;
pub use factory::WorkerFactory;
pub use pacing::{frame_interval, FpsMeter, FrameClock};
