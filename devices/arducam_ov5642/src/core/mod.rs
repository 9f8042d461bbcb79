pub mod app_controller;
pub mod capture;
pub mod config;
pub mod config_validation;
pub mod error;
pub mod frame_reader;
pub mod header;
pub mod poll;
pub mod retry_policy;
pub mod sync_search;

pub use app_controller::{AppController, LoopControl, StartupOutcome};
pub use capture::{CaptureError, CaptureResult, CaptureSession, CaptureSettings, CaptureStatus};
pub use config::{AppConfig, ConfigError, PipelineSettings, Wiring};
pub use error::CameraError;
pub use frame_reader::{EoiPolicy, FrameError, FrameReader, FrameSummary, ReaderSettings};
pub use header::{find_header, CorruptionKind, HeaderMatch};
pub use sync_search::{SyncError, SyncOutcome, SyncSearch, SyncSettings};
