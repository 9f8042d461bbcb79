use std::io;

use super::capture::CaptureError;
use super::frame_reader::FrameError;
use super::sync_search::SyncError;
use crate::hardware::camera::InitError;

/// キャプチャ1回分の失敗をまとめたエラー
///
/// どの失敗もステータス行としてホストへ報告されます。
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error(transparent)]
    Init(#[from] InitError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("link error: {0}")]
    Link(#[from] io::Error),
}

impl CameraError {
    /// ホストへ送るステータス文言
    pub fn status_text(&self) -> String {
        match self {
            CameraError::Init(e) => init_status_text(e),
            CameraError::Capture(CaptureError::CaptureTimeout { .. }) => {
                "ERROR: Capture Timeout".to_string()
            }
            CameraError::Capture(CaptureError::BadFifoSize(_)) => "ERROR: Bad image size".to_string(),
            CameraError::Sync(SyncError::SyncFailed { .. }) => "ERROR: Sync Failed".to_string(),
            CameraError::Frame(FrameError::NoHeaderFound { .. }) => {
                "ERROR: No JPEG header found".to_string()
            }
            other => format!("ERROR: {}", other),
        }
    }
}

/// 初期化失敗のステータス文言
pub fn init_status_text(err: &InitError) -> String {
    match err {
        InitError::ControlBusFault { .. } => "ERROR: SPI interface Error!".to_string(),
        InitError::SensorNotFound { vid, pid, .. } => format!(
            "ERROR: Sensor not found (VID=0x{:02X}, PID=0x{:02X})",
            vid, pid
        ),
        other => format!("ERROR: {}", other),
    }
}
