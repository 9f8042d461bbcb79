//! 同期探索
//!
//! 16通りの DeviceMode を順に試し、FIFO 先頭のサンプルに既知の SOI パターンが
//! 現れる最初のモードをロックします。探索はロック中のモードから始めて一巡するため、
//! リンク状態が変わっていなければ再探索は同じモードを即座に再ロックします。

use std::ops::ControlFlow;

use log::{debug, info, warn};

use super::capture::{validate_fifo_length, CaptureSession, CaptureSettings, CaptureStatus};
use super::header::{find_header, HeaderMatch};
use crate::hardware::bus::{BusError, ControlInterface, SensorInterface};
use crate::hardware::camera::{CameraController, DeviceMode};
use crate::hardware::clock::Clock;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Bus(#[from] BusError),
    /// どのモードでもヘッダが見つからなかった
    #[error("no device mode produced a recognizable header ({modes_tried} modes tried)")]
    SyncFailed { modes_tried: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// モードごとの完了フラグ待ち上限
    pub fill_wait_ms: u64,
    pub poll_interval_ms: u32,
    /// 走査する FIFO 先頭のバイト数
    pub sample_bytes: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            fill_wait_ms: 1000,
            poll_interval_ms: 10,
            sample_bytes: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub mode: DeviceMode,
    pub header: HeaderMatch,
    pub modes_tried: u8,
}

#[derive(Debug, Clone)]
pub struct SyncSearch {
    settings: SyncSettings,
}

impl SyncSearch {
    pub fn new(settings: SyncSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// 全モードを探索する。失敗時はタイミングレジスタを探索前のモードに戻す
    pub fn run<B, S, C>(
        &self,
        camera: &mut CameraController<B, S, C>,
    ) -> Result<SyncOutcome, SyncError>
    where
        B: ControlInterface,
        S: SensorInterface,
        C: Clock,
    {
        let prior = camera.mode();
        let mut modes_tried = 0u8;

        for mode in prior.sweep_from() {
            modes_tried += 1;
            match self.probe_mode(camera, mode) {
                Ok(Some(header)) => {
                    info!(
                        "Sync locked on mode {} ({} header at offset {})",
                        mode, header.kind, header.offset
                    );
                    camera.lock_mode(mode, header);
                    return Ok(SyncOutcome {
                        mode,
                        header,
                        modes_tried,
                    });
                }
                Ok(None) => debug!("Mode {}: no header", mode),
                Err(e) => {
                    if let Err(restore) = camera.apply_mode(prior) {
                        warn!("Failed to restore mode {}: {}", prior, restore);
                    }
                    return Err(e.into());
                }
            }
        }

        warn!("Sync failed after {} modes, keeping mode {}", modes_tried, prior);
        camera.apply_mode(prior)?;
        Err(SyncError::SyncFailed { modes_tried })
    }

    /// 1モード分の試行: キャプチャして先頭をサンプルし、ヘッダを走査する
    fn probe_mode<B, S, C>(
        &self,
        camera: &mut CameraController<B, S, C>,
        mode: DeviceMode,
    ) -> Result<Option<HeaderMatch>, BusError>
    where
        B: ControlInterface,
        S: SensorInterface,
        C: Clock,
    {
        let mut session = CaptureSession::new(CaptureSettings {
            timeout_ms: self.settings.fill_wait_ms,
            poll_interval_ms: self.settings.poll_interval_ms,
            settle_ms: 0,
        });
        session.trigger(camera, mode)?;
        let result = session.await_fill(camera)?;

        if result.status == CaptureStatus::Timeout {
            camera.clear_fifo_flag()?;
            return Ok(None);
        }
        let Ok(length) = validate_fifo_length(result.byte_length) else {
            camera.clear_fifo_flag()?;
            return Ok(None);
        };

        let sample_len = self.settings.sample_bytes.min(length as usize);
        let mut sample = Vec::with_capacity(sample_len);
        let mut chunk = vec![0u8; sample_len];

        camera.reset_read_pointer()?;
        camera.control().burst_read(sample_len, &mut chunk, |bytes| {
            sample.extend_from_slice(bytes);
            ControlFlow::Continue(())
        })?;
        camera.clear_fifo_flag()?;

        Ok(find_header(&sample))
    }
}
