//! キャプチャ状態機械
//!
//! `Idle → Triggered → Awaiting → {Done | TimedOut}`
//!
//! タイムアウトは報告のみで自動再試行はしません。どの結果でも FIFO の完了フラグは
//! クリアしてから制御を返します。

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use super::poll::{poll_with_timeout, PollOutcome};
use crate::hardware::bus::{BusError, BusResult, ControlInterface, SensorInterface};
use crate::hardware::camera::{CameraController, DeviceMode};
use crate::hardware::clock::Clock;

/// 長さレジスタで表現できる最大値。この値以上は不正なサイズとして扱う
pub const MAX_FIFO_LENGTH: u32 = 0x7F_FFFF;

/// 3つの長さレジスタから FIFO 長を復元する (最上位バイトは下位7ビットのみ有効)
pub fn decode_fifo_length(b1: u8, b2: u8, b3: u8) -> u32 {
    (u32::from(b3 & 0x7F) << 16) | (u32::from(b2) << 8) | u32::from(b1)
}

/// 読み出し可能な長さか確認する
pub fn validate_fifo_length(length: u32) -> Result<u32, CaptureError> {
    if length == 0 || length >= MAX_FIFO_LENGTH {
        Err(CaptureError::BadFifoSize(length))
    } else {
        Ok(length)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Bus(#[from] BusError),
    /// 完了フラグが上限時間内に立たなかった
    #[error("capture did not complete within {elapsed_ms} ms")]
    CaptureTimeout { elapsed_ms: u64 },
    /// 長さが 0 または最大値以上
    #[error("bad FIFO size: {0}")]
    BadFifoSize(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Done,
    Timeout,
}

/// 1回のキャプチャ結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureResult {
    /// FIFO に格納されたバイト数 (23ビット)
    pub byte_length: u32,
    pub status: CaptureStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Triggered,
    Awaiting { started_ms: u64 },
    Done { length: u32 },
    TimedOut { elapsed_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// 完了フラグ待ちの上限
    pub timeout_ms: u64,
    pub poll_interval_ms: u32,
    /// 完了後、長さを読む前の CPLD 安定待ち
    pub settle_ms: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            poll_interval_ms: 10,
            settle_ms: 50,
        }
    }
}

#[derive(Debug)]
pub struct CaptureSession {
    settings: CaptureSettings,
    state: CaptureState,
}

impl CaptureSession {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            state: CaptureState::Idle,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// ロック中のモードでキャプチャを開始し、完了を待って長さを検証する
    pub fn run<B, S, C>(
        &mut self,
        camera: &mut CameraController<B, S, C>,
    ) -> Result<CaptureResult, CaptureError>
    where
        B: ControlInterface,
        S: SensorInterface,
        C: Clock,
    {
        let mode = camera.mode();
        self.trigger(camera, mode)?;
        let result = self.await_fill(camera)?;

        match result.status {
            CaptureStatus::Timeout => {
                camera.clear_fifo_flag()?;
                let elapsed_ms = match self.state {
                    CaptureState::TimedOut { elapsed_ms } => elapsed_ms,
                    _ => self.settings.timeout_ms,
                };
                warn!("Capture timeout after {} ms", elapsed_ms);
                Err(CaptureError::CaptureTimeout { elapsed_ms })
            }
            CaptureStatus::Done => match validate_fifo_length(result.byte_length) {
                Ok(_) => Ok(result),
                Err(e) => {
                    warn!("Bad FIFO length: {}", result.byte_length);
                    camera.clear_fifo_flag()?;
                    Err(e)
                }
            },
        }
    }

    /// `Idle → Triggered`: フラグクリア、ポインタリセット、キャプチャ開始
    pub fn trigger<B, S, C>(
        &mut self,
        camera: &mut CameraController<B, S, C>,
        mode: DeviceMode,
    ) -> BusResult<()>
    where
        B: ControlInterface,
        S: SensorInterface,
        C: Clock,
    {
        camera.wake_sensor()?;
        camera.apply_mode(mode)?;
        camera.clear_fifo_flag()?;
        camera.reset_fifo_pointers()?;
        camera.clear_fifo_flag()?;
        camera.start_capture()?;
        debug!("Capture triggered (mode {})", mode);
        self.state = CaptureState::Triggered;
        Ok(())
    }

    /// `Triggered → Awaiting → {Done | TimedOut}`
    pub fn await_fill<B, S, C>(
        &mut self,
        camera: &mut CameraController<B, S, C>,
    ) -> BusResult<CaptureResult>
    where
        B: ControlInterface,
        S: SensorInterface,
        C: Clock,
    {
        self.state = CaptureState::Awaiting {
            started_ms: camera.now_ms(),
        };

        let outcome = poll_with_timeout(
            camera,
            self.settings.poll_interval_ms,
            self.settings.timeout_ms,
            |cam| Ok::<_, BusError>(cam.capture_done()?.then_some(())),
        )?;

        match outcome {
            PollOutcome::Done(()) => {
                camera.delay_ms(self.settings.settle_ms);
                let (b1, b2, b3) = camera.read_fifo_length_bytes()?;
                let length = decode_fifo_length(b1, b2, b3);
                debug!("Capture done: {} bytes", length);
                self.state = CaptureState::Done { length };
                Ok(CaptureResult {
                    byte_length: length,
                    status: CaptureStatus::Done,
                })
            }
            PollOutcome::TimedOut { elapsed_ms } => {
                self.state = CaptureState::TimedOut { elapsed_ms };
                Ok(CaptureResult {
                    byte_length: 0,
                    status: CaptureStatus::Timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fifo_length() {
        assert_eq!(decode_fifo_length(0x34, 0x12, 0x05), 0x05_1234);
        assert_eq!(decode_fifo_length(0xFF, 0xFF, 0x7F), MAX_FIFO_LENGTH);
    }

    #[test]
    fn test_decode_ignores_stray_top_bit() {
        assert_eq!(
            decode_fifo_length(0x01, 0x02, 0x83),
            decode_fifo_length(0x01, 0x02, 0x03)
        );
    }

    #[test]
    fn test_length_bounds() {
        assert!(matches!(validate_fifo_length(0), Err(CaptureError::BadFifoSize(0))));
        assert!(matches!(
            validate_fifo_length(0x7F_FFFF),
            Err(CaptureError::BadFifoSize(0x7F_FFFF))
        ));
        assert!(validate_fifo_length(0x80_0000).is_err());
        assert_eq!(validate_fifo_length(0x7F_FFFE).unwrap(), 0x7F_FFFE);
        assert_eq!(validate_fifo_length(1).unwrap(), 1);
    }
}
