use std::fmt;

use embedded_hal::delay::DelayNs;
use log::debug;

use super::registers::*;
use crate::core::header::HeaderMatch;
use crate::hardware::bus::{BusResult, ControlInterface, SensorInterface};
use crate::hardware::clock::Clock;

/// CPLD のクロック/ビット位相設定 (タイミングレジスタ下位4ビット, 0..=15)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceMode(u8);

impl DeviceMode {
    pub const COUNT: u8 = 16;

    /// 起動時のモード。VSYNC 極性補正 (0x02) と同じビット配置
    pub const DEFAULT: DeviceMode = DeviceMode(VSYNC_LEVEL_MASK);

    pub fn new(bits: u8) -> Option<Self> {
        (bits < Self::COUNT).then_some(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// このモードから始めて全16モードを一巡する
    pub fn sweep_from(self) -> impl Iterator<Item = DeviceMode> {
        (0..Self::COUNT).map(move |i| DeviceMode((self.0 + i) % Self::COUNT))
    }
}

impl Default for DeviceMode {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// ArduCAM カメラのコントローラ
///
/// 2本のバスとクロックを所有し、ロック中の `DeviceMode` と直近の同期結果を保持します。
/// 同期探索・キャプチャ・フレーム読み出しはこのオブジェクトへの参照を受け取って逐次実行されます。
pub struct CameraController<B, S, C> {
    control: B,
    sensor: S,
    clock: C,
    mode: DeviceMode,
    last_match: Option<HeaderMatch>,
}

impl<B, S, C> CameraController<B, S, C>
where
    B: ControlInterface,
    S: SensorInterface,
    C: Clock,
{
    pub fn new(control: B, sensor: S, clock: C) -> Self {
        Self {
            control,
            sensor,
            clock,
            mode: DeviceMode::DEFAULT,
            last_match: None,
        }
    }

    /// ロック中のモード
    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    /// 直近の同期で検出したヘッダ
    pub fn last_match(&self) -> Option<HeaderMatch> {
        self.last_match
    }

    pub fn is_synced(&self) -> bool {
        self.last_match.is_some()
    }

    /// 同期成功時にモードをロックする
    pub(crate) fn lock_mode(&mut self, mode: DeviceMode, header: HeaderMatch) {
        debug!("DeviceMode locked: {} ({:?})", mode, header);
        self.mode = mode;
        self.last_match = Some(header);
    }

    /// 再初期化時に同期状態を破棄する
    pub fn forget_sync(&mut self) {
        self.mode = DeviceMode::DEFAULT;
        self.last_match = None;
    }

    pub fn control(&mut self) -> &mut B {
        &mut self.control
    }

    pub fn sensor(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn clock(&mut self) -> &mut C {
        &mut self.clock
    }

    /// タイミングレジスタの下位4ビットを書き換える (上位ビットは保持)
    ///
    /// VSYNC 極性ビット (0x02) は下位4ビットに含まれるため、モード適用後は
    /// モードのビット1がそのまま極性になります。初期化時の極性補正はモードを
    /// 適用するまでの値です。
    pub fn apply_mode(&mut self, mode: DeviceMode) -> BusResult<()> {
        let tim = self.control.read_register(ARDUCHIP_TIM)?;
        self.control
            .write_register(ARDUCHIP_TIM, (tim & !MODE_BITS_MASK) | mode.bits())
    }

    pub fn clear_fifo_flag(&mut self) -> BusResult<()> {
        self.control.write_register(ARDUCHIP_FIFO, FIFO_CLEAR_MASK)
    }

    pub fn reset_read_pointer(&mut self) -> BusResult<()> {
        self.control.write_register(ARDUCHIP_FIFO, FIFO_RDPTR_RST_MASK)
    }

    pub fn reset_fifo_pointers(&mut self) -> BusResult<()> {
        self.reset_read_pointer()?;
        self.control.write_register(ARDUCHIP_FIFO, FIFO_WRPTR_RST_MASK)
    }

    pub fn start_capture(&mut self) -> BusResult<()> {
        self.control.write_register(ARDUCHIP_FIFO, FIFO_START_MASK)
    }

    /// キャプチャ完了フラグ
    pub fn capture_done(&mut self) -> BusResult<bool> {
        Ok(self.control.read_register(ARDUCHIP_TRIG)? & CAP_DONE_MASK != 0)
    }

    /// 長さレジスタ3つの生の値 (b1, b2, b3)
    pub fn read_fifo_length_bytes(&mut self) -> BusResult<(u8, u8, u8)> {
        let b1 = self.control.read_register(FIFO_SIZE1)?;
        let b2 = self.control.read_register(FIFO_SIZE2)?;
        let b3 = self.control.read_register(FIFO_SIZE3)?;
        Ok((b1, b2, b3))
    }

    pub fn revision(&mut self) -> BusResult<u8> {
        self.control.read_register(ARDUCHIP_REV)
    }

    /// センサのスリープ解除とテストパターン無効化 (レジスタ内容は保持)
    pub fn wake_sensor(&mut self) -> BusResult<()> {
        self.sensor.write_register(OV5642_SYSTEM_CTRL0, SYSTEM_AWAKE)?;
        self.sensor
            .write_register(OV5642_TEST_PATTERN, TEST_PATTERN_DISABLED)
    }
}

impl<B, S, C: Clock> DelayNs for CameraController<B, S, C> {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.delay_ns(ns);
    }
}

impl<B, S, C: Clock> Clock for CameraController<B, S, C> {
    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}
