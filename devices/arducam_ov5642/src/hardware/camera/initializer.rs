//! センサ初期化
//!
//! 各ステージは独立した `Result` を返し、呼び出し側へ明示的に伝播します。
//! 停止して外部介入を待つか続行するかは最上位の呼び出し側だけが判断します。

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use super::controller::CameraController;
use super::registers::*;
use super::tables::{post_init_fixups, RegisterTable, SentinelPolicy, TableError};
use crate::core::retry_policy::probe_retry_delay_ms;
use crate::hardware::bus::{BusError, ControlInterface, SensorInterface};
use crate::hardware::clock::Clock;

const SENSOR_HOLD_MS: u32 = 50;
const SENSOR_RELEASE_MS: u32 = 200;
const CPLD_RESET_MS: u32 = 100;
const SOFT_RESET_MS: u32 = 100;
const TABLE_SETTLE_MS: u32 = 100;
const CONTROL_BUS_CHECKS: u8 = 3;

/// 初期化のエラー
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    Bus(#[from] BusError),
    /// SPI テストレジスタの読み戻しが一致しない
    #[error("control bus self-test failed (wrote 0x55, read 0x{read:02X})")]
    ControlBusFault { read: u8 },
    /// チップIDが一致しない
    #[error("sensor not found after {attempts} attempts (VID=0x{vid:02X}, PID=0x{pid:02X})")]
    SensorNotFound { vid: u8, pid: u8, attempts: u8 },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// 初期化の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub revision: u8,
    pub probe_attempts: u8,
    /// 読み込んだテーブル名と書き込んだエントリ数
    pub tables: Vec<(String, usize)>,
}

pub struct SensorInitializer {
    tables: Vec<RegisterTable>,
    probe_retries: u8,
}

impl SensorInitializer {
    /// `tables` は与えた順序で読み込まれ、最後に固定の補正が適用されます
    pub fn new(tables: Vec<RegisterTable>, probe_retries: u8) -> Self {
        Self {
            tables,
            probe_retries: probe_retries.max(1),
        }
    }

    pub fn tables(&self) -> &[RegisterTable] {
        &self.tables
    }

    /// 初期化シーケンス全体を実行
    pub fn initialize<B, S, C>(
        &self,
        camera: &mut CameraController<B, S, C>,
    ) -> Result<InitReport, InitError>
    where
        B: ControlInterface,
        S: SensorInterface,
        C: Clock,
    {
        self.reset(camera)?;
        self.verify_control_bus(camera)?;

        let revision = camera.revision()?;
        info!("CPLD revision: 0x{:02X}", revision);

        let probe_attempts = self.probe_sensor_id(camera)?;
        self.soft_reset_sensor(camera)?;

        let mut loaded = Vec::with_capacity(self.tables.len() + 1);
        for table in &self.tables {
            let written = self.load_table(camera, table)?;
            loaded.push((table.name().to_string(), written));
            camera.delay_ms(TABLE_SETTLE_MS);
        }
        let fixups = post_init_fixups();
        let written = self.load_table(camera, &fixups)?;
        loaded.push((fixups.name().to_string(), written));

        camera.control().write_register(ARDUCHIP_FRAMES, 0x00)?;
        camera.clear_fifo_flag()?;
        self.apply_clock_polarity_fix(camera)?;
        camera.wake_sensor()?;

        Ok(InitReport {
            revision,
            probe_attempts,
            tables: loaded,
        })
    }

    /// センサ電源/リセットと CPLD のリセット
    pub fn reset<B, S, C>(&self, camera: &mut CameraController<B, S, C>) -> Result<(), InitError>
    where
        B: ControlInterface,
        S: SensorInterface,
        C: Clock,
    {
        debug!("Resetting sensor and CPLD");
        camera.control().write_register(ARDUCHIP_GPIO, GPIO_SENSOR_HOLD)?;
        camera.delay_ms(SENSOR_HOLD_MS);
        camera.control().write_register(ARDUCHIP_GPIO, GPIO_SENSOR_RELEASE)?;
        camera.delay_ms(SENSOR_RELEASE_MS);

        camera.control().write_register(ARDUCHIP_RESET, CPLD_RESET_ASSERT)?;
        camera.delay_ms(CPLD_RESET_MS);
        camera.control().write_register(ARDUCHIP_RESET, CPLD_RESET_RELEASE)?;
        camera.delay_ms(CPLD_RESET_MS);
        Ok(())
    }

    /// SPI テストレジスタに 0x55 を書いて読み戻す
    pub fn verify_control_bus<B, S, C>(
        &self,
        camera: &mut CameraController<B, S, C>,
    ) -> Result<(), InitError>
    where
        B: ControlInterface,
        S: SensorInterface,
        C: Clock,
    {
        let mut read = 0;
        for attempt in 1..=CONTROL_BUS_CHECKS {
            camera.control().write_register(ARDUCHIP_TEST1, TEST_PATTERN)?;
            read = camera.control().read_register(ARDUCHIP_TEST1)?;
            if read == TEST_PATTERN {
                debug!("SPI interface OK (attempt {})", attempt);
                return Ok(());
            }
            warn!("SPI interface check {} failed: read 0x{:02X}", attempt, read);
            camera.delay_ms(probe_retry_delay_ms(attempt));
        }
        Err(InitError::ControlBusFault { read })
    }

    /// チップIDの確認。一致するまで `probe_retries` 回まで再試行し、試行回数を返す
    pub fn probe_sensor_id<B, S, C>(
        &self,
        camera: &mut CameraController<B, S, C>,
    ) -> Result<u8, InitError>
    where
        B: ControlInterface,
        S: SensorInterface,
        C: Clock,
    {
        let (mut vid, mut pid) = (0, 0);
        for attempt in 1..=self.probe_retries {
            match read_chip_id(camera) {
                Ok((v, p)) if v == OV5642_EXPECTED_VID && p == OV5642_EXPECTED_PID => {
                    info!("OV5642 detected (attempt {})", attempt);
                    return Ok(attempt);
                }
                Ok((v, p)) => {
                    warn!(
                        "Unexpected chip id VID=0x{:02X} PID=0x{:02X} (attempt {}/{})",
                        v, p, attempt, self.probe_retries
                    );
                    (vid, pid) = (v, p);
                }
                Err(BusError::BusTimeout { addr }) => {
                    warn!(
                        "Sensor did not acknowledge 0x{:04X} (attempt {}/{})",
                        addr, attempt, self.probe_retries
                    );
                }
                Err(e) => return Err(e.into()),
            }
            if attempt < self.probe_retries {
                camera.delay_ms(probe_retry_delay_ms(attempt));
            }
        }
        Err(InitError::SensorNotFound {
            vid,
            pid,
            attempts: self.probe_retries,
        })
    }

    fn soft_reset_sensor<B, S, C>(
        &self,
        camera: &mut CameraController<B, S, C>,
    ) -> Result<(), InitError>
    where
        B: ControlInterface,
        S: SensorInterface,
        C: Clock,
    {
        camera
            .sensor()
            .write_register(OV5642_SYSTEM_CTRL0, SYSTEM_SOFT_RESET)?;
        camera.delay_ms(SOFT_RESET_MS);
        Ok(())
    }

    /// テーブルを順に書き込み、書き込んだエントリ数を返す
    pub fn load_table<B, S, C>(
        &self,
        camera: &mut CameraController<B, S, C>,
        table: &RegisterTable,
    ) -> Result<usize, InitError>
    where
        B: ControlInterface,
        S: SensorInterface,
        C: Clock,
    {
        let mut written = 0;
        for entry in table.entries() {
            if entry.is_sentinel() {
                match table.sentinel() {
                    SentinelPolicy::Stop => break,
                    SentinelPolicy::Delay { ms } => {
                        camera.delay_ms(ms);
                        continue;
                    }
                }
            }
            camera.sensor().write_register(entry.addr, entry.value)?;
            written += 1;
        }
        debug!("Loaded table '{}': {} registers", table.name(), written);
        Ok(written)
    }

    /// VSYNC 極性の補正 (タイミングレジスタのビット1を立てる)。何度実行しても同じ結果
    pub fn apply_clock_polarity_fix<B, S, C>(
        &self,
        camera: &mut CameraController<B, S, C>,
    ) -> Result<(), InitError>
    where
        B: ControlInterface,
        S: SensorInterface,
        C: Clock,
    {
        let tim = camera.control().read_register(ARDUCHIP_TIM)?;
        camera
            .control()
            .write_register(ARDUCHIP_TIM, tim | VSYNC_LEVEL_MASK)?;
        Ok(())
    }
}

fn read_chip_id<B, S, C>(camera: &mut CameraController<B, S, C>) -> Result<(u8, u8), BusError>
where
    B: ControlInterface,
    S: SensorInterface,
    C: Clock,
{
    let vid = camera.sensor().read_register(OV5642_CHIPID_HIGH)?;
    let pid = camera.sensor().read_register(OV5642_CHIPID_LOW)?;
    Ok((vid, pid))
}
