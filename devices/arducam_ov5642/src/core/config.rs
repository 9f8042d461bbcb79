use std::path::PathBuf;

use crate::core::capture::CaptureSettings;
use crate::core::config_validation::{
    parse_eoi_policy, parse_frame_size, parse_table_dir, validate_baud_rate, validate_chunk_size,
    validate_probe_retries, validate_sample_bytes, validate_timeout_ms, ValidationError,
};
use crate::core::frame_reader::ReaderSettings;
use crate::core::sync_search::SyncSettings;
use crate::hardware::camera::tables::{load_register_tables, TableError};
use crate::hardware::camera::{FrameSize, RegisterTable};

/// アプリケーション設定
///
/// この構造体はビルド時に`cfg.toml`ファイルから読み込まれた設定を保持します。
#[toml_cfg::toml_config]
pub struct Config {
    #[default("QSXGA")]
    frame_size: &'static str,

    #[default("")]
    table_dir: &'static str,

    #[default(5000)]
    capture_timeout_ms: u32,

    #[default(10)]
    capture_poll_interval_ms: u32,

    #[default(1000)]
    sync_fill_wait_ms: u32,

    #[default(1024)]
    sync_sample_bytes: u32,

    #[default(2048)]
    header_sample_bytes: u32,

    #[default(4096)]
    chunk_size: u32,

    #[default(5)]
    probe_retries: u8,

    #[default("canonical")]
    eoi_policy: &'static str,

    #[default("/dev/spidev0.0")]
    spi_device: &'static str,

    #[default(2000000)]
    spi_speed_hz: u32,

    #[default("/dev/i2c-1")]
    i2c_device: &'static str,

    #[default("/dev/gpiochip0")]
    cs_gpio_chip: &'static str,

    #[default(8)]
    cs_gpio_line: u32,

    #[default("/dev/ttyGS0")]
    link_port: &'static str,

    #[default(115200)]
    link_baud_rate: u32,
}

/// 設定エラー
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("未対応のフレームサイズ: {0}")]
    InvalidFrameSize(String),
    #[error("未対応の EOI 判定方式 (canonical | transformed): {0}")]
    InvalidEoiPolicy(String),
    #[error("タイムアウト値が無効です (1-120000 ms): {0}")]
    InvalidTimeout(u32),
    #[error("chunk_size の値が無効です (64-65536): {0}")]
    InvalidChunkSize(u32),
    #[error("サンプル長が無効です (2-65536): {0}")]
    InvalidSampleBytes(u32),
    #[error("probe_retries の値が無効です (1-20): {0}")]
    InvalidProbeRetries(u8),
    #[error("ボーレートが無効です: {0}")]
    InvalidBaudRate(u32),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Linux SBC 上での配線
#[derive(Debug, Clone)]
pub struct Wiring {
    pub spi_device: String,
    pub spi_speed_hz: u32,
    pub i2c_device: String,
    pub cs_gpio_chip: String,
    pub cs_gpio_line: u32,
    pub link_port: String,
    pub link_baud_rate: u32,
}

/// キャプチャパイプラインの設定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineSettings {
    pub capture: CaptureSettings,
    pub sync: SyncSettings,
    pub reader: ReaderSettings,
}

/// アプリケーション設定を表す構造体
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// JPEG 出力解像度
    pub frame_size: FrameSize,

    /// ベンダーレジスタテーブルのディレクトリ
    pub table_dir: Option<PathBuf>,

    pub pipeline: PipelineSettings,

    /// センサID確認の最大試行回数
    pub probe_retries: u8,

    pub wiring: Wiring,
}

impl AppConfig {
    /// 設定ファイルから設定をロードします
    pub fn load() -> Result<Self, ConfigError> {
        // toml_cfg によって生成された定数
        Self::from_config(&CONFIG)
    }

    fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let frame_size = parse_frame_size(config.frame_size).map_err(map_validation_error)?;
        let table_dir = parse_table_dir(config.table_dir);

        let capture = CaptureSettings {
            timeout_ms: validate_timeout_ms(config.capture_timeout_ms)
                .map_err(map_validation_error)?,
            poll_interval_ms: config.capture_poll_interval_ms.max(1),
            ..CaptureSettings::default()
        };

        let sync = SyncSettings {
            fill_wait_ms: validate_timeout_ms(config.sync_fill_wait_ms)
                .map_err(map_validation_error)?,
            poll_interval_ms: config.capture_poll_interval_ms.max(1),
            sample_bytes: validate_sample_bytes(config.sync_sample_bytes)
                .map_err(map_validation_error)?,
        };

        let reader = ReaderSettings {
            header_sample_bytes: validate_sample_bytes(config.header_sample_bytes)
                .map_err(map_validation_error)?,
            chunk_size: validate_chunk_size(config.chunk_size).map_err(map_validation_error)?,
            eoi_policy: parse_eoi_policy(config.eoi_policy).map_err(map_validation_error)?,
        };

        let probe_retries =
            validate_probe_retries(config.probe_retries).map_err(map_validation_error)?;

        let wiring = Wiring {
            spi_device: config.spi_device.to_string(),
            spi_speed_hz: config.spi_speed_hz,
            i2c_device: config.i2c_device.to_string(),
            cs_gpio_chip: config.cs_gpio_chip.to_string(),
            cs_gpio_line: config.cs_gpio_line,
            link_port: config.link_port.to_string(),
            link_baud_rate: validate_baud_rate(config.link_baud_rate)
                .map_err(map_validation_error)?,
        };

        Ok(AppConfig {
            frame_size,
            table_dir,
            pipeline: PipelineSettings {
                capture,
                sync,
                reader,
            },
            probe_retries,
            wiring,
        })
    }

    /// 設定に従ってレジスタテーブルを読み込む
    pub fn register_tables(&self) -> Result<Vec<RegisterTable>, ConfigError> {
        Ok(load_register_tables(
            self.table_dir.as_deref(),
            self.frame_size,
        )?)
    }
}

fn map_validation_error(err: ValidationError) -> ConfigError {
    match err {
        ValidationError::UnknownFrameSize(v) => ConfigError::InvalidFrameSize(v),
        ValidationError::UnknownEoiPolicy(v) => ConfigError::InvalidEoiPolicy(v),
        ValidationError::InvalidTimeout(v) => ConfigError::InvalidTimeout(v),
        ValidationError::InvalidChunkSize(v) => ConfigError::InvalidChunkSize(v),
        ValidationError::InvalidSampleBytes(v) => ConfigError::InvalidSampleBytes(v),
        ValidationError::InvalidProbeRetries(v) => ConfigError::InvalidProbeRetries(v),
        ValidationError::InvalidBaudRate(v) => ConfigError::InvalidBaudRate(v),
    }
}
