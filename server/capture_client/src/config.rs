use std::path::PathBuf;

use crate::client::ClientSettings;
use crate::config_validation::{
    parse_image_dir, parse_serial_port, validate_baud_rate, validate_idle_gap_ms,
    validate_min_image_bytes, validate_timeout_secs, ValidationError,
};

/// アプリケーション設定
///
/// この構造体はビルド時に`cfg.toml`ファイルから読み込まれた設定を保持します。
#[toml_cfg::toml_config]
pub struct Config {
    #[default("")]
    serial_port: &'static str,

    #[default(115200)]
    baud_rate: u32,

    #[default(15)]
    ready_timeout_secs: u32,

    #[default(10)]
    marker_timeout_secs: u32,

    #[default(60)]
    transfer_timeout_secs: u32,

    #[default(2000)]
    idle_gap_ms: u32,

    #[default(1000)]
    min_image_bytes: u32,

    #[default("images")]
    image_dir: &'static str,

    #[default(true)]
    resend_init_on_silence: bool,
}

/// 設定エラー
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ボーレートが無効です: {0}")]
    InvalidBaudRate(u32),
    #[error("{key} の値が無効です: {value}")]
    InvalidTimeout { key: &'static str, value: u32 },
    #[error("min_image_bytes の値が無効です (4以上): {0}")]
    InvalidMinImageBytes(u32),
    #[error("image_dir が空です")]
    EmptyImageDir,
}

/// アプリケーション設定を表す構造体
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` なら自動検出
    pub serial_port: Option<String>,
    pub baud_rate: u32,
    pub client: ClientSettings,
    pub image_dir: PathBuf,
}

impl AppConfig {
    /// 設定ファイルから設定をロードします
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_config(&CONFIG)
    }

    fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let client = ClientSettings {
            ready_timeout: validate_timeout_secs("ready_timeout_secs", config.ready_timeout_secs)
                .map_err(map_validation_error)?,
            marker_timeout: validate_timeout_secs(
                "marker_timeout_secs",
                config.marker_timeout_secs,
            )
            .map_err(map_validation_error)?,
            transfer_timeout: validate_timeout_secs(
                "transfer_timeout_secs",
                config.transfer_timeout_secs,
            )
            .map_err(map_validation_error)?,
            idle_gap: validate_idle_gap_ms(config.idle_gap_ms).map_err(map_validation_error)?,
            min_image_bytes: validate_min_image_bytes(config.min_image_bytes)
                .map_err(map_validation_error)?,
            resend_init_on_silence: config.resend_init_on_silence,
        };

        Ok(AppConfig {
            serial_port: parse_serial_port(config.serial_port),
            baud_rate: validate_baud_rate(config.baud_rate).map_err(map_validation_error)?,
            client,
            image_dir: parse_image_dir(config.image_dir).map_err(map_validation_error)?,
        })
    }
}

fn map_validation_error(err: ValidationError) -> ConfigError {
    match err {
        ValidationError::InvalidBaudRate(v) => ConfigError::InvalidBaudRate(v),
        ValidationError::InvalidTimeout { key, value } => ConfigError::InvalidTimeout { key, value },
        ValidationError::InvalidMinImageBytes(v) => ConfigError::InvalidMinImageBytes(v),
        ValidationError::EmptyImageDir => ConfigError::EmptyImageDir,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn raw() -> Config {
        Config {
            serial_port: "",
            baud_rate: 115200,
            ready_timeout_secs: 15,
            marker_timeout_secs: 10,
            transfer_timeout_secs: 60,
            idle_gap_ms: 2000,
            min_image_bytes: 1000,
            image_dir: "images",
            resend_init_on_silence: true,
        }
    }

    #[test]
    fn test_defaults_convert() {
        let config = AppConfig::from_config(&raw()).unwrap();
        assert_eq!(config.serial_port, None);
        assert_eq!(config.client.transfer_timeout, Duration::from_secs(60));
        assert_eq!(config.client.idle_gap, Duration::from_millis(2000));
        assert_eq!(config.image_dir, PathBuf::from("images"));
    }

    #[test]
    fn test_invalid_timeout_names_key() {
        let mut bad = raw();
        bad.marker_timeout_secs = 0;
        match AppConfig::from_config(&bad) {
            Err(ConfigError::InvalidTimeout { key, value }) => {
                assert_eq!(key, "marker_timeout_secs");
                assert_eq!(value, 0);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
