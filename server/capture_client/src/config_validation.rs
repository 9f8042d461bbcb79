use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    InvalidBaudRate(u32),
    InvalidTimeout { key: &'static str, value: u32 },
    InvalidMinImageBytes(u32),
    EmptyImageDir,
}

/// 空文字列は自動検出
pub fn parse_serial_port(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub fn validate_baud_rate(value: u32) -> Result<u32, ValidationError> {
    if value >= 9_600 {
        Ok(value)
    } else {
        Err(ValidationError::InvalidBaudRate(value))
    }
}

/// 秒単位のタイムアウト (1秒から1時間)
pub fn validate_timeout_secs(key: &'static str, value: u32) -> Result<Duration, ValidationError> {
    if (1..=3_600).contains(&value) {
        Ok(Duration::from_secs(u64::from(value)))
    } else {
        Err(ValidationError::InvalidTimeout { key, value })
    }
}

pub fn validate_idle_gap_ms(value: u32) -> Result<Duration, ValidationError> {
    if (10..=60_000).contains(&value) {
        Ok(Duration::from_millis(u64::from(value)))
    } else {
        Err(ValidationError::InvalidTimeout {
            key: "idle_gap_ms",
            value,
        })
    }
}

/// SOI と EOI の4バイトより小さい値は意味がない
pub fn validate_min_image_bytes(value: u32) -> Result<usize, ValidationError> {
    if value >= 4 {
        Ok(value as usize)
    } else {
        Err(ValidationError::InvalidMinImageBytes(value))
    }
}

pub fn parse_image_dir(value: &str) -> Result<PathBuf, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ValidationError::EmptyImageDir)
    } else {
        Ok(PathBuf::from(value))
    }
}
