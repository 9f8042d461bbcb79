use std::path::PathBuf;

use super::frame_reader::EoiPolicy;
use crate::hardware::camera::FrameSize;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    UnknownFrameSize(String),
    UnknownEoiPolicy(String),
    InvalidTimeout(u32),
    InvalidChunkSize(u32),
    InvalidSampleBytes(u32),
    InvalidProbeRetries(u8),
    InvalidBaudRate(u32),
}

pub fn parse_frame_size(value: &str) -> Result<FrameSize, ValidationError> {
    value.parse().map_err(ValidationError::UnknownFrameSize)
}

pub fn parse_eoi_policy(value: &str) -> Result<EoiPolicy, ValidationError> {
    value.parse().map_err(ValidationError::UnknownEoiPolicy)
}

/// 空文字列はテーブルディレクトリなし
pub fn parse_table_dir(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

pub fn validate_timeout_ms(value: u32) -> Result<u64, ValidationError> {
    if (1..=120_000).contains(&value) {
        Ok(u64::from(value))
    } else {
        Err(ValidationError::InvalidTimeout(value))
    }
}

pub fn validate_chunk_size(value: u32) -> Result<usize, ValidationError> {
    if (64..=65_536).contains(&value) {
        Ok(value as usize)
    } else {
        Err(ValidationError::InvalidChunkSize(value))
    }
}

/// ヘッダ走査のサンプル長 (少なくとも2バイト)
pub fn validate_sample_bytes(value: u32) -> Result<usize, ValidationError> {
    if (2..=65_536).contains(&value) {
        Ok(value as usize)
    } else {
        Err(ValidationError::InvalidSampleBytes(value))
    }
}

pub fn validate_probe_retries(value: u8) -> Result<u8, ValidationError> {
    if (1..=20).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::InvalidProbeRetries(value))
    }
}

pub fn validate_baud_rate(value: u32) -> Result<u32, ValidationError> {
    if value >= 9_600 {
        Ok(value)
    } else {
        Err(ValidationError::InvalidBaudRate(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_size() {
        assert_eq!(parse_frame_size("uxga"), Ok(FrameSize::Uxga));
        assert_eq!(
            parse_frame_size("HD"),
            Err(ValidationError::UnknownFrameSize("HD".to_string()))
        );
    }

    #[test]
    fn test_parse_eoi_policy() {
        assert_eq!(parse_eoi_policy("canonical"), Ok(EoiPolicy::Canonical));
        assert!(parse_eoi_policy("both").is_err());
    }

    #[test]
    fn test_table_dir_empty_means_none() {
        assert_eq!(parse_table_dir("  "), None);
        assert_eq!(parse_table_dir("/opt/tables"), Some(PathBuf::from("/opt/tables")));
    }

    #[test]
    fn test_numeric_bounds() {
        assert!(validate_timeout_ms(0).is_err());
        assert_eq!(validate_timeout_ms(5000), Ok(5000));
        assert!(validate_chunk_size(16).is_err());
        assert_eq!(validate_chunk_size(4096), Ok(4096));
        assert!(validate_sample_bytes(1).is_err());
        assert!(validate_probe_retries(0).is_err());
        assert!(validate_baud_rate(300).is_err());
    }
}
