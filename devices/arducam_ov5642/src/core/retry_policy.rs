/// センサID確認などの再試行間隔 (線形バックオフ)
pub fn probe_retry_delay_ms(attempt: u8) -> u32 {
    100 * attempt as u32
}
