use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;

/// ポーリングとタイムアウト判定に使う単調クロック
///
/// 待機は `DelayNs` で行い、経過時間は `now_ms` で比較します。
pub trait Clock: DelayNs {
    /// 任意の起点からの経過ミリ秒
    fn now_ms(&self) -> u64;
}

/// `std::thread::sleep` ベースのクロック
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayNs for SystemClock {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}
