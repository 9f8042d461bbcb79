//! JPEG ヘッダ (SOI) の検出
//!
//! センサから CPLD への経路はアナログタイミング次第でビット列が変形することがあります。
//! 観測されている変形は6種類で、それぞれ SOI (FF D8) を別の2バイトに写します。
//! この6種類は経験的な固定リストとして扱います。

use std::fmt;

/// 観測されている変形の種類 (走査順)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorruptionKind {
    /// 変形なし
    Standard,
    /// 各バイトのビット順が逆
    BitReversed,
    /// 全ビット反転
    BitInverted,
    /// ニブル入れ替え
    NibbleSwapped,
    /// 1ビット右シフト
    ShiftedRight,
    /// 1ビット左シフト
    ShiftedLeft,
}

impl CorruptionKind {
    pub const ALL: [CorruptionKind; 6] = [
        CorruptionKind::Standard,
        CorruptionKind::BitReversed,
        CorruptionKind::BitInverted,
        CorruptionKind::NibbleSwapped,
        CorruptionKind::ShiftedRight,
        CorruptionKind::ShiftedLeft,
    ];

    /// この変形を受けた SOI
    pub const fn soi(self) -> [u8; 2] {
        match self {
            CorruptionKind::Standard => [0xFF, 0xD8],
            CorruptionKind::BitReversed => [0xFF, 0x1B],
            CorruptionKind::BitInverted => [0x00, 0x27],
            CorruptionKind::NibbleSwapped => [0xFF, 0x8D],
            CorruptionKind::ShiftedRight => [0x7F, 0xEC],
            CorruptionKind::ShiftedLeft => [0xFF, 0xB0],
        }
    }

    /// この変形を受けた EOI
    pub const fn eoi(self) -> [u8; 2] {
        match self {
            CorruptionKind::Standard => [0xFF, 0xD9],
            CorruptionKind::BitReversed => [0xFF, 0x9B],
            CorruptionKind::BitInverted => [0x00, 0x26],
            CorruptionKind::NibbleSwapped => [0xFF, 0x9D],
            CorruptionKind::ShiftedRight => [0x7F, 0xEC],
            CorruptionKind::ShiftedLeft => [0xFF, 0xB2],
        }
    }
}

impl fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CorruptionKind::Standard => "standard",
            CorruptionKind::BitReversed => "bit-reversed",
            CorruptionKind::BitInverted => "bit-inverted",
            CorruptionKind::NibbleSwapped => "nibble-swapped",
            CorruptionKind::ShiftedRight => "shifted-right",
            CorruptionKind::ShiftedLeft => "shifted-left",
        };
        f.write_str(name)
    }
}

/// 検出したヘッダの種類と位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderMatch {
    pub kind: CorruptionKind,
    /// サンプル内での SOI 先頭バイトの位置
    pub offset: usize,
}

/// 連続する2バイトを先頭から走査し、最初に見つかった SOI パターンを返す
pub fn find_header(sample: &[u8]) -> Option<HeaderMatch> {
    sample.windows(2).enumerate().find_map(|(offset, pair)| {
        CorruptionKind::ALL
            .iter()
            .find(|kind| kind.soi() == pair)
            .map(|&kind| HeaderMatch { kind, offset })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_are_distinct() {
        for (i, a) in CorruptionKind::ALL.iter().enumerate() {
            for b in &CorruptionKind::ALL[i + 1..] {
                assert_ne!(a.soi(), b.soi(), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_shifted_patterns_follow_16bit_shift() {
        let soi = u16::from_be_bytes([0xFF, 0xD8]);
        assert_eq!(CorruptionKind::ShiftedRight.soi(), (soi >> 1).to_be_bytes());
        assert_eq!(CorruptionKind::ShiftedLeft.soi(), (soi << 1).to_be_bytes());
    }

    #[test]
    fn test_earliest_offset_wins() {
        let sample = [0x00, 0x11, 0xFF, 0x1B, 0xFF, 0xD8];
        assert_eq!(
            find_header(&sample),
            Some(HeaderMatch {
                kind: CorruptionKind::BitReversed,
                offset: 2
            })
        );
    }

    #[test]
    fn test_no_header() {
        assert_eq!(find_header(&[0x11; 64]), None);
        assert_eq!(find_header(&[0xFF]), None);
        assert_eq!(find_header(&[]), None);
    }
}
