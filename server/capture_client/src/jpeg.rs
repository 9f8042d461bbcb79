//! 受信したバイト列から JPEG を切り出す
//!
//! デバイスが `Payload:` で長さを通知した場合は、検出済みのヘッダ位置から送られてくるので
//! 先頭バイトから画像として扱い、通知された長さで終端します。先頭2バイトが既知の
//! (変形した) SOI であれば、対応する EOI でも終端します。
//!
//! 長さの通知がない場合は SOI (FF D8) より前のバイトを捨て、EOI (FF D9) で終端します。
//! マーカーがチャンク境界をまたいでも検出できるよう、直前の1バイトを持ち越します。

use log::debug;

pub const SOI: [u8; 2] = [0xFF, 0xD8];
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// デバイスが検出する6種類の SOI と対応する EOI (標準, ビット順反転, ビット反転,
/// ニブル入れ替え, 右シフト, 左シフト)
pub const MARKER_PAIRS: [([u8; 2], [u8; 2]); 6] = [
    (SOI, EOI),
    ([0xFF, 0x1B], [0xFF, 0x9B]),
    ([0x00, 0x27], [0x00, 0x26]),
    ([0xFF, 0x8D], [0xFF, 0x9D]),
    ([0x7F, 0xEC], [0x7F, 0xEC]),
    ([0xFF, 0xB0], [0xFF, 0xB2]),
];

/// 診断用に保持する先頭のバイト数
const HEAD_KEEP: usize = 16;

/// SOI に対応する EOI
pub fn eoi_for(soi: [u8; 2]) -> Option<[u8; 2]> {
    MARKER_PAIRS
        .iter()
        .find(|(start, _)| *start == soi)
        .map(|&(_, end)| end)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    /// SOI を探している
    Searching,
    /// 画像を蓄積している
    Collecting,
    /// EOI を受信した
    CompleteEoi,
    /// 通知された長さに達した
    CompleteLength,
}

#[derive(Debug)]
pub struct JpegAssembler {
    state: AssemblyState,
    image: Vec<u8>,
    head: Vec<u8>,
    carry: Option<u8>,
    limit: Option<usize>,
    eoi: Option<[u8; 2]>,
    bytes_seen: usize,
}

impl JpegAssembler {
    /// `limit` はデバイスが `Payload:` で通知した画像のバイト数
    pub fn new(limit: Option<usize>) -> Self {
        let mut assembler = Self {
            state: AssemblyState::Searching,
            image: Vec::new(),
            head: Vec::with_capacity(HEAD_KEEP),
            carry: None,
            limit,
            eoi: None,
            bytes_seen: 0,
        };
        if limit.is_some() {
            assembler.state = AssemblyState::Collecting;
            assembler.check_limit();
        }
        assembler
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    /// 画像の先頭を受信済みか
    pub fn soi_found(&self) -> bool {
        self.state != AssemblyState::Searching && !self.image.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        matches!(
            self.state,
            AssemblyState::CompleteEoi | AssemblyState::CompleteLength
        )
    }

    pub fn eoi_found(&self) -> bool {
        self.state == AssemblyState::CompleteEoi
    }

    /// 受信した総バイト数 (捨てたものも含む)
    pub fn bytes_seen(&self) -> usize {
        self.bytes_seen
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    /// 受信データ先頭の16進ダンプ (SOI が見つからないときの診断用)
    pub fn head_hex(&self) -> String {
        hex::encode(&self.head)
    }

    pub fn push(&mut self, data: &[u8]) -> AssemblyState {
        self.bytes_seen += data.len();
        let keep = HEAD_KEEP.saturating_sub(self.head.len()).min(data.len());
        self.head.extend_from_slice(&data[..keep]);
        let mut rest = data;

        if self.state == AssemblyState::Searching {
            rest = self.search_soi(rest);
        }
        if self.state == AssemblyState::Collecting {
            self.collect(rest);
        }
        self.state
    }

    /// SOI を探し、見つかった場合はその後ろの残りを返す
    fn search_soi<'a>(&mut self, data: &'a [u8]) -> &'a [u8] {
        if self.carry == Some(SOI[0]) && data.first() == Some(&SOI[1]) {
            debug!("SOI found across chunk boundary");
            self.begin_image();
            return &data[1..];
        }
        match data.windows(2).position(|pair| pair == SOI) {
            Some(pos) => {
                debug!("SOI found after {} discarded bytes", self.bytes_seen - data.len() + pos);
                self.begin_image();
                &data[pos + 2..]
            }
            None => {
                self.carry = data.last().copied().or(self.carry);
                &[]
            }
        }
    }

    fn begin_image(&mut self) {
        self.image.extend_from_slice(&SOI);
        self.eoi = Some(EOI);
        self.carry = None;
        self.state = AssemblyState::Collecting;
    }

    fn collect(&mut self, data: &[u8]) {
        for &byte in data {
            if self.is_complete() {
                break;
            }
            let prev = self.image.last().copied();
            self.image.push(byte);
            if self.image.len() == 2 && self.eoi.is_none() {
                self.eoi = eoi_for([self.image[0], self.image[1]]);
                debug!("image starts with {:02X?}, end marker {:02X?}", &self.image[..2], self.eoi);
            }
            // SOI の2バイトとは重ならない
            if let Some(eoi) = self.eoi {
                if self.image.len() >= 4 && prev == Some(eoi[0]) && byte == eoi[1] {
                    self.state = AssemblyState::CompleteEoi;
                    break;
                }
            }
            self.check_limit();
        }
    }

    fn check_limit(&mut self) {
        if let Some(limit) = self.limit {
            if self.image.len() >= limit {
                self.state = AssemblyState::CompleteLength;
            }
        }
    }

    pub fn into_image(self) -> Vec<u8> {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_garbage_before_soi() {
        let mut asm = JpegAssembler::new(None);
        assert_eq!(asm.push(&[0x00, 0x11, 0x22]), AssemblyState::Searching);
        assert_eq!(asm.push(&[0xFF, 0xD8, 0x01]), AssemblyState::Collecting);
        assert_eq!(asm.push(&[0x02, 0xFF, 0xD9, 0x99]), AssemblyState::CompleteEoi);
        assert_eq!(asm.into_image(), vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]);
    }

    #[test]
    fn test_markers_split_across_chunks() {
        let mut asm = JpegAssembler::new(None);
        asm.push(&[0x10, 0xFF]);
        asm.push(&[0xD8, 0x05, 0xFF]);
        assert!(asm.soi_found());
        assert_eq!(asm.push(&[0xD9]), AssemblyState::CompleteEoi);
        assert_eq!(asm.len(), 5);
    }

    #[test]
    fn test_carry_survives_empty_read() {
        let mut asm = JpegAssembler::new(None);
        asm.push(&[0x00, 0xFF]);
        asm.push(&[]);
        assert_eq!(asm.push(&[0xD8]), AssemblyState::Collecting);
        assert_eq!(asm.len(), 2);
    }

    #[test]
    fn test_declared_length_bounds_image() {
        let mut asm = JpegAssembler::new(Some(4));
        assert_eq!(
            asm.push(&[0xFF, 0xD8, 0x01, 0x02, 0x03, 0x04]),
            AssemblyState::CompleteLength
        );
        assert_eq!(asm.into_image(), vec![0xFF, 0xD8, 0x01, 0x02]);
    }

    #[test]
    fn test_declared_stream_starts_at_first_byte() {
        // ビット反転した SOI (00 27) から始まるストリーム
        let mut asm = JpegAssembler::new(Some(8));
        assert!(!asm.soi_found());
        assert_eq!(asm.push(&[0x00, 0x27, 0x55]), AssemblyState::Collecting);
        assert!(asm.soi_found());
        assert_eq!(
            asm.push(&[0x55, 0x55, 0x55, 0x55, 0x55, 0xAA]),
            AssemblyState::CompleteLength
        );
        assert_eq!(asm.len(), 8);
    }

    #[test]
    fn test_declared_stream_ends_at_paired_eoi() {
        let mut asm = JpegAssembler::new(Some(100));
        asm.push(&[0xFF, 0x1B, 0x01, 0xFF]);
        // 標準の EOI では終わらない
        assert_eq!(asm.push(&[0xD9, 0x02, 0xFF]), AssemblyState::Collecting);
        assert_eq!(asm.push(&[0x9B, 0x03]), AssemblyState::CompleteEoi);
        assert_eq!(asm.into_image(), vec![0xFF, 0x1B, 0x01, 0xFF, 0xD9, 0x02, 0xFF, 0x9B]);
    }

    #[test]
    fn test_declared_zero_length_is_complete() {
        let asm = JpegAssembler::new(Some(0));
        assert!(asm.is_complete());
        assert!(asm.is_empty());
    }

    #[test]
    fn test_eoi_for_known_headers() {
        assert_eq!(eoi_for([0x00, 0x27]), Some([0x00, 0x26]));
        assert_eq!(eoi_for([0x7F, 0xEC]), Some([0x7F, 0xEC]));
        assert_eq!(eoi_for([0x12, 0x34]), None);
    }

    #[test]
    fn test_head_hex_keeps_prefix() {
        let mut asm = JpegAssembler::new(None);
        asm.push(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(asm.head_hex(), "deadbeef");
        assert_eq!(asm.bytes_seen(), 4);
    }
}
