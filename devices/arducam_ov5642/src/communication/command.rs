//! ホストからのコマンド解析
//!
//! コマンドは予約バイト1つ、または改行で終わる短い単語で届きます。
//! 受信バッファは固定長のリングで、満杯になると古いバイトから捨てます。

use heapless::Deque;
use log::debug;

/// キャプチャ要求
pub const CAPTURE_BYTE: u8 = 0x10;
/// 再初期化要求
pub const REINIT_BYTE: u8 = 0x11;
/// 再同期要求
pub const RESYNC_BYTE: u8 = 0x12;

/// 単語コマンド用リングバッファの容量
pub const COMMAND_RING_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Capture,
    Reinit,
    Resync,
    /// コマンドループの終了
    Shutdown,
}

impl Command {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            CAPTURE_BYTE => Some(Command::Capture),
            REINIT_BYTE => Some(Command::Reinit),
            RESYNC_BYTE => Some(Command::Resync),
            _ => None,
        }
    }

    /// 大文字小文字を区別しない
    pub fn from_word(word: &str) -> Option<Self> {
        match word.trim().to_ascii_uppercase().as_str() {
            "CAPTURE" | "SNAP" => Some(Command::Capture),
            "INIT" | "REINIT" => Some(Command::Reinit),
            "SYNC" | "RESYNC" => Some(Command::Resync),
            "QUIT" | "EXIT" | "STOP" => Some(Command::Shutdown),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct CommandReader {
    ring: Deque<u8, COMMAND_RING_CAPACITY>,
    dropped: usize,
}

impl CommandReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1バイト受け取り、コマンドが確定したら返す
    ///
    /// 予約バイトは途中の単語を破棄して即座に確定します。
    pub fn push(&mut self, byte: u8) -> Option<Command> {
        if let Some(command) = Command::from_byte(byte) {
            self.ring.clear();
            return Some(command);
        }

        match byte {
            b'\n' | b'\r' => {
                if self.ring.is_empty() {
                    return None;
                }
                let word: Vec<u8> = self.ring.iter().copied().collect();
                self.ring.clear();
                let word = String::from_utf8_lossy(&word);
                let command = Command::from_word(&word);
                if command.is_none() {
                    debug!("Ignoring unknown command word: {:?}", word);
                }
                command
            }
            _ => {
                if self.ring.is_full() {
                    self.ring.pop_front();
                    self.dropped += 1;
                }
                // 直前に空きを作っているので失敗しない
                let _ = self.ring.push_back(byte);
                None
            }
        }
    }

    /// 未確定のバイト数
    pub fn buffered(&self) -> usize {
        self.ring.len()
    }

    /// 容量超過で捨てたバイト数
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(reader: &mut CommandReader, bytes: &[u8]) -> Vec<Command> {
        bytes.iter().filter_map(|&b| reader.push(b)).collect()
    }

    #[test]
    fn test_reserved_bytes() {
        let mut reader = CommandReader::new();
        assert_eq!(
            feed(&mut reader, &[0x10, 0x11, 0x12]),
            vec![Command::Capture, Command::Reinit, Command::Resync]
        );
    }

    #[test]
    fn test_words_are_case_insensitive() {
        let mut reader = CommandReader::new();
        assert_eq!(
            feed(&mut reader, b"capture\r\nQuit\n"),
            vec![Command::Capture, Command::Shutdown]
        );
    }

    #[test]
    fn test_reserved_byte_discards_partial_word() {
        let mut reader = CommandReader::new();
        assert_eq!(feed(&mut reader, b"QU\x10IT\n"), vec![Command::Capture]);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_ring_is_bounded() {
        let mut reader = CommandReader::new();
        let noise = vec![b'x'; COMMAND_RING_CAPACITY * 3];
        assert!(feed(&mut reader, &noise).is_empty());
        assert_eq!(reader.buffered(), COMMAND_RING_CAPACITY);
        assert_eq!(reader.dropped(), COMMAND_RING_CAPACITY * 2);

        // 改行までの雑音と連結された単語は認識しない
        assert_eq!(feed(&mut reader, b"SYNC\n"), vec![]);

        // 改行で区切られていれば雑音の後でも認識する
        let mut reader = CommandReader::new();
        let mut input = vec![b'x'; COMMAND_RING_CAPACITY];
        input.extend_from_slice(b"\nSYNC\n");
        assert_eq!(feed(&mut reader, &input), vec![Command::Resync]);
    }
}
