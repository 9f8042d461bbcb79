use log::{debug, warn};

use super::status::StatusLine;
use super::{BINARY_MARKER, STATUS_PREFIX, STATUS_SUFFIX};

/// 1行の最大長。超えた分はバイナリの取りこぼしとみなして破棄する
pub const MAX_LINE_LENGTH: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserMode {
    Text,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// `ACK CMD ... END` の行
    Status(StatusLine),
    /// 枠のないテキスト行 (デバイスの起動ログなど)
    Text(String),
    /// バイナリマーカー。以降のバイトはすべて `Payload`
    BinaryStart,
    Payload(Vec<u8>),
}

/// 受信バイト列をステータス行とバイナリに分ける
#[derive(Debug)]
pub struct LinkParser {
    mode: ParserMode,
    line: Vec<u8>,
    discarded: usize,
}

impl Default for LinkParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkParser {
    pub fn new() -> Self {
        Self {
            mode: ParserMode::Text,
            line: Vec::with_capacity(128),
            discarded: 0,
        }
    }

    pub fn mode(&self) -> ParserMode {
        self.mode
    }

    /// テキストモードに戻し、途中の行を破棄する
    pub fn reset(&mut self) {
        self.mode = ParserMode::Text;
        self.line.clear();
    }

    /// 長すぎて破棄したバイト数
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn feed(&mut self, data: &[u8]) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            if self.mode == ParserMode::Binary {
                events.push(LinkEvent::Payload(rest.to_vec()));
                break;
            }

            let Some(newline) = rest.iter().position(|&b| b == b'\n') else {
                self.buffer(rest);
                break;
            };
            self.buffer(&rest[..newline]);
            rest = &rest[newline + 1..];

            if let Some(event) = self.finish_line() {
                if event == LinkEvent::BinaryStart {
                    self.mode = ParserMode::Binary;
                }
                events.push(event);
            }
        }
        events
    }

    fn buffer(&mut self, bytes: &[u8]) {
        let room = MAX_LINE_LENGTH.saturating_sub(self.line.len());
        if bytes.len() > room {
            self.discarded += bytes.len() - room;
            warn!("Line longer than {} bytes, truncating", MAX_LINE_LENGTH);
        }
        self.line.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    fn finish_line(&mut self) -> Option<LinkEvent> {
        let raw = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }

        if text.contains(BINARY_MARKER) {
            return Some(LinkEvent::BinaryStart);
        }
        let framed = text
            .strip_prefix(STATUS_PREFIX)
            .and_then(|inner| inner.strip_suffix(STATUS_SUFFIX));
        match framed {
            Some(inner) => {
                let status = StatusLine::parse(inner);
                debug!("Device: {:?}", status);
                Some(LinkEvent::Status(status))
            }
            None => {
                debug!("Device log: {}", text);
                Some(LinkEvent::Text(text.to_string()))
            }
        }
    }
}
