//! デバイス側リンクプロトコル
//!
//! 1本のチャネルにステータス行とバイナリを多重化します。
//!
//! ```text
//! ACK CMD <text> END\n      ステータス行 (テキストモード)
//! ACK IMG END\n             バイナリモードへの切り替え
//! <raw JPEG bytes>          長さ接頭辞なし。ホストは通知済みの長さか EOI で区切る
//! ```

use std::fmt;
use std::io::{self, Read, Write};

use heapless::Deque;
use log::{debug, warn};

use super::command::{Command, CommandReader};

pub const STATUS_PREFIX: &str = "ACK CMD";
pub const STATUS_SUFFIX: &str = "END";
pub const BINARY_MARKER: &[u8] = b"ACK IMG END\n";

const READ_BUFFER_SIZE: usize = 64;
const PENDING_COMMANDS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Text,
    Binary,
}

pub struct Link<T> {
    channel: T,
    mode: LinkMode,
    commands: CommandReader,
    pending: Deque<Command, PENDING_COMMANDS>,
    payload_bytes: u64,
}

impl<T: Read + Write> Link<T> {
    pub fn new(channel: T) -> Self {
        Self {
            channel,
            mode: LinkMode::Text,
            commands: CommandReader::new(),
            pending: Deque::new(),
            payload_bytes: 0,
        }
    }

    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    pub fn is_binary(&self) -> bool {
        self.mode == LinkMode::Binary
    }

    /// 直近のバイナリ区間で送ったバイト数
    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes
    }

    /// ステータス行を送る。改行は空白に置き換える
    pub fn status(&mut self, text: impl fmt::Display) -> io::Result<()> {
        if self.is_binary() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "status line while in binary mode",
            ));
        }
        let text = text.to_string().replace(['\r', '\n'], " ");
        debug!("status: {}", text);
        writeln!(self.channel, "{} {} {}", STATUS_PREFIX, text, STATUS_SUFFIX)?;
        self.channel.flush()
    }

    /// バイナリマーカーを送り、バイナリモードに切り替える
    pub fn begin_binary(&mut self) -> io::Result<()> {
        if self.is_binary() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "already in binary mode",
            ));
        }
        self.channel.write_all(BINARY_MARKER)?;
        self.mode = LinkMode::Binary;
        self.payload_bytes = 0;
        Ok(())
    }

    pub fn payload(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.is_binary() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "payload outside binary mode",
            ));
        }
        self.channel.write_all(bytes)?;
        self.payload_bytes += bytes.len() as u64;
        Ok(())
    }

    /// バイナリ区間を終えてテキストモードに戻る
    pub fn end_binary(&mut self) -> io::Result<()> {
        self.mode = LinkMode::Text;
        self.channel.flush()
    }

    /// 受信済みのバイトからコマンドを1つ取り出す。データがなければ `None`
    pub fn poll_command(&mut self) -> io::Result<Option<Command>> {
        if let Some(command) = self.pending.pop_front() {
            return Ok(Some(command));
        }

        let mut buf = [0u8; READ_BUFFER_SIZE];
        let n = match self.channel.read(&mut buf) {
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };

        for &byte in &buf[..n] {
            if let Some(command) = self.commands.push(byte) {
                if self.pending.push_back(command).is_err() {
                    warn!("Command queue full, dropping {:?}", command);
                }
            }
        }
        Ok(self.pending.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockLink;

    #[test]
    fn test_status_line_format() {
        let mock = MockLink::new();
        let mut link = Link::new(mock.clone());

        link.status("Camera Ready!").unwrap();
        link.status(format_args!("Length: {}", 1234)).unwrap();

        assert_eq!(
            mock.output(),
            b"ACK CMD Camera Ready! END\nACK CMD Length: 1234 END\n".to_vec()
        );
    }

    #[test]
    fn test_status_newlines_flattened() {
        let mock = MockLink::new();
        let mut link = Link::new(mock.clone());
        link.status("line one\nline two").unwrap();
        assert_eq!(mock.output_lines(), vec!["ACK CMD line one line two END"]);
    }

    #[test]
    fn test_mode_transitions_are_enforced() {
        let mock = MockLink::new();
        let mut link = Link::new(mock.clone());

        assert!(link.payload(&[0xFF]).is_err());
        link.begin_binary().unwrap();
        assert!(link.status("nope").is_err());
        link.payload(&[0xFF, 0xD8]).unwrap();
        link.end_binary().unwrap();
        link.status("after").unwrap();

        let mut expected = BINARY_MARKER.to_vec();
        expected.extend_from_slice(&[0xFF, 0xD8]);
        expected.extend_from_slice(b"ACK CMD after END\n");
        assert_eq!(mock.output(), expected);
    }

    #[test]
    fn test_poll_command_queues_multiple() {
        let mock = MockLink::new();
        let mut link = Link::new(mock.clone());

        assert_eq!(link.poll_command().unwrap(), None);
        mock.queue_input(&[0x12, 0x10]);
        assert_eq!(link.poll_command().unwrap(), Some(Command::Resync));
        assert_eq!(link.poll_command().unwrap(), Some(Command::Capture));
        assert_eq!(link.poll_command().unwrap(), None);
    }
}
