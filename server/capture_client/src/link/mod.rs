//! デバイスとのリンクプロトコル (ホスト側)
//!
//! デバイスはステータス行とバイナリを1本のチャネルで送ります。
//! ステータス行は `ACK CMD <text> END`、バイナリの開始は `ACK IMG END` の1行です。

pub mod parser;
pub mod status;

pub use parser::{LinkEvent, LinkParser, ParserMode};
pub use status::StatusLine;

/// キャプチャ要求
pub const CAPTURE_BYTE: u8 = 0x10;
/// 再初期化要求
pub const REINIT_BYTE: u8 = 0x11;
/// 再同期要求
pub const RESYNC_BYTE: u8 = 0x12;

pub const STATUS_PREFIX: &str = "ACK CMD";
pub const STATUS_SUFFIX: &str = "END";
pub const BINARY_MARKER: &str = "ACK IMG END";
