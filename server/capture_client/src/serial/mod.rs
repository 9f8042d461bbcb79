pub mod mock;
pub mod port;

use std::io;

/// シリアル通信での結果の型
pub type SerialResult<T> = Result<T, SerialError>;

/// シリアル通信のエラー
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    /// 自動検出で該当するポートがなかった
    #[error("no camera device found (available: {available:?})")]
    NoDeviceFound { available: Vec<String> },
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),
}

/// シリアル通信インターフェースのトレイト
///
/// このトレイトを実装することで、実機用とテスト用(Mock)の
/// 実装を切り替えることができます。
pub trait SerialInterface {
    /// データをすべて書き込む
    fn write_all(&mut self, data: &[u8]) -> SerialResult<()>;

    /// 届いているデータを読み取る。読み取りタイムアウトまでに何も届かなければ `Ok(0)`
    fn read(&mut self, buffer: &mut [u8]) -> SerialResult<usize>;

    /// 受信バッファを破棄する
    fn clear_input(&mut self) -> SerialResult<()>;
}
