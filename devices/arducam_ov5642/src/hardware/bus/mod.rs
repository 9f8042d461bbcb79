//! バストランスポート層
//!
//! キャプチャコントローラ (SPI制御バス) とイメージセンサ (I2Cセンサバス) への
//! レジスタアクセスを提供します。各操作はバスを排他的に取得し、戻る前に必ず解放します。
//! 取得中に別のバス操作を呼び出すことはありません。

pub mod i2c;
pub mod spi;

use std::ops::ControlFlow;

pub use self::i2c::I2cSensorBus;
pub use self::spi::SpiControlBus;

/// バス操作の結果の型
pub type BusResult<T> = Result<T, BusError>;

/// バス操作のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// 相手デバイスが ACK を返さなかった
    #[error("bus peer did not acknowledge (register 0x{addr:04X})")]
    BusTimeout { addr: u16 },
    /// センサバスのその他のエラー
    #[error("sensor bus error: {0:?}")]
    Sensor(embedded_hal::i2c::ErrorKind),
    /// 制御バスのエラー
    #[error("control bus error: {0:?}")]
    Control(embedded_hal::spi::ErrorKind),
    /// チップセレクトの操作に失敗
    #[error("chip select could not be driven")]
    ChipSelect,
}

/// キャプチャコントローラ (FIFO/CPLD) へのレジスタアクセス
pub trait ControlInterface {
    /// 8ビットアドレスのレジスタに書き込む
    fn write_register(&mut self, addr: u8, value: u8) -> BusResult<()>;

    /// 8ビットアドレスのレジスタを読み取る
    fn read_register(&mut self, addr: u8) -> BusResult<u8>;

    /// バーストリード
    ///
    /// バーストコマンドを1回だけ発行し、最大 `length` バイトを `chunk` 単位で読み出して
    /// `sink` に渡します。`sink` が `Break` を返すとその時点で終了します。
    /// 戻り値は実際に読み出したバイト数です。
    fn burst_read<F>(&mut self, length: usize, chunk: &mut [u8], sink: F) -> BusResult<usize>
    where
        F: FnMut(&[u8]) -> ControlFlow<()>;
}

/// イメージセンサへの16ビットアドレス・8ビット値のレジスタアクセス
pub trait SensorInterface {
    fn write_register(&mut self, addr: u16, value: u8) -> BusResult<()>;
    fn read_register(&mut self, addr: u16) -> BusResult<u8>;
}
