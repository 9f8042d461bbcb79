//! SPI 制御バス
//!
//! ArduCAM の CPLD はアドレスの最上位ビットで読み書きを区別します。
//! 書き込みは `[addr | 0x80, value]`、読み取りは `[addr & 0x7F]` の後に1バイト受信です。

use std::ops::ControlFlow;

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::{Error as _, SpiBus};
use log::trace;

use super::{BusError, BusResult, ControlInterface};

/// バーストリードコマンド
pub const BURST_FIFO_READ: u8 = 0x3C;

const WRITE_FLAG: u8 = 0x80;

/// SPI バスと手動チップセレクトで構成される制御バス
pub struct SpiControlBus<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> SpiControlBus<SPI, CS>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    /// 制御バスを作成します。チップセレクトは非選択状態 (High) にしてから返します。
    pub fn new(spi: SPI, mut cs: CS) -> BusResult<Self> {
        cs.set_high().map_err(|_| BusError::ChipSelect)?;
        Ok(Self { spi, cs })
    }

    /// チップセレクトを Low にして `op` を実行し、結果に関わらず High に戻す
    fn with_cs<T>(&mut self, op: impl FnOnce(&mut SPI) -> Result<T, SPI::Error>) -> BusResult<T> {
        self.cs.set_low().map_err(|_| BusError::ChipSelect)?;

        let result = match op(&mut self.spi) {
            Ok(value) => self.spi.flush().map(|_| value),
            Err(e) => Err(e),
        };

        let released = self.cs.set_high().map_err(|_| BusError::ChipSelect);
        let value = result.map_err(|e| BusError::Control(e.kind()))?;
        released?;
        Ok(value)
    }
}

impl<SPI, CS> ControlInterface for SpiControlBus<SPI, CS>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    fn write_register(&mut self, addr: u8, value: u8) -> BusResult<()> {
        trace!("SPI write 0x{:02X} <- 0x{:02X}", addr, value);
        self.with_cs(|spi| spi.write(&[addr | WRITE_FLAG, value]))
    }

    fn read_register(&mut self, addr: u8) -> BusResult<u8> {
        let value = self.with_cs(|spi| {
            spi.write(&[addr & !WRITE_FLAG])?;
            let mut buf = [0u8; 1];
            spi.read(&mut buf)?;
            Ok(buf[0])
        })?;
        trace!("SPI read 0x{:02X} -> 0x{:02X}", addr, value);
        Ok(value)
    }

    fn burst_read<F>(&mut self, length: usize, chunk: &mut [u8], mut sink: F) -> BusResult<usize>
    where
        F: FnMut(&[u8]) -> ControlFlow<()>,
    {
        if chunk.is_empty() || length == 0 {
            return Ok(0);
        }

        self.with_cs(|spi| {
            spi.write(&[BURST_FIFO_READ])?;

            let mut total = 0usize;
            while total < length {
                let n = chunk.len().min(length - total);
                spi.read(&mut chunk[..n])?;
                total += n;
                if sink(&chunk[..n]).is_break() {
                    break;
                }
            }
            Ok(total)
        })
    }
}
