//! I2C (SCCB) センサバス
//!
//! OV5642 は16ビットのレジスタアドレスを持ちます。読み取りは SCCB の制約により
//! アドレス書き込みと1バイト読み取りの2トランザクションに分けます。

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use log::trace;

use super::{BusError, BusResult, SensorInterface};

/// OV5642 の 7ビット I2C アドレス
pub const OV5642_I2C_ADDRESS: u8 = 0x3C;

/// 書き込み後のセトリング時間
const WRITE_SETTLE_MS: u32 = 1;

pub struct I2cSensorBus<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
}

impl<I2C, D> I2cSensorBus<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self {
            i2c,
            delay,
            address: OV5642_I2C_ADDRESS,
        }
    }

    fn map_error(addr: u16, kind: ErrorKind) -> BusError {
        match kind {
            ErrorKind::NoAcknowledge(_) => BusError::BusTimeout { addr },
            other => BusError::Sensor(other),
        }
    }
}

impl<I2C, D> SensorInterface for I2cSensorBus<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    fn write_register(&mut self, addr: u16, value: u8) -> BusResult<()> {
        let [hi, lo] = addr.to_be_bytes();
        self.i2c
            .write(self.address, &[hi, lo, value])
            .map_err(|e| Self::map_error(addr, e.kind()))?;
        trace!("I2C write 0x{:04X} <- 0x{:02X}", addr, value);
        self.delay.delay_ms(WRITE_SETTLE_MS);
        Ok(())
    }

    fn read_register(&mut self, addr: u16) -> BusResult<u8> {
        self.i2c
            .write(self.address, &addr.to_be_bytes())
            .map_err(|e| Self::map_error(addr, e.kind()))?;

        let mut buf = [0u8; 1];
        self.i2c
            .read(self.address, &mut buf)
            .map_err(|e| Self::map_error(addr, e.kind()))?;
        trace!("I2C read 0x{:04X} -> 0x{:02X}", addr, buf[0]);
        Ok(buf[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockClock, MockSensor};

    #[test]
    fn test_write_then_read_back() {
        let sensor = MockSensor::new();
        let clock = MockClock::new();
        let mut bus = I2cSensorBus::new(sensor.clone(), clock.clone());

        bus.write_register(0x3008, 0x80).unwrap();
        assert_eq!(bus.read_register(0x3008).unwrap(), 0x80);
        assert_eq!(sensor.writes(), vec![(0x3008, 0x80)]);
        // 書き込みごとに 1ms 待つ
        assert_eq!(clock.elapsed_ms(), 1);
    }

    #[test]
    fn test_nack_maps_to_bus_timeout() {
        let sensor = MockSensor::new();
        sensor.set_nack(true);
        let mut bus = I2cSensorBus::new(sensor, MockClock::new());

        assert_eq!(
            bus.read_register(0x300A),
            Err(BusError::BusTimeout { addr: 0x300A })
        );
        assert_eq!(
            bus.write_register(0x503D, 0x00),
            Err(BusError::BusTimeout { addr: 0x503D })
        );
    }
}
