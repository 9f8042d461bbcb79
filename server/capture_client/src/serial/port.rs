use std::io::{self, Read, Write};
use std::time::Duration;

use log::{debug, info};
use serialport::{ClearBuffer, SerialPort, SerialPortType};

use super::{SerialError, SerialInterface, SerialResult};

/// 1回の読み取りで待つ時間
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// カメラ側デバイスとみなすポート名/製品名のキーワード
const DEVICE_KEYWORDS: [&str; 3] = ["pico", "circuitpython", "usbmodem"];

/// ポート名または USB の製品名/製造元からカメラ側デバイスか判定する
pub fn is_device_port(port_name: &str, product: Option<&str>, manufacturer: Option<&str>) -> bool {
    [Some(port_name), product, manufacturer]
        .into_iter()
        .flatten()
        .map(str::to_ascii_lowercase)
        .any(|text| DEVICE_KEYWORDS.iter().any(|keyword| text.contains(keyword)))
}

/// 接続中のポートからカメラ側デバイスを探す
pub fn detect_device_port() -> SerialResult<String> {
    let ports = serialport::available_ports()?;
    for port in &ports {
        let (product, manufacturer) = match &port.port_type {
            SerialPortType::UsbPort(usb) => (usb.product.as_deref(), usb.manufacturer.as_deref()),
            _ => (None, None),
        };
        if is_device_port(&port.port_name, product, manufacturer) {
            info!("デバイスを検出しました: {}", port.port_name);
            return Ok(port.port_name.clone());
        }
    }
    Err(SerialError::NoDeviceFound {
        available: ports.into_iter().map(|p| p.port_name).collect(),
    })
}

/// `serialport` による実機用の実装
pub struct SerialPortChannel {
    port: Box<dyn SerialPort>,
}

impl SerialPortChannel {
    pub fn open(port_name: &str, baud_rate: u32) -> SerialResult<Self> {
        debug!("{} を {} bps で開きます", port_name, baud_rate);
        let port = serialport::new(port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()?;
        Ok(Self { port })
    }

    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl SerialInterface for SerialPortChannel {
    fn write_all(&mut self, data: &[u8]) -> SerialResult<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> SerialResult<usize> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_input(&mut self) -> SerialResult<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}
