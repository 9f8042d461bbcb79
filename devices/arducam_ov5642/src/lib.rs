/*!
 * # ArduCAM OV5642 Capture Library
 *
 * ArduCAM (OV5642 + FIFO/CPLD) から JPEG フレームを取得し、ステータス行と
 * バイナリを1本のシリアルチャネルに多重化してホストへ送るためのライブラリ
 *
 * ## モジュール構成
 * - `hardware`: バス (SPI制御バス / I2Cセンサバス)、クロック、カメラレジスタ操作
 * - `core`: 設定、キャプチャ状態機械、同期探索、フレーム読み出し、アプリ制御
 * - `communication`: デバイス側リンクプロトコルとコマンド解析
 */

pub mod communication;
pub mod core;
pub mod hardware;

pub use crate::communication::{Command, CommandReader, Link};
pub use crate::core::{
    AppConfig, AppController, CameraError, CaptureError, CaptureResult, CaptureSession,
    ConfigError, CorruptionKind, EoiPolicy, FrameError, FrameReader, HeaderMatch, SyncError,
    SyncSearch,
};
pub use crate::hardware::bus::{BusError, ControlInterface, I2cSensorBus, SensorInterface, SpiControlBus};
pub use crate::hardware::camera::{CameraController, DeviceMode, InitError, SensorInitializer};
pub use crate::hardware::clock::{Clock, SystemClock};

/// ライブラリのバージョン情報
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
