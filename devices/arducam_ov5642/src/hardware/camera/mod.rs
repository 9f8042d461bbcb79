//! ArduCAM OV5642 カメラ制御
//!
//! - `registers`: CPLD / OV5642 のレジスタ定義
//! - `tables`: 初期化用レジスタテーブル
//! - `controller`: バスを所有し DeviceMode を保持するコントローラ
//! - `initializer`: リセット、ID確認、テーブル読み込み

pub mod controller;
pub mod initializer;
pub mod registers;
pub mod tables;

pub use controller::{CameraController, DeviceMode};
pub use initializer::{InitError, InitReport, SensorInitializer};
pub use tables::{FrameSize, RegisterEntry, RegisterTable, SentinelPolicy, TableError};
