/*!
 * # Capture Client
 *
 * ArduCAM キャプチャデバイスにシリアル経由で撮影を要求し、
 * ステータス行とバイナリが混在するストリームから JPEG を取り出して保存するホスト側ライブラリ
 *
 * ## モジュール構成
 * - `serial`: シリアルポートの抽象化 (実機 / モック)
 * - `link`: ステータス行とバイナリの分離
 * - `jpeg`: SOI/EOI による画像の切り出し
 * - `client`: 起動待ち、撮影要求、受信
 * - `storage`: タイムスタンプ名での保存
 */

pub mod client;
pub mod config;
pub mod config_validation;
pub mod jpeg;
pub mod link;
pub mod serial;
pub mod storage;

pub use client::{CaptureClient, CapturedImage, ClientError, ClientSettings};
pub use config::{AppConfig, ConfigError};
pub use jpeg::JpegAssembler;
pub use link::{LinkEvent, LinkParser, StatusLine};
pub use serial::{SerialError, SerialInterface};
pub use storage::{ImageStore, SavedImage, StorageError};

/// ライブラリのバージョン情報
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
