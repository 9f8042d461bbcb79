//! キャプチャクライアント
//!
//! 起動メッセージを待ち、キャプチャ要求を送り、ステータス行を読み飛ばしてから
//! バイナリ区間の JPEG を組み立てます。待ち時間は (起動, マーカー, 転送) の3つが
//! それぞれ独立した上限を持ち、クライアント側での再試行はしません。

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::jpeg::JpegAssembler;
use crate::link::{LinkEvent, LinkParser, StatusLine, CAPTURE_BYTE, REINIT_BYTE, RESYNC_BYTE};
use crate::serial::{SerialError, SerialInterface};
use crate::storage::{ImageStore, SavedImage, StorageError};

/// 1回の読み取りバッファ
const READ_CHUNK_SIZE: usize = 4096;
/// 転送中の進捗ログ間隔
const PROGRESS_LOG_BYTES: usize = 10 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// 起動メッセージが届かなかった
    #[error("device did not report ready")]
    NotReady,
    /// バイナリマーカーが届かなかった
    #[error("binary marker not received within {0:?}")]
    MarkerTimeout(Duration),
    /// コマンドへの応答がなかった
    #[error("no response from device within {0:?}")]
    ResponseTimeout(Duration),
    /// デバイスがエラーを報告した
    #[error("device reported: {0}")]
    DeviceError(String),
    /// 転送中に SOI が見つからなかった
    #[error("no JPEG header in {received} received bytes (head: {head})")]
    NoImageHeader { received: usize, head: String },
    /// SOI は受信したが EOI/通知長に届く前に上限時間を超えた
    #[error("transfer timed out after {received} bytes")]
    TransferTimeout { received: usize },
    /// 画像が小さすぎる
    #[error("image too small: {received} bytes (minimum {minimum})")]
    TruncatedImage { received: usize, minimum: usize },
    #[error(transparent)]
    Serial(#[from] SerialError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    pub ready_timeout: Duration,
    pub marker_timeout: Duration,
    pub transfer_timeout: Duration,
    /// SOI 受信後、この時間データが途切れたら終了
    pub idle_gap: Duration,
    pub min_image_bytes: usize,
    /// 起動メッセージが来なければ再初期化を1回要求する
    pub resend_init_on_silence: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(15),
            marker_timeout: Duration::from_secs(10),
            transfer_timeout: Duration::from_secs(60),
            idle_gap: Duration::from_millis(2000),
            min_image_bytes: 1000,
            resend_init_on_silence: true,
        }
    }
}

/// 受信した画像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub data: Vec<u8>,
    pub eoi_found: bool,
    /// デバイスが `Length:` で報告した FIFO 長
    pub fifo_length: Option<u32>,
    /// デバイスが `Payload:` で通知した送信バイト数
    pub declared_payload: Option<u32>,
}

/// 起動メッセージ待ちの結果
enum ReadyWait {
    Ready,
    /// 時間切れ。途中で届いたエラー行があれば保持する
    Silent { last_error: Option<String> },
}

/// マーカー待ちで得た情報
#[derive(Debug, Default)]
struct Announcement {
    fifo_length: Option<u32>,
    declared_payload: Option<u32>,
    /// マーカーと同じ読み取りで届いたバイナリ
    early_payload: Vec<u8>,
}

pub struct CaptureClient<S> {
    port: S,
    parser: LinkParser,
    settings: ClientSettings,
    buffer: Vec<u8>,
}

impl<S: SerialInterface> CaptureClient<S> {
    pub fn new(port: S, settings: ClientSettings) -> Self {
        Self {
            port,
            parser: LinkParser::new(),
            settings,
            buffer: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// 起動メッセージ (`Camera Ready!`) を待つ
    ///
    /// 上限内に届かなければ、設定に応じて再初期化を1回だけ要求してもう一度待ちます。
    pub fn wait_ready(&mut self) -> Result<(), ClientError> {
        info!("デバイスの起動を待っています...");
        let mut last_error = match self.wait_for_ready_within(self.settings.ready_timeout)? {
            ReadyWait::Ready => return Ok(()),
            ReadyWait::Silent { last_error } => last_error,
        };

        if self.settings.resend_init_on_silence {
            warn!("起動メッセージがありません。再初期化を要求します");
            self.send(REINIT_BYTE)?;
            match self.wait_for_ready_within(self.settings.ready_timeout)? {
                ReadyWait::Ready => return Ok(()),
                ReadyWait::Silent { last_error: error } => last_error = error.or(last_error),
            }
        }

        Err(match last_error {
            Some(text) => ClientError::DeviceError(text),
            None => ClientError::NotReady,
        })
    }

    /// 再初期化を要求して起動メッセージを待つ
    pub fn request_reinit(&mut self) -> Result<(), ClientError> {
        self.send(REINIT_BYTE)?;
        match self.wait_for_ready_within(self.settings.ready_timeout)? {
            ReadyWait::Ready => Ok(()),
            ReadyWait::Silent {
                last_error: Some(text),
            } => Err(ClientError::DeviceError(text)),
            ReadyWait::Silent { last_error: None } => Err(ClientError::NotReady),
        }
    }

    /// 再同期を要求し、結果のステータス行を返す
    pub fn request_resync(&mut self) -> Result<String, ClientError> {
        self.send(RESYNC_BYTE)?;
        let timeout = self.settings.marker_timeout * 2;
        let started = Instant::now();
        while started.elapsed() < timeout {
            for event in self.read_events()? {
                match event {
                    LinkEvent::Status(StatusLine::Error(text)) => {
                        return Err(ClientError::DeviceError(text))
                    }
                    LinkEvent::Status(StatusLine::Info(text)) if text.starts_with("Sync locked") => {
                        info!("{}", text);
                        return Ok(text);
                    }
                    other => debug!("{:?}", other),
                }
            }
        }
        Err(ClientError::ResponseTimeout(timeout))
    }

    /// 1枚撮影して受信する
    pub fn capture(&mut self) -> Result<CapturedImage, ClientError> {
        self.port.clear_input()?;
        self.parser.reset();

        info!("キャプチャを要求します (0x{:02X})", CAPTURE_BYTE);
        self.send(CAPTURE_BYTE)?;

        let announcement = self.wait_for_marker()?;
        self.receive_image(announcement)
    }

    /// 撮影して保存する。サイズ検査を通った画像だけがファイルになる
    pub fn capture_and_save(&mut self, store: &ImageStore) -> Result<SavedImage, ClientError> {
        let image = self.capture()?;
        Ok(store.save(&image.data)?)
    }

    fn send(&mut self, byte: u8) -> Result<(), ClientError> {
        self.port.write_all(&[byte])?;
        Ok(())
    }

    fn read_events(&mut self) -> Result<Vec<LinkEvent>, ClientError> {
        let n = self.port.read(&mut self.buffer)?;
        if n == 0 {
            return Ok(Vec::new());
        }
        Ok(self.parser.feed(&self.buffer[..n]))
    }

    fn wait_for_ready_within(&mut self, timeout: Duration) -> Result<ReadyWait, ClientError> {
        let started = Instant::now();
        let mut last_error = None;
        while started.elapsed() < timeout {
            for event in self.read_events()? {
                match event {
                    LinkEvent::Status(StatusLine::Ready) => {
                        info!("デバイスの準備ができました");
                        return Ok(ReadyWait::Ready);
                    }
                    LinkEvent::Status(StatusLine::Error(text)) => {
                        warn!("デバイスのエラー: {}", text);
                        last_error = Some(text);
                    }
                    LinkEvent::BinaryStart | LinkEvent::Payload(_) => {
                        // 前回の転送の残り
                        self.parser.reset();
                    }
                    other => debug!("{:?}", other),
                }
            }
        }
        Ok(ReadyWait::Silent { last_error })
    }

    fn wait_for_marker(&mut self) -> Result<Announcement, ClientError> {
        let timeout = self.settings.marker_timeout;
        let started = Instant::now();
        let mut announcement = Announcement::default();
        let mut marker_seen = false;

        while started.elapsed() < timeout {
            for event in self.read_events()? {
                match event {
                    LinkEvent::Status(StatusLine::Error(text)) if !marker_seen => {
                        warn!("デバイスがエラーを報告しました: {}", text);
                        return Err(ClientError::DeviceError(text));
                    }
                    LinkEvent::Status(StatusLine::Length(n)) => {
                        info!("FIFO 長: {} bytes", n);
                        announcement.fifo_length = Some(n);
                    }
                    LinkEvent::Status(StatusLine::Payload(n)) => {
                        announcement.declared_payload = Some(n);
                    }
                    LinkEvent::BinaryStart => {
                        debug!("バイナリマーカーを受信しました");
                        marker_seen = true;
                    }
                    LinkEvent::Payload(bytes) => announcement.early_payload.extend(bytes),
                    other => debug!("{:?}", other),
                }
            }
            if marker_seen {
                return Ok(announcement);
            }
        }
        Err(ClientError::MarkerTimeout(timeout))
    }

    fn receive_image(&mut self, announcement: Announcement) -> Result<CapturedImage, ClientError> {
        let limit = announcement.declared_payload.map(|n| n as usize);
        let mut assembler = JpegAssembler::new(limit);
        assembler.push(&announcement.early_payload);

        let started = Instant::now();
        let mut last_data = Instant::now();
        let mut next_progress = PROGRESS_LOG_BYTES;
        let mut timed_out = false;

        while !assembler.is_complete() {
            if started.elapsed() >= self.settings.transfer_timeout {
                timed_out = true;
                break;
            }

            let n = self.port.read(&mut self.buffer)?;
            if n == 0 {
                if assembler.soi_found() && last_data.elapsed() >= self.settings.idle_gap {
                    debug!("{:?} の無通信で転送終了とみなします", self.settings.idle_gap);
                    break;
                }
                continue;
            }

            last_data = Instant::now();
            for event in self.parser.feed(&self.buffer[..n]) {
                if let LinkEvent::Payload(bytes) = event {
                    assembler.push(&bytes);
                }
            }
            if assembler.bytes_seen() >= next_progress {
                info!("受信中... {} KB", assembler.bytes_seen() / 1024);
                next_progress += PROGRESS_LOG_BYTES;
            }
        }
        self.parser.reset();

        if !assembler.soi_found() {
            return Err(ClientError::NoImageHeader {
                received: assembler.bytes_seen(),
                head: assembler.head_hex(),
            });
        }
        if timed_out {
            return Err(ClientError::TransferTimeout {
                received: assembler.len(),
            });
        }
        if assembler.len() < self.settings.min_image_bytes {
            return Err(ClientError::TruncatedImage {
                received: assembler.len(),
                minimum: self.settings.min_image_bytes,
            });
        }

        let eoi_found = assembler.eoi_found();
        if !eoi_found {
            warn!("EOI を受信していません ({} bytes)", assembler.len());
        }
        let data = assembler.into_image();
        info!("画像を受信しました: {} bytes", data.len());
        Ok(CapturedImage {
            data,
            eoi_found,
            fifo_length: announcement.fifo_length,
            declared_payload: announcement.declared_payload,
        })
    }
}
