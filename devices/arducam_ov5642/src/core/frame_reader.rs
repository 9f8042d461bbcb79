//! フレーム読み出し
//!
//! FIFO を1回のバーストリードで読み、先頭サンプル内の SOI 位置を特定してから
//! それ以降のバイトを固定サイズ以下のチャンクでリンクへ流します。
//! SOI より前のバイトは決して送りません。

use std::io::{self, Read, Write};
use std::mem;
use std::ops::ControlFlow;
use std::str::FromStr;

use log::{debug, info, warn};

use super::capture::CaptureResult;
use super::header::{find_header, CorruptionKind, HeaderMatch};
use crate::communication::Link;
use crate::hardware::bus::{BusError, ControlInterface, SensorInterface};
use crate::hardware::camera::CameraController;
use crate::hardware::clock::Clock;

/// ストリーム中の EOI 判定に使うマーカー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EoiPolicy {
    /// 変形なしの FF D9
    #[default]
    Canonical,
    /// 検出した変形に対応する EOI
    Transformed,
}

impl EoiPolicy {
    pub fn marker_for(self, kind: CorruptionKind) -> [u8; 2] {
        match self {
            EoiPolicy::Canonical => CorruptionKind::Standard.eoi(),
            EoiPolicy::Transformed => kind.eoi(),
        }
    }
}

impl FromStr for EoiPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "canonical" => Ok(EoiPolicy::Canonical),
            "transformed" => Ok(EoiPolicy::Transformed),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Bus(#[from] BusError),
    /// サンプル内に既知の SOI パターンがなかった
    #[error("no image header in the first {sampled} bytes")]
    NoHeaderFound { sampled: usize },
    #[error("link write failed: {0}")]
    Link(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderSettings {
    pub header_sample_bytes: usize,
    /// 1回に送る最大バイト数
    pub chunk_size: usize,
    pub eoi_policy: EoiPolicy,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            header_sample_bytes: 2048,
            chunk_size: 4096,
            eoi_policy: EoiPolicy::Canonical,
        }
    }
}

/// 読み出し結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSummary {
    pub header: HeaderMatch,
    /// SOI 以降の宣言長 (`length - offset`)
    pub payload_len: usize,
    pub bytes_sent: usize,
    pub chunks: usize,
    pub eoi_found: bool,
}

#[derive(Debug, Clone)]
pub struct FrameReader {
    settings: ReaderSettings,
}

impl FrameReader {
    pub fn new(settings: ReaderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    /// FIFO の内容をリンクへ流す。成否に関わらず最後に完了フラグをクリアする
    pub fn read_out<B, S, C, T>(
        &self,
        camera: &mut CameraController<B, S, C>,
        capture: &CaptureResult,
        link: &mut Link<T>,
    ) -> Result<FrameSummary, FrameError>
    where
        B: ControlInterface,
        S: SensorInterface,
        C: Clock,
        T: Read + Write,
    {
        let result = self.stream(camera, capture.byte_length as usize, link);

        if link.is_binary() {
            if let Err(e) = link.end_binary() {
                warn!("Failed to leave binary mode: {}", e);
            }
        }
        let cleared = camera.clear_fifo_flag();
        let summary = result?;
        cleared?;

        info!(
            "Frame sent: {} bytes in {} chunks (offset {}, eoi {})",
            summary.bytes_sent, summary.chunks, summary.header.offset, summary.eoi_found
        );
        Ok(summary)
    }

    fn stream<B, S, C, T>(
        &self,
        camera: &mut CameraController<B, S, C>,
        length: usize,
        link: &mut Link<T>,
    ) -> Result<FrameSummary, FrameError>
    where
        B: ControlInterface,
        S: SensorInterface,
        C: Clock,
        T: Read + Write,
    {
        camera.reset_read_pointer()?;

        let chunk_size = self.settings.chunk_size.max(1);
        let mut readout = Readout::new(
            self.settings.header_sample_bytes.max(2).min(length),
            length,
            chunk_size,
            self.settings.eoi_policy,
        );
        let mut chunk = vec![0u8; chunk_size];

        camera
            .control()
            .burst_read(length, &mut chunk, |bytes| readout.accept(bytes, link))?;

        readout.finish(link)
    }
}

enum Phase {
    Sampling(Vec<u8>),
    Streaming,
}

/// バーストリード中の状態
struct Readout {
    phase: Phase,
    sample_target: usize,
    length: usize,
    chunk_size: usize,
    policy: EoiPolicy,
    header: Option<HeaderMatch>,
    eoi: [u8; 2],
    staged: Vec<u8>,
    prev: Option<u8>,
    sent: usize,
    chunks: usize,
    eoi_found: bool,
    failure: Option<FrameError>,
}

impl Readout {
    fn new(sample_target: usize, length: usize, chunk_size: usize, policy: EoiPolicy) -> Self {
        Self {
            phase: Phase::Sampling(Vec::with_capacity(sample_target)),
            sample_target,
            length,
            chunk_size,
            policy,
            header: None,
            eoi: CorruptionKind::Standard.eoi(),
            staged: Vec::with_capacity(chunk_size),
            prev: None,
            sent: 0,
            chunks: 0,
            eoi_found: false,
            failure: None,
        }
    }

    fn accept<T: Read + Write>(&mut self, bytes: &[u8], link: &mut Link<T>) -> ControlFlow<()> {
        let mut rest = bytes;

        if let Phase::Sampling(prefix) = &mut self.phase {
            let take = (self.sample_target - prefix.len()).min(rest.len());
            prefix.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if prefix.len() < self.sample_target {
                return ControlFlow::Continue(());
            }
            if self.complete_sample(link).is_break() {
                return ControlFlow::Break(());
            }
        }

        self.push(rest, link)
    }

    /// サンプルを走査し、ヘッダが見つかればバイナリ区間を開始する
    fn complete_sample<T: Read + Write>(&mut self, link: &mut Link<T>) -> ControlFlow<()> {
        let prefix = match mem::replace(&mut self.phase, Phase::Streaming) {
            Phase::Sampling(prefix) => prefix,
            Phase::Streaming => return ControlFlow::Continue(()),
        };

        let Some(header) = find_header(&prefix) else {
            self.failure = Some(FrameError::NoHeaderFound {
                sampled: prefix.len(),
            });
            return ControlFlow::Break(());
        };

        debug!("Header {} at offset {}", header.kind, header.offset);
        self.header = Some(header);
        self.eoi = self.policy.marker_for(header.kind);

        let announce = link
            .status(format_args!("Payload: {}", self.length - header.offset))
            .and_then(|_| link.begin_binary());
        if let Err(e) = announce {
            self.failure = Some(e.into());
            return ControlFlow::Break(());
        }

        self.push(&prefix[header.offset..], link)
    }

    /// SOI 以降のバイトを再チャンク化して送る。EOI を送った時点で終了
    fn push<T: Read + Write>(&mut self, data: &[u8], link: &mut Link<T>) -> ControlFlow<()> {
        for &byte in data {
            self.staged.push(byte);
            self.sent += 1;

            // ヘッダの2バイトは EOI 候補にしない
            let at_eoi = self.sent >= 4 && self.prev == Some(self.eoi[0]) && byte == self.eoi[1];
            self.prev = Some(byte);

            if at_eoi {
                self.eoi_found = true;
                return match self.flush(link) {
                    Ok(()) => ControlFlow::Break(()),
                    Err(e) => self.fail(e),
                };
            }
            if self.staged.len() == self.chunk_size {
                if let Err(e) = self.flush(link) {
                    return self.fail(e);
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn flush<T: Read + Write>(&mut self, link: &mut Link<T>) -> io::Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        link.payload(&self.staged)?;
        self.chunks += 1;
        self.staged.clear();
        Ok(())
    }

    fn fail(&mut self, e: io::Error) -> ControlFlow<()> {
        self.failure = Some(e.into());
        ControlFlow::Break(())
    }

    fn finish<T: Read + Write>(mut self, link: &mut Link<T>) -> Result<FrameSummary, FrameError> {
        if let Some(failure) = self.failure.take() {
            return Err(failure);
        }
        // バーストがサンプル長に届かずに終わった場合
        if matches!(self.phase, Phase::Sampling(_)) {
            // complete_sample は失敗時に failure を設定する
            let _ = self.complete_sample(link);
            if let Some(failure) = self.failure.take() {
                return Err(failure);
            }
        }
        self.flush(link)?;
        link.end_binary()?;

        let header = self.header.ok_or(FrameError::NoHeaderFound { sampled: 0 })?;
        Ok(FrameSummary {
            header,
            payload_len: self.length - header.offset,
            bytes_sent: self.sent,
            chunks: self.chunks,
            eoi_found: self.eoi_found,
        })
    }
}
