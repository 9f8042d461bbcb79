use std::io::{self, Read, Write};

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::communication::{Command, Link};
use crate::core::capture::CaptureSession;
use crate::core::config::PipelineSettings;
use crate::core::error::{init_status_text, CameraError};
use crate::core::frame_reader::{FrameError, FrameReader, FrameSummary};
use crate::core::sync_search::{SyncOutcome, SyncSearch};
use crate::hardware::bus::{ControlInterface, SensorInterface};
use crate::hardware::camera::{CameraController, InitError, InitReport, SensorInitializer};
use crate::hardware::clock::Clock;

/// 起動時の初期化結果
#[derive(Debug)]
pub enum StartupOutcome {
    Ready(InitReport),
    /// 初期化に失敗し、外部からの介入待ち
    Halted(InitError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Shutdown,
}

/// アプリケーションの主要な制御フローを管理する
///
/// カメラ、パイプライン各段、リンクを1つの所有者にまとめ、コマンドごとに
/// 1回分の処理を実行します。ロック中の DeviceMode はカメラ側が保持します。
pub struct AppController<B, S, C, T> {
    camera: CameraController<B, S, C>,
    initializer: SensorInitializer,
    capture: CaptureSession,
    sync: SyncSearch,
    reader: FrameReader,
    link: Link<T>,
}

impl<B, S, C, T> AppController<B, S, C, T>
where
    B: ControlInterface,
    S: SensorInterface,
    C: Clock,
    T: Read + Write,
{
    pub fn new(
        camera: CameraController<B, S, C>,
        initializer: SensorInitializer,
        pipeline: PipelineSettings,
        link: Link<T>,
    ) -> Self {
        Self {
            camera,
            initializer,
            capture: CaptureSession::new(pipeline.capture),
            sync: SyncSearch::new(pipeline.sync),
            reader: FrameReader::new(pipeline.reader),
            link,
        }
    }

    /// 初期化を実行し、結果をステータス行で報告する
    ///
    /// 失敗しても停止はせず `Halted` を返します。待機するかどうかは呼び出し側が決めます。
    pub fn startup(&mut self) -> io::Result<StartupOutcome> {
        self.camera.forget_sync();
        match self.initializer.initialize(&mut self.camera) {
            Ok(report) => {
                info!(
                    "初期化完了: rev=0x{:02X}, probe={}回, tables={:?}",
                    report.revision, report.probe_attempts, report.tables
                );
                self.link
                    .status(format_args!("CPLD Revision: 0x{:02X}", report.revision))?;
                self.link.status("Camera Ready!")?;
                Ok(StartupOutcome::Ready(report))
            }
            Err(e) => {
                error!("初期化に失敗しました: {}", e);
                self.link.status(init_status_text(&e))?;
                Ok(StartupOutcome::Halted(e))
            }
        }
    }

    /// 初期化失敗後の待機。再初期化コマンドで復帰し、終了コマンドで `None` を返す
    pub fn wait_for_intervention(&mut self, idle_ms: u32) -> io::Result<Option<InitReport>> {
        warn!("外部からの再初期化コマンドを待機します");
        loop {
            match self.link.poll_command()? {
                Some(Command::Reinit) => {
                    if let StartupOutcome::Ready(report) = self.startup()? {
                        return Ok(Some(report));
                    }
                }
                Some(Command::Shutdown) => return Ok(None),
                Some(other) => {
                    warn!("未初期化のためコマンドを無視: {:?}", other);
                    self.link.status("ERROR: Camera not initialized")?;
                }
                None => self.camera.delay_ms(idle_ms),
            }
        }
    }

    /// コマンドループ。終了コマンドを受けるかリンクが失われるまで戻らない
    pub fn run(&mut self, idle_ms: u32) -> io::Result<()> {
        loop {
            match self.link.poll_command()? {
                Some(command) => {
                    if self.handle(command)? == LoopControl::Shutdown {
                        info!("終了コマンドを受信しました");
                        return Ok(());
                    }
                }
                None => self.camera.delay_ms(idle_ms),
            }
        }
    }

    /// コマンド1つ分の処理
    pub fn handle(&mut self, command: Command) -> io::Result<LoopControl> {
        match command {
            Command::Capture => {
                self.capture_and_report()?;
            }
            Command::Reinit => {
                self.startup()?;
            }
            Command::Resync => {
                self.resync_and_report()?;
            }
            Command::Shutdown => return Ok(LoopControl::Shutdown),
        }
        Ok(LoopControl::Continue)
    }

    /// 1回分のキャプチャ。未同期なら先に同期探索を行う
    pub fn capture_once(&mut self) -> Result<FrameSummary, CameraError> {
        if !self.camera.is_synced() {
            let outcome = self.sync.run(&mut self.camera)?;
            self.report_sync(&outcome)?;
        }

        let result = self.capture.run(&mut self.camera)?;
        self.link.status("Capture Done.")?;
        self.link
            .status(format_args!("Length: {}", result.byte_length))?;

        Ok(self
            .reader
            .read_out(&mut self.camera, &result, &mut self.link)?)
    }

    /// キャプチャを実行し、失敗はステータス行で報告する
    ///
    /// リンク自体の書き込み失敗だけは `Err` として返します。
    pub fn capture_and_report(&mut self) -> io::Result<Option<FrameSummary>> {
        self.link.status("Capture Started...")?;

        match self.capture_once() {
            Ok(summary) => Ok(Some(summary)),
            Err(CameraError::Link(e)) | Err(CameraError::Frame(FrameError::Link(e))) => Err(e),
            Err(e) => {
                warn!("キャプチャ失敗: {}", e);
                if let Err(clear) = self.camera.clear_fifo_flag() {
                    warn!("FIFOフラグのクリアに失敗: {}", clear);
                }
                self.link.status(e.status_text())?;
                Ok(None)
            }
        }
    }

    /// 明示的な再同期
    pub fn resync_and_report(&mut self) -> io::Result<Option<SyncOutcome>> {
        self.link.status("Sync Started...")?;
        match self.sync.run(&mut self.camera) {
            Ok(outcome) => {
                self.report_sync(&outcome)?;
                Ok(Some(outcome))
            }
            Err(e) => {
                warn!("再同期失敗: {}", e);
                self.link.status(CameraError::from(e).status_text())?;
                Ok(None)
            }
        }
    }

    fn report_sync(&mut self, outcome: &SyncOutcome) -> io::Result<()> {
        self.link.status(format_args!(
            "Sync locked: mode {} ({} @ {})",
            outcome.mode, outcome.header.kind, outcome.header.offset
        ))
    }

    pub fn camera(&self) -> &CameraController<B, S, C> {
        &self.camera
    }
}
