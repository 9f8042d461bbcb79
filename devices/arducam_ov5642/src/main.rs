use std::time::Duration;

use anyhow::{anyhow, Context};
use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::{CdevPin, I2cdev, SpidevBus};
use log::{error, info, warn};
use tracing_subscriber::EnvFilter;

use arducam_capture::core::{AppController, StartupOutcome};
use arducam_capture::{
    AppConfig, CameraController, I2cSensorBus, Link, SensorInitializer, SpiControlBus,
    SystemClock, VERSION,
};

/// コマンド待ちのポーリング間隔
const IDLE_POLL_MS: u32 = 5;
/// リンク読み取りのタイムアウト
const LINK_READ_TIMEOUT: Duration = Duration::from_millis(50);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("arducam_capture=info".parse()?),
        )
        .init();

    info!("=== ArduCAM OV5642 キャプチャ v{} ===", VERSION);

    let config = AppConfig::load().context("設定の読み込みに失敗しました")?;
    info!(
        "設定: frame_size={}, chunk_size={}, eoi={:?}",
        config.frame_size, config.pipeline.reader.chunk_size, config.pipeline.reader.eoi_policy
    );
    let wiring = &config.wiring;

    // SPI 制御バス (チップセレクトは GPIO で手動制御)
    let mut spi = SpidevBus::open(&wiring.spi_device)
        .map_err(|e| anyhow!("{} を開けません: {:?}", wiring.spi_device, e))?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(wiring.spi_speed_hz)
        .mode(SpiModeFlags::SPI_MODE_0 | SpiModeFlags::SPI_NO_CS)
        .build();
    spi.configure(&options)
        .with_context(|| format!("{} の設定に失敗しました", wiring.spi_device))?;

    let mut chip = Chip::new(&wiring.cs_gpio_chip)
        .with_context(|| format!("{} を開けません", wiring.cs_gpio_chip))?;
    let cs_handle = chip
        .get_line(wiring.cs_gpio_line)?
        .request(LineRequestFlags::OUTPUT, 1, "arducam-cs")?;
    let cs = CdevPin::new(cs_handle)?;

    let control = SpiControlBus::new(spi, cs)
        .map_err(|e| anyhow!("チップセレクトの初期化に失敗: {}", e))?;

    // I2C センサバス
    let i2c = I2cdev::new(&wiring.i2c_device)
        .with_context(|| format!("{} を開けません", wiring.i2c_device))?;
    let sensor = I2cSensorBus::new(i2c, SystemClock::new());

    // ホストとのリンク
    let port = serialport::new(&wiring.link_port, wiring.link_baud_rate)
        .timeout(LINK_READ_TIMEOUT)
        .open()
        .with_context(|| format!("リンク {} を開けません", wiring.link_port))?;
    let link = Link::new(port);

    let tables = config.register_tables()?;
    let initializer = SensorInitializer::new(tables, config.probe_retries);
    let camera = CameraController::new(control, sensor, SystemClock::new());

    let mut app = AppController::new(camera, initializer, config.pipeline, link);

    match app.startup()? {
        StartupOutcome::Ready(_) => {}
        StartupOutcome::Halted(e) => {
            error!("初期化失敗: {}", e);
            if app.wait_for_intervention(IDLE_POLL_MS)?.is_none() {
                warn!("初期化されないまま終了します");
                return Ok(());
            }
        }
    }

    app.run(IDLE_POLL_MS)?;
    info!("終了します");
    Ok(())
}
