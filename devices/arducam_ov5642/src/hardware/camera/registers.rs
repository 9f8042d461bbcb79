//! ArduCAM CPLD と OV5642 のレジスタ定義

// --- CPLD (SPI制御バス, 8ビットアドレス) ---

/// テストレジスタ (SPI 配線の自己診断用)
pub const ARDUCHIP_TEST1: u8 = 0x00;
/// 1回のキャプチャで取得するフレーム数 (0 = 1フレーム)
pub const ARDUCHIP_FRAMES: u8 = 0x01;
/// タイミングレジスタ。下位4ビットがクロック/ビット位相の選択 (DeviceMode)
pub const ARDUCHIP_TIM: u8 = 0x03;
pub const ARDUCHIP_FIFO: u8 = 0x04;
/// センサの電源/リセット制御
pub const ARDUCHIP_GPIO: u8 = 0x06;
/// CPLD のリセット
pub const ARDUCHIP_RESET: u8 = 0x07;
pub const ARDUCHIP_REV: u8 = 0x40;
pub const ARDUCHIP_TRIG: u8 = 0x41;

pub const FIFO_SIZE1: u8 = 0x42;
pub const FIFO_SIZE2: u8 = 0x43;
pub const FIFO_SIZE3: u8 = 0x44;

pub const FIFO_CLEAR_MASK: u8 = 0x01;
pub const FIFO_START_MASK: u8 = 0x02;
pub const FIFO_RDPTR_RST_MASK: u8 = 0x10;
pub const FIFO_WRPTR_RST_MASK: u8 = 0x20;

pub const CAP_DONE_MASK: u8 = 0x08;
pub const VSYNC_LEVEL_MASK: u8 = 0x02;
pub const MODE_BITS_MASK: u8 = 0x0F;

pub const TEST_PATTERN: u8 = 0x55;

/// センサをリセット + パワーダウン + 電源OFF
pub const GPIO_SENSOR_HOLD: u8 = 0x00;
/// リセット解除 + 電源ON
pub const GPIO_SENSOR_RELEASE: u8 = 0x05;

pub const CPLD_RESET_ASSERT: u8 = 0x80;
pub const CPLD_RESET_RELEASE: u8 = 0x00;

// --- OV5642 (I2Cセンサバス, 16ビットアドレス) ---

pub const OV5642_CHIPID_HIGH: u16 = 0x300A;
pub const OV5642_CHIPID_LOW: u16 = 0x300B;
pub const OV5642_EXPECTED_VID: u8 = 0x56;
pub const OV5642_EXPECTED_PID: u8 = 0x42;

pub const OV5642_SYSTEM_CTRL0: u16 = 0x3008;
pub const SYSTEM_SOFT_RESET: u8 = 0x80;
pub const SYSTEM_AWAKE: u8 = 0x00;

pub const OV5642_TEST_PATTERN: u16 = 0x503D;
pub const TEST_PATTERN_DISABLED: u8 = 0x00;
