//! テスト用のハードウェアモック
//!
//! 実機なしで ArduCAM (CPLD + FIFO)、OV5642、クロック、シリアルリンクをシミュレートします。
//! 状態は `Arc<Mutex<..>>` で共有されるため、ドライバにムーブした後もテストから検証できます。

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::i2c::{self, I2c, NoAcknowledgeSource, Operation};
use embedded_hal::spi::{self, SpiBus};

use super::bus::i2c::OV5642_I2C_ADDRESS;
use super::bus::spi::BURST_FIFO_READ;
use super::camera::registers::{
    ARDUCHIP_FIFO, ARDUCHIP_REV, ARDUCHIP_TEST1, ARDUCHIP_TIM, ARDUCHIP_TRIG, CAP_DONE_MASK,
    FIFO_CLEAR_MASK, FIFO_RDPTR_RST_MASK, FIFO_SIZE1, FIFO_SIZE2, FIFO_SIZE3, FIFO_START_MASK,
    OV5642_CHIPID_HIGH, OV5642_CHIPID_LOW,
};
use super::clock::Clock;

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// モックバスのエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// SPI 転送失敗
    Spi,
    /// I2C の NACK
    Nack,
}

impl spi::Error for MockFault {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

impl i2c::Error for MockFault {
    fn kind(&self) -> i2c::ErrorKind {
        match self {
            MockFault::Nack => i2c::ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            MockFault::Spi => i2c::ErrorKind::Other,
        }
    }
}

#[derive(Debug)]
struct ChipState {
    regs: Vec<u8>,
    selected: bool,
    command: Option<u8>,
    fifo: Vec<u8>,
    read_ptr: usize,
    frames: HashMap<u8, Vec<u8>>,
    default_frame: Vec<u8>,
    fill_after_polls: Option<u32>,
    pending_polls: Option<u32>,
    capture_mode: u8,
    length_override: Option<u32>,
    stray_length_bits: u8,
    test_register_stuck: Option<u8>,
    bus_fault: bool,
    writes: Vec<(u8, u8)>,
    bursts: usize,
    captured_modes: Vec<u8>,
    starts_with_flag_set: usize,
}

impl ChipState {
    fn new() -> Self {
        let mut regs = vec![0u8; 256];
        regs[ARDUCHIP_REV as usize] = 0x73;
        Self {
            regs,
            selected: false,
            command: None,
            fifo: Vec::new(),
            read_ptr: 0,
            frames: HashMap::new(),
            default_frame: Vec::new(),
            fill_after_polls: Some(0),
            pending_polls: None,
            capture_mode: 0,
            length_override: None,
            stray_length_bits: 0,
            test_register_stuck: None,
            bus_fault: false,
            writes: Vec::new(),
            bursts: 0,
            captured_modes: Vec::new(),
            starts_with_flag_set: 0,
        }
    }

    fn fifo_length(&self) -> u32 {
        self.length_override.unwrap_or(self.fifo.len() as u32)
    }

    fn write_register(&mut self, addr: u8, value: u8) {
        self.writes.push((addr, value));
        if addr == ARDUCHIP_FIFO {
            if value & FIFO_CLEAR_MASK != 0 {
                self.regs[ARDUCHIP_TRIG as usize] &= !CAP_DONE_MASK;
            }
            if value & FIFO_RDPTR_RST_MASK != 0 {
                self.read_ptr = 0;
            }
            if value & FIFO_START_MASK != 0 {
                if self.regs[ARDUCHIP_TRIG as usize] & CAP_DONE_MASK != 0 {
                    self.starts_with_flag_set += 1;
                }
                self.capture_mode = self.regs[ARDUCHIP_TIM as usize] & 0x0F;
                self.captured_modes.push(self.capture_mode);
                self.pending_polls = self.fill_after_polls;
            }
            return;
        }
        self.regs[addr as usize] = value;
    }

    fn read_register(&mut self, addr: u8) -> u8 {
        match addr {
            ARDUCHIP_TEST1 => self.test_register_stuck.unwrap_or(self.regs[addr as usize]),
            ARDUCHIP_TRIG => {
                if let Some(remaining) = self.pending_polls {
                    if remaining == 0 {
                        self.complete_capture();
                    } else {
                        self.pending_polls = Some(remaining - 1);
                    }
                }
                self.regs[addr as usize]
            }
            FIFO_SIZE1 => (self.fifo_length() & 0xFF) as u8,
            FIFO_SIZE2 => ((self.fifo_length() >> 8) & 0xFF) as u8,
            FIFO_SIZE3 => ((self.fifo_length() >> 16) & 0x7F) as u8 | self.stray_length_bits,
            _ => self.regs[addr as usize],
        }
    }

    fn complete_capture(&mut self) {
        self.pending_polls = None;
        self.fifo = self
            .frames
            .get(&self.capture_mode)
            .cloned()
            .unwrap_or_else(|| self.default_frame.clone());
        self.regs[ARDUCHIP_TRIG as usize] |= CAP_DONE_MASK;
    }

    fn write_word(&mut self, word: u8) {
        match self.command {
            None => {
                self.command = Some(word);
                if word == BURST_FIFO_READ {
                    self.bursts += 1;
                }
            }
            Some(cmd) if cmd & 0x80 != 0 => self.write_register(cmd & 0x7F, word),
            Some(_) => {}
        }
    }

    fn read_words(&mut self, words: &mut [u8]) {
        match self.command {
            Some(BURST_FIFO_READ) => {
                for word in words.iter_mut() {
                    *word = self.fifo.get(self.read_ptr).copied().unwrap_or(0x00);
                    self.read_ptr += 1;
                }
            }
            Some(cmd) if cmd & 0x80 == 0 => {
                words.fill(0);
                if let Some(first) = words.first_mut() {
                    *first = self.read_register(cmd);
                }
            }
            _ => words.fill(0),
        }
    }
}

/// ArduCAM の CPLD/FIFO を模した SPI デバイス
///
/// キャプチャ開始時のタイミングレジスタ下位4ビット (DeviceMode) に応じて
/// FIFO に格納されるフレームを切り替えられます。
#[derive(Debug, Clone)]
pub struct MockArduChip {
    state: Arc<Mutex<ChipState>>,
}

impl Default for MockArduChip {
    fn default() -> Self {
        Self::new()
    }
}

impl MockArduChip {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChipState::new())),
        }
    }

    /// このチップに接続されたチップセレクトピン
    pub fn chip_select(&self) -> MockChipSelect {
        MockChipSelect {
            state: Arc::clone(&self.state),
        }
    }

    /// テスト用: 指定モードでキャプチャしたときの FIFO 内容を設定
    pub fn set_frame_for_mode(&self, mode: u8, frame: Vec<u8>) {
        lock(&self.state).frames.insert(mode & 0x0F, frame);
    }

    /// テスト用: モード別の設定がないときの FIFO 内容を設定
    pub fn set_default_frame(&self, frame: Vec<u8>) {
        lock(&self.state).default_frame = frame;
    }

    /// テスト用: FIFO の内容を直接設定し、キャプチャ完了状態にする
    pub fn load_fifo(&self, data: Vec<u8>) {
        let mut state = lock(&self.state);
        state.fifo = data;
        state.read_ptr = 0;
        state.regs[ARDUCHIP_TRIG as usize] |= CAP_DONE_MASK;
    }

    /// テスト用: キャプチャ開始から完了フラグが立つまでのポーリング回数 (`None` で完了しない)
    pub fn set_fill_after_polls(&self, polls: Option<u32>) {
        lock(&self.state).fill_after_polls = polls;
    }

    /// テスト用: 長さレジスタが報告する値を上書き
    pub fn set_length_override(&self, length: Option<u32>) {
        lock(&self.state).length_override = length;
    }

    /// テスト用: 長さレジスタ最上位バイトに混入する余分なビット
    pub fn set_stray_length_bits(&self, bits: u8) {
        lock(&self.state).stray_length_bits = bits;
    }

    /// テスト用: テストレジスタの読み出し値を固定 (SPI 配線不良のシミュレート)
    pub fn set_test_register_stuck(&self, value: Option<u8>) {
        lock(&self.state).test_register_stuck = value;
    }

    /// テスト用: SPI 転送エラーをシミュレート
    pub fn set_bus_fault(&self, enable: bool) {
        lock(&self.state).bus_fault = enable;
    }

    pub fn set_register(&self, addr: u8, value: u8) {
        lock(&self.state).regs[addr as usize] = value;
    }

    pub fn register(&self, addr: u8) -> u8 {
        lock(&self.state).regs[addr as usize]
    }

    /// 完了フラグが立っているか
    pub fn done_flag(&self) -> bool {
        lock(&self.state).regs[ARDUCHIP_TRIG as usize] & CAP_DONE_MASK != 0
    }

    pub fn is_selected(&self) -> bool {
        lock(&self.state).selected
    }

    /// 書き込まれた (アドレス, 値) の記録
    pub fn writes(&self) -> Vec<(u8, u8)> {
        lock(&self.state).writes.clone()
    }

    /// 発行されたバーストリードコマンドの数
    pub fn burst_count(&self) -> usize {
        lock(&self.state).bursts
    }

    /// キャプチャ開始時の DeviceMode の履歴
    pub fn captured_modes(&self) -> Vec<u8> {
        lock(&self.state).captured_modes.clone()
    }

    /// 完了フラグを消さずにキャプチャを開始した回数
    pub fn starts_with_flag_set(&self) -> usize {
        lock(&self.state).starts_with_flag_set
    }
}

impl spi::ErrorType for MockArduChip {
    type Error = MockFault;
}

impl SpiBus<u8> for MockArduChip {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        if state.bus_fault {
            return Err(MockFault::Spi);
        }
        state.read_words(words);
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        if state.bus_fault {
            return Err(MockFault::Spi);
        }
        for &word in words {
            state.write_word(word);
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        self.write(write)?;
        self.read(read)
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        let outgoing = words.to_vec();
        self.write(&outgoing)?;
        self.read(words)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// `MockArduChip` のチップセレクト
#[derive(Debug, Clone)]
pub struct MockChipSelect {
    state: Arc<Mutex<ChipState>>,
}

impl digital::ErrorType for MockChipSelect {
    type Error = Infallible;
}

impl OutputPin for MockChipSelect {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        state.selected = true;
        state.command = None;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        state.selected = false;
        state.command = None;
        Ok(())
    }
}

#[derive(Debug)]
struct SensorState {
    regs: HashMap<u16, u8>,
    pointer: u16,
    nack: bool,
    id_ready_after: u32,
    id_reads: u32,
    writes: Vec<(u16, u8)>,
}

/// OV5642 を模した I2C デバイス
#[derive(Debug, Clone)]
pub struct MockSensor {
    state: Arc<Mutex<SensorState>>,
}

impl Default for MockSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSensor {
    /// チップID (0x56, 0x42) を返すセンサを作成
    pub fn new() -> Self {
        let mut regs = HashMap::new();
        regs.insert(OV5642_CHIPID_HIGH, 0x56);
        regs.insert(OV5642_CHIPID_LOW, 0x42);
        Self {
            state: Arc::new(Mutex::new(SensorState {
                regs,
                pointer: 0,
                nack: false,
                id_ready_after: 0,
                id_reads: 0,
                writes: Vec::new(),
            })),
        }
    }

    /// テスト用: チップIDを変更
    pub fn set_chip_id(&self, high: u8, low: u8) {
        let mut state = lock(&self.state);
        state.regs.insert(OV5642_CHIPID_HIGH, high);
        state.regs.insert(OV5642_CHIPID_LOW, low);
    }

    /// テスト用: 最初の `reads` 回の ID 読み取りでは 0x00 を返す (電源投入直後の再現)
    pub fn set_id_ready_after(&self, reads: u32) {
        lock(&self.state).id_ready_after = reads;
    }

    /// テスト用: NACK をシミュレート
    pub fn set_nack(&self, enable: bool) {
        lock(&self.state).nack = enable;
    }

    pub fn register(&self, addr: u16) -> Option<u8> {
        lock(&self.state).regs.get(&addr).copied()
    }

    /// 書き込まれた (アドレス, 値) の記録
    pub fn writes(&self) -> Vec<(u16, u8)> {
        lock(&self.state).writes.clone()
    }
}

impl i2c::ErrorType for MockSensor {
    type Error = MockFault;
}

impl I2c for MockSensor {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        if state.nack || address != OV5642_I2C_ADDRESS {
            return Err(MockFault::Nack);
        }

        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    if bytes.len() >= 2 {
                        state.pointer = u16::from_be_bytes([bytes[0], bytes[1]]);
                    }
                    if let Some(&value) = bytes.get(2) {
                        let pointer = state.pointer;
                        state.regs.insert(pointer, value);
                        state.writes.push((pointer, value));
                    }
                }
                Operation::Read(buf) => {
                    let pointer = state.pointer;
                    let id_register = pointer == OV5642_CHIPID_HIGH || pointer == OV5642_CHIPID_LOW;
                    if pointer == OV5642_CHIPID_HIGH {
                        state.id_reads += 1;
                    }
                    let value = if id_register && state.id_reads <= state.id_ready_after {
                        0x00
                    } else {
                        state.regs.get(&pointer).copied().unwrap_or(0)
                    };
                    buf.fill(value);
                }
            }
        }
        Ok(())
    }
}

/// 待機した分だけ時間が進むクロック
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    nanos: Arc<Mutex<u64>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_ms(&self) -> u64 {
        *lock(&self.nanos) / 1_000_000
    }
}

impl DelayNs for MockClock {
    fn delay_ns(&mut self, ns: u32) {
        *lock(&self.nanos) += u64::from(ns);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.elapsed_ms()
    }
}

/// ホストとのシリアルリンクを模したチャネル
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    incoming: Arc<Mutex<VecDeque<u8>>>,
    outgoing: Arc<Mutex<Vec<u8>>>,
    simulate_write_error: Arc<Mutex<bool>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// テスト用: ホストから届くバイトを追加
    pub fn queue_input(&self, data: &[u8]) {
        lock(&self.incoming).extend(data.iter().copied());
    }

    /// テスト用: デバイスが送信したバイト列
    pub fn output(&self) -> Vec<u8> {
        lock(&self.outgoing).clone()
    }

    pub fn clear_output(&self) {
        lock(&self.outgoing).clear();
    }

    /// テスト用: 送信データのうちテキスト部分の行
    pub fn output_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.output())
            .lines()
            .map(|line| line.to_string())
            .collect()
    }

    /// テスト用: 書き込みエラーをシミュレート
    pub fn set_write_error(&self, enable: bool) {
        *lock(&self.simulate_write_error) = enable;
    }
}

impl io::Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut incoming = lock(&self.incoming);
        if incoming.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(incoming.len());
        for (slot, byte) in buf.iter_mut().zip(incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl io::Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if *lock(&self.simulate_write_error) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write error"));
        }
        lock(&self.outgoing).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_capture_fills_after_polls() {
        let mut chip = MockArduChip::new();
        let mut cs = chip.chip_select();
        chip.set_fill_after_polls(Some(2));
        chip.set_default_frame(vec![1, 2, 3]);

        let mut write = |chip: &mut MockArduChip, addr: u8, value: u8| {
            cs.set_low().unwrap();
            chip.write(&[addr | 0x80, value]).unwrap();
            cs.set_high().unwrap();
        };
        write(&mut chip, ARDUCHIP_FIFO, FIFO_START_MASK);

        let mut cs = chip.chip_select();
        let mut poll = |chip: &mut MockArduChip| {
            cs.set_low().unwrap();
            chip.write(&[ARDUCHIP_TRIG]).unwrap();
            let mut buf = [0u8];
            chip.read(&mut buf).unwrap();
            cs.set_high().unwrap();
            buf[0] & CAP_DONE_MASK != 0
        };
        assert!(!poll(&mut chip));
        assert!(!poll(&mut chip));
        assert!(poll(&mut chip));
        assert_eq!(chip.captured_modes(), vec![0]);
    }

    #[test]
    fn test_mock_clock_advances_on_delay() {
        let mut clock = MockClock::new();
        clock.delay_ms(25);
        clock.delay_us(1_000);
        assert_eq!(clock.now_ms(), 26);
    }

    #[test]
    fn test_mock_link_read_timeout_when_empty() {
        let mut link = MockLink::new();
        let mut buf = [0u8; 4];
        let err = io::Read::read(&mut link, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        link.queue_input(&[0x10]);
        assert_eq!(io::Read::read(&mut link, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0x10);
    }
}
