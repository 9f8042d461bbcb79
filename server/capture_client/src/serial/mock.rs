use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use super::{SerialError, SerialInterface, SerialResult};

/// 受信データがないときに1回の読み取りで待つ時間
const EMPTY_READ_DELAY: Duration = Duration::from_millis(2);

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// テスト用のシリアルポートモック実装
///
/// 実際のデバイスを使わずにシリアル通信をシミュレートします。
/// 書き込まれたバイトに応じて応答を返せるため、キャプチャ要求からの一連のやり取りを再現できます。
#[derive(Debug, Clone, Default)]
pub struct MockSerial {
    /// 送信されたデータの記録
    pub sent_data: Arc<Mutex<Vec<u8>>>,
    /// 読み取り用のデータキュー（1回の読み取りで先頭の1要素まで返す）
    pub read_data_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// 特定のバイトを受け取ったときに受信キューへ追加する応答
    pub responses: Arc<Mutex<HashMap<u8, Vec<Vec<u8>>>>>,
    pub simulate_read_error: Arc<Mutex<bool>>,
    pub simulate_write_error: Arc<Mutex<bool>>,
    pub clear_count: Arc<Mutex<usize>>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// テスト用: 読み取り用データをキューに追加
    pub fn queue_read_data(&self, data: &[u8]) {
        lock(&self.read_data_queue).push_back(data.to_vec());
    }

    /// テスト用: `byte` が書き込まれたら `chunks` を順に受信させる
    pub fn respond_to(&self, byte: u8, chunks: Vec<Vec<u8>>) {
        lock(&self.responses).insert(byte, chunks);
    }

    /// テスト用: 送信されたデータを取得
    pub fn get_sent_data(&self) -> Vec<u8> {
        lock(&self.sent_data).clone()
    }

    /// テスト用: 受信バッファが破棄された回数
    pub fn clear_count(&self) -> usize {
        *lock(&self.clear_count)
    }

    /// テスト用: 読み取りエラーをシミュレート
    pub fn set_read_error(&self, enable: bool) {
        *lock(&self.simulate_read_error) = enable;
    }

    /// テスト用: 書き込みエラーをシミュレート
    pub fn set_write_error(&self, enable: bool) {
        *lock(&self.simulate_write_error) = enable;
    }
}

impl SerialInterface for MockSerial {
    fn write_all(&mut self, data: &[u8]) -> SerialResult<()> {
        if *lock(&self.simulate_write_error) {
            return Err(SerialError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "Simulated write error",
            )));
        }

        lock(&self.sent_data).extend_from_slice(data);

        let responses = lock(&self.responses);
        let mut queue = lock(&self.read_data_queue);
        for byte in data {
            if let Some(chunks) = responses.get(byte) {
                queue.extend(chunks.iter().cloned());
            }
        }
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> SerialResult<usize> {
        if *lock(&self.simulate_read_error) {
            return Err(SerialError::Io(io::Error::new(
                io::ErrorKind::Other,
                "Simulated read error",
            )));
        }

        let mut queue = lock(&self.read_data_queue);
        let Some(mut data) = queue.pop_front() else {
            drop(queue);
            // 実機の読み取りタイムアウトの代わり
            thread::sleep(EMPTY_READ_DELAY);
            return Ok(0);
        };

        let len = data.len().min(buffer.len());
        buffer[..len].copy_from_slice(&data[..len]);
        if len < data.len() {
            // 入り切らなかった残りは次回に返す
            queue.push_front(data.split_off(len));
        }
        Ok(len)
    }

    fn clear_input(&mut self) -> SerialResult<()> {
        lock(&self.read_data_queue).clear();
        *lock(&self.clear_count) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_respond_to_queues_chunks() {
        let mut mock = MockSerial::new();
        mock.respond_to(0x10, vec![b"abc".to_vec(), b"de".to_vec()]);

        mock.write_all(&[0x10]).unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(mock.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ab");
        assert_eq!(mock.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'c');
        assert_eq!(mock.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"de");
        assert_eq!(mock.read(&mut buf).unwrap(), 0);
        assert_eq!(mock.get_sent_data(), vec![0x10]);
    }
}
