//! センサ初期化用のレジスタテーブル
//!
//! ベンダー提供のテーブルは抽出ツールが生成する 3バイト/レコード
//! (`[addr_hi, addr_lo, value]`) のファイルから読み込みます。
//! 解像度テーブルは ArduCAM のウィンドウ設定を元にここで生成します。

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::warn;

/// テーブル終端/ディレイを示す番兵アドレス
pub const SENTINEL_ADDR: u16 = 0xFFFF;

/// 番兵で挿入するディレイ
pub const SENTINEL_DELAY_MS: u32 = 5;

const PACKED_RECORD_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterEntry {
    pub addr: u16,
    pub value: u8,
}

impl RegisterEntry {
    pub const fn new(addr: u16, value: u8) -> Self {
        Self { addr, value }
    }

    pub fn is_sentinel(&self) -> bool {
        self.addr == SENTINEL_ADDR
    }
}

/// 番兵アドレスの扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelPolicy {
    /// テーブルの終端として読み込みを終了する
    Stop,
    /// 指定時間待ってから続行する
    Delay { ms: u32 },
}

impl Default for SentinelPolicy {
    fn default() -> Self {
        SentinelPolicy::Delay {
            ms: SENTINEL_DELAY_MS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("register table '{name}' is {len} bytes, not a multiple of 3")]
    Malformed { name: String, len: usize },
    #[error("failed to read register table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 順序付きのレジスタ書き込みテーブル (読み込み後は不変)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterTable {
    name: Cow<'static, str>,
    entries: Vec<RegisterEntry>,
    sentinel: SentinelPolicy,
}

impl RegisterTable {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        entries: Vec<RegisterEntry>,
        sentinel: SentinelPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            entries,
            sentinel,
        }
    }

    /// 3バイト/レコード形式のテーブルを解析
    pub fn from_packed(
        name: impl Into<Cow<'static, str>>,
        bytes: &[u8],
        sentinel: SentinelPolicy,
    ) -> Result<Self, TableError> {
        let name = name.into();
        if bytes.len() % PACKED_RECORD_LEN != 0 {
            return Err(TableError::Malformed {
                name: name.into_owned(),
                len: bytes.len(),
            });
        }

        let entries = bytes
            .chunks_exact(PACKED_RECORD_LEN)
            .map(|rec| RegisterEntry::new(u16::from_be_bytes([rec[0], rec[1]]), rec[2]))
            .collect();
        Ok(Self::new(name, entries, sentinel))
    }

    /// ファイルからテーブルを読み込む。テーブル名はファイル名 (拡張子なし)
    pub fn load_file(path: &Path, sentinel: SentinelPolicy) -> Result<Self, TableError> {
        let bytes = std::fs::read(path).map_err(|source| TableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_packed(name, &bytes, sentinel)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[RegisterEntry] {
        &self.entries
    }

    pub fn sentinel(&self) -> SentinelPolicy {
        self.sentinel
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// ベンダーテーブルのファイル名 (読み込み順)
pub const VENDOR_TABLE_FILES: [&str; 2] = ["ov5642_qvga_preview.bin", "ov5642_jpeg_capture.bin"];

/// テーブル書き込み後に必ず適用する補正
pub const POST_INIT_FIXUPS: [RegisterEntry; 7] = [
    RegisterEntry::new(0x3103, 0x93),
    RegisterEntry::new(0x3818, 0xA8),
    RegisterEntry::new(0x3621, 0x10),
    RegisterEntry::new(0x3801, 0xB0),
    RegisterEntry::new(0x4407, 0x08),
    RegisterEntry::new(0x5888, 0x00),
    RegisterEntry::new(0x5000, 0xFF),
];

/// ベンダーテーブル (存在するもののみ) と解像度テーブルを読み込み順に並べる
pub fn load_register_tables(
    table_dir: Option<&Path>,
    frame_size: FrameSize,
) -> Result<Vec<RegisterTable>, TableError> {
    let mut tables = Vec::with_capacity(VENDOR_TABLE_FILES.len() + 1);
    match table_dir {
        Some(dir) => {
            for file in VENDOR_TABLE_FILES {
                let path = dir.join(file);
                if path.is_file() {
                    tables.push(RegisterTable::load_file(&path, SentinelPolicy::default())?);
                } else {
                    warn!("Register table {} not found, skipping", path.display());
                }
            }
        }
        None => warn!("No table directory configured; loading resolution table only"),
    }
    tables.push(frame_size.table());
    Ok(tables)
}

pub fn post_init_fixups() -> RegisterTable {
    RegisterTable::new("post_init_fixups", POST_INIT_FIXUPS.to_vec(), SentinelPolicy::Stop)
}

/// JPEG 出力解像度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSize {
    Qvga,
    Vga,
    Xga,
    Uxga,
    Qsxga,
}

impl FrameSize {
    pub const fn dimensions(self) -> (u16, u16) {
        match self {
            FrameSize::Qvga => (320, 240),
            FrameSize::Vga => (640, 480),
            FrameSize::Xga => (1024, 768),
            FrameSize::Uxga => (1600, 1200),
            FrameSize::Qsxga => (2592, 1944),
        }
    }

    /// 解像度設定テーブル
    ///
    /// センサ全域 (2592x1944) のウィンドウから DSP でスケーリングして出力します。
    pub fn table(self) -> RegisterTable {
        let (width, height) = self.dimensions();
        let [w_hi, w_lo] = width.to_be_bytes();
        let [h_hi, h_lo] = height.to_be_bytes();

        let entries = vec![
            RegisterEntry::new(0x3800, 0x01),
            RegisterEntry::new(0x3801, 0xA8),
            RegisterEntry::new(0x3802, 0x00),
            RegisterEntry::new(0x3803, 0x0A),
            RegisterEntry::new(0x3804, 0x0A),
            RegisterEntry::new(0x3805, 0x20),
            RegisterEntry::new(0x3806, 0x07),
            RegisterEntry::new(0x3807, 0x98),
            RegisterEntry::new(0x3808, w_hi),
            RegisterEntry::new(0x3809, w_lo),
            RegisterEntry::new(0x380A, h_hi),
            RegisterEntry::new(0x380B, h_lo),
            RegisterEntry::new(0x380C, 0x0C),
            RegisterEntry::new(0x380D, 0x80),
            RegisterEntry::new(0x380E, 0x07),
            RegisterEntry::new(0x380F, 0xD0),
            RegisterEntry::new(0x5001, 0x7F),
            RegisterEntry::new(0x5680, 0x00),
            RegisterEntry::new(0x5681, 0x00),
            RegisterEntry::new(0x5682, 0x0A),
            RegisterEntry::new(0x5683, 0x20),
            RegisterEntry::new(0x5684, 0x00),
            RegisterEntry::new(0x5685, 0x00),
            RegisterEntry::new(0x5686, 0x07),
            RegisterEntry::new(0x5687, 0x98),
            RegisterEntry::new(SENTINEL_ADDR, 0xFF),
        ];
        RegisterTable::new(
            format!("ov5642_{}x{}", width, height),
            entries,
            SentinelPolicy::default(),
        )
    }
}

impl FromStr for FrameSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QVGA" | "320X240" => Ok(FrameSize::Qvga),
            "VGA" | "640X480" => Ok(FrameSize::Vga),
            "XGA" | "1024X768" => Ok(FrameSize::Xga),
            "UXGA" | "1600X1200" => Ok(FrameSize::Uxga),
            "QSXGA" | "2592X1944" => Ok(FrameSize::Qsxga),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.dimensions();
        write!(f, "{}x{}", width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_packed_parses_big_endian_addresses() {
        let table = RegisterTable::from_packed(
            "t",
            &[0x30, 0x08, 0x80, 0xFF, 0xFF, 0xFF],
            SentinelPolicy::Stop,
        )
        .unwrap();

        assert_eq!(
            table.entries(),
            &[RegisterEntry::new(0x3008, 0x80), RegisterEntry::new(0xFFFF, 0xFF)]
        );
        assert!(table.entries()[1].is_sentinel());
    }

    #[test]
    fn test_from_packed_rejects_partial_record() {
        let result = RegisterTable::from_packed("broken", &[0x30, 0x08], SentinelPolicy::Stop);
        assert!(matches!(result, Err(TableError::Malformed { len: 2, .. })));
    }

    #[test]
    fn test_resolution_table_encodes_output_size() {
        let table = FrameSize::Uxga.table();
        let value = |addr: u16| {
            table
                .entries()
                .iter()
                .find(|e| e.addr == addr)
                .map(|e| e.value)
        };

        assert_eq!(value(0x3808), Some(0x06));
        assert_eq!(value(0x3809), Some(0x40));
        assert_eq!(value(0x380A), Some(0x04));
        assert_eq!(value(0x380B), Some(0xB0));
        assert_eq!(table.name(), "ov5642_1600x1200");
    }

    #[test]
    fn test_load_register_tables_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(VENDOR_TABLE_FILES[0]),
            [0x30, 0x08, 0x80, 0x30, 0x08, 0x00],
        )
        .unwrap();

        let tables = load_register_tables(Some(dir.path()), FrameSize::Qvga).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name(), "ov5642_qvga_preview");
        assert_eq!(tables[0].len(), 2);
        assert_eq!(tables[1].name(), "ov5642_320x240");
    }

    #[test]
    fn test_load_register_tables_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(VENDOR_TABLE_FILES[1]), [0x30, 0x08]).unwrap();

        let result = load_register_tables(Some(dir.path()), FrameSize::Vga);
        assert!(matches!(result, Err(TableError::Malformed { .. })));
    }

    #[test]
    fn test_frame_size_parse() {
        assert_eq!("qsxga".parse::<FrameSize>(), Ok(FrameSize::Qsxga));
        assert_eq!("320x240".parse::<FrameSize>(), Ok(FrameSize::Qvga));
        assert!("SVGA".parse::<FrameSize>().is_err());
    }
}
