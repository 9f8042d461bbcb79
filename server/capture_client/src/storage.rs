//! 受信画像の保存

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{info, warn};
use sha2::{Digest, Sha256};

/// 同じ秒に保存が重なったときに試す連番の上限
const MAX_COLLISION_SUFFIX: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("no free file name for {0}")]
    NameExhausted(String),
}

/// 保存した画像の情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    pub path: PathBuf,
    pub size: usize,
    /// SHA-256 (16進)
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 現在時刻のファイル名で保存する
    pub fn save(&self, data: &[u8]) -> Result<SavedImage, StorageError> {
        self.save_at(data, Local::now())
    }

    /// `img_YYYYmmdd-HHMMSS.jpg` で保存する。既に存在する場合は `_1`, `_2`... を付ける
    pub fn save_at(&self, data: &[u8], time: DateTime<Local>) -> Result<SavedImage, StorageError> {
        fs::create_dir_all(&self.dir).map_err(|source| StorageError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let stem = format!("img_{}", time.format("%Y%m%d-%H%M%S"));
        for suffix in 0..MAX_COLLISION_SUFFIX {
            let name = match suffix {
                0 => format!("{}.jpg", stem),
                n => format!("{}_{}.jpg", stem, n),
            };
            let path = self.dir.join(name);

            let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(StorageError::Write { path, source }),
            };
            let written = fill_or_remove(file, &path, |file| {
                file.write_all(data)?;
                file.sync_all()
            });
            if let Err(source) = written {
                return Err(StorageError::Write { path, source });
            }

            let sha256 = hex::encode(Sha256::digest(data));
            info!(
                "画像を保存しました: {} ({} bytes, sha256={})",
                path.display(),
                data.len(),
                sha256
            );
            return Ok(SavedImage {
                path,
                size: data.len(),
                sha256,
            });
        }
        Err(StorageError::NameExhausted(stem))
    }
}

/// 新規作成したファイルに書き込む。失敗した場合は書きかけのファイルを削除する
fn fill_or_remove<F>(mut file: File, path: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let result = fill(&mut file);
    drop(file);
    if result.is_err() {
        if let Err(e) = fs::remove_file(path) {
            warn!("書きかけのファイルを削除できません: {} ({})", path.display(), e);
        }
    }
    result
}
