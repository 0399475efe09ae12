// Artifact module - 待扫描工件
// 上传文件的本地描述：路径、原始文件名和推断出的类别

use std::fmt;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

/// 工件类别，决定哪些引擎适用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// 普通文件
    File,
    /// SQLite 数据库
    Database,
    /// 压缩容器 (zip/tar/tgz)
    Archive,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::File => write!(f, "file"),
            ArtifactKind::Database => write!(f, "database"),
            ArtifactKind::Archive => write!(f, "archive"),
        }
    }
}

/// 一次扫描调用的输入。扫描期间所有引擎只读访问 `path`；
/// 若携带 scratch 目录，Artifact 被消费时目录随之删除，无论扫描成败
pub struct Artifact {
    pub path: PathBuf,
    pub original_name: String,
    pub kind: ArtifactKind,
    _scratch: Option<TempDir>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, original_name: impl Into<String>) -> io::Result<Self> {
        let path = path.into();
        let original_name = original_name.into();
        let kind = detect_kind(&path, &original_name)?;
        Ok(Self {
            path,
            original_name,
            kind,
            _scratch: None,
        })
    }

    /// 接管 scratch 目录的所有权，保证扫描调用结束后清理
    pub fn with_scratch(
        scratch: TempDir,
        path: impl Into<PathBuf>,
        original_name: impl Into<String>,
    ) -> io::Result<Self> {
        let mut artifact = Self::new(path, original_name)?;
        artifact._scratch = Some(scratch);
        Ok(artifact)
    }
}

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// 类别推断：先看文件头魔数，再退回扩展名。
/// 内容优先于扩展名，改名的 zip 仍然会按归档处理
pub fn detect_kind(path: &Path, original_name: &str) -> io::Result<ArtifactKind> {
    let mut file = fs::File::open(path)?;
    let mut head = [0u8; 16];
    let n = file.read(&mut head)?;

    if n >= 16 && &head == SQLITE_MAGIC {
        return Ok(ArtifactKind::Database);
    }
    // zip: 本地文件头 / 空归档 / 分段结束标记
    if n >= 4
        && (head.starts_with(b"PK\x03\x04")
            || head.starts_with(b"PK\x05\x06")
            || head.starts_with(b"PK\x07\x08"))
    {
        return Ok(ArtifactKind::Archive);
    }
    // gzip
    if n >= 2 && head[0] == 0x1f && head[1] == 0x8b {
        return Ok(ArtifactKind::Archive);
    }
    // ustar 魔数在偏移 257 处
    let mut magic = [0u8; 5];
    if file.seek(SeekFrom::Start(257)).is_ok() {
        if let Ok(m) = file.read(&mut magic) {
            if m == 5 && &magic == b"ustar" {
                return Ok(ArtifactKind::Archive);
            }
        }
    }

    Ok(kind_from_extension(original_name))
}

fn kind_from_extension(original_name: &str) -> ArtifactKind {
    let name = original_name.to_lowercase();
    let archive_exts = [".zip", ".tar", ".tar.gz", ".tgz", ".gz"];
    if archive_exts.iter().any(|ext| name.ends_with(ext)) {
        return ArtifactKind::Archive;
    }
    let db_exts = [".db", ".sqlite", ".sqlite3"];
    if db_exts.iter().any(|ext| name.ends_with(ext)) {
        return ArtifactKind::Database;
    }
    ArtifactKind::File
}
