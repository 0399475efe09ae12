// Safety module - 归档安全校验
// 只读取容器的目录结构和声明大小，拒绝可能耗尽资源的归档（zip 炸弹防御）。
// 任何基于解压的引擎必须在校验通过之后才允许运行

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 归档校验上限，可由配置覆盖
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveLimits {
    pub max_entries: usize,
    pub max_total_size: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_total_size: 500 * 1024 * 1024, // 500 MiB
        }
    }
}

/// 容器的元数据摘要，校验时临时计算，从不落盘
#[derive(Debug, Clone, Copy)]
pub struct ArchiveManifest {
    pub entry_count: usize,
    pub total_declared_size: u64,
}

#[derive(Error, Debug)]
pub enum SafetyViolation {
    #[error("archive has too many entries ({count} > {limit})")]
    TooManyEntries { count: usize, limit: usize },

    #[error("archive declared size exceeds limit ({limit} bytes)")]
    ArchiveTooLarge { limit: u64 },

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),
}

/// 校验归档容器。按魔数而不是扩展名选择格式，
/// 累计声明大小一越界立即返回，不再读取剩余条目
pub fn validate_archive(
    path: &Path,
    limits: &ArchiveLimits,
) -> Result<ArchiveManifest, SafetyViolation> {
    let mut file = File::open(path).map_err(|e| SafetyViolation::CorruptArchive(e.to_string()))?;

    let mut head = [0u8; 4];
    let n = file
        .read(&mut head)
        .map_err(|e| SafetyViolation::CorruptArchive(e.to_string()))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| SafetyViolation::CorruptArchive(e.to_string()))?;

    if n >= 4 && head.starts_with(b"PK") {
        validate_zip(file, limits)
    } else if n >= 2 && head[0] == 0x1f && head[1] == 0x8b {
        validate_tar(GzDecoder::new(file), limits)
    } else {
        // 裸 tar 没有文件头魔数（ustar 在 257 偏移处），直接按 tar 流解析
        validate_tar(file, limits)
    }
}

fn validate_zip(file: File, limits: &ArchiveLimits) -> Result<ArchiveManifest, SafetyViolation> {
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| SafetyViolation::CorruptArchive(e.to_string()))?;

    let entry_count = archive.len();
    if entry_count > limits.max_entries {
        return Err(SafetyViolation::TooManyEntries {
            count: entry_count,
            limit: limits.max_entries,
        });
    }

    let mut total: u64 = 0;
    for i in 0..entry_count {
        let entry = archive
            .by_index_raw(i)
            .map_err(|e| SafetyViolation::CorruptArchive(e.to_string()))?;
        total = total.saturating_add(entry.size());
        if total > limits.max_total_size {
            return Err(SafetyViolation::ArchiveTooLarge {
                limit: limits.max_total_size,
            });
        }
    }

    Ok(ArchiveManifest {
        entry_count,
        total_declared_size: total,
    })
}

fn validate_tar<R: Read>(
    reader: R,
    limits: &ArchiveLimits,
) -> Result<ArchiveManifest, SafetyViolation> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| SafetyViolation::CorruptArchive(e.to_string()))?;

    let mut count: usize = 0;
    let mut total: u64 = 0;
    for entry in entries {
        let entry = entry.map_err(|e| SafetyViolation::CorruptArchive(e.to_string()))?;
        count += 1;
        if count > limits.max_entries {
            return Err(SafetyViolation::TooManyEntries {
                count,
                limit: limits.max_entries,
            });
        }
        let size = entry
            .header()
            .size()
            .map_err(|e| SafetyViolation::CorruptArchive(e.to_string()))?;
        total = total.saturating_add(size);
        if total > limits.max_total_size {
            return Err(SafetyViolation::ArchiveTooLarge {
                limit: limits.max_total_size,
            });
        }
    }

    Ok(ArchiveManifest {
        entry_count: count,
        total_declared_size: total,
    })
}
